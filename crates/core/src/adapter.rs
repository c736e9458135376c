//! The continuation capability: how relayed activities re-enter the
//! conversation channel.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::activity::Activity;
use crate::destination::Destination;
use crate::error::DeliverError;

/// Resumes a previously observed conversation with a new outbound
/// activity. Implemented against the bot channel's service endpoint in
/// production; swap in [`RecordingAdapter`] for tests.
#[async_trait]
pub trait ConversationAdapter: Send + Sync {
    async fn continue_conversation(
        &self,
        destination: &Destination,
        activity: Activity,
    ) -> Result<(), DeliverError>;
}

#[derive(Default)]
struct RecordingInner {
    deliveries: Vec<(Destination, Activity)>,
    attempts: u32,
    fail_remaining: u32,
}

/// A `ConversationAdapter` for development and integration testing:
/// records every successful delivery and can script failures.
#[derive(Default)]
pub struct RecordingAdapter {
    inner: Mutex<RecordingInner>,
}

impl RecordingAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` continuation calls fail.
    pub async fn fail_next(&self, count: u32) {
        self.inner.lock().await.fail_remaining = count;
    }

    /// Continuation calls observed, including failed ones.
    pub async fn attempts(&self) -> u32 {
        self.inner.lock().await.attempts
    }

    /// Successful deliveries, in order.
    pub async fn deliveries(&self) -> Vec<(Destination, Activity)> {
        self.inner.lock().await.deliveries.clone()
    }
}

#[async_trait]
impl ConversationAdapter for RecordingAdapter {
    async fn continue_conversation(
        &self,
        destination: &Destination,
        activity: Activity,
    ) -> Result<(), DeliverError> {
        let mut inner = self.inner.lock().await;
        inner.attempts += 1;
        if inner.fail_remaining > 0 {
            inner.fail_remaining -= 1;
            return Err(DeliverError::Adapter(anyhow::anyhow!(
                "scripted delivery failure"
            )));
        }
        inner.deliveries.push((destination.clone(), activity));
        Ok(())
    }
}
