//! Routes normalized bus messages into the stored conversation.
//!
//! The router holds the one live [`Destination`] (overwritten wholesale by
//! the HTTP path, read here on every delivery) and the processing flag
//! that keeps overlapping deliveries from queueing duplicate typing
//! indicators. The flag is cleared through a drop guard so a mid-delivery
//! failure can never leave it stuck.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use crate::activity::{reply_activity, typing_activity};
use crate::adapter::ConversationAdapter;
use crate::destination::Destination;
use crate::error::DeliverError;
use crate::normalize::NormalizedMessage;

pub struct DestinationRouter {
    adapter: Arc<dyn ConversationAdapter>,
    destination: RwLock<Option<Destination>>,
    processing: AtomicBool,
}

/// Clears the processing flag when dropped, on success and failure alike.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl DestinationRouter {
    pub fn new(adapter: Arc<dyn ConversationAdapter>) -> Self {
        Self {
            adapter,
            destination: RwLock::new(None),
            processing: AtomicBool::new(false),
        }
    }

    /// Overwrites the stored destination. Last write wins; fields are
    /// never merged.
    pub async fn set_destination(&self, destination: Destination) {
        *self.destination.write().await = Some(destination);
    }

    pub async fn current_destination(&self) -> Option<Destination> {
        self.destination.read().await.clone()
    }

    /// Whether a typing-indicator/message pair is currently in flight.
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    fn begin_processing(&self) -> Option<ProcessingGuard<'_>> {
        self.processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ProcessingGuard(&self.processing))
    }

    /// Relays one normalized message: typing indicator first (unless an
    /// overlapping delivery already holds the processing flag), then the
    /// message itself. The flag clears on every exit path.
    pub async fn relay(&self, message: &NormalizedMessage) -> Result<(), DeliverError> {
        let _guard = match self.begin_processing() {
            Some(guard) => {
                if let Err(err) = self.send_typing().await {
                    warn!(error = %err, "typing indicator delivery failed");
                }
                Some(guard)
            }
            None => {
                debug!("delivery already in flight; skipping typing indicator");
                None
            }
        };
        self.deliver(message).await
    }

    /// Delivers the reply activity for `message` to the stored
    /// destination. Adapter failures are logged and re-raised; they never
    /// affect the bus connection, and the frame counts as processed.
    pub async fn deliver(&self, message: &NormalizedMessage) -> Result<(), DeliverError> {
        let destination = self
            .current_destination()
            .await
            .ok_or(DeliverError::NoDestination)?;
        let activity = reply_activity(message);
        self.adapter
            .continue_conversation(&destination, activity)
            .await
            .inspect_err(|err| {
                error!(agent = %message.agent, error = %err, "continuation delivery failed");
            })
    }

    async fn send_typing(&self) -> Result<(), DeliverError> {
        let destination = self
            .current_destination()
            .await
            .ok_or(DeliverError::NoDestination)?;
        self.adapter
            .continue_conversation(&destination, typing_activity())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::kind;
    use crate::adapter::RecordingAdapter;
    use crate::normalize::normalize;

    fn router_with_adapter() -> (Arc<RecordingAdapter>, DestinationRouter) {
        let adapter = Arc::new(RecordingAdapter::new());
        let router = DestinationRouter::new(adapter.clone() as Arc<dyn ConversationAdapter>);
        (adapter, router)
    }

    #[tokio::test]
    async fn deliver_without_destination_is_defensive_error() {
        let (_adapter, router) = router_with_adapter();
        let message = normalize("hello");
        let err = router.deliver(&message).await.unwrap_err();
        assert!(matches!(err, DeliverError::NoDestination));
    }

    #[tokio::test]
    async fn relay_sends_typing_then_message() {
        let (adapter, router) = router_with_adapter();
        router
            .set_destination(Destination::bootstrap("http://localhost:3978"))
            .await;

        let message = normalize(r#"{"message":"Hello","agent":"Planner"}"#);
        router.relay(&message).await.expect("relay");

        let deliveries = adapter.deliveries().await;
        assert_eq!(deliveries.len(), 2);
        assert_eq!(deliveries[0].1.kind, kind::TYPING);
        assert_eq!(deliveries[1].1.kind, kind::MESSAGE);
        assert_eq!(
            deliveries[1].1.from.as_ref().unwrap().id,
            "agent-planner"
        );
        assert!(!router.is_processing());
    }

    #[tokio::test]
    async fn destination_overwrite_is_wholesale() {
        let (adapter, router) = router_with_adapter();

        let a = Destination::bootstrap("http://a.example");
        let mut b = Destination::bootstrap("http://b.example");
        b.conversation.id = "conv-b".to_string();

        router.set_destination(a).await;
        router.set_destination(b.clone()).await;

        let message = normalize("hi");
        router.deliver(&message).await.expect("deliver");

        let deliveries = adapter.deliveries().await;
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].0, b);
        assert_eq!(deliveries[0].0.conversation.id, "conv-b");
        assert_eq!(deliveries[0].0.service_url, "http://b.example");
    }

    #[tokio::test]
    async fn processing_flag_clears_on_failure_and_typing_recovers() {
        let (adapter, router) = router_with_adapter();
        router
            .set_destination(Destination::bootstrap("http://localhost:3978"))
            .await;

        // Both the typing indicator and the message delivery fail.
        adapter.fail_next(2).await;
        let message = normalize("boom");
        assert!(router.relay(&message).await.is_err());
        assert!(!router.is_processing());

        // The next frame still gets its typing indicator.
        router.relay(&message).await.expect("relay");
        let deliveries = adapter.deliveries().await;
        assert_eq!(deliveries[0].1.kind, kind::TYPING);
        assert_eq!(deliveries[1].1.kind, kind::MESSAGE);
    }

    #[tokio::test]
    async fn adapter_failure_is_reraised_to_the_caller() {
        let (adapter, router) = router_with_adapter();
        router
            .set_destination(Destination::bootstrap("http://localhost:3978"))
            .await;
        adapter.fail_next(2).await;

        let err = router.relay(&normalize("x")).await.unwrap_err();
        assert!(matches!(err, DeliverError::Adapter(_)));
    }
}
