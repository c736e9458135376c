//! The production conversation-continuation adapter.
//!
//! Completes an outbound activity with the addressing fields stored in the
//! destination and posts it to the channel's conversation endpoint.

use anyhow::Context;
use async_trait::async_trait;
use tracing::debug;

use relay_core::activity::Activity;
use relay_core::adapter::ConversationAdapter;
use relay_core::destination::Destination;
use relay_core::error::DeliverError;

pub struct HttpConversationAdapter {
    http: reqwest::Client,
    /// Sent as an identifying header on every continuation request.
    app_id: String,
}

impl HttpConversationAdapter {
    pub fn new(http: reqwest::Client, app_id: String) -> Self {
        Self { http, app_id }
    }

    /// Fills in the addressing fields the builders leave blank. The
    /// destination's user becomes the recipient and its bot the sender,
    /// unless the activity already carries a sender identity of its own.
    fn complete(destination: &Destination, mut activity: Activity) -> Activity {
        activity.channel_id = Some(destination.channel_id.clone());
        activity.service_url = Some(destination.service_url.clone());
        activity.conversation = Some(destination.conversation.clone());
        activity.recipient = Some(destination.user.clone());
        if activity.from.is_none() {
            activity.from = Some(destination.bot.clone());
        }
        activity.reply_to_id = destination.activity_id.clone();
        if activity.locale.is_none() {
            activity.locale = destination.locale.clone();
        }
        activity
    }
}

#[async_trait]
impl ConversationAdapter for HttpConversationAdapter {
    async fn continue_conversation(
        &self,
        destination: &Destination,
        activity: Activity,
    ) -> Result<(), DeliverError> {
        let activity = Self::complete(destination, activity);
        let url = format!(
            "{}/v3/conversations/{}/activities",
            destination.service_url.trim_end_matches('/'),
            destination.conversation.id
        );
        debug!(url = %url, kind = %activity.kind, "continuing conversation");

        let response = self
            .http
            .post(&url)
            .header("x-bot-app-id", &self.app_id)
            .json(&activity)
            .send()
            .await
            .context("continuation request failed")
            .map_err(DeliverError::Adapter)?;

        response
            .error_for_status()
            .context("channel rejected the continuation activity")
            .map_err(DeliverError::Adapter)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::activity::{reply_activity, typing_activity};
    use relay_core::normalize::normalize;

    #[test]
    fn complete_addresses_the_stored_user_and_bot() {
        let destination = Destination::bootstrap("http://localhost:3978");
        let activity = HttpConversationAdapter::complete(
            &destination,
            reply_activity(&normalize(r#"{"message":"hi","agent":"Planner"}"#)),
        );

        assert_eq!(activity.recipient.as_ref().unwrap().id, "websocket-user");
        // The builder already set the agent identity; it must survive.
        assert_eq!(activity.from.as_ref().unwrap().id, "agent-planner");
        assert_eq!(activity.reply_to_id.as_deref(), Some("websocket-activity"));
        assert_eq!(activity.locale.as_deref(), Some("en-US"));
        assert_eq!(
            activity.conversation.as_ref().unwrap().id,
            "websocket-conversation"
        );
    }

    #[test]
    fn complete_defaults_the_sender_to_the_bot() {
        let mut destination = Destination::bootstrap("http://localhost:3978");
        destination.locale = None;
        let mut activity = typing_activity();
        activity.from = None;

        let activity = HttpConversationAdapter::complete(&destination, activity);
        assert_eq!(activity.from.as_ref().unwrap().id, "websocket-bot");
        assert!(activity.locale.is_none());
    }
}
