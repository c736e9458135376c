//! The stored conversation reference relayed messages are delivered to.

use serde::{Deserialize, Serialize};

use crate::activity::{Activity, ChannelAccount, ConversationAccount};

/// The last observed conversation context: enough to resume the
/// conversation through the channel's continuation capability. Exactly one
/// instance is live at a time; it is overwritten wholesale on every inbound
/// channel activity, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    pub channel_id: String,
    pub service_url: String,
    pub conversation: ConversationAccount,
    pub user: ChannelAccount,
    pub bot: ChannelAccount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl Destination {
    /// The synthetic default seeded at startup, so relay delivery is
    /// possible before any real conversation has begun.
    pub fn bootstrap(service_url: &str) -> Self {
        let mut conversation = ConversationAccount::new("websocket-conversation");
        conversation.name = Some("WebSocket Conversation".to_string());
        conversation.conversation_type = Some("personal".to_string());

        Self {
            channel_id: "emulator".to_string(),
            service_url: service_url.to_string(),
            conversation,
            user: ChannelAccount::new("websocket-user", "WebSocket User").with_role("user"),
            bot: ChannelAccount::new("websocket-bot", "WebSocket Bot").with_role("bot"),
            activity_id: Some("websocket-activity".to_string()),
            locale: Some("en-US".to_string()),
        }
    }

    /// Extracts the conversation reference from an inbound channel
    /// activity: the activity's sender becomes the user to reply to, its
    /// recipient the bot identity to reply as.
    pub fn from_activity(activity: &Activity) -> Self {
        Self {
            channel_id: activity.channel_id.clone().unwrap_or_default(),
            service_url: activity.service_url.clone().unwrap_or_default(),
            conversation: activity.conversation.clone().unwrap_or_default(),
            user: activity.from.clone().unwrap_or_default(),
            bot: activity.recipient.clone().unwrap_or_default(),
            activity_id: activity.id.clone(),
            locale: activity.locale.clone(),
        }
    }
}
