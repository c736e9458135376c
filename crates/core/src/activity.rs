//! A minimal bot-channel activity model and the pure builders the relay
//! uses to construct outbound activities.
//!
//! Only the fields this service reads or writes are modeled; unknown
//! inbound fields are ignored by serde. Activity kinds stay wire strings
//! so unrecognized kinds from the channel deserialize instead of erroring.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::normalize::{NormalizedMessage, default_actions};

/// Activity kind wire strings.
pub mod kind {
    pub const MESSAGE: &str = "message";
    pub const TYPING: &str = "typing";
    pub const CONVERSATION_UPDATE: &str = "conversationUpdate";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelAccount {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl ChannelAccount {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConversationAccount {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_type: Option<String>,
}

impl ConversationAccount {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            conversation_type: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub content_type: String,
    pub content: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardAction {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedActionsPayload {
    pub actions: Vec<CardAction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationAccount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub members_added: Vec<ChannelAccount>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_actions: Option<SuggestedActionsPayload>,
}

impl Activity {
    pub fn is_message(&self) -> bool {
        self.kind == kind::MESSAGE
    }

    pub fn is_conversation_update(&self) -> bool {
        self.kind == kind::CONVERSATION_UPDATE
    }

    /// The outbound payload of a channel message: its text, or its card
    /// submit value when the user tapped a card action.
    pub fn outbound_text(&self) -> Option<String> {
        if let Some(text) = self.text.as_deref().filter(|t| !t.is_empty()) {
            return Some(text.to_string());
        }
        self.value.as_ref().map(|value| match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
    }
}

/// Synthesized sender identity for a relayed agent message:
/// `agent-{name lower-cased, spaces replaced with hyphens}`.
pub fn agent_identity(agent: &str) -> ChannelAccount {
    let slug = agent.to_lowercase().replace(' ', "-");
    ChannelAccount::new(format!("agent-{slug}"), agent)
}

/// The typing indicator shown while a relayed message is being delivered.
pub fn typing_activity() -> Activity {
    Activity {
        kind: kind::TYPING.to_string(),
        from: Some(ChannelAccount::new("travel-assistant", "Travel Assistant")),
        ..Activity::default()
    }
}

fn adaptive_card(message: &NormalizedMessage) -> Attachment {
    let actions: Vec<Value> = message
        .actions
        .iter()
        .map(|action| {
            serde_json::json!({
                "type": "Action.Submit",
                "title": action.title,
                "data": action.value,
            })
        })
        .collect();

    Attachment {
        content_type: "application/vnd.microsoft.card.adaptive".to_string(),
        content: serde_json::json!({
            "type": "AdaptiveCard",
            "version": "1.4",
            "body": [{
                "type": "TextBlock",
                "text": message.text,
                "wrap": true,
                "size": "Medium",
            }],
            "actions": actions,
        }),
    }
}

/// Builds the reply activity for one normalized message: an adaptive card
/// when the message carries suggested actions, plain text otherwise.
pub fn reply_activity(message: &NormalizedMessage) -> Activity {
    let from = agent_identity(&message.agent);
    if message.actions.is_empty() {
        return Activity {
            kind: kind::MESSAGE.to_string(),
            from: Some(from),
            text: Some(message.text.clone()),
            ..Activity::default()
        };
    }
    Activity {
        kind: kind::MESSAGE.to_string(),
        from: Some(from),
        attachments: vec![adaptive_card(message)],
        ..Activity::default()
    }
}

/// Greeting sent when a new member joins the conversation.
pub fn welcome_activity() -> Activity {
    Activity {
        kind: kind::MESSAGE.to_string(),
        text: Some(
            "Hello! 👋 I'm your travel assistant. Here are some things I can help you with:"
                .to_string(),
        ),
        ..Activity::default()
    }
}

/// The built-in travel prompts as a standalone suggested-actions message.
pub fn suggested_actions_activity() -> Activity {
    let actions = default_actions()
        .into_iter()
        .map(|action| CardAction {
            kind: "imBack".to_string(),
            title: action.title,
            value: action.value,
        })
        .collect();
    Activity {
        kind: kind::MESSAGE.to_string(),
        suggested_actions: Some(SuggestedActionsPayload { actions }),
        ..Activity::default()
    }
}
