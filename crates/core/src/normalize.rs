//! Normalizes raw bus frames into a deliverable message.
//!
//! `normalize` is total: any input string, JSON or not, yields a
//! `NormalizedMessage` with text, an agent name and a non-empty
//! suggested-actions list.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Agent name used when a frame does not carry one.
pub const DEFAULT_AGENT: &str = "AutoGen Agent";

/// Frame fields with dedicated handling; everything else is plain content.
const RESERVED_KEYS: [&str; 2] = ["agent", "suggested_actions"];

/// One tappable prompt offered back to the end user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuggestedAction {
    pub title: String,
    pub value: String,
}

impl SuggestedAction {
    pub fn new(title: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            value: value.into(),
        }
    }

    fn prompt(text: &str) -> Self {
        Self::new(text, text)
    }
}

/// The built-in travel prompts, used whenever a frame carries no usable
/// suggested actions of its own.
pub fn default_actions() -> Vec<SuggestedAction> {
    [
        "What activities can I do in Singapore?",
        "Tell me more about Singapore's culture",
        "What's the best time to visit Singapore?",
        "Recommend some local food in Singapore",
    ]
    .into_iter()
    .map(SuggestedAction::prompt)
    .collect()
}

/// What one inbound frame boils down to. Derived per frame, never
/// persisted beyond its delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedMessage {
    pub text: String,
    pub agent: String,
    pub actions: Vec<SuggestedAction>,
}

#[derive(Deserialize)]
struct RawAction {
    #[serde(default)]
    title: String,
    value: Option<String>,
}

fn parse_actions(value: &Value) -> Vec<SuggestedAction> {
    value
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| serde_json::from_value::<RawAction>(entry.clone()).ok())
                .map(|raw| {
                    let value = raw.value.unwrap_or_else(|| raw.title.clone());
                    SuggestedAction {
                        title: raw.title,
                        value,
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Flattens every non-reserved field into `key: value` lines.
fn synthesize(fields: &serde_json::Map<String, Value>) -> String {
    fields
        .iter()
        .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
        .map(|(key, value)| format!("{}: {}", key, render(value)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses a raw frame into a `NormalizedMessage`. Never fails: anything
/// that is not a JSON object comes back verbatim as text with defaults.
pub fn normalize(raw: &str) -> NormalizedMessage {
    let fields = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(fields)) => fields,
        _ => {
            return NormalizedMessage {
                text: raw.to_string(),
                agent: DEFAULT_AGENT.to_string(),
                actions: default_actions(),
            };
        }
    };

    let agent = fields
        .get("agent")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_AGENT)
        .to_string();

    let actions = fields
        .get("suggested_actions")
        .map(parse_actions)
        .filter(|actions| !actions.is_empty())
        .unwrap_or_else(default_actions);

    let text = match fields.get("message") {
        Some(message) => render(message),
        None => synthesize(&fields),
    };

    NormalizedMessage {
        text,
        agent,
        actions,
    }
}
