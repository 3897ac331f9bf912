//! Message and chat-request domain types.
//!
//! These are the value objects that flow through the proxy:
//! the caller sends a `ChatRequest`, its messages are sorted into a
//! `ContextFrame`, and the Prompt Compiler flattens them back into
//! `WireMessage`s for the upstream API.

use serde::{Deserialize, Serialize};

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (identity, rules, lore)
    System,
    /// The end user
    User,
    /// The AI assistant
    Assistant,
}

impl Role {
    /// The wire-format name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single conversation message. Immutable once constructed.
///
/// The context tier a message belongs to (system / lore / history / input)
/// is not stored on the message — it is implied by which `ContextFrame`
/// group holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Optional participant name (multi-character conversations)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            name: None,
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            name: None,
        }
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            name: None,
        }
    }
}

/// A compiled message in upstream wire format — pure `{role, content}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

/// An inbound chat-completion request (OpenAI-compatible surface).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The conversation messages, in chronological order.
    pub messages: Vec<Message>,

    /// The managed model identifier (store id, not the upstream model string).
    pub model: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub presence_penalty: f32,

    #[serde(default)]
    pub frequency_penalty: f32,

    /// Whether to stream the response.
    #[serde(default)]
    pub stream: bool,
}

fn default_temperature() -> f32 {
    0.8
}

fn default_max_tokens() -> u32 {
    2000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, proxy!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, proxy!");
        assert!(msg.name.is_none());
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
        assert_eq!(Role::System.as_str(), "system");
    }

    #[test]
    fn message_serialization_roundtrip() {
        let msg = Message::system("Test message");
        let json = serde_json::to_string(&msg).unwrap();
        let deserialized: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, msg);
        assert!(!json.contains("name"), "absent name must be omitted");
    }

    #[test]
    fn chat_request_defaults() {
        let req: ChatRequest = serde_json::from_str(
            r#"{"messages":[{"role":"user","content":"hi"}],"model":"1"}"#,
        )
        .unwrap();
        assert!((req.temperature - 0.8).abs() < f32::EPSILON);
        assert_eq!(req.max_tokens, 2000);
        assert!(!req.stream);
        assert_eq!(req.presence_penalty, 0.0);
    }
}
