//! Conversation message types.
//!
//! `ConversationMessage` mirrors what a persisted conversation store hands out.
//! `ChatMessage` is the plain `{role, content}` pair that crosses into the
//! generation path; converting severs any tie to the store before compute runs
//! on another thread.

use serde::{Deserialize, Serialize};

/// Represents the role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message from the user.
    User,
    /// Message from the AI assistant.
    Assistant,
    /// System-generated message.
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

/// A single persisted message in a conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// The role of the message sender.
    pub role: MessageRole,
    /// The content of the message.
    pub content: String,
    /// Timestamp when the message was created (ISO 8601 format).
    pub timestamp: String,
}

/// Plain value pair handed to prompt assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

impl From<&ConversationMessage> for ChatMessage {
    fn from(message: &ConversationMessage) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// A read snapshot over an ordered (oldest first) conversation.
///
/// Implementors are expected to already be sorted; `snapshot` copies the
/// entries out so the caller owns them outright.
pub trait ConversationSource {
    fn snapshot(&self) -> Vec<ChatMessage>;
}

impl ConversationSource for [ConversationMessage] {
    fn snapshot(&self) -> Vec<ChatMessage> {
        self.iter().map(ChatMessage::from).collect()
    }
}

impl ConversationSource for Vec<ConversationMessage> {
    fn snapshot(&self) -> Vec<ChatMessage> {
        self.as_slice().snapshot()
    }
}

impl ConversationSource for [ChatMessage] {
    fn snapshot(&self) -> Vec<ChatMessage> {
        self.to_vec()
    }
}

impl ConversationSource for Vec<ChatMessage> {
    fn snapshot(&self) -> Vec<ChatMessage> {
        self.clone()
    }
}

/// The immutable input of one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub model_id: String,
    pub messages: Vec<ChatMessage>,
    pub system_prompt: String,
}

impl GenerationRequest {
    pub fn new(
        model_id: impl Into<String>,
        conversation: &(impl ConversationSource + ?Sized),
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            messages: conversation.snapshot(),
            system_prompt: system_prompt.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_preserves_order_and_drops_timestamps() {
        let stored = vec![
            ConversationMessage {
                role: MessageRole::User,
                content: "hi".to_string(),
                timestamp: "2026-01-01T00:00:00Z".to_string(),
            },
            ConversationMessage {
                role: MessageRole::Assistant,
                content: "hello".to_string(),
                timestamp: "2026-01-01T00:00:01Z".to_string(),
            },
        ];

        let request = GenerationRequest::new("model-X", &stored, "be brief");

        assert_eq!(
            request.messages,
            vec![
                ChatMessage::new(MessageRole::User, "hi"),
                ChatMessage::new(MessageRole::Assistant, "hello"),
            ]
        );
        assert_eq!(request.system_prompt, "be brief");
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&MessageRole::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
        assert_eq!(MessageRole::System.as_str(), "system");
    }
}
