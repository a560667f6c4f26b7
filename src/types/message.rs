use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Error;
use crate::types::Timestamp;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person typing into the client.
    User,
    /// The backend's generated reply.
    Assistant,
}

impl Role {
    /// The lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message of a room's history.
///
/// History records carry the text in `content`, in `content_ja`, or in both.
/// When both are present `content_ja` is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MessageRecord")]
pub struct Message {
    /// The author.
    pub role: Role,
    /// The raw text, before any formatting.
    pub content: String,
    /// When the backend stored the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
}

impl Message {
    /// Create a message without a timestamp.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: None,
        }
    }

    /// Attach the creation time.
    pub fn with_created_at(mut self, created_at: Timestamp) -> Self {
        self.created_at = Some(created_at);
        self
    }
}

/// A history record as the backend sends it.
#[derive(Deserialize)]
struct MessageRecord {
    role: Role,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    content_ja: Option<String>,
    #[serde(default)]
    created_at: Option<Timestamp>,
}

impl TryFrom<MessageRecord> for Message {
    type Error = Error;

    fn try_from(record: MessageRecord) -> Result<Self, Self::Error> {
        let content = record.content_ja.or(record.content).ok_or_else(|| {
            Error::validation(
                "message has neither content nor content_ja",
                Some("content".to_string()),
            )
        })?;
        Ok(Self {
            role: record.role,
            content,
            created_at: record.created_at,
        })
    }
}

/// Request body persisting the user's turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRequest {
    /// The user's text.
    pub prompt: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn history_entry_deserialization() {
        let message: Message = serde_json::from_value(json!({
            "role": "assistant",
            "content": "hello",
            "created_at": "2024-05-06 07:08:09"
        }))
        .unwrap();
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.content, "hello");
        assert_eq!(message.created_at.unwrap().clock(), "07:08");
    }

    #[test]
    fn localized_content_field_is_accepted() {
        let message: Message = serde_json::from_value(json!({
            "role": "user",
            "content_ja": "こんにちは"
        }))
        .unwrap();
        assert_eq!(message.content, "こんにちは");
        assert!(message.created_at.is_none());
    }

    #[test]
    fn localized_content_wins_over_content() {
        let message: Message = serde_json::from_value(json!({
            "role": "assistant",
            "content": "hello",
            "content_ja": "こんにちは",
            "created_at": "2024-05-06 07:08:09"
        }))
        .unwrap();
        assert_eq!(message.content, "こんにちは");
        assert_eq!(message.created_at.unwrap().clock(), "07:08");
    }

    #[test]
    fn record_without_text_is_rejected() {
        let result = serde_json::from_value::<Message>(json!({"role": "user"}));
        assert!(result.is_err());
    }

    #[test]
    fn missing_timestamp_is_not_serialized() {
        let value = serde_json::to_value(Message::new(Role::User, "hi")).unwrap();
        assert_eq!(value, json!({"role": "user", "content": "hi"}));
    }
}
