use serde::{Deserialize, Serialize};

use crate::now_millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Wire-format role string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message in a chat. Messages are immutable once appended; the
/// in-progress streaming assistant message is replaced wholesale on every
/// delta rather than mutated in place, so concurrent readers always see a
/// consistent snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            reasoning_content: None,
            timestamp: now_millis(),
        }
    }

    /// Empty assistant message seeding the slot a stream fills in.
    pub fn assistant() -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            reasoning_content: None,
            timestamp: now_millis(),
        }
    }
}
