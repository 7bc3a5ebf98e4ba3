use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::ChatMessage;
use crate::now_millis;

pub const NEW_CHAT_TITLE: &str = "New Chat";

/// Auto-derived titles keep the first 20 characters of the first user
/// message.
pub const TITLE_MAX_CHARS: usize = 20;

/// A conversation. All mutation helpers derive a new value by copying and
/// overriding fields; the originals are never touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub title: String,
    /// Last-touched time, epoch millis.
    pub timestamp: i64,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl Chat {
    /// Fresh chat with a new id. Not durable until it is saved.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: NEW_CHAT_TITLE.to_string(),
            timestamp: now_millis(),
            messages: Vec::new(),
        }
    }

    /// True while the chat still carries the placeholder title and has no
    /// messages, i.e. the first user message should name it.
    pub fn is_untitled(&self) -> bool {
        self.title == NEW_CHAT_TITLE && self.messages.is_empty()
    }

    pub fn derive_title(text: &str) -> String {
        text.chars().take(TITLE_MAX_CHARS).collect()
    }

    pub fn with_message(&self, message: ChatMessage) -> Self {
        let mut messages = self.messages.clone();
        messages.push(message);
        Self {
            messages,
            ..self.clone()
        }
    }

    /// Replaces the last message, used to swap the streaming assistant slot
    /// for its rebuilt copy. No-op on an empty chat.
    pub fn with_last_message_replaced(&self, message: ChatMessage) -> Self {
        let mut messages = self.messages.clone();
        if let Some(last) = messages.last_mut() {
            *last = message;
        }
        Self {
            messages,
            ..self.clone()
        }
    }

    pub fn with_title(&self, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..self.clone()
        }
    }

    pub fn touched(&self, timestamp: i64) -> Self {
        Self {
            timestamp,
            ..self.clone()
        }
    }
}

impl Default for Chat {
    fn default() -> Self {
        Self::new()
    }
}
