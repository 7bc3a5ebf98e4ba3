use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::chat::Chat;

/// Document schema version, bumped on incompatible layout changes.
pub const SCHEMA_VERSION: u32 = 1;

fn schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Root aggregate persisted as one document: every chat, the current-chat
/// selection and the daily token ledger.
///
/// Invariants: chat ids are unique; `current_chat_id` is either empty or the
/// id of exactly one chat; `daily_usage` holds at most one entry per date and
/// per-date totals only grow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatHistory {
    #[serde(default = "schema_version")]
    pub version: u32,
    #[serde(default)]
    pub chats: Vec<Chat>,
    /// Empty string means no chat is selected.
    #[serde(default)]
    pub current_chat_id: String,
    /// Date key (`YYYY-MM-DD`, client-local) to total tokens.
    #[serde(default)]
    pub daily_usage: BTreeMap<String, u64>,
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            chats: Vec::new(),
            current_chat_id: String::new(),
            daily_usage: BTreeMap::new(),
        }
    }
}

impl ChatHistory {
    pub fn chat_by_id(&self, id: &str) -> Option<&Chat> {
        self.chats.iter().find(|chat| chat.id == id)
    }

    pub fn current_chat(&self) -> Option<&Chat> {
        if self.current_chat_id.is_empty() {
            return None;
        }
        self.chat_by_id(&self.current_chat_id)
    }

    pub fn most_recent_chat(&self) -> Option<&Chat> {
        self.chats.iter().max_by_key(|chat| chat.timestamp)
    }

    /// Chat list for display, most recently touched first.
    pub fn chats_by_recency(&self) -> Vec<Chat> {
        let mut chats = self.chats.clone();
        chats.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        chats
    }

    /// Ledger as a date-ascending list.
    pub fn daily_usage_sorted(&self) -> Vec<TokenUsage> {
        self.daily_usage
            .iter()
            .map(|(date, total)| TokenUsage {
                date: date.clone(),
                total_tokens: *total,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub date: String,
    pub total_tokens: u64,
}
