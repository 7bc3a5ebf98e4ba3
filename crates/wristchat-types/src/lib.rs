pub mod chat;
pub mod history;
pub mod message;

pub use chat::{Chat, NEW_CHAT_TITLE, TITLE_MAX_CHARS};
pub use history::{ChatHistory, TokenUsage, SCHEMA_VERSION};
pub use message::{ChatMessage, Role};

/// Current time as epoch milliseconds, the timestamp unit used throughout
/// the data model.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
