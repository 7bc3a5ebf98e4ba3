pub mod document;
pub mod error;
pub mod history;
pub mod settings;
pub mod usage;

pub use document::DocumentStore;
pub use error::{Result, StoreError};
pub use history::ChatHistoryStore;
pub use settings::{Settings, SettingsStore};
pub use usage::{format_token_count, today_key};
