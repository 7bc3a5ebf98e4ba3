pub mod controller;
pub mod error;

pub use controller::{ChatSession, NoopRefreshSink, RefreshSink};
pub use error::SessionError;
