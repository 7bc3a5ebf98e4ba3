pub mod client;
pub mod error;
pub mod streaming;
pub mod traits;
pub mod types;

pub use client::ChatApiClient;
pub use error::{ApiError, Result};
pub use streaming::{
    decode_event_stream, ChatStreamChunk, Delta, EventStream, StreamChoice, StreamEvent,
};
pub use traits::ChatTransport;
pub use types::{ChatRequest, ChatResponse, StreamOptions, Usage, WireMessage};
