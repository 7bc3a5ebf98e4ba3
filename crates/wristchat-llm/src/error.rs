use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-2xx response, surfaced verbatim. Never retried automatically.
    #[error("API error ({status}): {body}")]
    Http { status: u16, body: String },

    /// Connection, timeout or mid-stream I/O failure.
    #[error("connection failed: {0}")]
    Transport(String),

    /// The request could not be constructed at all.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;
