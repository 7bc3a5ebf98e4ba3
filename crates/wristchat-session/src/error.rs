use thiserror::Error;
use wristchat_llm::ApiError;
use wristchat_store::StoreError;

#[derive(Debug, Error)]
pub enum SessionError {
    /// No API key configured; failed fast before any network call.
    #[error("API key is missing")]
    MissingApiKey,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SessionError {
    /// Short diagnostic string published to the error slot for the UI.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::MissingApiKey => "API Key is missing.".to_string(),
            SessionError::Api(ApiError::Http { status, body }) => {
                format!("Error {}: {}", status, body)
            }
            SessionError::Api(ApiError::Transport(message)) => {
                format!("Connection failed: {}", message)
            }
            SessionError::Api(ApiError::InvalidRequest(message)) => {
                format!("Connection failed: {}", message)
            }
            SessionError::Store(error) => format!("Storage error: {}", error),
        }
    }
}
