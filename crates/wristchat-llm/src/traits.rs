use async_trait::async_trait;

use crate::error::Result;
use crate::streaming::EventStream;
use crate::types::ChatRequest;

/// Seam between the session controller and the network layer.
///
/// Implementations must abort the underlying connection when the returned
/// stream is dropped; that is the cancellation path and must be idempotent.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Issues the streaming completion request. A non-success HTTP status is
    /// reported as [`crate::ApiError::Http`] with the response body (or
    /// status line when the body is empty), never as decoded content.
    async fn open_stream(
        &self,
        base_url: &str,
        api_key: &str,
        request: &ChatRequest,
    ) -> Result<EventStream>;
}
