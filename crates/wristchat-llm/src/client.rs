use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ApiError, Result};
use crate::streaming::{decode_event_stream, EventStream};
use crate::traits::ChatTransport;
use crate::types::{ChatRequest, ChatResponse};

/// Generous timeouts: model responses can be slow to start and long-running.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(120);
const READ_TIMEOUT: Duration = Duration::from_secs(120);

/// HTTP client for OpenAI-compatible completion endpoints.
///
/// The base URL and API key are passed per call because both are
/// user-editable settings resolved at send time.
pub struct ChatApiClient {
    http: reqwest::Client,
}

impl ChatApiClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .build()
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        Ok(Self { http })
    }

    fn completions_url(base_url: &str) -> String {
        format!("{}/v1/chat/completions", base_url.trim_end_matches('/'))
    }

    async fn post(
        &self,
        base_url: &str,
        api_key: &str,
        request: &ChatRequest,
    ) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(Self::completions_url(base_url))
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = if body.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                body
            };
            return Err(ApiError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Non-streaming completion.
    pub async fn chat(
        &self,
        base_url: &str,
        api_key: &str,
        request: &ChatRequest,
    ) -> Result<ChatResponse> {
        let response = self.post(base_url, api_key, request).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))
    }
}

#[async_trait]
impl ChatTransport for ChatApiClient {
    async fn open_stream(
        &self,
        base_url: &str,
        api_key: &str,
        request: &ChatRequest,
    ) -> Result<EventStream> {
        let response = self.post(base_url, api_key, request).await?;
        Ok(decode_event_stream(response.bytes_stream()))
    }
}
