use std::collections::VecDeque;
use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};
use crate::types::Usage;

/// Decoded event from the SSE body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental "thinking" text, accumulated separately from the answer.
    Reasoning { content: String },

    /// Incremental answer text.
    Message { content: String },

    /// Terminal usage report; typically arrives on the very last chunk and
    /// may accompany content deltas.
    Usage { total_tokens: u64 },

    Done {
        #[serde(skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },
}

/// One SSE data payload: `{id?, choices:[{delta, finish_reason?}], usage?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatStreamChunk {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChoice {
    pub delta: Delta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
}

impl ChatStreamChunk {
    /// Events carried by this chunk. A chunk can hold a usage block and
    /// content deltas together; usage-only chunks have an empty `choices`
    /// array. `finish_reason` does not end the stream here because the usage
    /// chunk arrives after it; only the `[DONE]` sentinel does.
    pub fn to_stream_events(&self) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if let Some(usage) = &self.usage {
            if usage.total_tokens > 0 {
                events.push(StreamEvent::Usage {
                    total_tokens: u64::from(usage.total_tokens),
                });
            }
        }

        if let Some(choice) = self.choices.first() {
            if let Some(content) = &choice.delta.reasoning_content {
                if !content.is_empty() {
                    events.push(StreamEvent::Reasoning {
                        content: content.clone(),
                    });
                }
            }
            if let Some(content) = &choice.delta.content {
                if !content.is_empty() {
                    events.push(StreamEvent::Message {
                        content: content.clone(),
                    });
                }
            }
        }

        events
    }
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Decodes a newline-delimited SSE body into [`StreamEvent`]s.
///
/// Blank lines and lines without the `data: ` prefix are ignored. A `[DONE]`
/// payload yields [`StreamEvent::Done`] and stops decoding entirely, even if
/// more bytes follow. A payload that fails to parse is skipped so one bad
/// chunk never aborts the stream. Transport failures mid-stream surface as
/// [`ApiError::Transport`] and end the stream.
///
/// Dropping the returned stream aborts the underlying byte source; that is
/// the cancellation path and it is idempotent.
pub fn decode_event_stream<S, E>(bytes: S) -> EventStream
where
    S: Stream<Item = std::result::Result<bytes::Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send,
{
    Box::pin(async_stream::stream! {
        let mut byte_chunks = Box::pin(bytes);
        let mut buffer: VecDeque<u8> = VecDeque::with_capacity(8192);

        while let Some(chunk_result) = byte_chunks.next().await {
            let chunk = match chunk_result {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(ApiError::Transport(e.to_string()));
                    return;
                }
            };
            buffer.extend(chunk);

            while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                let line_bytes: Vec<u8> = buffer.drain(..=newline_pos).collect();
                let Ok(line_str) = std::str::from_utf8(&line_bytes) else {
                    continue;
                };
                let line = line_str.trim();
                if line.is_empty() {
                    continue;
                }
                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                let data = data.trim();
                if data == "[DONE]" {
                    yield Ok(StreamEvent::Done { finish_reason: None });
                    return;
                }
                match serde_json::from_str::<ChatStreamChunk>(data) {
                    Ok(chunk) => {
                        for event in chunk.to_stream_events() {
                            yield Ok(event);
                        }
                    }
                    Err(e) => {
                        tracing::debug!("skipping undecodable stream chunk: {}", e);
                    }
                }
            }
        }
    })
}
