use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::{Stream, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use wristchat_llm::{ChatRequest, ChatTransport, StreamEvent, WireMessage};
use wristchat_store::{today_key, ChatHistoryStore, SettingsStore};
use wristchat_types::{now_millis, Chat, ChatMessage, Role, TokenUsage};

use crate::error::SessionError;

/// Sink notified after token usage is recorded so an external surface (the
/// watch-face complication in the original app) can re-query the ledger.
pub trait RefreshSink: Send + Sync {
    fn request_refresh(&self);
}

/// Sink that drops every refresh request.
pub struct NoopRefreshSink;

impl RefreshSink for NoopRefreshSink {
    fn request_refresh(&self) {}
}

struct InFlight {
    handle: JoinHandle<()>,
    /// Set synchronously before the abort so a transport failure racing the
    /// cancel is never reported as an error.
    cancelled: Arc<AtomicBool>,
}

/// One chat session: at most one in-flight send at a time, observable state
/// in watch cells, history and settings behind their stores.
///
/// The send runs on a spawned task that owns the network read loop; every
/// decoded delta replaces the streaming assistant message wholesale and
/// republishes the whole chat, so observers always see consistent snapshots
/// in the order they were produced.
pub struct ChatSession {
    history: ChatHistoryStore,
    settings: SettingsStore,
    transport: Arc<dyn ChatTransport>,
    refresh: Arc<dyn RefreshSink>,
    current_chat: watch::Sender<Option<Chat>>,
    streaming: watch::Sender<bool>,
    error: watch::Sender<Option<String>>,
    in_flight: Mutex<Option<InFlight>>,
}

impl ChatSession {
    pub fn new(
        history: ChatHistoryStore,
        settings: SettingsStore,
        transport: Arc<dyn ChatTransport>,
        refresh: Arc<dyn RefreshSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            history,
            settings,
            transport,
            refresh,
            current_chat: watch::channel(None).0,
            streaming: watch::channel(false).0,
            error: watch::channel(None).0,
            in_flight: Mutex::new(None),
        })
    }

    /// Startup entry point: loads or creates the initial chat and publishes
    /// it as current.
    pub async fn bootstrap(&self) -> Result<Chat, SessionError> {
        let chat = self.history.get_or_create_initial_chat().await?;
        self.current_chat.send_replace(Some(chat.clone()));
        Ok(chat)
    }

    pub fn current_chat(&self) -> watch::Receiver<Option<Chat>> {
        self.current_chat.subscribe()
    }

    pub fn is_streaming(&self) -> watch::Receiver<bool> {
        self.streaming.subscribe()
    }

    /// Last surfaced error; cleared by [`ChatSession::clear_error`].
    pub fn last_error(&self) -> watch::Receiver<Option<String>> {
        self.error.subscribe()
    }

    pub fn history(&self) -> &ChatHistoryStore {
        &self.history
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn history_stream(&self) -> impl Stream<Item = Vec<Chat>> {
        self.history.history_stream()
    }

    pub fn daily_usage_stream(&self) -> impl Stream<Item = Vec<TokenUsage>> {
        self.history.daily_usage_stream()
    }

    pub fn api_key_stream(&self) -> impl Stream<Item = String> {
        self.settings.api_key_stream()
    }

    pub fn clear_error(&self) {
        self.error.send_replace(None);
    }

    /// Publishes a fresh, not-yet-persisted chat as current. It becomes
    /// durable on the first send.
    pub fn new_chat(&self) -> Chat {
        let chat = self.history.new_chat();
        self.current_chat.send_replace(Some(chat.clone()));
        self.error.send_replace(None);
        chat
    }

    pub async fn select_chat(&self, chat: &Chat) -> Result<(), SessionError> {
        self.history.select_chat(chat).await?;
        self.current_chat.send_replace(Some(chat.clone()));
        self.error.send_replace(None);
        Ok(())
    }

    pub async fn delete_chat(&self, chat_id: &str) -> Result<(), SessionError> {
        self.history.delete_chat(chat_id).await?;
        Ok(())
    }

    /// Removes every chat (the ledger survives), re-bootstraps the current
    /// chat and pings the refresh sink.
    pub async fn clear_all_history(&self) -> Result<Chat, SessionError> {
        self.history.clear_all_history().await?;
        let chat = self.bootstrap().await?;
        self.refresh.request_refresh();
        Ok(chat)
    }

    /// Starts one send. Rejected outright while a previous send is still in
    /// flight, when `text` is blank, or when no chat is current.
    ///
    /// The user message (and the derived title, on a chat's first message)
    /// is published and persisted before any network round trip; it stays in
    /// place even when the send then fails fast on a missing API key.
    pub fn send_message(self: &Arc<Self>, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let Some(chat) = self.current_chat.borrow().clone() else {
            return;
        };

        let mut in_flight = self.in_flight.lock().expect("in-flight lock poisoned");
        if in_flight
            .as_ref()
            .is_some_and(|entry| !entry.handle.is_finished())
        {
            return;
        }

        self.error.send_replace(None);

        let mut chat_with_user = chat.with_message(ChatMessage::user(text));
        if chat.is_untitled() {
            chat_with_user = chat_with_user.with_title(Chat::derive_title(text));
        }
        chat_with_user = chat_with_user.touched(now_millis());

        self.current_chat.send_replace(Some(chat_with_user.clone()));

        let cancelled = Arc::new(AtomicBool::new(false));
        let session = Arc::clone(self);
        let flag = Arc::clone(&cancelled);
        let handle = tokio::spawn(async move {
            session.streaming.send_replace(true);
            if let Err(error) = session.run_stream(chat_with_user).await {
                if !flag.load(Ordering::SeqCst) {
                    tracing::warn!("send failed: {}", error);
                    session.error.send_replace(Some(error.user_message()));
                }
                // Keep whatever partial output was published.
                let partial = session.current_chat.borrow().clone();
                if let Some(partial) = partial {
                    if let Err(e) = session.history.save_and_select_chat(&partial).await {
                        tracing::warn!("failed to persist partial chat: {}", e);
                    }
                }
            }
            session.streaming.send_replace(false);
        });

        *in_flight = Some(InFlight { handle, cancelled });
    }

    async fn run_stream(&self, chat: Chat) -> Result<(), SessionError> {
        self.history.save_and_select_chat(&chat).await?;

        let settings = self.settings.read();
        if settings.api_key.trim().is_empty() {
            return Err(SessionError::MissingApiKey);
        }

        let messages: Vec<WireMessage> = chat.messages.iter().map(WireMessage::from).collect();
        let request = ChatRequest::streaming(settings.model.as_str(), messages);
        let mut events = self
            .transport
            .open_stream(&settings.base_url, &settings.api_key, &request)
            .await?;

        // Seed the slot the deltas fill in.
        let mut working = chat.with_message(ChatMessage::assistant());
        self.current_chat.send_replace(Some(working.clone()));

        let mut content = String::new();
        let mut reasoning = String::new();

        while let Some(event) = events.next().await {
            match event? {
                StreamEvent::Message { content: part } => {
                    content.push_str(&part);
                    working = self.publish_delta(working, &content, &reasoning);
                }
                StreamEvent::Reasoning { content: part } => {
                    reasoning.push_str(&part);
                    working = self.publish_delta(working, &content, &reasoning);
                }
                StreamEvent::Usage { total_tokens } if total_tokens > 0 => {
                    self.history
                        .record_token_usage(&today_key(), total_tokens)
                        .await?;
                    self.refresh.request_refresh();
                }
                StreamEvent::Usage { .. } => {}
                StreamEvent::Done { .. } => break,
            }
        }

        self.history.save_and_select_chat(&working).await?;
        Ok(())
    }

    /// Rebuilds the streaming assistant message from the accumulators and
    /// republishes the whole chat. Replacement, not mutation.
    fn publish_delta(&self, working: Chat, content: &str, reasoning: &str) -> Chat {
        let message = ChatMessage {
            role: Role::Assistant,
            content: content.to_string(),
            reasoning_content: if reasoning.is_empty() {
                None
            } else {
                Some(reasoning.to_string())
            },
            timestamp: now_millis(),
        };
        let next = working.with_last_message_replaced(message);
        self.current_chat.send_replace(Some(next.clone()));
        next
    }

    /// Stops the in-flight send, persisting whatever partial output is
    /// currently published. An operator stop never surfaces as an error.
    pub async fn stop_streaming(&self) {
        let taken = self
            .in_flight
            .lock()
            .expect("in-flight lock poisoned")
            .take();
        if let Some(in_flight) = taken {
            in_flight.cancelled.store(true, Ordering::SeqCst);
            in_flight.handle.abort();
        }
        self.streaming.send_replace(false);

        let partial = self.current_chat.borrow().clone();
        if let Some(partial) = partial {
            if let Err(e) = self.history.save_and_select_chat(&partial).await {
                tracing::warn!("failed to persist partial chat: {}", e);
            }
        }
    }
}
