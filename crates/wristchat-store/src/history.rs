use std::path::PathBuf;
use std::sync::Arc;

use futures::Stream;
use tokio::sync::watch;
use wristchat_types::{Chat, ChatHistory, TokenUsage};

use crate::document::DocumentStore;
use crate::error::Result;

/// Typed operations over the persisted [`ChatHistory`] document.
///
/// Every write is one atomic read-modify-write transform, so the
/// exactly-one-current-chat and unique-id invariants hold across concurrent
/// callers. Handles are cheap to clone and share one store.
#[derive(Clone)]
pub struct ChatHistoryStore {
    store: Arc<DocumentStore<ChatHistory>>,
}

impl ChatHistoryStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            store: Arc::new(DocumentStore::open(path)),
        }
    }

    fn upsert(history: ChatHistory, chat: Chat) -> ChatHistory {
        let mut chats = history.chats;
        match chats.iter().position(|c| c.id == chat.id) {
            Some(index) => chats[index] = chat,
            None => chats.push(chat),
        }
        ChatHistory { chats, ..history }
    }

    /// Upserts by id without touching the current-chat selection.
    pub async fn save_chat(&self, chat: &Chat) -> Result<()> {
        let chat = chat.clone();
        self.store
            .update(move |history| Self::upsert(history, chat))
            .await?;
        Ok(())
    }

    /// Upserts and selects in one commit. The session controller persists
    /// stream progress exclusively through this so a save can never race a
    /// separate select.
    pub async fn save_and_select_chat(&self, chat: &Chat) -> Result<()> {
        let chat = chat.clone();
        self.store
            .update(move |history| {
                let id = chat.id.clone();
                let mut next = Self::upsert(history, chat);
                next.current_chat_id = id;
                next
            })
            .await?;
        Ok(())
    }

    /// Generates a chat without persisting it; it becomes durable on the
    /// first save.
    pub fn new_chat(&self) -> Chat {
        Chat::new()
    }

    pub async fn create_and_select_new_chat(&self) -> Result<Chat> {
        let chat = Chat::new();
        let inserted = chat.clone();
        self.store
            .update(move |mut history| {
                history.current_chat_id = chat.id.clone();
                history.chats.push(chat);
                history
            })
            .await?;
        Ok(inserted)
    }

    /// Selects an existing chat; silently a no-op when the id is unknown.
    pub async fn select_chat(&self, chat: &Chat) -> Result<()> {
        let id = chat.id.clone();
        self.store
            .update(move |mut history| {
                if history.chats.iter().any(|c| c.id == id) {
                    history.current_chat_id = id;
                }
                history
            })
            .await?;
        Ok(())
    }

    /// Startup entry point: the selected chat if it still exists, else the
    /// most recently touched chat (selecting it), else a fresh selected chat.
    pub async fn get_or_create_initial_chat(&self) -> Result<Chat> {
        let history = self.store.read();
        if !history.current_chat_id.is_empty() {
            if let Some(chat) = history.chat_by_id(&history.current_chat_id) {
                return Ok(chat.clone());
            }
            return self.create_and_select_new_chat().await;
        }
        if let Some(chat) = history.most_recent_chat().cloned() {
            self.select_chat(&chat).await?;
            return Ok(chat);
        }
        self.create_and_select_new_chat().await
    }

    /// Removes the chat; when it was current, the selection moves to some
    /// remaining chat or clears.
    pub async fn delete_chat(&self, chat_id: &str) -> Result<()> {
        let id = chat_id.to_string();
        self.store
            .update(move |mut history| {
                history.chats.retain(|c| c.id != id);
                if history.current_chat_id == id {
                    history.current_chat_id = history
                        .chats
                        .first()
                        .map(|c| c.id.clone())
                        .unwrap_or_default();
                }
                history
            })
            .await?;
        Ok(())
    }

    /// Accumulates tokens into the ledger entry for `date`, never
    /// overwriting.
    pub async fn record_token_usage(&self, date: &str, tokens: u64) -> Result<()> {
        let date = date.to_string();
        self.store
            .update(move |mut history| {
                *history.daily_usage.entry(date).or_insert(0) += tokens;
                history
            })
            .await?;
        Ok(())
    }

    /// Removes every chat and clears the selection. The usage ledger is kept.
    pub async fn clear_all_history(&self) -> Result<()> {
        self.store
            .update(|mut history| {
                history.chats.clear();
                history.current_chat_id.clear();
                history
            })
            .await?;
        Ok(())
    }

    pub fn snapshot(&self) -> ChatHistory {
        self.store.read()
    }

    pub fn current_chat(&self) -> Option<Chat> {
        self.store.read().current_chat().cloned()
    }

    pub fn history(&self) -> Vec<Chat> {
        self.store.read().chats_by_recency()
    }

    pub fn daily_usage(&self) -> Vec<TokenUsage> {
        self.store.read().daily_usage_sorted()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatHistory> {
        self.store.subscribe()
    }

    /// Current chat as a live view, re-emitting on every commit.
    pub fn current_chat_stream(&self) -> impl Stream<Item = Option<Chat>> {
        Self::derived(self.subscribe(), |history| history.current_chat().cloned())
    }

    /// Chat list (most recent first) as a live view.
    pub fn history_stream(&self) -> impl Stream<Item = Vec<Chat>> {
        Self::derived(self.subscribe(), |history| history.chats_by_recency())
    }

    /// Usage ledger (date ascending) as a live view.
    pub fn daily_usage_stream(&self) -> impl Stream<Item = Vec<TokenUsage>> {
        Self::derived(self.subscribe(), |history| history.daily_usage_sorted())
    }

    fn derived<T, F>(mut rx: watch::Receiver<ChatHistory>, project: F) -> impl Stream<Item = T>
    where
        F: Fn(&ChatHistory) -> T + Send + 'static,
        T: Send + 'static,
    {
        async_stream::stream! {
            loop {
                let value = {
                    let history = rx.borrow_and_update();
                    project(&history)
                };
                yield value;
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }
    }
}
