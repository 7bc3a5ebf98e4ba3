use std::path::PathBuf;
use std::sync::Arc;

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::document::DocumentStore;
use crate::error::Result;

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/".to_string()
}

fn default_auto_hide() -> bool {
    true
}

/// User-editable settings, persisted as their own small document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Always stored with a trailing slash so endpoint paths append cleanly.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_auto_hide")]
    pub auto_hide_chat_button: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            base_url: default_base_url(),
            auto_hide_chat_button: default_auto_hide(),
        }
    }
}

#[derive(Clone)]
pub struct SettingsStore {
    store: Arc<DocumentStore<Settings>>,
}

impl SettingsStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            store: Arc::new(DocumentStore::open(path)),
        }
    }

    pub fn read(&self) -> Settings {
        self.store.read()
    }

    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.store.subscribe()
    }

    pub async fn save_settings(&self, api_key: &str, model: &str, base_url: &str) -> Result<()> {
        let api_key = api_key.to_string();
        let model = model.to_string();
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        self.store
            .update(move |mut settings| {
                settings.api_key = api_key;
                settings.model = model;
                settings.base_url = base_url;
                settings
            })
            .await?;
        Ok(())
    }

    pub async fn set_auto_hide_chat_button(&self, enabled: bool) -> Result<()> {
        self.store
            .update(move |mut settings| {
                settings.auto_hide_chat_button = enabled;
                settings
            })
            .await?;
        Ok(())
    }

    /// API key as a live view, for the "is a key configured" surface.
    pub fn api_key_stream(&self) -> impl Stream<Item = String> {
        let mut rx = self.subscribe();
        async_stream::stream! {
            loop {
                let key = rx.borrow_and_update().api_key.clone();
                yield key;
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }
    }
}
