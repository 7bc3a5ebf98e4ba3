use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{watch, Mutex};

use crate::error::Result;

/// Durable, transactional single-value document with a live-update
/// subscription.
///
/// One canonical value lives in a watch slot; `update` serializes all
/// read-modify-write transforms behind one async lock, commits the new value
/// to disk with a temp-file-plus-rename write, then publishes it to every
/// subscriber. An unreadable or corrupt file falls back to the default value
/// instead of failing the caller; the corruption is logged.
pub struct DocumentStore<T> {
    path: PathBuf,
    slot: watch::Sender<T>,
    write_lock: Mutex<()>,
}

impl<T> DocumentStore<T>
where
    T: Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let initial = Self::load(&path);
        let (slot, _) = watch::channel(initial);
        Self {
            path,
            slot,
            write_lock: Mutex::new(()),
        }
    }

    fn load(path: &Path) -> T {
        match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(
                        "corrupt document at {}: {}; starting from defaults",
                        path.display(),
                        e
                    );
                    T::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => T::default(),
            Err(e) => {
                tracing::warn!(
                    "unreadable document at {}: {}; starting from defaults",
                    path.display(),
                    e
                );
                T::default()
            }
        }
    }

    /// Latest committed value.
    pub fn read(&self) -> T {
        self.slot.borrow().clone()
    }

    /// Receiver that observes every committed value.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.slot.subscribe()
    }

    /// Applies `transform` to the latest committed value and commits the
    /// result as one atomic write. Concurrent updates never interleave; each
    /// sees the result of all prior updates.
    pub async fn update<F>(&self, transform: F) -> Result<T>
    where
        F: FnOnce(T) -> T,
    {
        let _guard = self.write_lock.lock().await;
        let next = transform(self.slot.borrow().clone());
        self.commit(&next).await?;
        self.slot.send_replace(next.clone());
        Ok(next)
    }

    async fn commit(&self, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
