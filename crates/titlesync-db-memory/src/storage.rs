use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use titlesync_core::{HolderId, TitleCollection, TitleRecord};
use titlesync_storage::{StorageError, TitleStore};

/// In-memory title store backed by `DashMap`.
///
/// Besides the store contract it exposes three testing aids:
/// - [`set_unavailable`](Self::set_unavailable) makes every call fail with
///   a connection error, like a database that went away
/// - [`set_delay`](Self::set_delay) adds latency to every call
/// - [`load_count`](Self::load_count) / [`selected_reads`](Self::selected_reads)
///   count read round trips, so callers can assert cache hits
#[derive(Debug, Default)]
pub struct InMemoryTitleStore {
    /// holder -> (title text -> acquired_at)
    titles: DashMap<HolderId, HashMap<String, i64>>,
    selected: DashMap<HolderId, String>,
    unavailable: AtomicBool,
    closed: AtomicBool,
    delay_ms: AtomicU64,
    loads: AtomicUsize,
    selected_reads: AtomicUsize,
}

impl InMemoryTitleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the backend going away (or coming back).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delays every call by `delay`, simulating a slow backend.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of `load_titles` calls served so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Number of `get_selected` calls served so far.
    pub fn selected_reads(&self) -> usize {
        self.selected_reads.load(Ordering::SeqCst)
    }

    async fn check_available(&self) -> Result<(), StorageError> {
        let delay_ms = self.delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::connection_error("store is closed"));
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::connection_error("store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl TitleStore for InMemoryTitleStore {
    async fn ensure_schema(&self) -> Result<(), StorageError> {
        self.check_available().await
    }

    async fn load_titles(&self, holder: HolderId) -> Result<TitleCollection, StorageError> {
        self.check_available().await?;
        self.loads.fetch_add(1, Ordering::SeqCst);

        let collection = self
            .titles
            .get(&holder)
            .map(|titles| {
                titles
                    .iter()
                    .map(|(title, acquired_at)| TitleRecord::new(holder, title.clone(), *acquired_at))
                    .collect()
            })
            .unwrap_or_default();
        Ok(collection)
    }

    async fn upsert_title(
        &self,
        holder: HolderId,
        title: &str,
        acquired_at: i64,
    ) -> Result<bool, StorageError> {
        self.check_available().await?;
        self.titles
            .entry(holder)
            .or_default()
            .insert(title.to_string(), acquired_at);
        tracing::trace!(%holder, title, "in-memory upsert");
        Ok(true)
    }

    async fn delete_title(&self, holder: HolderId, title: &str) -> Result<bool, StorageError> {
        self.check_available().await?;
        let removed = self
            .titles
            .get_mut(&holder)
            .map(|mut titles| titles.remove(title).is_some())
            .unwrap_or(false);
        self.titles.remove_if(&holder, |_, titles| titles.is_empty());
        Ok(removed)
    }

    async fn get_selected(&self, holder: HolderId) -> Result<Option<String>, StorageError> {
        self.check_available().await?;
        self.selected_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.selected.get(&holder).map(|title| title.clone()))
    }

    async fn set_selected(
        &self,
        holder: HolderId,
        title: Option<&str>,
    ) -> Result<(), StorageError> {
        self.check_available().await?;
        match title {
            Some(title) => {
                self.selected.insert(holder, title.to_string());
            }
            None => {
                self.selected.remove(&holder);
            }
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        self.check_available().await
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
