//! Read-through / invalidate-on-write coordination between the store and
//! the shared cache.

use std::time::Duration;

use titlesync_core::{HolderId, InvalidationMessage, TitleCollection};
use titlesync_storage::{DynTitleStore, StorageError};

use crate::cache::{InvalidationBus, SharedCache};

/// Cached stand-in for "holder has no selection". NUL never occurs in title text.
pub const NO_SELECTION_SENTINEL: &str = "\u{0}none";

fn titles_key(holder: HolderId) -> String {
    format!("titles:{holder}")
}

fn selected_key(holder: HolderId) -> String {
    format!("selected:{holder}")
}

/// Keeps the shared cache coherent with the durable store.
///
/// ## Read path
///
/// shared cache → (miss or undecodable) → store → populate shared cache with TTL
///
/// ## Write path
///
/// store write → delete shared key → publish change descriptor
///
/// The store write must succeed for the operation to succeed; cache and
/// channel failures are logged by the cache tier and never fail a write.
#[derive(Clone)]
pub struct CoherenceService {
    store: DynTitleStore,
    cache: SharedCache,
    bus: InvalidationBus,
    ttl: Duration,
}

impl CoherenceService {
    pub fn new(store: DynTitleStore, cache: SharedCache, bus: InvalidationBus, ttl: Duration) -> Self {
        Self {
            store,
            cache,
            bus,
            ttl,
        }
    }

    pub fn store(&self) -> &DynTitleStore {
        &self.store
    }

    pub fn shared_cache(&self) -> &SharedCache {
        &self.cache
    }

    pub fn bus(&self) -> &InvalidationBus {
        &self.bus
    }

    pub async fn load_titles(&self, holder: HolderId) -> Result<TitleCollection, StorageError> {
        let key = titles_key(holder);
        if let Some(raw) = self.cache.get(&key).await {
            match serde_json::from_str::<TitleCollection>(&raw) {
                Ok(titles) => return Ok(titles),
                Err(e) => {
                    tracing::warn!(%holder, key = %key, error = %e, "undecodable cached collection, reloading");
                }
            }
        }

        let titles = self.store.load_titles(holder).await?;
        match serde_json::to_string(&titles) {
            Ok(encoded) => self.cache.set(&key, &encoded, self.ttl).await,
            Err(e) => tracing::warn!(%holder, error = %e, "failed to encode collection for cache"),
        }
        Ok(titles)
    }

    /// Grant (or refresh) a title. Returns whether a row was written.
    pub async fn add_title(
        &self,
        holder: HolderId,
        title: &str,
        acquired_at: i64,
    ) -> Result<bool, StorageError> {
        let written = self.store.upsert_title(holder, title, acquired_at).await?;
        if written {
            self.cache.delete(&titles_key(holder)).await;
            self.bus
                .publish(&InvalidationMessage::title_added(holder, title))
                .await;
        }
        Ok(written)
    }

    /// Revoke a title, clearing the selection if it pointed at it.
    ///
    /// The selection clear is a separate follow-up write; if it fails the
    /// revoke still counts and the dangling selection is reconciled on read.
    pub async fn delete_title(&self, holder: HolderId, title: &str) -> Result<bool, StorageError> {
        let removed = self.store.delete_title(holder, title).await?;
        if !removed {
            return Ok(false);
        }

        self.cache.delete(&titles_key(holder)).await;
        self.bus
            .publish(&InvalidationMessage::title_removed(holder, title))
            .await;

        match self.get_selected(holder).await {
            Ok(Some(selected)) if selected == title => {
                if let Err(e) = self.set_selected(holder, None).await {
                    tracing::error!(%holder, operation = "delete_title", error = %e, "failed to clear selection of revoked title");
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(%holder, operation = "delete_title", error = %e, "could not check selection after revoke");
            }
        }
        Ok(true)
    }

    pub async fn get_selected(&self, holder: HolderId) -> Result<Option<String>, StorageError> {
        let key = selected_key(holder);
        if let Some(raw) = self.cache.get(&key).await {
            return Ok((raw != NO_SELECTION_SENTINEL).then_some(raw));
        }

        let selected = self.store.get_selected(holder).await?;
        let encoded = selected.as_deref().unwrap_or(NO_SELECTION_SENTINEL);
        self.cache.set(&key, encoded, self.ttl).await;
        Ok(selected)
    }

    pub async fn set_selected(&self, holder: HolderId, title: Option<&str>) -> Result<(), StorageError> {
        self.store.set_selected(holder, title).await?;
        self.cache.delete(&selected_key(holder)).await;
        self.bus
            .publish(&InvalidationMessage::title_selected(holder, title))
            .await;
        Ok(())
    }

    /// Drop every shared cache entry in the namespace.
    pub async fn purge(&self) -> usize {
        let removed = self.cache.delete_by_pattern("").await;
        tracing::info!(removed, "purged shared title cache");
        removed
    }
}
