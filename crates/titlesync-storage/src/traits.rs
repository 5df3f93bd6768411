//! The durable store trait.

use std::sync::Arc;

use async_trait::async_trait;
use titlesync_core::{HolderId, TitleCollection};

use crate::error::StorageError;

/// Authoritative storage for owned titles and the selected title.
///
/// Every method is one independent unit of work; no call spans both tables
/// in a single transaction. Implementations must be thread-safe and must not
/// block the calling task.
#[async_trait]
pub trait TitleStore: Send + Sync {
    /// Creates the owned-titles and selected-title tables if absent.
    ///
    /// Safe to call on every startup.
    async fn ensure_schema(&self) -> Result<(), StorageError>;

    /// Loads every title owned by `holder`.
    ///
    /// An unknown holder yields an empty collection.
    async fn load_titles(&self, holder: HolderId) -> Result<TitleCollection, StorageError>;

    /// Inserts a title or refreshes its acquisition time.
    ///
    /// Returns whether a row was affected.
    async fn upsert_title(
        &self,
        holder: HolderId,
        title: &str,
        acquired_at: i64,
    ) -> Result<bool, StorageError>;

    /// Deletes a title. Returns whether a row was removed.
    async fn delete_title(&self, holder: HolderId, title: &str) -> Result<bool, StorageError>;

    /// Returns the selected title, if any.
    async fn get_selected(&self, holder: HolderId) -> Result<Option<String>, StorageError>;

    /// Sets the selected title, or removes the selection row when `None`.
    async fn set_selected(
        &self,
        holder: HolderId,
        title: Option<&str>,
    ) -> Result<(), StorageError>;

    /// Verifies the backend is reachable.
    async fn health_check(&self) -> Result<(), StorageError>;

    /// Releases pooled connections. Further calls fail.
    async fn close(&self);
}

/// Type alias for a shareable store.
pub type DynTitleStore = Arc<dyn TitleStore>;
