//! # titlesync-storage
//!
//! Durable store contract for titlesync.
//!
//! The durable store is the only source of truth for owned titles and the
//! selected title of each holder. This crate defines the [`TitleStore`]
//! trait and [`StorageError`]; implementations live in separate crates
//! (`titlesync-db-postgres`, `titlesync-db-memory`).
//!
//! ## Example
//!
//! ```ignore
//! use titlesync_core::{HolderId, now_millis};
//! use titlesync_storage::{StorageError, TitleStore};
//!
//! async fn grant(store: &dyn TitleStore, holder: HolderId) -> Result<bool, StorageError> {
//!     store.upsert_title(holder, "&6Champion", now_millis()).await
//! }
//! ```

pub mod error;
pub mod traits;

pub use error::{ErrorCategory, StorageError};
pub use traits::{DynTitleStore, TitleStore};
