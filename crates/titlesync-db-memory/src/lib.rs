//! In-memory durable store for titlesync.
//!
//! Implements [`TitleStore`] over concurrent maps. Used by tests (including
//! multi-process coherence tests, where several services share one store)
//! and for running the stack without PostgreSQL.
//!
//! # Example
//!
//! ```ignore
//! use titlesync_db_memory::InMemoryTitleStore;
//! use titlesync_storage::TitleStore;
//!
//! let store = InMemoryTitleStore::new();
//! store.upsert_title(holder, "Champion", now_millis()).await?;
//! ```

pub mod storage;

pub use storage::InMemoryTitleStore;
pub use titlesync_storage::{StorageError, TitleStore};
