//! titlesync server: a title service backed by PostgreSQL, kept coherent
//! across processes by a Redis shared cache and Pub/Sub invalidation.
//!
//! # Example
//!
//! ```ignore
//! use titlesync_server::{TitleRuntime, config::loader::load_config};
//!
//! let config = load_config(None)?;
//! let runtime = TitleRuntime::start(&config).await?;
//! runtime.service().add_title(holder, "&6Champion").await?;
//! runtime.service().equip_title(holder, "&6Champion").await?;
//! let shown = runtime.service().display_title(holder).await;
//! runtime.shutdown().await;
//! ```

pub mod bootstrap;
pub mod cache;
pub mod coherence;
pub mod config;
pub mod error;
pub mod observability;
pub mod service;

pub use bootstrap::TitleRuntime;
pub use cache::{InvalidationBus, LocalTitleCache, SharedCache, create_shared_cache};
pub use coherence::{CoherenceService, NO_SELECTION_SENTINEL};
pub use config::{AppConfig, CacheConfig, PostgresStorageConfig, RedisConfig, StorageBackend};
pub use error::TitleError;
pub use observability::init_tracing;
pub use service::{RedeemOutcome, ServiceSettings, TitleService, ToggleOutcome};

pub use titlesync_core::{HolderId, MAX_TITLES, format_selected_title};
