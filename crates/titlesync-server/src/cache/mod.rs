//! Cache tiers sitting in front of the title store.
//!
//! ## Architecture
//!
//! - **Local cache (DashMap)**: per-process, keyed by holder, evicted on invalidation
//! - **Shared cache (Redis)**: network, shared by every process, TTL bounded
//! - **Invalidation bus (Pub/Sub)**: cross-process eviction of local entries
//!
//! ## Lookup Order
//!
//! ```text
//! read → local (DashMap) → shared (Redis) → store (PostgreSQL)
//!             ↓                  ↓                  ↓
//!        <1µs latency       ~1ms latency      ~10ms latency
//! ```
//!
//! ## Graceful Degradation
//!
//! If Redis is unavailable or disabled, the shared tier becomes a no-op:
//! reads fall through to the store and no invalidations cross process
//! boundaries. Each process stays correct for its own writes.

pub mod error;
pub mod local;
pub mod memory;
pub mod pubsub;
pub mod redis;
pub mod shared;

pub use error::CacheError;
pub use local::{LocalCacheStats, LocalTitleCache};
pub use memory::MemorySharedCache;
pub use pubsub::InvalidationBus;
pub use self::redis::{RedisSharedCache, create_shared_cache};
pub use shared::{MessageStream, SharedCache};
