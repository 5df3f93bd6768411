//! Shared cache facade over the configured backend.

use std::time::Duration;

use futures_util::stream::BoxStream;

use super::error::CacheError;
use super::memory::MemorySharedCache;
use super::redis::RedisSharedCache;

/// Stream of raw invalidation payloads received from the channel.
pub type MessageStream = BoxStream<'static, String>;

/// Shared cache tier.
///
/// ## Cache Modes
///
/// - **Disabled**: every read misses, every write and publish is a no-op
/// - **Memory**: single-process stand-in with the same TTL and broadcast semantics
/// - **Redis**: multi-process mode backed by a pooled Redis connection
///
/// Keys passed in are relative; the backend applies the configured prefix.
/// No operation here ever fails the caller. Backend errors are logged and
/// surface as a miss or a skipped write.
#[derive(Clone, Default)]
pub enum SharedCache {
    #[default]
    Disabled,
    Memory(MemorySharedCache),
    Redis(RedisSharedCache),
}

impl SharedCache {
    /// Process-local shared cache, mostly useful for tests and single-node setups.
    pub fn memory(key_prefix: impl Into<String>) -> Self {
        SharedCache::Memory(MemorySharedCache::new(key_prefix))
    }

    /// Whether a backend is configured.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, SharedCache::Disabled)
    }

    pub fn mode(&self) -> &'static str {
        match self {
            SharedCache::Disabled => "disabled",
            SharedCache::Memory(_) => "memory",
            SharedCache::Redis(_) => "redis",
        }
    }

    /// Fetch a value, `None` on miss or backend failure.
    pub async fn get(&self, key: &str) -> Option<String> {
        match self {
            SharedCache::Disabled => None,
            SharedCache::Memory(cache) => cache.get(key),
            SharedCache::Redis(cache) => cache.get(key).await,
        }
    }

    /// Store a value with expiry.
    pub async fn set(&self, key: &str, value: &str, ttl: Duration) {
        match self {
            SharedCache::Disabled => {}
            SharedCache::Memory(cache) => cache.set(key, value, ttl),
            SharedCache::Redis(cache) => cache.set(key, value, ttl).await,
        }
    }

    pub async fn delete(&self, key: &str) {
        match self {
            SharedCache::Disabled => {}
            SharedCache::Memory(cache) => cache.delete(key),
            SharedCache::Redis(cache) => cache.delete(key).await,
        }
    }

    /// Delete every key starting with `prefix`. An empty prefix clears the
    /// whole namespace. Returns the number of keys removed.
    pub async fn delete_by_pattern(&self, prefix: &str) -> usize {
        match self {
            SharedCache::Disabled => 0,
            SharedCache::Memory(cache) => cache.delete_by_pattern(prefix),
            SharedCache::Redis(cache) => cache.delete_by_pattern(prefix).await,
        }
    }

    /// Broadcast a raw payload on the invalidation channel.
    pub async fn publish(&self, payload: &str) {
        match self {
            SharedCache::Disabled => {}
            SharedCache::Memory(cache) => cache.publish(payload),
            SharedCache::Redis(cache) => cache.publish(payload).await,
        }
    }

    /// Open a dedicated subscription to the invalidation channel.
    ///
    /// The returned stream ends when the underlying connection is lost.
    pub async fn open_subscription(&self) -> Result<MessageStream, CacheError> {
        match self {
            SharedCache::Disabled => Err(CacheError::Disabled),
            SharedCache::Memory(cache) => cache.open_subscription(),
            SharedCache::Redis(cache) => cache.open_subscription().await,
        }
    }

    /// Check if the backend answers (for health checks).
    pub async fn is_available(&self) -> bool {
        match self {
            SharedCache::Disabled => false,
            SharedCache::Memory(cache) => cache.is_reachable(),
            SharedCache::Redis(cache) => cache.ping().await.is_ok(),
        }
    }
}

impl std::fmt::Debug for SharedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedCache").field(&self.mode()).finish()
    }
}
