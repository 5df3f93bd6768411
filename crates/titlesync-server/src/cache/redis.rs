//! Redis-backed shared cache and invalidation channel.

use std::sync::Arc;
use std::time::Duration;

use deadpool_redis::{Pool, redis::AsyncCommands};
use futures_util::StreamExt;

use super::error::CacheError;
use super::shared::{MessageStream, SharedCache};
use crate::config::{CacheConfig, RedisConfig};

/// Keys fetched per SCAN round trip.
const SCAN_BATCH: usize = 100;

/// Shared cache on a pooled Redis connection.
///
/// Commands go through the deadpool pool, which health-checks connections
/// on recycle. Subscriptions use a dedicated connection from the client since
/// a connection in subscribe mode cannot run other commands.
#[derive(Clone)]
pub struct RedisSharedCache {
    pool: Pool,
    client: redis::Client,
    key_prefix: Arc<str>,
    channel: Arc<str>,
}

impl RedisSharedCache {
    pub fn new(
        pool: Pool,
        client: redis::Client,
        key_prefix: impl Into<Arc<str>>,
        channel: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            pool,
            client,
            key_prefix: key_prefix.into(),
            channel: channel.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    pub(crate) async fn get(&self, key: &str) -> Option<String> {
        let key = self.full_key(key);
        match self.pool.get().await {
            Ok(mut conn) => match conn.get::<_, Option<String>>(&key).await {
                Ok(Some(value)) => {
                    tracing::debug!(key = %key, "shared cache hit");
                    Some(value)
                }
                Ok(None) => {
                    tracing::debug!(key = %key, "shared cache miss");
                    None
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Redis GET error");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Failed to get Redis connection");
                None
            }
        }
    }

    pub(crate) async fn set(&self, key: &str, value: &str, ttl: Duration) {
        let key = self.full_key(key);
        // SETEX rejects a zero expiry.
        let ttl_secs = ttl.as_secs().max(1);
        match self.pool.get().await {
            Ok(mut conn) => {
                if let Err(e) = conn.set_ex::<_, _, ()>(&key, value, ttl_secs).await {
                    tracing::warn!(key = %key, error = %e, "Redis SETEX error");
                } else {
                    tracing::debug!(key = %key, ttl_secs, "shared cache set");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to get Redis connection"),
        }
    }

    pub(crate) async fn delete(&self, key: &str) {
        let key = self.full_key(key);
        match self.pool.get().await {
            Ok(mut conn) => {
                if let Err(e) = conn.del::<_, ()>(&key).await {
                    tracing::warn!(key = %key, error = %e, "Redis DEL error");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to get Redis connection"),
        }
    }

    pub(crate) async fn delete_by_pattern(&self, prefix: &str) -> usize {
        match self.scan_and_delete(prefix).await {
            Ok(removed) => {
                tracing::debug!(prefix = %prefix, removed, "shared cache pattern delete");
                removed
            }
            Err(e) => {
                tracing::warn!(prefix = %prefix, error = %e, "Redis pattern delete failed");
                0
            }
        }
    }

    /// Cursor-based SCAN so large keyspaces never block the server.
    async fn scan_and_delete(&self, prefix: &str) -> Result<usize, CacheError> {
        let pattern = format!("{}*", self.full_key(prefix));
        let mut conn = self.pool.get().await?;
        let mut cursor: u64 = 0;
        let mut removed = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                removed += conn.del::<_, usize>(&keys).await?;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(removed)
    }

    pub(crate) async fn publish(&self, payload: &str) {
        match self.pool.get().await {
            Ok(mut conn) => match conn.publish::<_, _, i64>(&*self.channel, payload).await {
                Ok(receivers) => {
                    tracing::debug!(channel = %self.channel, payload = %payload, receivers, "published invalidation");
                }
                Err(e) => {
                    tracing::warn!(channel = %self.channel, error = %e, "Redis PUBLISH error");
                }
            },
            Err(e) => tracing::warn!(error = %e, "Failed to get Redis connection"),
        }
    }

    pub(crate) async fn open_subscription(&self) -> Result<MessageStream, CacheError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&*self.channel).await?;
        tracing::info!(channel = %self.channel, "Subscribed to invalidation channel");

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            match msg.get_payload::<String>() {
                Ok(payload) => Some(payload),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to parse invalidation message payload");
                    None
                }
            }
        });
        Ok(stream.boxed())
    }

    pub(crate) async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// Build the shared cache tier from configuration.
///
/// Never fails: a disabled, misconfigured or unreachable Redis degrades to
/// [`SharedCache::Disabled`] with a single warning, and the service runs on
/// its local cache and the store alone.
pub async fn create_shared_cache(redis_config: &RedisConfig, cache: &CacheConfig) -> SharedCache {
    if !redis_config.enabled {
        tracing::info!("Redis disabled, running without a shared cache");
        return SharedCache::Disabled;
    }

    tracing::info!(url = %redis_config.masked_url(), "Connecting to Redis");

    let client = match redis::Client::open(redis_config.url.as_str()) {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, "Invalid Redis URL. Running without a shared cache.");
            return SharedCache::Disabled;
        }
    };

    let timeout = Duration::from_millis(redis_config.timeout_ms);
    let mut pool_config = deadpool_redis::PoolConfig::new(redis_config.pool_size);
    pool_config.timeouts.wait = Some(timeout);
    pool_config.timeouts.create = Some(timeout);
    pool_config.timeouts.recycle = Some(timeout);

    let mut deadpool_config = deadpool_redis::Config::from_url(redis_config.url.as_str());
    deadpool_config.pool = Some(pool_config);

    let pool = match deadpool_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to create Redis pool. Running without a shared cache.");
            return SharedCache::Disabled;
        }
    };

    let cache = RedisSharedCache::new(
        pool,
        client,
        cache.key_prefix.as_str(),
        redis_config.channel.as_str(),
    );

    match cache.ping().await {
        Ok(()) => {
            tracing::info!(channel = %cache.channel(), "✓ Connected to Redis successfully");
            SharedCache::Redis(cache)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to connect to Redis. Running without a shared cache.");
            SharedCache::Disabled
        }
    }
}
