//! Shared cache error types.

/// Failures talking to the shared cache tier.
///
/// These never escape the cache layer for get/set/delete: callers see a
/// miss or a no-op and the error is logged. Only opening the invalidation
/// subscription reports them, so the listener can back off and retry.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("shared cache is disabled")]
    Disabled,

    #[error("failed to get Redis connection: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("Redis command failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("shared cache unreachable: {0}")]
    Unreachable(String),

    #[error("invalidation subscription closed")]
    SubscriptionClosed,
}

impl CacheError {
    /// Whether retrying later can succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}
