//! In-process shared cache with the same contract as the Redis backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use super::error::CacheError;
use super::shared::MessageStream;

const CHANNEL_CAPACITY: usize = 1024;

/// A cached entry with TTL support.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: Arc<str>,
    pub cached_at: Instant,
    pub ttl: Duration,
}

impl CachedEntry {
    pub fn new(data: &str, ttl: Duration) -> Self {
        Self {
            data: Arc::from(data),
            cached_at: Instant::now(),
            ttl,
        }
    }

    /// Check if this entry has expired.
    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

/// Shared cache living in this process.
///
/// Clones share the same entries and channel, so several services built from
/// clones of one `MemorySharedCache` behave like processes sharing one Redis.
/// Reachability can be toggled to exercise degraded paths.
#[derive(Clone)]
pub struct MemorySharedCache {
    inner: Arc<Inner>,
}

struct Inner {
    key_prefix: String,
    entries: DashMap<String, CachedEntry>,
    channel: Mutex<broadcast::Sender<String>>,
    unreachable: AtomicBool,
}

impl MemorySharedCache {
    pub fn new(key_prefix: impl Into<String>) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                key_prefix: key_prefix.into(),
                entries: DashMap::new(),
                channel: Mutex::new(sender),
                unreachable: AtomicBool::new(false),
            }),
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.inner.key_prefix, key)
    }

    /// Simulate the backend going away (or coming back).
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.unreachable.store(!reachable, Ordering::SeqCst);
    }

    pub fn is_reachable(&self) -> bool {
        !self.inner.unreachable.load(Ordering::SeqCst)
    }

    /// End every open subscription stream, as a dropped connection would.
    pub fn disconnect_subscribers(&self) {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        *self.inner.channel.lock() = sender;
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.channel.lock().receiver_count()
    }

    /// Write a raw value under a relative key, bypassing any encoding.
    pub fn insert_raw(&self, key: &str, value: &str, ttl: Duration) {
        self.inner
            .entries
            .insert(self.full_key(key), CachedEntry::new(value, ttl));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub(crate) fn get(&self, key: &str) -> Option<String> {
        if !self.is_reachable() {
            tracing::warn!(key = %key, "shared cache unreachable, treating GET as miss");
            return None;
        }
        let full_key = self.full_key(key);
        let entry = self.inner.entries.get(&full_key)?;
        if entry.is_expired() {
            drop(entry);
            self.inner.entries.remove(&full_key);
            return None;
        }
        Some(entry.data.to_string())
    }

    pub(crate) fn set(&self, key: &str, value: &str, ttl: Duration) {
        if !self.is_reachable() {
            tracing::warn!(key = %key, "shared cache unreachable, skipping SET");
            return;
        }
        self.insert_raw(key, value, ttl);
    }

    pub(crate) fn delete(&self, key: &str) {
        if !self.is_reachable() {
            tracing::warn!(key = %key, "shared cache unreachable, skipping DEL");
            return;
        }
        self.inner.entries.remove(&self.full_key(key));
    }

    pub(crate) fn delete_by_pattern(&self, prefix: &str) -> usize {
        if !self.is_reachable() {
            tracing::warn!(prefix = %prefix, "shared cache unreachable, skipping pattern delete");
            return 0;
        }
        let full_prefix = self.full_key(prefix);
        let before = self.inner.entries.len();
        self.inner
            .entries
            .retain(|key, _| !key.starts_with(&full_prefix));
        before.saturating_sub(self.inner.entries.len())
    }

    pub(crate) fn publish(&self, payload: &str) {
        if !self.is_reachable() {
            tracing::warn!(payload = %payload, "shared cache unreachable, dropping publish");
            return;
        }
        // No receivers is not an error: nobody is listening yet.
        let receivers = self.inner.channel.lock().send(payload.to_string()).unwrap_or(0);
        tracing::debug!(payload = %payload, receivers, "published invalidation (memory)");
    }

    pub(crate) fn open_subscription(&self) -> Result<MessageStream, CacheError> {
        if !self.is_reachable() {
            return Err(CacheError::Unreachable("memory shared cache offline".into()));
        }
        let receiver = self.inner.channel.lock().subscribe();
        let stream = BroadcastStream::new(receiver).filter_map(|item| async move {
            match item {
                Ok(payload) => Some(payload),
                Err(e) => {
                    tracing::warn!(error = %e, "invalidation subscriber lagged, messages dropped");
                    None
                }
            }
        });
        Ok(stream.boxed())
    }
}
