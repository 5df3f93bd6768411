//! Cross-process invalidation over the shared cache's Pub/Sub channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::RwLock;
use titlesync_core::InvalidationMessage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::shared::SharedCache;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(300); // 5 minutes max

/// Messages buffered between the listener and the dispatcher.
const DISPATCH_BUFFER: usize = 1024;

type Handler = Arc<dyn Fn(&InvalidationMessage) + Send + Sync>;
type ResyncHandler = Arc<dyn Fn() + Send + Sync>;

/// Work handed from the listener to the dispatcher, in arrival order.
enum Dispatch {
    Payload(String),
    /// The subscription was re-established after a loss; anything published
    /// in between was missed.
    Resync,
}

/// Publishes invalidation messages and fans received ones out to handlers.
///
/// ## How It Works
///
/// 1. The first [`subscribe`](Self::subscribe) spawns a listener task on a
///    dedicated subscription connection
/// 2. The listener forwards raw payloads over a channel to a dispatcher task
/// 3. The dispatcher parses each payload and invokes every handler once
/// 4. If the subscription drops, the listener reconnects with exponential backoff
///    and, once subscribed again, runs every [`on_resync`](Self::on_resync)
///    handler so state built from missed messages is discarded
///
/// ## Example Flow
///
/// ```text
/// Process 1: PUBLISH title:sync "title-add:<holder>:Hero"
///   ↓
/// Process 2: listener → dispatcher → local cache evicts <holder>
/// Process 1: listener → dispatcher → local cache evicts <holder>
/// ```
///
/// Publishing processes receive their own messages; handlers must be idempotent.
#[derive(Clone)]
pub struct InvalidationBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    cache: SharedCache,
    handlers: RwLock<Vec<Handler>>,
    resync_handlers: RwLock<Vec<ResyncHandler>>,
    listening: AtomicBool,
    interrupted: AtomicBool,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl InvalidationBus {
    pub fn new(cache: SharedCache) -> Self {
        Self {
            inner: Arc::new(BusInner {
                cache,
                handlers: RwLock::new(Vec::new()),
                resync_handlers: RwLock::new(Vec::new()),
                listening: AtomicBool::new(false),
                interrupted: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
        }
    }

    /// Register a handler and make sure the listener is running.
    ///
    /// Handlers run on the dispatcher task, never on the listener, and must
    /// not block. With the shared cache disabled the handler is kept but no
    /// messages will arrive.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(&InvalidationMessage) + Send + Sync + 'static,
    {
        self.inner.handlers.write().push(Arc::new(handler));

        if !self.inner.cache.is_enabled() {
            tracing::warn!("shared cache disabled, cross-process invalidation is inactive");
            return;
        }
        self.ensure_listening();
    }

    /// Register a handler run after the subscription recovers from a loss.
    ///
    /// Messages published while no subscription was held are never
    /// delivered, so the handler must drop whatever they would have
    /// invalidated. Runs on the dispatcher task, ordered with messages.
    pub fn on_resync<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.resync_handlers.write().push(Arc::new(handler));
    }

    /// Broadcast a message to every subscribed process, this one included.
    pub async fn publish(&self, message: &InvalidationMessage) {
        self.inner.cache.publish(&message.to_string()).await;
    }

    pub fn handler_count(&self) -> usize {
        self.inner.handlers.read().len()
    }

    /// Whether a listener currently holds (or is establishing) the subscription.
    pub fn is_listening(&self) -> bool {
        self.inner.listening.load(Ordering::SeqCst)
    }

    /// Stop the listener and dispatcher and wait for them to exit.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.listening.store(false, Ordering::SeqCst);
        tracing::debug!("invalidation bus stopped");
    }

    /// Parse a raw payload and hand it to every handler.
    pub fn dispatch(&self, raw: &str) {
        self.inner.dispatch(raw);
    }

    fn ensure_listening(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        if self
            .inner
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let inner = Arc::clone(&self.inner);
            self.inner.tasks.spawn(listen(inner));
        }
    }
}

impl BusInner {
    fn dispatch(&self, raw: &str) {
        let message: InvalidationMessage = match raw.parse() {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(payload = %raw, error = %e, "ignoring malformed invalidation message");
                return;
            }
        };
        tracing::debug!(action = %message.action, holder = %message.holder, "received invalidation");

        let handlers: Vec<Handler> = self.handlers.read().iter().cloned().collect();
        for handler in handlers {
            handler(&message);
        }
    }

    fn resync(&self) {
        let handlers: Vec<ResyncHandler> =
            self.resync_handlers.read().iter().cloned().collect();
        tracing::info!(
            handlers = handlers.len(),
            "invalidation subscription restored, resyncing"
        );
        for handler in handlers {
            handler();
        }
    }
}

/// Listener loop: owns the subscription and feeds the dispatcher.
async fn listen(inner: Arc<BusInner>) {
    let (tx, rx) = mpsc::channel::<Dispatch>(DISPATCH_BUFFER);
    inner.tasks.spawn(run_dispatcher(Arc::clone(&inner), rx));

    let mut backoff = INITIAL_BACKOFF;
    loop {
        let subscription = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            result = inner.cache.open_subscription() => result,
        };

        let error = match subscription {
            Ok(mut stream) => {
                backoff = INITIAL_BACKOFF;
                if inner.interrupted.swap(false, Ordering::SeqCst)
                    && tx.send(Dispatch::Resync).await.is_err()
                {
                    return;
                }
                loop {
                    let next = tokio::select! {
                        _ = inner.shutdown.cancelled() => return,
                        next = stream.next() => next,
                    };
                    match next {
                        Some(payload) => {
                            if tx.send(Dispatch::Payload(payload)).await.is_err() {
                                return;
                            }
                        }
                        None => break,
                    }
                }
                super::CacheError::SubscriptionClosed
            }
            Err(e) => e,
        };

        if !error.is_transient() {
            tracing::warn!(error = %error, "invalidation listener stopped");
            inner.interrupted.store(true, Ordering::SeqCst);
            inner.listening.store(false, Ordering::SeqCst);
            return;
        }

        // Allow a later subscribe() to take over while this task sleeps.
        inner.interrupted.store(true, Ordering::SeqCst);
        inner.listening.store(false, Ordering::SeqCst);
        tracing::error!(
            error = %error,
            backoff_secs = backoff.as_secs(),
            "Invalidation listener error, reconnecting..."
        );

        tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            _ = tokio::time::sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);

        if inner
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Another listener was started in the meantime.
            return;
        }
    }
}

async fn run_dispatcher(inner: Arc<BusInner>, mut rx: mpsc::Receiver<Dispatch>) {
    loop {
        let next = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            next = rx.recv() => next,
        };
        match next {
            Some(Dispatch::Payload(raw)) => inner.dispatch(&raw),
            Some(Dispatch::Resync) => inner.resync(),
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use titlesync_core::HolderId;

    #[tokio::test]
    async fn dispatch_invokes_every_handler_once() {
        let bus = InvalidationBus::new(SharedCache::Disabled);
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let (a, b) = (Arc::clone(&first), Arc::clone(&second));
        bus.subscribe(move |_| {
            a.fetch_add(1, Ordering::SeqCst);
        });
        bus.subscribe(move |_| {
            b.fetch_add(1, Ordering::SeqCst);
        });

        let holder = HolderId::random();
        bus.dispatch(&InvalidationMessage::title_added(holder, "Hero").to_string());

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_payloads_are_ignored() {
        let bus = InvalidationBus::new(SharedCache::Disabled);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        bus.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.dispatch("garbage");
        bus.dispatch("title-add:not-a-uuid:Hero");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disabled_cache_never_starts_listener() {
        let bus = InvalidationBus::new(SharedCache::Disabled);
        bus.subscribe(|_| {});
        assert!(!bus.is_listening());
        assert_eq!(bus.handler_count(), 1);
    }

    #[tokio::test]
    async fn listener_starts_once_for_many_subscribers() {
        let cache = SharedCache::memory("title:");
        let bus = InvalidationBus::new(cache.clone());
        for _ in 0..5 {
            bus.subscribe(|_| {});
        }
        assert!(bus.is_listening());

        let SharedCache::Memory(memory) = &cache else {
            unreachable!()
        };
        tokio::time::timeout(Duration::from_secs(2), async {
            while memory.subscriber_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("listener subscribed");
        assert_eq!(memory.subscriber_count(), 1);

        bus.shutdown().await;
        assert!(!bus.is_listening());
    }

    #[tokio::test]
    async fn resync_runs_after_subscription_recovers() {
        let cache = SharedCache::memory("title:");
        let SharedCache::Memory(memory) = &cache else {
            unreachable!()
        };
        let bus = InvalidationBus::new(cache.clone());
        let resyncs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&resyncs);
        bus.on_resync(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        bus.subscribe(|_| {});

        let wait_subscribed = || async move {
            tokio::time::timeout(Duration::from_secs(5), async {
                while memory.subscriber_count() == 0 {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .expect("listener subscribed");
        };
        wait_subscribed().await;
        // The first subscription is not a recovery.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(resyncs.load(Ordering::SeqCst), 0);

        memory.disconnect_subscribers();
        wait_subscribed().await;
        tokio::time::timeout(Duration::from_secs(2), async {
            while resyncs.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("resync after reconnect");
        assert_eq!(resyncs.load(Ordering::SeqCst), 1);

        bus.shutdown().await;
    }
}
