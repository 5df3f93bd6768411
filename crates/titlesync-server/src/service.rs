//! Title service: the public entry point combining the local cache with the
//! coherence layer.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use titlesync_core::{HolderId, MAX_TITLES, TitleCollection, format_selected_title, now_millis};
use titlesync_storage::DynTitleStore;
use tokio_util::task::TaskTracker;

use crate::cache::{InvalidationBus, LocalTitleCache, SharedCache};
use crate::coherence::CoherenceService;
use crate::config::CacheConfig;
use crate::error::{Result, TitleError};

/// Tunables for [`TitleService`].
#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    /// Shared cache entry lifetime.
    pub ttl: Duration,
    /// Default bound for latency-sensitive lookups.
    pub lookup_timeout: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        (&CacheConfig::default()).into()
    }
}

impl From<&CacheConfig> for ServiceSettings {
    fn from(config: &CacheConfig) -> Self {
        Self {
            ttl: config.ttl(),
            lookup_timeout: config.lookup_timeout(),
        }
    }
}

/// Result of redeeming a title (e.g. from a consumable item).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemOutcome {
    Granted,
    AlreadyOwned,
    CollectionFull,
}

/// Result of toggling a title on or off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Equipped,
    Unequipped,
    NotOwned,
}

/// Title operations for holders, served from a three-tier cache.
///
/// Cheap to clone; clones share the local cache and the invalidation
/// subscription. Mutations run on tracked tasks, so a mutation that has
/// started always finishes its store write, cache invalidation and broadcast
/// even if the caller stops waiting for it.
#[derive(Clone)]
pub struct TitleService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    coherence: CoherenceService,
    local: Arc<LocalTitleCache>,
    mutations: TaskTracker,
    // Held shared while a mutation is admitted and exclusively while closing.
    admission: RwLock<()>,
    lookup_timeout: Duration,
}

impl TitleService {
    /// Build the service and register its local cache on the invalidation channel.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(store: DynTitleStore, cache: SharedCache, settings: ServiceSettings) -> Self {
        let bus = InvalidationBus::new(cache.clone());
        let local = Arc::new(LocalTitleCache::new());

        let evictor = Arc::clone(&local);
        bus.subscribe(move |message| evictor.apply(message));
        let resync = Arc::clone(&local);
        bus.on_resync(move || resync.clear());

        tracing::info!(
            shared_cache = cache.mode(),
            ttl_secs = settings.ttl.as_secs(),
            "title service ready"
        );

        Self {
            inner: Arc::new(ServiceInner {
                coherence: CoherenceService::new(store, cache, bus, settings.ttl),
                local,
                mutations: TaskTracker::new(),
                admission: RwLock::new(()),
                lookup_timeout: settings.lookup_timeout,
            }),
        }
    }

    pub fn local_cache(&self) -> &LocalTitleCache {
        &self.inner.local
    }

    pub fn bus(&self) -> &InvalidationBus {
        self.inner.coherence.bus()
    }

    pub fn shared_cache(&self) -> &SharedCache {
        self.inner.coherence.shared_cache()
    }

    pub fn lookup_timeout(&self) -> Duration {
        self.inner.lookup_timeout
    }

    // --- Reads ---

    pub async fn load_titles(&self, holder: HolderId) -> Result<Arc<TitleCollection>> {
        logged(holder, "load_titles", self.inner.load_titles(holder).await)
    }

    pub async fn has_title(&self, holder: HolderId, title: &str) -> Result<bool> {
        Ok(self.load_titles(holder).await?.contains(title))
    }

    pub async fn get_title_count(&self, holder: HolderId) -> Result<usize> {
        Ok(self.load_titles(holder).await?.len())
    }

    pub async fn is_full(&self, holder: HolderId) -> Result<bool> {
        Ok(self.get_title_count(holder).await? >= MAX_TITLES)
    }

    /// The holder's selected title, `None` when unset or no longer owned.
    pub async fn get_selected_title(&self, holder: HolderId) -> Result<Option<String>> {
        logged(
            holder,
            "get_selected_title",
            self.inner.get_selected_title(holder).await,
        )
    }

    /// Local-cache-only view of the selection; never touches the network.
    pub fn get_selected_title_cached(&self, holder: HolderId) -> Option<String> {
        let local = &self.inner.local;
        let selected = local.selected(holder).flatten()?;
        match local.titles(holder) {
            Some(titles) if !titles.contains(&selected) => None,
            _ => Some(selected),
        }
    }

    /// Cached selection, unformatted, empty when unknown.
    pub fn selected_title_raw(&self, holder: HolderId) -> String {
        self.get_selected_title_cached(holder).unwrap_or_default()
    }

    /// Selection lookup bounded by `timeout`; `None` on timeout or failure.
    pub async fn get_selected_title_within(
        &self,
        holder: HolderId,
        timeout: Duration,
    ) -> Option<String> {
        match tokio::time::timeout(timeout, self.get_selected_title(holder)).await {
            Ok(result) => result.ok().flatten(),
            Err(_) => {
                tracing::debug!(%holder, timeout_ms = timeout.as_millis() as u64, "selection lookup timed out");
                None
            }
        }
    }

    /// Title count bounded by `timeout`; `0` on timeout or failure.
    pub async fn get_title_count_within(&self, holder: HolderId, timeout: Duration) -> usize {
        match tokio::time::timeout(timeout, self.get_title_count(holder)).await {
            Ok(result) => result.unwrap_or(0),
            Err(_) => {
                tracing::debug!(%holder, timeout_ms = timeout.as_millis() as u64, "title count lookup timed out");
                0
            }
        }
    }

    /// Formatted selection for display, bounded by the configured lookup timeout.
    pub async fn display_title(&self, holder: HolderId) -> String {
        let selected = self
            .get_selected_title_within(holder, self.inner.lookup_timeout)
            .await;
        format_selected_title(selected.as_deref())
    }

    /// See [`titlesync_core::format_selected_title`].
    pub fn format_selected_title(title: Option<&str>) -> String {
        format_selected_title(title)
    }

    // --- Mutations ---

    /// Grant a title, or refresh its acquisition time if already owned.
    ///
    /// Fails with [`TitleError::CollectionFull`] when granting a new title to
    /// a holder at capacity.
    pub async fn add_title(&self, holder: HolderId, title: &str) -> Result<bool> {
        let inner = Arc::clone(&self.inner);
        let title = title.to_owned();
        self.run_mutation(holder, "add_title", async move {
            inner.add_title(holder, &title).await
        })
        .await
    }

    /// Revoke a title. Returns whether the holder owned it.
    pub async fn delete_title(&self, holder: HolderId, title: &str) -> Result<bool> {
        let inner = Arc::clone(&self.inner);
        let title = title.to_owned();
        self.run_mutation(holder, "delete_title", async move {
            inner.delete_title(holder, &title).await
        })
        .await
    }

    pub async fn set_selected_title(&self, holder: HolderId, title: Option<&str>) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        let title = title.map(str::to_owned);
        self.run_mutation(holder, "set_selected_title", async move {
            inner.set_selected_title(holder, title.as_deref()).await
        })
        .await
    }

    pub async fn equip_title(&self, holder: HolderId, title: &str) -> Result<()> {
        self.set_selected_title(holder, Some(title)).await
    }

    pub async fn unequip_title(&self, holder: HolderId) -> Result<()> {
        self.set_selected_title(holder, None).await
    }

    /// Grant a title unless already owned or the collection is full.
    pub async fn redeem_title(&self, holder: HolderId, title: &str) -> Result<RedeemOutcome> {
        if self.has_title(holder, title).await? {
            return Ok(RedeemOutcome::AlreadyOwned);
        }
        match self.add_title(holder, title).await {
            Ok(_) => Ok(RedeemOutcome::Granted),
            Err(TitleError::CollectionFull { .. }) => Ok(RedeemOutcome::CollectionFull),
            Err(e) => Err(e),
        }
    }

    /// Equip an owned title, or unequip it if it is already selected.
    pub async fn toggle_title(&self, holder: HolderId, title: &str) -> Result<ToggleOutcome> {
        if !self.has_title(holder, title).await? {
            return Ok(ToggleOutcome::NotOwned);
        }
        if self.get_selected_title(holder).await?.as_deref() == Some(title) {
            self.unequip_title(holder).await?;
            Ok(ToggleOutcome::Unequipped)
        } else {
            self.equip_title(holder, title).await?;
            Ok(ToggleOutcome::Equipped)
        }
    }

    // --- Lifecycle ---

    /// Warm the local cache for a holder who just came online.
    pub async fn on_session_start(&self, holder: HolderId) {
        let (titles, selected) = tokio::join!(
            self.load_titles(holder),
            self.get_selected_title(holder)
        );
        if titles.is_err() || selected.is_err() {
            tracing::warn!(%holder, "session warm-up incomplete, entries will load on demand");
        }
    }

    /// Forget a holder who went offline.
    pub fn on_session_end(&self, holder: HolderId) {
        self.inner.local.forget(holder);
    }

    /// Drop every shared cache entry and this process's local cache.
    pub async fn purge_shared_cache(&self) -> usize {
        let removed = self.inner.coherence.purge().await;
        self.inner.local.clear();
        removed
    }

    /// Stop accepting mutations, wait for in-flight ones, stop the
    /// invalidation listener and clear the local cache.
    pub async fn shutdown(&self) {
        {
            let _closing = self.inner.admission.write();
            self.inner.mutations.close();
        }
        self.inner.mutations.wait().await;
        self.bus().shutdown().await;
        self.inner.local.clear();
        tracing::info!("title service stopped");
    }

    async fn run_mutation<T, F>(
        &self,
        holder: HolderId,
        operation: &'static str,
        task: F,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let handle = {
            let _admitted = self.inner.admission.read();
            if self.inner.mutations.is_closed() {
                return Err(TitleError::ShuttingDown);
            }
            self.inner.mutations.spawn(task)
        };
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(e.into()),
        };
        logged(holder, operation, result)
    }
}

impl ServiceInner {
    async fn load_titles(&self, holder: HolderId) -> Result<Arc<TitleCollection>> {
        if let Some(titles) = self.local.titles(holder) {
            return Ok(titles);
        }
        let epoch = self.local.epoch();
        let titles = Arc::new(self.coherence.load_titles(holder).await?);
        self.local.insert_titles(holder, epoch, Arc::clone(&titles));
        Ok(titles)
    }

    async fn get_selected_title(&self, holder: HolderId) -> Result<Option<String>> {
        let selected = match self.local.selected(holder) {
            Some(selected) => selected,
            None => {
                let epoch = self.local.epoch();
                let selected = self.coherence.get_selected(holder).await?;
                self.local.insert_selected(holder, epoch, selected.clone());
                selected
            }
        };

        let Some(title) = selected else {
            return Ok(None);
        };
        // A selection outside the collection is dangling; render it as none.
        let titles = self.load_titles(holder).await?;
        Ok(titles.contains(&title).then_some(title))
    }

    async fn add_title(&self, holder: HolderId, title: &str) -> Result<bool> {
        let titles = self.load_titles(holder).await?;
        if !titles.contains(title) && titles.is_full() {
            return Err(TitleError::CollectionFull {
                holder,
                max: MAX_TITLES,
            });
        }

        let written = self
            .coherence
            .add_title(holder, title, now_millis())
            .await?;
        self.local.evict_titles(holder);
        Ok(written)
    }

    async fn delete_title(&self, holder: HolderId, title: &str) -> Result<bool> {
        let removed = self.coherence.delete_title(holder, title).await?;
        if removed {
            self.local.evict_titles(holder);
            self.local.evict_selected(holder);
        }
        Ok(removed)
    }

    async fn set_selected_title(&self, holder: HolderId, title: Option<&str>) -> Result<()> {
        self.coherence.set_selected(holder, title).await?;
        self.local.evict_selected(holder);
        Ok(())
    }
}

fn logged<T>(holder: HolderId, operation: &'static str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        match e {
            TitleError::CollectionFull { .. } => {
                tracing::debug!(%holder, operation, error = %e, "title operation refused");
            }
            _ => tracing::error!(
                %holder,
                operation,
                category = e.category().map(tracing::field::display),
                error = %e,
                "title operation failed"
            ),
        }
    }
    result
}
