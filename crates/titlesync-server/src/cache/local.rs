//! Process-local title cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use titlesync_core::{HolderId, InvalidationMessage, TitleCollection};

/// Per-process cache of collections and selections, keyed by holder.
///
/// Every eviction bumps a process-wide epoch before removing the entry.
/// Loaders capture the epoch before going to the shared cache or store and
/// pass it back on insert; the insert re-checks it while holding the map
/// entry, so a load racing an invalidation can never resurrect the old value.
/// Nothing is kept for holders without a cached entry.
#[derive(Debug, Default)]
pub struct LocalTitleCache {
    titles: DashMap<HolderId, Arc<TitleCollection>>,
    selected: DashMap<HolderId, Option<String>>,
    epoch: AtomicU64,
}

/// Entry counts for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalCacheStats {
    pub collections: usize,
    pub selections: usize,
}

impl LocalTitleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn titles(&self, holder: HolderId) -> Option<Arc<TitleCollection>> {
        self.titles.get(&holder).map(|entry| Arc::clone(&entry))
    }

    /// `Some(None)` means "known to have no selection".
    pub fn selected(&self, holder: HolderId) -> Option<Option<String>> {
        self.selected.get(&holder).map(|entry| entry.clone())
    }

    /// Current epoch, to be captured before a load starts.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Insert a loaded collection unless anything was evicted since `epoch`.
    pub fn insert_titles(
        &self,
        holder: HolderId,
        epoch: u64,
        titles: Arc<TitleCollection>,
    ) -> bool {
        insert_if_current(&self.titles, &self.epoch, holder, epoch, titles)
    }

    pub fn insert_selected(&self, holder: HolderId, epoch: u64, selected: Option<String>) -> bool {
        insert_if_current(&self.selected, &self.epoch, holder, epoch, selected)
    }

    pub fn evict_titles(&self, holder: HolderId) {
        self.bump();
        self.titles.remove(&holder);
    }

    pub fn evict_selected(&self, holder: HolderId) {
        self.bump();
        self.selected.remove(&holder);
    }

    /// Apply a received invalidation: the collection always goes, the
    /// selection only for selection changes.
    pub fn apply(&self, message: &InvalidationMessage) {
        self.evict_titles(message.holder);
        if message.affects_selection() {
            self.evict_selected(message.holder);
        }
    }

    /// Drop everything held for a holder, e.g. when their session ends.
    pub fn forget(&self, holder: HolderId) {
        self.bump();
        self.titles.remove(&holder);
        self.selected.remove(&holder);
    }

    /// Drop every entry. Used after the invalidation feed was interrupted.
    pub fn clear(&self) {
        self.bump();
        self.titles.clear();
        self.selected.clear();
    }

    pub fn stats(&self) -> LocalCacheStats {
        LocalCacheStats {
            collections: self.titles.len(),
            selections: self.selected.len(),
        }
    }

    fn bump(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }
}

// The epoch is compared while the entry's shard lock is held. An eviction
// bumps first and removes second, so its removal either sees this insert or
// this insert sees the bumped epoch.
fn insert_if_current<V>(
    map: &DashMap<HolderId, V>,
    epoch: &AtomicU64,
    holder: HolderId,
    expected: u64,
    value: V,
) -> bool {
    let entry = map.entry(holder);
    if epoch.load(Ordering::Acquire) != expected {
        return false;
    }
    match entry {
        Entry::Occupied(mut occupied) => {
            occupied.insert(value);
        }
        Entry::Vacant(vacant) => {
            vacant.insert(value);
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use titlesync_core::TitleRecord;

    fn collection(holder: HolderId, titles: &[&str]) -> Arc<TitleCollection> {
        Arc::new(
            titles
                .iter()
                .map(|t| TitleRecord::new(holder, *t, 1))
                .collect(),
        )
    }

    #[test]
    fn insert_and_read_back() {
        let cache = LocalTitleCache::new();
        let holder = HolderId::random();
        let epoch = cache.epoch();
        assert!(cache.insert_titles(holder, epoch, collection(holder, &["Hero"])));
        assert!(cache.insert_selected(holder, epoch, None));

        assert!(cache.titles(holder).unwrap().contains("Hero"));
        assert_eq!(cache.selected(holder), Some(None));
    }

    #[test]
    fn stale_load_is_not_cached() {
        let cache = LocalTitleCache::new();
        let holder = HolderId::random();
        let epoch = cache.epoch();

        cache.evict_titles(holder);
        assert!(!cache.insert_titles(holder, epoch, collection(holder, &["Old"])));
        assert!(cache.titles(holder).is_none());
    }

    #[test]
    fn add_message_keeps_selection() {
        let cache = LocalTitleCache::new();
        let holder = HolderId::random();
        let epoch = cache.epoch();
        cache.insert_titles(holder, epoch, collection(holder, &["Hero"]));
        cache.insert_selected(holder, epoch, Some("Hero".into()));

        cache.apply(&InvalidationMessage::title_added(holder, "Champion"));
        assert!(cache.titles(holder).is_none());
        assert_eq!(cache.selected(holder), Some(Some("Hero".into())));

        cache.apply(&InvalidationMessage::title_selected(holder, None));
        assert!(cache.selected(holder).is_none());
    }

    #[test]
    fn eviction_is_per_holder() {
        let cache = LocalTitleCache::new();
        let (a, b) = (HolderId::random(), HolderId::random());
        cache.insert_titles(a, cache.epoch(), collection(a, &["A"]));
        cache.insert_titles(b, cache.epoch(), collection(b, &["B"]));

        cache.forget(a);
        assert!(cache.titles(a).is_none());
        assert!(cache.titles(b).is_some());

        cache.clear();
        assert_eq!(
            cache.stats(),
            LocalCacheStats {
                collections: 0,
                selections: 0
            }
        );
    }

    #[test]
    fn invalidations_for_unseen_holders_keep_nothing() {
        let cache = LocalTitleCache::new();
        for _ in 0..10_000 {
            let holder = HolderId::random();
            cache.apply(&InvalidationMessage::title_added(holder, "Hero"));
            cache.apply(&InvalidationMessage::title_selected(holder, None));
            cache.forget(holder);
        }

        assert_eq!(
            cache.stats(),
            LocalCacheStats {
                collections: 0,
                selections: 0
            }
        );
        assert_eq!(cache.epoch(), 40_000);
    }

    #[test]
    fn eviction_of_another_holder_rejects_inflight_load() {
        let cache = LocalTitleCache::new();
        let (a, b) = (HolderId::random(), HolderId::random());
        let epoch = cache.epoch();

        cache.evict_titles(b);
        assert!(!cache.insert_titles(a, epoch, collection(a, &["Hero"])));
        assert!(cache.insert_titles(a, cache.epoch(), collection(a, &["Hero"])));
    }
}
