//! Multi-process coherence tests.
//!
//! Two `TitleService` instances share one store and one in-process shared
//! cache, standing in for two processes sharing PostgreSQL and Redis.

use std::sync::Arc;
use std::time::Duration;

use titlesync_core::{HolderId, MAX_TITLES, now_millis};
use titlesync_db_memory::InMemoryTitleStore;
use titlesync_server::cache::MemorySharedCache;
use titlesync_server::{
    RedeemOutcome, ServiceSettings, SharedCache, TitleError, TitleService, format_selected_title,
};
use titlesync_storage::{DynTitleStore, TitleStore};

struct Cluster {
    store: Arc<InMemoryTitleStore>,
    shared: MemorySharedCache,
    a: TitleService,
    b: TitleService,
}

fn cluster() -> Cluster {
    let store = Arc::new(InMemoryTitleStore::new());
    let shared = MemorySharedCache::new("title:");
    let service = || {
        TitleService::new(
            Arc::clone(&store) as DynTitleStore,
            SharedCache::Memory(shared.clone()),
            ServiceSettings::default(),
        )
    };
    let (a, b) = (service(), service());
    Cluster {
        store,
        shared,
        a,
        b,
    }
}

fn standalone(cache: SharedCache) -> (TitleService, Arc<InMemoryTitleStore>) {
    let store = Arc::new(InMemoryTitleStore::new());
    let service = TitleService::new(
        Arc::clone(&store) as DynTitleStore,
        cache,
        ServiceSettings::default(),
    );
    (service, store)
}

/// Wait until both services' listeners hold a subscription.
async fn wait_for_listeners(shared: &MemorySharedCache, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while shared.subscriber_count() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("listeners subscribed");
}

/// Poll until `check` holds, failing after a few seconds.
async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition reached");
}

#[tokio::test]
async fn grant_is_visible_immediately_with_fresh_timestamp() {
    let (service, _) = standalone(SharedCache::memory("title:"));
    let holder = HolderId::random();

    let before = now_millis();
    assert!(service.add_title(holder, "Hero").await.unwrap());

    let titles = service.load_titles(holder).await.unwrap();
    let record = titles.get("Hero").expect("granted title present");
    assert!(record.acquired_at >= before);
    assert_eq!(record.holder, holder);
}

#[tokio::test]
async fn regrant_refreshes_without_growing() {
    let (service, _) = standalone(SharedCache::memory("title:"));
    let holder = HolderId::random();

    service.add_title(holder, "Hero").await.unwrap();
    let first = service.load_titles(holder).await.unwrap().get("Hero").unwrap().acquired_at;
    tokio::time::sleep(Duration::from_millis(5)).await;
    service.add_title(holder, "Hero").await.unwrap();

    let titles = service.load_titles(holder).await.unwrap();
    assert_eq!(titles.len(), 1);
    assert!(titles.get("Hero").unwrap().acquired_at > first);
}

#[tokio::test]
async fn revoke_removes_title_and_selection() {
    let (service, _) = standalone(SharedCache::memory("title:"));
    let holder = HolderId::random();

    service.add_title(holder, "Hero").await.unwrap();
    service.add_title(holder, "Sage").await.unwrap();
    service.equip_title(holder, "Hero").await.unwrap();
    assert_eq!(service.get_selected_title(holder).await.unwrap().as_deref(), Some("Hero"));

    assert!(service.delete_title(holder, "Hero").await.unwrap());
    let titles = service.load_titles(holder).await.unwrap();
    assert!(!titles.contains("Hero"));
    assert!(titles.contains("Sage"));
    assert_eq!(service.get_selected_title(holder).await.unwrap(), None);
}

#[tokio::test]
async fn revoking_unselected_title_keeps_selection() {
    let (service, _) = standalone(SharedCache::memory("title:"));
    let holder = HolderId::random();

    service.add_title(holder, "Hero").await.unwrap();
    service.add_title(holder, "Sage").await.unwrap();
    service.equip_title(holder, "Sage").await.unwrap();

    service.delete_title(holder, "Hero").await.unwrap();
    assert_eq!(service.get_selected_title(holder).await.unwrap().as_deref(), Some("Sage"));
}

#[tokio::test]
async fn write_on_one_process_reaches_the_other() {
    let cluster = cluster();
    wait_for_listeners(&cluster.shared, 2).await;
    let holder = HolderId::random();

    // B caches the empty collection locally.
    assert!(cluster.b.load_titles(holder).await.unwrap().is_empty());
    assert!(cluster.b.local_cache().titles(holder).is_some());

    cluster.a.add_title(holder, "Hero").await.unwrap();

    let b = cluster.b.clone();
    eventually(|| {
        let b = b.clone();
        async move { b.has_title(holder, "Hero").await.unwrap() }
    })
    .await;
    // B's reload went past the dropped shared key to the store.
    assert!(cluster.store.load_count() >= 2);
}

#[tokio::test]
async fn selection_change_reaches_the_other_process() {
    let cluster = cluster();
    wait_for_listeners(&cluster.shared, 2).await;
    let holder = HolderId::random();

    cluster.a.add_title(holder, "Hero").await.unwrap();
    cluster.b.on_session_start(holder).await;
    assert_eq!(cluster.b.get_selected_title(holder).await.unwrap(), None);

    cluster.a.equip_title(holder, "Hero").await.unwrap();

    let b = cluster.b.clone();
    eventually(|| {
        let b = b.clone();
        async move { b.get_selected_title(holder).await.unwrap().as_deref() == Some("Hero") }
    })
    .await;
}

#[tokio::test]
async fn writer_receives_its_own_invalidation() {
    let cluster = cluster();
    wait_for_listeners(&cluster.shared, 2).await;
    let holder = HolderId::random();

    cluster.a.load_titles(holder).await.unwrap();
    assert!(cluster.a.local_cache().titles(holder).is_some());

    // Every subscriber sees a message on the channel, the publisher included.
    cluster
        .a
        .shared_cache()
        .publish(&format!("title-add:{holder}:Sage"))
        .await;

    let a = cluster.a.clone();
    eventually(|| {
        let a = a.clone();
        async move { a.local_cache().titles(holder).is_none() }
    })
    .await;
}

#[tokio::test]
async fn session_end_forgets_holder() {
    let (service, store) = standalone(SharedCache::Disabled);
    let holder = HolderId::random();

    service.add_title(holder, "Hero").await.unwrap();
    service.on_session_start(holder).await;
    assert!(service.local_cache().titles(holder).is_some());
    let loads = store.load_count();

    service.on_session_end(holder);
    assert!(service.local_cache().titles(holder).is_none());
    assert!(service.local_cache().selected(holder).is_none());
    // Data is still in the store.
    assert!(service.has_title(holder, "Hero").await.unwrap());
    assert_eq!(store.load_count(), loads + 1);
}

#[tokio::test]
async fn disabled_shared_cache_stays_correct() {
    let (service, store) = standalone(SharedCache::Disabled);
    let holder = HolderId::random();

    service.add_title(holder, "Champion").await.unwrap();
    service.equip_title(holder, "Champion").await.unwrap();
    assert_eq!(
        service.get_selected_title(holder).await.unwrap().as_deref(),
        Some("Champion")
    );
    service.delete_title(holder, "Champion").await.unwrap();

    assert!(service.load_titles(holder).await.unwrap().is_empty());
    assert_eq!(service.get_selected_title(holder).await.unwrap(), None);
    assert!(store.load_count() >= 2);
}

#[tokio::test]
async fn unreachable_shared_cache_falls_through_to_store() {
    let shared = MemorySharedCache::new("title:");
    let (service, _) = standalone(SharedCache::Memory(shared.clone()));
    let holder = HolderId::random();

    shared.set_reachable(false);
    service.add_title(holder, "Hero").await.unwrap();
    assert!(service.has_title(holder, "Hero").await.unwrap());
    assert!(shared.is_empty());
}

#[tokio::test]
async fn store_failure_surfaces_as_error() {
    let (service, store) = standalone(SharedCache::memory("title:"));
    let holder = HolderId::random();
    store.set_unavailable(true);

    let err = service.add_title(holder, "Hero").await.unwrap_err();
    assert!(matches!(err, TitleError::Storage(_)));
    assert!(service.set_selected_title(holder, Some("Hero")).await.is_err());

    store.set_unavailable(false);
    assert!(service.load_titles(holder).await.unwrap().is_empty());
}

#[tokio::test]
async fn capacity_is_enforced_for_new_titles() {
    let (service, _) = standalone(SharedCache::memory("title:"));
    let holder = HolderId::random();

    for i in 0..MAX_TITLES {
        service.add_title(holder, &format!("T{i}")).await.unwrap();
    }
    assert!(service.is_full(holder).await.unwrap());
    assert_eq!(service.get_title_count(holder).await.unwrap(), MAX_TITLES);

    let err = service.add_title(holder, "Overflow").await.unwrap_err();
    assert!(matches!(err, TitleError::CollectionFull { .. }));
    // Re-granting an owned title is still allowed.
    assert!(service.add_title(holder, "T0").await.unwrap());

    assert_eq!(
        service.redeem_title(holder, "Overflow").await.unwrap(),
        RedeemOutcome::CollectionFull
    );
    assert_eq!(
        service.redeem_title(holder, "T1").await.unwrap(),
        RedeemOutcome::AlreadyOwned
    );

    service.delete_title(holder, "T1").await.unwrap();
    assert!(!service.is_full(holder).await.unwrap());
    assert_eq!(
        service.redeem_title(holder, "Overflow").await.unwrap(),
        RedeemOutcome::Granted
    );
}

#[tokio::test]
async fn champion_lifecycle() {
    let cluster = cluster();
    wait_for_listeners(&cluster.shared, 2).await;
    let holder = HolderId::random();

    cluster.a.add_title(holder, "&6Champion").await.unwrap();
    cluster.a.equip_title(holder, "&6Champion").await.unwrap();
    assert_eq!(cluster.a.display_title(holder).await, "[§6Champion§r]");

    cluster.a.delete_title(holder, "&6Champion").await.unwrap();
    assert!(cluster.a.load_titles(holder).await.unwrap().is_empty());
    assert_eq!(cluster.a.get_selected_title(holder).await.unwrap(), None);
    assert_eq!(cluster.a.display_title(holder).await, "");

    let b = cluster.b.clone();
    eventually(|| {
        let b = b.clone();
        async move {
            b.load_titles(holder).await.unwrap().is_empty()
                && b.get_selected_title(holder).await.unwrap().is_none()
        }
    })
    .await;
}

#[tokio::test]
async fn purge_clears_shared_and_local() {
    let cluster = cluster();
    let holder = HolderId::random();

    cluster.a.add_title(holder, "Hero").await.unwrap();
    cluster.a.on_session_start(holder).await;
    assert!(!cluster.shared.is_empty());

    let removed = cluster.a.purge_shared_cache().await;
    assert!(removed >= 2);
    assert!(cluster.shared.is_empty());
    assert!(cluster.a.local_cache().titles(holder).is_none());
}

#[tokio::test]
async fn listener_recovers_after_subscription_loss() {
    let cluster = cluster();
    wait_for_listeners(&cluster.shared, 2).await;

    cluster.shared.disconnect_subscribers();
    assert_eq!(cluster.shared.subscriber_count(), 0);

    // Listeners reconnect after their first backoff step.
    wait_for_listeners(&cluster.shared, 2).await;

    let holder = HolderId::random();
    cluster.b.load_titles(holder).await.unwrap();
    cluster.a.add_title(holder, "Hero").await.unwrap();

    let b = cluster.b.clone();
    eventually(|| {
        let b = b.clone();
        async move { b.has_title(holder, "Hero").await.unwrap() }
    })
    .await;
}

#[tokio::test]
async fn writes_missed_during_outage_are_not_served_from_local_cache() {
    let cluster = cluster();
    wait_for_listeners(&cluster.shared, 2).await;

    let holder = HolderId::random();
    assert!(!cluster.b.has_title(holder, "Hero").await.unwrap());
    assert!(cluster.b.local_cache().titles(holder).is_some());

    // The grant's invalidation is published while nobody is subscribed.
    cluster.shared.disconnect_subscribers();
    cluster.a.add_title(holder, "Hero").await.unwrap();
    assert!(cluster.store.load_titles(holder).await.unwrap().contains("Hero"));

    wait_for_listeners(&cluster.shared, 2).await;
    let b = cluster.b.clone();
    eventually(|| {
        let b = b.clone();
        async move { b.has_title(holder, "Hero").await.unwrap() }
    })
    .await;
}

#[test]
fn formatting_examples() {
    assert_eq!(format_selected_title(None), "");
    assert_eq!(format_selected_title(Some("")), "");
    let hero = format_selected_title(Some("&cHero"));
    assert!(hero.starts_with('[') && hero.ends_with("§r]"));
    assert!(hero.contains("§c"));
}
