//! Contract tests for CacheMetadataStore.
//!
//! Every backend must behave identically for hits, misses and overwrites.
//! The memory and filesystem stores are checked here; the HTTP store shares
//! the same trait and is covered by its unit tests.

use std::sync::Arc;

use monoselect_cache::fakes::{MemoryCacheStore, UnavailableCacheStore};
use monoselect_cache::{CacheEntry, CacheError, CacheKey, CacheMetadataStore, FsCacheStore};

fn backends() -> (tempfile::TempDir, Vec<(&'static str, Arc<dyn CacheMetadataStore>)>) {
    let dir = tempfile::tempdir().unwrap();
    let fs_store = FsCacheStore::new(dir.path()).unwrap();
    let backends: Vec<(&'static str, Arc<dyn CacheMetadataStore>)> = vec![
        ("memory", Arc::new(MemoryCacheStore::new())),
        ("fs", Arc::new(fs_store)),
    ];
    (dir, backends)
}

#[tokio::test]
async fn get_all_returns_only_hits() {
    let (_dir, backends) = backends();
    for (name, store) in backends {
        let hit = CacheKey::for_component("deploys", "web", "aaaa");
        let miss = CacheKey::for_component("deploys", "api", "bbbb");
        store.put(CacheEntry::new(hit.clone(), "42")).await.unwrap();

        let got = store.get_all(&[hit.clone(), miss]).await.unwrap();
        assert_eq!(got.len(), 1, "{name}: one hit expected");
        assert_eq!(got[0].key(), hit, "{name}");
        assert_eq!(got[0].build_id, "42", "{name}");
    }
}

#[tokio::test]
async fn same_component_different_hash_is_a_miss() {
    let (_dir, backends) = backends();
    for (name, store) in backends {
        store
            .put(CacheEntry::new(
                CacheKey::for_component("deploys", "web", "aaaa"),
                "42",
            ))
            .await
            .unwrap();

        let got = store
            .get_all(&[CacheKey::for_component("deploys", "web", "cccc")])
            .await
            .unwrap();
        assert!(got.is_empty(), "{name}: stale hash must miss");
    }
}

#[tokio::test]
async fn pipelines_do_not_collide() {
    let (_dir, backends) = backends();
    for (name, store) in backends {
        store
            .put(CacheEntry::new(
                CacheKey::for_component("deploys", "web", "aaaa"),
                "1",
            ))
            .await
            .unwrap();

        let got = store
            .get_all(&[CacheKey::for_component("other-pipeline", "web", "aaaa")])
            .await
            .unwrap();
        assert!(got.is_empty(), "{name}: other pipeline must miss");
    }
}

#[tokio::test]
async fn empty_batch_is_empty() {
    let (_dir, backends) = backends();
    for (name, store) in backends {
        assert!(store.get_all(&[]).await.unwrap().is_empty(), "{name}");
    }
}

#[tokio::test]
async fn unavailable_store_errors() {
    let store = UnavailableCacheStore;
    let err = store
        .get_all(&[CacheKey::new("p/c", "aa")])
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::Unavailable(_)));
}

#[tokio::test]
async fn memory_store_counts_batches() {
    let store = MemoryCacheStore::new().with_entry(CacheKey::new("p/c", "aa"), "7");
    assert_eq!(store.len(), 1);
    store.get_all(&[CacheKey::new("p/c", "aa")]).await.unwrap();
    store.get_all(&[CacheKey::new("p/c", "bb")]).await.unwrap();
    assert_eq!(store.lookup_count(), 2);
}
