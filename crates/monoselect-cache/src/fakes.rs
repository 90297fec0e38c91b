//! In-memory fakes for cache stores (testing only)
//!
//! `MemoryCacheStore` satisfies the [`CacheMetadataStore`] contract without
//! any external dependencies; `UnavailableCacheStore` fails every call, for
//! exercising degradation paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::CacheError;
use crate::store::{CacheEntry, CacheKey, CacheMetadataStore, CacheResult};

// ---------------------------------------------------------------------------
// MemoryCacheStore
// ---------------------------------------------------------------------------

/// In-memory cache store backed by a `HashMap<CacheKey, CacheEntry>`.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    lookups: AtomicUsize,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with a hit for `key`.
    pub fn with_entry(self, key: CacheKey, build_id: &str) -> Self {
        self.entries
            .lock()
            .unwrap()
            .insert(key.clone(), CacheEntry::new(key, build_id));
        self
    }

    /// Number of `get_all` batches served so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheMetadataStore for MemoryCacheStore {
    async fn get_all(&self, keys: &[CacheKey]) -> CacheResult<Vec<CacheEntry>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let entries = self.entries.lock().unwrap();
        Ok(keys
            .iter()
            .filter_map(|key| entries.get(key).cloned())
            .collect())
    }

    async fn put(&self, entry: CacheEntry) -> CacheResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(entry.key(), entry);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// UnavailableCacheStore
// ---------------------------------------------------------------------------

/// A store that is always down.
#[derive(Debug, Default)]
pub struct UnavailableCacheStore;

#[async_trait]
impl CacheMetadataStore for UnavailableCacheStore {
    async fn get_all(&self, _keys: &[CacheKey]) -> CacheResult<Vec<CacheEntry>> {
        Err(CacheError::Unavailable("store offline".to_string()))
    }

    async fn put(&self, _entry: CacheEntry) -> CacheResult<()> {
        Err(CacheError::Unavailable("store offline".to_string()))
    }
}
