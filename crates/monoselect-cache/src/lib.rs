//! Monoselect-Cache: build cache metadata for pure components
//!
//! This crate provides the persistence layer behind pure-component cache
//! short-circuiting. It records which build produced a given
//! `(component, content_hash)` and answers batch lookups.
//!
//! ## Key Components
//!
//! - `CacheMetadataStore`: async trait every backend implements
//! - `HttpCacheStore`: remote JSON service
//! - `FsCacheStore`: shared-volume or local directory
//! - `fakes::MemoryCacheStore`: in-memory store for tests

mod error;
pub mod fakes;
mod fs;
mod http;
pub mod store;

pub use error::CacheError;
pub use fs::FsCacheStore;
pub use http::{HttpCacheConfig, HttpCacheStore};
pub use store::{CacheEntry, CacheKey, CacheMetadataStore, CacheResult};

use std::sync::Arc;

/// Pick a store from the environment.
///
/// `MONOSELECT_CACHE_URL` selects the HTTP store, otherwise
/// `MONOSELECT_CACHE_DIR` selects the filesystem store. Returns `Ok(None)`
/// when neither is set.
pub fn store_from_env() -> CacheResult<Option<Arc<dyn CacheMetadataStore>>> {
    if let Some(config) = HttpCacheConfig::from_env() {
        tracing::debug!(url = %config.base_url, "using HTTP cache store");
        return Ok(Some(Arc::new(HttpCacheStore::new(config)?)));
    }

    match std::env::var("MONOSELECT_CACHE_DIR") {
        Ok(dir) if !dir.is_empty() => {
            tracing::debug!(dir = %dir, "using filesystem cache store");
            Ok(Some(Arc::new(FsCacheStore::new(dir)?)))
        }
        _ => Ok(None),
    }
}
