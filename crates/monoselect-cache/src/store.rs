//! Cache metadata trait definitions
//!
//! A pure component's build output depends only on the contents of its
//! matching files, so a previous successful build of the same content can
//! stand in for a rebuild. The store maps `(component, content_hash)` to the
//! id of the build that produced it.
//!
//! All stores are async and backend-agnostic. An in-memory fake is provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Result type for cache store operations
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Lookup key for a cached build.
///
/// `component` is namespaced by pipeline (`<pipeline>/<name>`) so unrelated
/// pipelines can share one store without colliding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub component: String,
    pub content_hash: String,
}

impl CacheKey {
    pub fn new(component: impl Into<String>, content_hash: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            content_hash: content_hash.into(),
        }
    }

    /// Build the namespaced key for `name` within `pipeline`.
    pub fn for_component(pipeline: &str, name: &str, content_hash: impl Into<String>) -> Self {
        Self::new(format!("{pipeline}/{name}"), content_hash)
    }

    /// Short form of the hash (first 12 chars) for log lines.
    pub fn short_hash(&self) -> &str {
        match self.content_hash.char_indices().nth(12) {
            Some((end, _)) => &self.content_hash[..end],
            None => &self.content_hash,
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.component, self.short_hash())
    }
}

/// A recorded successful build for a given key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub component: String,
    pub content_hash: String,
    pub build_id: String,
    pub recorded_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: CacheKey, build_id: impl Into<String>) -> Self {
        Self {
            component: key.component,
            content_hash: key.content_hash,
            build_id: build_id.into(),
            recorded_at: Utc::now(),
        }
    }

    pub fn key(&self) -> CacheKey {
        CacheKey::new(self.component.clone(), self.content_hash.clone())
    }
}

/// Persistent mapping from [`CacheKey`] to the build that produced it.
///
/// Guarantees:
/// - `get_all(keys)` returns only hits; an absent key is a miss, not an error.
/// - Returned entries always match one of the requested keys exactly.
/// - `put(entry)` followed by `get_all([entry.key()])` returns that entry
///   (later puts for the same key replace earlier ones).
#[async_trait]
pub trait CacheMetadataStore: Send + Sync {
    /// Batch lookup. Order of the result is unspecified.
    async fn get_all(&self, keys: &[CacheKey]) -> CacheResult<Vec<CacheEntry>>;

    /// Record a successful build for a key.
    async fn put(&self, entry: CacheEntry) -> CacheResult<()>;
}

pub(crate) fn is_hex_hash(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_component_namespaces_by_pipeline() {
        let key = CacheKey::for_component("deploys", "web", "abc");
        assert_eq!(key.component, "deploys/web");
        assert_eq!(key.content_hash, "abc");
    }

    #[test]
    fn test_short_hash_truncates() {
        let key = CacheKey::new("p/c", "0123456789abcdef0123");
        assert_eq!(key.short_hash(), "0123456789ab");
        assert_eq!(CacheKey::new("p/c", "ab").short_hash(), "ab");
    }

    #[test]
    fn test_short_hash_of_non_ascii_does_not_split_chars() {
        let key = CacheKey::new("p/c", "ééééééééééééé");
        assert_eq!(key.short_hash(), "éééééééééééé");
        assert_eq!(key.to_string(), "p/c@éééééééééééé");
    }

    #[test]
    fn test_entry_key_roundtrip() {
        let key = CacheKey::new("p/c", "beef");
        let entry = CacheEntry::new(key.clone(), "42");
        assert_eq!(entry.key(), key);
        assert_eq!(entry.build_id, "42");
    }

    #[test]
    fn test_is_hex_hash() {
        assert!(is_hex_hash("deadBEEF01"));
        assert!(!is_hex_hash(""));
        assert!(!is_hex_hash("../etc"));
    }
}
