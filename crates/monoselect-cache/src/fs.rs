use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::store::{is_hex_hash, CacheEntry, CacheKey, CacheMetadataStore, CacheResult};

/// Filesystem-backed cache metadata store, one JSON document per key.
///
/// Layout: `<root>/entries/<hex(component)>/<content_hash>.json`
///
/// A corrupt or unreadable entry is a miss for that key only.
///
/// Suitable for a shared volume mounted on every agent, or for local runs.
#[derive(Debug, Clone)]
pub struct FsCacheStore {
    entries_dir: PathBuf,
}

impl FsCacheStore {
    /// Create a store rooted at `root`. Creates `root/entries/` if needed.
    pub fn new(root: impl AsRef<Path>) -> CacheResult<Self> {
        let entries_dir = root.as_ref().join("entries");
        fs::create_dir_all(&entries_dir)?;
        Ok(Self { entries_dir })
    }

    fn entry_path(&self, key: &CacheKey) -> CacheResult<PathBuf> {
        let invalid = |reason: &str| CacheError::InvalidKey {
            component: key.component.clone(),
            content_hash: key.content_hash.clone(),
            reason: reason.to_string(),
        };

        if !is_hex_hash(&key.content_hash) {
            return Err(invalid("content hash must be hex"));
        }
        if key.component.is_empty()
            || key
                .component
                .split('/')
                .any(|part| part.is_empty() || part == "." || part == "..")
        {
            return Err(invalid("component must be a non-empty relative name"));
        }

        let shard = hex::encode(key.component.as_bytes());
        Ok(self
            .entries_dir
            .join(shard)
            .join(format!("{}.json", key.content_hash)))
    }
}

#[async_trait]
impl CacheMetadataStore for FsCacheStore {
    async fn get_all(&self, keys: &[CacheKey]) -> CacheResult<Vec<CacheEntry>> {
        let mut found = Vec::new();
        for key in keys {
            let path = self.entry_path(key)?;
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(key = %key, "cache entry not on disk");
                    continue;
                }
                Err(e) => {
                    warn!(key = %key, path = %path.display(), error = %e, "unreadable cache entry");
                    continue;
                }
            };
            let entry: CacheEntry = match serde_json::from_slice(&bytes) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(key = %key, path = %path.display(), error = %e, "corrupt cache entry");
                    continue;
                }
            };
            if entry.key() == *key {
                found.push(entry);
            }
        }
        Ok(found)
    }

    async fn put(&self, entry: CacheEntry) -> CacheResult<()> {
        let path = self.entry_path(&entry.key())?;
        let data = serde_json::to_vec_pretty(&entry)?;

        tokio::task::spawn_blocking(move || -> CacheResult<()> {
            let Some(shard_dir) = path.parent() else {
                return Err(CacheError::Unavailable(format!(
                    "entry path {} has no parent",
                    path.display()
                )));
            };
            fs::create_dir_all(shard_dir)?;

            // Atomic write: temp file in the same directory, then rename.
            let mut tmp = NamedTempFile::new_in(shard_dir)?;
            tmp.write_all(&data)?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| CacheError::Unavailable(format!("cache write task failed: {e}")))?
    }
}
