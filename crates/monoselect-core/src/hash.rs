//! Content hashing for pure components.
//!
//! The hash covers, for each matching file in sorted path order, the
//! relative path and the SHA-256 of its contents. Including paths means a
//! rename changes the hash even when the bytes do not. Per-file digests are
//! computed concurrently and only combined once sorted, so the result does
//! not depend on enumeration order or scheduling.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::component::Component;
use crate::error::{Result, SelectError};
use crate::files::match_files;
use crate::matcher::PatternSet;

/// Concurrent file reads per hash.
const HASH_CONCURRENCY: usize = 32;

/// SHA-256 content hash (lowercase hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(String);

impl ContentHash {
    /// Combine per-file digests. Input order does not matter.
    pub fn from_file_digests<I>(digests: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut digests: Vec<(String, String)> = digests.into_iter().collect();
        digests.sort();
        digests.dedup();

        let mut hasher = Sha256::new();
        for (path, digest) in &digests {
            hasher.update(path.as_bytes());
            hasher.update(b"\0");
            hasher.update(digest.as_bytes());
            hasher.update(b"\n");
        }
        ContentHash(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 chars).
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(12) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SHA-256 of one file's contents, hex encoded.
pub fn digest_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hash the given relative paths under `root`.
pub async fn hash_files(root: &Path, files: &BTreeSet<String>) -> Result<ContentHash> {
    let digests: Vec<(String, String)> = futures::stream::iter(files.iter().cloned())
        .map(|relative| {
            let path = root.join(&relative);
            async move {
                let data = tokio::fs::read(&path).await?;
                Ok::<_, SelectError>((relative, digest_bytes(&data)))
            }
        })
        .buffer_unordered(HASH_CONCURRENCY)
        .try_collect()
        .await?;

    Ok(ContentHash::from_file_digests(digests))
}

/// Enumerate and hash every file feeding `component`'s content hash.
pub async fn component_hash(root: &Path, component: &Component) -> Result<ContentHash> {
    let patterns = PatternSet::new(&component.match_patterns_for_hash())?;
    let walk_root: PathBuf = root.to_path_buf();
    let files = tokio::task::spawn_blocking(move || match_files(&walk_root, &patterns))
        .await
        .map_err(|e| SelectError::Io(std::io::Error::other(format!("file walk task failed: {e}"))))??;

    let hash = hash_files(root, &files).await?;
    debug!(component = %component.name, files = files.len(), hash = %hash.short(), "computed content hash");
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn set(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn short_truncates_on_char_boundaries() {
        let hash: ContentHash = serde_json::from_str("\"0123456789abcdef\"").unwrap();
        assert_eq!(hash.short(), "0123456789ab");

        let odd: ContentHash = serde_json::from_str("\"hashé-hashé-hashé\"").unwrap();
        assert_eq!(odd.short(), "hashé-hashé-");

        let tiny: ContentHash = serde_json::from_str("\"ab\"").unwrap();
        assert_eq!(tiny.short(), "ab");
    }

    #[test]
    fn combination_is_order_independent() {
        let a = ("a.txt".to_string(), digest_bytes(b"a"));
        let b = ("b/c.txt".to_string(), digest_bytes(b"c"));
        let forward = ContentHash::from_file_digests(vec![a.clone(), b.clone()]);
        let backward = ContentHash::from_file_digests(vec![b, a]);
        assert_eq!(forward, backward);
        assert_eq!(forward.as_str().len(), 64);
    }

    #[test]
    fn rename_changes_hash() {
        let before = ContentHash::from_file_digests(vec![("a.txt".to_string(), digest_bytes(b"x"))]);
        let after = ContentHash::from_file_digests(vec![("b.txt".to_string(), digest_bytes(b"x"))]);
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn concurrent_hash_matches_sequential_combination() {
        let dir = tempfile::tempdir().unwrap();
        let names: Vec<String> = (0..50).map(|i| format!("src/file{i}.txt")).collect();
        for (i, name) in names.iter().enumerate() {
            write(dir.path(), name, &format!("contents {i}"));
        }

        let files: BTreeSet<String> = names.iter().cloned().collect();
        let concurrent = hash_files(dir.path(), &files).await.unwrap();

        let sequential = ContentHash::from_file_digests(names.iter().rev().map(|n| {
            let data = fs::read(dir.path().join(n)).unwrap();
            (n.clone(), digest_bytes(&data))
        }));
        assert_eq!(concurrent, sequential);
    }

    #[tokio::test]
    async fn any_byte_change_changes_hash() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "web/a.ts", "one");
        write(dir.path(), "web/b.ts", "two");
        let files = set(&["web/a.ts", "web/b.ts"]);

        let before = hash_files(dir.path(), &files).await.unwrap();
        write(dir.path(), "web/b.ts", "twp");
        let after = hash_files(dir.path(), &files).await.unwrap();
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = hash_files(dir.path(), &set(&["nope.txt"])).await.unwrap_err();
        assert!(matches!(err, SelectError::Io(_)));
    }

    #[tokio::test]
    async fn component_hash_covers_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "web/a.ts", "one");
        write(dir.path(), ".buildkite/pipeline.web.yml", "monorepo: {}\n");
        let component = Component::new("web").with_patterns(["web/**"]).pure();

        let before = component_hash(dir.path(), &component).await.unwrap();
        write(
            dir.path(),
            ".buildkite/pipeline.web.yml",
            "monorepo:\n  pure: true\n",
        );
        let after = component_hash(dir.path(), &component).await.unwrap();
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn unrelated_files_do_not_affect_hash() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "web/a.ts", "one");
        write(dir.path(), ".buildkite/pipeline.web.yml", "monorepo: {}\n");
        let component = Component::new("web").with_patterns(["web/**"]);

        let before = component_hash(dir.path(), &component).await.unwrap();
        write(dir.path(), "api/main.rs", "fn main() {}");
        let after = component_hash(dir.path(), &component).await.unwrap();
        assert_eq!(before, after);
    }
}
