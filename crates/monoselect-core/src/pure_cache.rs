//! Pure-component cache short-circuiting.
//!
//! For every included component marked `pure`, the content hash of its files
//! is looked up in the cache store. A hit means an earlier build already
//! produced exactly this content: the component is excluded again and its base
//! build is rewired to the build that produced it, so artifact handover pulls
//! from there. Lookups never fail the evaluation; any error is a miss.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use monoselect_cache::{CacheEntry, CacheError, CacheKey, CacheMetadataStore};
use tokio::task::JoinSet;
use tracing::debug;

use crate::component::Component;
use crate::decision::{Decision, Inclusion};
use crate::error::Result;
use crate::hash::{component_hash, ContentHash};
use crate::obs;

/// Pure-cache phase for one pipeline.
pub struct PureCache {
    root: PathBuf,
    pipeline: String,
    store: Option<Arc<dyn CacheMetadataStore>>,
}

impl PureCache {
    pub fn new(root: impl AsRef<Path>, pipeline: &str, store: Option<Arc<dyn CacheMetadataStore>>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            pipeline: pipeline.to_string(),
            store,
        }
    }

    /// Apply cache hits and misses to `decisions` (index-aligned with
    /// `components`).
    pub async fn resolve(&self, components: &[Component], mut decisions: Vec<Decision>) -> Vec<Decision> {
        let candidates: Vec<usize> = components
            .iter()
            .zip(&decisions)
            .enumerate()
            .filter(|(_, (c, d))| c.pure && d.is_included())
            .map(|(i, _)| i)
            .collect();

        if candidates.is_empty() {
            return decisions;
        }

        let Some(store) = &self.store else {
            debug!(count = candidates.len(), "no cache store configured, every pure lookup misses");
            for &i in &candidates {
                mark_miss(&mut decisions[i], None);
            }
            return decisions;
        };

        let hashes = self.hash_all(components, &candidates).await;

        let mut keys: Vec<(usize, CacheKey)> = Vec::new();
        for &i in &candidates {
            match hashes.get(&i) {
                Some(Ok(hash)) => keys.push((i, self.key_for(&components[i].name, hash))),
                Some(Err(e)) => {
                    obs::emit_cache_degraded(&components[i].name, e);
                    mark_miss(&mut decisions[i], None);
                }
                None => mark_miss(&mut decisions[i], None),
            }
        }
        if keys.is_empty() {
            return decisions;
        }

        let lookup: Vec<CacheKey> = keys.iter().map(|(_, k)| k.clone()).collect();
        let found: HashMap<CacheKey, String> = match store.get_all(&lookup).await {
            Ok(entries) => entries.into_iter().map(|e| (e.key(), e.build_id)).collect(),
            Err(e) => {
                for (i, _) in &keys {
                    obs::emit_cache_degraded(&components[*i].name, &e);
                }
                HashMap::new()
            }
        };

        for (i, key) in keys {
            match found.get(&key) {
                Some(build_id) => {
                    obs::emit_cache_hit(&key.component, &key.content_hash, build_id);
                    let decision = &mut decisions[i];
                    decision.base_build_id = Some(build_id.clone());
                    decision.inclusion = Inclusion::Excluded;
                    decision.reason = format!("already built in {build_id} (pure cache hit)");
                }
                None => mark_miss(&mut decisions[i], Some(&key)),
            }
        }

        decisions
    }

    /// Hash each candidate on its own task.
    async fn hash_all(
        &self,
        components: &[Component],
        candidates: &[usize],
    ) -> HashMap<usize, Result<ContentHash>> {
        let mut join_set = JoinSet::new();
        for &i in candidates {
            let root = self.root.clone();
            let component = components[i].clone();
            join_set.spawn(async move { (i, component_hash(&root, &component).await) });
        }

        let mut hashes = HashMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((i, hash)) => {
                    hashes.insert(i, hash);
                }
                Err(e) => debug!(error = %e, "hash task failed"),
            }
        }
        hashes
    }

    pub fn key_for(&self, name: &str, hash: &ContentHash) -> CacheKey {
        CacheKey::for_component(&self.pipeline, name, hash.as_str())
    }

    /// Record that `build_id` built `component` at its current content.
    pub async fn record(&self, component: &Component, build_id: &str) -> Result<CacheEntry> {
        let store = self.store.as_ref().ok_or(CacheError::NotConfigured)?;

        let hash = component_hash(&self.root, component).await?;
        let entry = CacheEntry::new(self.key_for(&component.name, &hash), build_id);
        store.put(entry.clone()).await?;
        debug!(component = %entry.component, hash = %hash.short(), build_id = %build_id, "recorded cache entry");
        Ok(entry)
    }
}

fn mark_miss(decision: &mut Decision, key: Option<&CacheKey>) {
    if let Some(key) = key {
        obs::emit_cache_miss(&key.component, &key.content_hash);
    }
    decision.reason.push_str(" (pure cache missed)");
}
