//! Change matching.
//!
//! Patterns follow the usual CI-glob conventions: `*` does not cross `/`,
//! `**` does, dot-files are matched like any other file, and a pattern with
//! no `/` in it is matched against the file's base name only (so `*.lock`
//! matches `web/yarn.lock`).

use std::collections::BTreeSet;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::component::Component;
use crate::error::Result;

/// A compiled set of path patterns.
#[derive(Debug, Clone)]
pub struct PatternSet {
    full_path: GlobSet,
    base_name: GlobSet,
    empty: bool,
}

impl PatternSet {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut full_path = GlobSetBuilder::new();
        let mut base_name = GlobSetBuilder::new();

        for pattern in patterns {
            let pattern = pattern.strip_prefix("./").unwrap_or(pattern);
            let glob = GlobBuilder::new(pattern).literal_separator(true).build()?;
            if pattern.contains('/') {
                full_path.add(glob);
            } else {
                base_name.add(glob);
            }
        }

        Ok(Self {
            full_path: full_path.build()?,
            base_name: base_name.build()?,
            empty: patterns.is_empty(),
        })
    }

    /// Match a repository-relative, `/`-separated path.
    pub fn is_match(&self, path: &str) -> bool {
        if self.empty {
            return false;
        }
        let path = path.strip_prefix("./").unwrap_or(path);
        if self.full_path.is_match(path) {
            return true;
        }
        let base = path.rsplit('/').next().unwrap_or(path);
        self.base_name.is_match(base)
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }
}

/// The subset of `changed_files` relevant to `component`.
///
/// An empty diff yields an empty result, never "everything".
pub fn compute_matches(component: &Component, changed_files: &[String]) -> Result<BTreeSet<String>> {
    if changed_files.is_empty() {
        return Ok(BTreeSet::new());
    }

    let patterns = PatternSet::new(&component.match_patterns_for_changes())?;
    Ok(changed_files
        .iter()
        .filter(|path| patterns.is_match(path))
        .cloned()
        .collect())
}
