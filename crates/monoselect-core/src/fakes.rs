//! In-memory fakes for the git and CI platform collaborators (testing only)
//!
//! `FakeGit` models a single first-parent history plus explicit merge bases
//! and diffs. `FakePlatform` serves canned build lists per branch.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Result, SelectError};
use crate::git::GitAccessor;
use crate::platform::{Build, BuildFilter, CiPlatform};

// ---------------------------------------------------------------------------
// FakeGit
// ---------------------------------------------------------------------------

/// In-memory [`GitAccessor`].
#[derive(Debug, Default)]
pub struct FakeGit {
    /// First-parent history, newest first.
    history: Vec<String>,
    extra_commits: HashSet<String>,
    merge_bases: HashMap<(String, String), String>,
    diffs: HashMap<(String, String), Vec<String>>,
    fail_diff: bool,
}

impl FakeGit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history<I, S>(mut self, commits: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.history = commits.into_iter().map(Into::into).collect();
        self
    }

    /// A commit that exists but is not on the first-parent history.
    pub fn with_commit(mut self, commit: &str) -> Self {
        self.extra_commits.insert(commit.to_string());
        self
    }

    pub fn with_merge_base(mut self, a: &str, b: &str, base: &str) -> Self {
        self.merge_bases
            .insert((a.to_string(), b.to_string()), base.to_string());
        self
    }

    pub fn with_diff<I, S>(mut self, base: &str, head: &str, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.diffs.insert(
            (base.to_string(), head.to_string()),
            files.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Make every `diff` call fail.
    pub fn failing_diff(mut self) -> Self {
        self.fail_diff = true;
        self
    }

    fn exists(&self, commit: &str) -> bool {
        self.history.iter().any(|c| c == commit)
            || self.extra_commits.contains(commit)
            || self.merge_bases.values().any(|c| c == commit)
    }
}

#[async_trait]
impl GitAccessor for FakeGit {
    async fn rev_parse(&self, reference: &str) -> Result<String> {
        if self.exists(reference) {
            Ok(reference.to_string())
        } else {
            Err(SelectError::Git(format!("unknown revision {reference}")))
        }
    }

    /// Supports `[--first-parent] [-n N] <commit>`.
    async fn rev_list(&self, args: &[&str]) -> Result<Vec<String>> {
        let mut limit = usize::MAX;
        let mut start = None;
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match *arg {
                "--first-parent" => {}
                "-n" => {
                    limit = iter
                        .next()
                        .and_then(|n| n.parse().ok())
                        .ok_or_else(|| SelectError::Git("bad -n argument".to_string()))?;
                }
                commit => start = Some(commit),
            }
        }

        let start = start.ok_or_else(|| SelectError::Git("no commit given".to_string()))?;
        let position = self
            .history
            .iter()
            .position(|c| c == start)
            .ok_or_else(|| SelectError::Git(format!("unknown revision {start}")))?;
        Ok(self.history[position..].iter().take(limit).cloned().collect())
    }

    async fn merge_base(&self, a: &str, b: &str) -> Result<String> {
        self.merge_bases
            .get(&(a.to_string(), b.to_string()))
            .cloned()
            .ok_or_else(|| SelectError::Git(format!("no merge base for {a} and {b}")))
    }

    async fn diff(&self, base: &str, head: &str) -> Result<Vec<String>> {
        if self.fail_diff {
            return Err(SelectError::Git("diff failed".to_string()));
        }
        self.diffs
            .get(&(base.to_string(), head.to_string()))
            .cloned()
            .ok_or_else(|| SelectError::Git(format!("bad revision {base}..{head}")))
    }
}

// ---------------------------------------------------------------------------
// FakePlatform
// ---------------------------------------------------------------------------

/// In-memory [`CiPlatform`] holding passed builds per branch, newest first.
#[derive(Debug, Default)]
pub struct FakePlatform {
    builds: HashMap<String, Vec<Build>>,
    failing: bool,
    requests: Mutex<Vec<BuildFilter>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// A platform whose API is down.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn with_builds(mut self, branch: &str, builds: Vec<Build>) -> Self {
        self.builds.insert(branch.to_string(), builds);
        self
    }

    /// Filters received so far.
    pub fn requests(&self) -> Vec<BuildFilter> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CiPlatform for FakePlatform {
    async fn get_builds(&self, filter: &BuildFilter) -> Result<Vec<Build>> {
        self.requests.lock().unwrap().push(filter.clone());
        if self.failing {
            return Err(SelectError::Platform("HTTP 503".to_string()));
        }
        Ok(self
            .builds
            .get(&filter.branch)
            .map(|builds| {
                builds
                    .iter()
                    .take(filter.per_page as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
