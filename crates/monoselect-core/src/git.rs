//! Git integration for history and diff queries.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, SelectError};

/// The git operations build selection needs.
#[async_trait]
pub trait GitAccessor: Send + Sync {
    /// Resolve `reference` to a commit SHA, failing if it does not exist.
    async fn rev_parse(&self, reference: &str) -> Result<String>;

    /// `git rev-list <args>`, newest first.
    async fn rev_list(&self, args: &[&str]) -> Result<Vec<String>>;

    /// Best common ancestor of two refs.
    async fn merge_base(&self, a: &str, b: &str) -> Result<String>;

    /// Paths changed between two commits, both sides of renames included.
    async fn diff(&self, base: &str, head: &str) -> Result<Vec<String>>;
}

/// [`GitAccessor`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    repo_dir: PathBuf,
}

impl GitCli {
    pub fn new(repo_dir: impl AsRef<Path>) -> Self {
        Self {
            repo_dir: repo_dir.as_ref().to_path_buf(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        debug!(args = ?args, "running git");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .output()
            .await
            .map_err(|e| SelectError::Git(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SelectError::Git(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl GitAccessor for GitCli {
    async fn rev_parse(&self, reference: &str) -> Result<String> {
        let spec = format!("{reference}^{{commit}}");
        let sha = self.run(&["rev-parse", "--verify", "--quiet", &spec]).await?;
        let sha = sha.trim().to_string();
        if sha.is_empty() {
            return Err(SelectError::Git(format!(
                "git rev-parse {reference} returned empty output"
            )));
        }
        Ok(sha)
    }

    async fn rev_list(&self, args: &[&str]) -> Result<Vec<String>> {
        let mut full = vec!["rev-list"];
        full.extend_from_slice(args);
        Ok(lines(&self.run(&full).await?))
    }

    async fn merge_base(&self, a: &str, b: &str) -> Result<String> {
        let sha = self.run(&["merge-base", a, b]).await?;
        Ok(sha.trim().to_string())
    }

    async fn diff(&self, base: &str, head: &str) -> Result<Vec<String>> {
        // -z keeps paths verbatim; without it git C-quotes non-ASCII names.
        let out = self
            .run(&["diff", "--name-only", "-z", "--no-renames", base, head])
            .await?;
        Ok(out
            .split('\0')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn run_git(repo_dir: &Path, args: &[&str]) -> String {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init", "-q"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["commit", "-q", "--allow-empty", "-m", "initial"]);
        dir
    }

    fn commit_file(repo: &Path, rel: &str, contents: &str) -> String {
        let path = repo.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
        run_git(repo, &["add", "-A"]);
        run_git(repo, &["commit", "-q", "-m", rel]);
        run_git(repo, &["rev-parse", "HEAD"])
    }

    #[tokio::test]
    async fn rev_parse_returns_40_hex_chars() {
        let repo = make_git_repo();
        let sha = GitCli::new(repo.path()).rev_parse("HEAD").await.unwrap();
        assert_eq!(sha.len(), 40, "SHA should be 40 hex chars, got: {sha}");
        assert!(sha.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn rev_parse_fails_for_unknown_commit() {
        let repo = make_git_repo();
        let result = GitCli::new(repo.path())
            .rev_parse("0123456789012345678901234567890123456789")
            .await;
        assert!(matches!(result, Err(SelectError::Git(_))));
    }

    #[tokio::test]
    async fn rev_parse_fails_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert!(GitCli::new(dir.path()).rev_parse("HEAD").await.is_err());
    }

    #[tokio::test]
    async fn rev_list_is_newest_first() {
        let repo = make_git_repo();
        let first = commit_file(repo.path(), "a.txt", "a");
        let second = commit_file(repo.path(), "b.txt", "b");

        let git = GitCli::new(repo.path());
        let list = git
            .rev_list(&["--first-parent", "-n", "2", &second])
            .await
            .unwrap();
        assert_eq!(list, vec![second, first]);
    }

    #[tokio::test]
    async fn diff_lists_changed_paths() {
        let repo = make_git_repo();
        let base = commit_file(repo.path(), "web/a.ts", "a");
        commit_file(repo.path(), "api/b.rs", "b");
        let head = commit_file(repo.path(), "web/c.ts", "c");

        let mut changed = GitCli::new(repo.path()).diff(&base, &head).await.unwrap();
        changed.sort();
        assert_eq!(changed, vec!["api/b.rs", "web/c.ts"]);
    }

    #[tokio::test]
    async fn diff_returns_non_ascii_paths_unquoted() {
        let repo = make_git_repo();
        let base = commit_file(repo.path(), "web/a.ts", "a");
        let head = commit_file(repo.path(), "web/café.ts", "c");

        let changed = GitCli::new(repo.path()).diff(&base, &head).await.unwrap();
        assert_eq!(changed, vec!["web/café.ts"]);

        let web = crate::component::Component::new("web").with_patterns(["web/**"]);
        let matched = crate::matcher::compute_matches(&web, &changed).unwrap();
        assert!(matched.contains("web/café.ts"));
    }

    #[tokio::test]
    async fn diff_keeps_paths_with_spaces_and_quotes() {
        let repo = make_git_repo();
        let base = commit_file(repo.path(), "a.txt", "a");
        let head = commit_file(repo.path(), "docs/my \"notes\".md", "n");

        let changed = GitCli::new(repo.path()).diff(&base, &head).await.unwrap();
        assert_eq!(changed, vec!["docs/my \"notes\".md"]);
    }

    #[tokio::test]
    async fn diff_of_identical_commits_is_empty() {
        let repo = make_git_repo();
        let head = commit_file(repo.path(), "a.txt", "a");
        let changed = GitCli::new(repo.path()).diff(&head, &head).await.unwrap();
        assert!(changed.is_empty());
    }

    #[tokio::test]
    async fn merge_base_finds_fork_point() {
        let repo = make_git_repo();
        let fork = commit_file(repo.path(), "a.txt", "a");
        let main = run_git(repo.path(), &["rev-parse", "--abbrev-ref", "HEAD"]);
        run_git(repo.path(), &["checkout", "-q", "-b", "feature"]);
        let feature = commit_file(repo.path(), "f.txt", "f");
        run_git(repo.path(), &["checkout", "-q", &main]);
        commit_file(repo.path(), "m.txt", "m");

        let base = GitCli::new(repo.path())
            .merge_base(&main, &feature)
            .await
            .unwrap();
        assert_eq!(base, fork);
    }
}
