//! Base build resolution.
//!
//! The base build is the prior passed, unblocked CI run whose commit the
//! current commit is diffed against, and whose artifacts excluded components
//! hand over. Which strategy applies depends only on the branch being built:
//!
//! - **default branch**: the nearest commit at or before `HEAD` on the
//!   first-parent history that also has a passed build.
//! - **integration branch**: the most recent passed build of that branch whose
//!   commit still exists locally. The branch may have been reset, so ancestry
//!   is not required. Falls back to the default-branch strategy when no build
//!   validates.
//! - **feature branch**: the default-branch strategy anchored at the merge-base
//!   with `origin/<default>`.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tracing::debug;

use crate::context::BuildContext;
use crate::error::{Result, SelectError};
use crate::git::GitAccessor;
use crate::obs;
use crate::platform::{Build, BuildFilter, CiPlatform};

/// Which strategy a branch resolves with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    Default,
    Integration,
    Feature,
}

impl BranchKind {
    pub fn of(ctx: &BuildContext) -> Self {
        if ctx.branch == ctx.default_branch {
            BranchKind::Default
        } else if ctx.integration_branch.as_deref() == Some(ctx.branch.as_str()) {
            BranchKind::Integration
        } else {
            BranchKind::Feature
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BranchKind::Default => "default",
            BranchKind::Integration => "integration",
            BranchKind::Feature => "feature",
        }
    }
}

/// How far back each strategy looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverLimits {
    /// Passed default-branch builds fetched.
    pub default_builds: u32,
    /// First-parent commits walked back from the anchor commit.
    pub history_depth: u32,
    /// Passed integration-branch builds fetched.
    pub integration_builds: u32,
}

impl Default for ResolverLimits {
    fn default() -> Self {
        Self {
            default_builds: 50,
            history_depth: 100,
            integration_builds: 10,
        }
    }
}

/// Finds the base build for an evaluation.
pub struct BaseBuildResolver {
    git: Arc<dyn GitAccessor>,
    platform: Arc<dyn CiPlatform>,
    limits: ResolverLimits,
}

impl BaseBuildResolver {
    pub fn new(git: Arc<dyn GitAccessor>, platform: Arc<dyn CiPlatform>) -> Self {
        Self {
            git,
            platform,
            limits: ResolverLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: ResolverLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Resolve the base build for `ctx`.
    ///
    /// Any error means "no base build"; callers switch to fallback mode
    /// rather than aborting.
    pub async fn resolve(&self, ctx: &BuildContext) -> Result<Build> {
        let kind = BranchKind::of(ctx);
        debug!(branch = %ctx.branch, strategy = kind.as_str(), "resolving base build");

        let build = match kind {
            BranchKind::Default => self.at_or_before(&ctx.commit, &ctx.default_branch).await?,
            BranchKind::Integration => self.for_integration_branch(ctx).await?,
            BranchKind::Feature => self.for_feature_branch(ctx).await?,
        };

        obs::emit_base_build_resolved(kind.as_str(), &build.id, &build.commit, &build.web_url);
        Ok(build)
    }

    /// Nearest passed build of `branch` whose commit is `commit` or one of its
    /// first-parent ancestors.
    pub async fn at_or_before(&self, commit: &str, branch: &str) -> Result<Build> {
        let filter = BuildFilter::passed(branch, self.limits.default_builds);
        let depth = self.limits.history_depth.to_string();
        let rev_list_args = ["--first-parent", "-n", depth.as_str(), commit];

        let (builds, history) = tokio::try_join!(
            self.platform.get_builds(&filter),
            self.git.rev_list(&rev_list_args),
        )?;

        let built: HashSet<&str> = builds
            .iter()
            .filter(|b| !b.blocked)
            .map(|b| b.commit.as_str())
            .collect();

        // History is newest first, so the first built commit is the nearest.
        let nearest = history
            .iter()
            .find(|c| built.contains(c.as_str()))
            .ok_or_else(|| {
                SelectError::NoBaseBuild(format!(
                    "no passed build of {branch} at or before {commit} within {} commits",
                    self.limits.history_depth
                ))
            })?;

        debug!(commit = %nearest, branch = %branch, "found nearest built commit");
        builds
            .into_iter()
            .find(|b| !b.blocked && &b.commit == nearest)
            .ok_or_else(|| SelectError::NoBaseBuild(format!("cannot find build for {nearest}")))
    }

    /// Most recent passed, unblocked build of `branch` whose commit exists in
    /// the local repository.
    pub async fn most_recent_validated(&self, branch: &str) -> Result<Option<Build>> {
        let filter = BuildFilter::passed(branch, self.limits.integration_builds);
        let candidates: Vec<Build> = self
            .platform
            .get_builds(&filter)
            .await?
            .into_iter()
            .filter(|b| !b.blocked)
            .collect();

        let checks = join_all(candidates.iter().map(|b| self.git.rev_parse(&b.commit))).await;

        Ok(candidates
            .into_iter()
            .zip(checks)
            .find_map(|(build, check)| match check {
                Ok(_) => Some(build),
                Err(e) => {
                    debug!(build = %build.id, commit = %build.commit, error = %e, "build commit not found locally");
                    None
                }
            }))
    }

    async fn for_integration_branch(&self, ctx: &BuildContext) -> Result<Build> {
        match self.most_recent_validated(&ctx.branch).await? {
            Some(build) => Ok(build),
            None => {
                debug!(branch = %ctx.branch, "no validated integration build, trying default branch");
                self.at_or_before(&ctx.commit, &ctx.default_branch).await
            }
        }
    }

    async fn for_feature_branch(&self, ctx: &BuildContext) -> Result<Build> {
        let remote_default = format!("origin/{}", ctx.default_branch);
        let merge_base = self.git.merge_base(&remote_default, &ctx.commit).await?;
        debug!(merge_base = %merge_base, branch = %ctx.branch, "found merge base");

        self.at_or_before(&merge_base, &ctx.default_branch)
            .await
            .map_err(|e| {
                SelectError::NoBaseBuild(format!(
                    "no build for merge base {merge_base} of {}: {e}. Try bringing the branch up to date with {}",
                    ctx.branch, ctx.default_branch
                ))
            })
    }
}
