//! The evaluation driver.
//!
//! Phases run strictly one after another:
//!
//! 1. load and order components
//! 2. resolve the base build
//! 3. diff base commit against the current commit
//! 4. match changes and decide each component
//! 5. propagate `depends_on`
//! 6. pure cache lookups
//! 7. select steps and env
//!
//! Failure to resolve a base build, or to diff against it, is not an error:
//! the run continues in fallback mode and includes every component.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use monoselect_cache::CacheMetadataStore;
use serde::Serialize;
use tracing::{info, Instrument};

use crate::component::Component;
use crate::context::BuildContext;
use crate::decision::{decide_all, propagate_depends_on, Decision};
use crate::error::{Result, SelectError};
use crate::git::GitAccessor;
use crate::matcher::compute_matches;
use crate::merge::{select, Pipeline, Selection};
use crate::obs;
use crate::overrides::Overrides;
use crate::platform::{Build, CiPlatform};
use crate::pure_cache::PureCache;
use crate::registry::Registry;
use crate::resolver::{BaseBuildResolver, ResolverLimits};

/// Result of one evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    /// `None` in fallback mode.
    pub base_build: Option<Build>,
    pub changed_files: Vec<String>,
    /// One per component, in registry order.
    pub selections: Vec<Selection>,
    pub evaluated_at: DateTime<Utc>,
}

impl Evaluation {
    pub fn is_fallback(&self) -> bool {
        self.base_build.is_none()
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::merge(&self.selections)
    }

    pub fn selection(&self, name: &str) -> Option<&Selection> {
        self.selections.iter().find(|s| s.name == name)
    }
}

/// Runs evaluations against one repository checkout.
pub struct Evaluator {
    root: PathBuf,
    git: Arc<dyn GitAccessor>,
    platform: Arc<dyn CiPlatform>,
    cache: Option<Arc<dyn CacheMetadataStore>>,
    limits: ResolverLimits,
}

impl Evaluator {
    pub fn new(root: impl AsRef<Path>, git: Arc<dyn GitAccessor>, platform: Arc<dyn CiPlatform>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            git,
            platform,
            cache: None,
            limits: ResolverLimits::default(),
        }
    }

    pub fn with_cache(mut self, store: Arc<dyn CacheMetadataStore>) -> Self {
        self.cache = Some(store);
        self
    }

    pub fn with_limits(mut self, limits: ResolverLimits) -> Self {
        self.limits = limits;
        self
    }

    pub async fn evaluate(&self, ctx: &BuildContext, overrides: &Overrides) -> Result<Evaluation> {
        self.run(ctx, overrides)
            .instrument(obs::evaluation_span(&ctx.branch, &ctx.commit))
            .await
    }

    async fn run(&self, ctx: &BuildContext, overrides: &Overrides) -> Result<Evaluation> {
        let components = Registry::new(&self.root).load_all().await?;
        info!(count = components.len(), "loaded components");

        let (base_build, changed_files) = self.base_and_changes(ctx).await;
        let base_build_id = base_build.as_ref().map(|b| b.id.clone());

        let decisions = components
            .iter()
            .map(|c| {
                let matched = compute_matches(c, &changed_files)?;
                Ok::<_, SelectError>(Decision::new(&c.name, base_build_id.clone(), matched))
            })
            .collect::<Result<Vec<_>>>()?;

        let decisions = decide_all(decisions, overrides);
        let decisions = propagate_depends_on(&components, decisions);
        let decisions = PureCache::new(&self.root, &ctx.pipeline, self.cache.clone())
            .resolve(&components, decisions)
            .await;

        report(&components, &decisions);
        Ok(Evaluation {
            base_build,
            changed_files,
            selections: select(&components, &decisions),
            evaluated_at: Utc::now(),
        })
    }

    async fn base_and_changes(&self, ctx: &BuildContext) -> (Option<Build>, Vec<String>) {
        let resolver = BaseBuildResolver::new(self.git.clone(), self.platform.clone())
            .with_limits(self.limits);

        let base = match resolver.resolve(ctx).await {
            Ok(base) => base,
            Err(e) => {
                obs::emit_fallback_entered(&e);
                return (None, Vec::new());
            }
        };

        match self.git.diff(&base.commit, &ctx.commit).await {
            Ok(changed) => {
                info!(count = changed.len(), base = %base.commit, "computed changed files");
                (Some(base), changed)
            }
            Err(e) => {
                obs::emit_fallback_entered(&e);
                (None, Vec::new())
            }
        }
    }
}

fn report(components: &[Component], decisions: &[Decision]) {
    for (component, decision) in components.iter().zip(decisions) {
        obs::emit_component_decided(&component.name, decision.is_included(), &decision.reason);
    }
}
