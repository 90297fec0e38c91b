//! The identity of the build being evaluated.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SelectError};

/// Where and what is being built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildContext {
    pub branch: String,
    pub commit: String,
    pub default_branch: String,
    /// Long-lived branch that gets reset or reparented, if the repo has one.
    pub integration_branch: Option<String>,
    /// Pipeline slug, used to namespace cache keys.
    pub pipeline: String,
}

impl BuildContext {
    pub fn new(branch: &str, commit: &str, default_branch: &str, pipeline: &str) -> Self {
        Self {
            branch: branch.to_string(),
            commit: commit.to_string(),
            default_branch: default_branch.to_string(),
            integration_branch: None,
            pipeline: pipeline.to_string(),
        }
    }

    pub fn with_integration_branch(mut self, branch: &str) -> Self {
        self.integration_branch = Some(branch.to_string()).filter(|b| !b.is_empty());
        self
    }

    /// Read the context from the CI agent's standard variables.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut branch = None;
        let mut commit = None;
        let mut default_branch = None;
        let mut pipeline = None;
        let mut integration_branch = None;

        for (key, value) in vars {
            let value = value.as_ref();
            if value.is_empty() {
                continue;
            }
            let slot = match key.as_ref() {
                "BUILDKITE_BRANCH" => &mut branch,
                "BUILDKITE_COMMIT" => &mut commit,
                "BUILDKITE_PIPELINE_DEFAULT_BRANCH" => &mut default_branch,
                "BUILDKITE_PIPELINE_SLUG" => &mut pipeline,
                "MONOSELECT_INTEGRATION_BRANCH" => &mut integration_branch,
                _ => continue,
            };
            *slot = Some(value.to_string());
        }

        let require = |value: Option<String>, name: &str| {
            value.ok_or_else(|| SelectError::Config {
                path: "environment".to_string(),
                detail: format!("{name} is not set"),
            })
        };

        Ok(Self {
            branch: require(branch, "BUILDKITE_BRANCH")?,
            commit: require(commit, "BUILDKITE_COMMIT")?,
            default_branch: require(default_branch, "BUILDKITE_PIPELINE_DEFAULT_BRANCH")?,
            integration_branch,
            pipeline: require(pipeline, "BUILDKITE_PIPELINE_SLUG")?,
        })
    }
}
