//! Error taxonomy for build selection.

use monoselect_cache::CacheError;

/// Errors produced while loading components and selecting builds.
#[derive(Debug, thiserror::Error)]
pub enum SelectError {
    /// A single descriptor could not be read or validated. The registry skips
    /// the file and carries on.
    #[error("invalid component descriptor {path}: {detail}")]
    Config { path: String, detail: String },

    #[error("dependency cycle detected: {from} -> {to}")]
    Cycle { from: String, to: String },

    #[error("could not find a component that produces \"{artifact}\" (expected by {component})")]
    UnresolvedArtifact { artifact: String, component: String },

    #[error("artifact \"{artifact}\" is produced by more than one component: {producers:?}")]
    AmbiguousArtifact {
        artifact: String,
        producers: Vec<String>,
    },

    #[error("could not find a component named \"{dependency}\" (depended on by {component})")]
    UnresolvedDependency {
        dependency: String,
        component: String,
    },

    #[error("duplicate component name \"{name}\" in {first} and {second}")]
    DuplicateComponent {
        name: String,
        first: String,
        second: String,
    },

    #[error("env of component {component} must be a mapping of variable names to values")]
    InvalidEnv { component: String },

    #[error("no pipeline files found under {0}")]
    NoPipelineFiles(String),

    #[error("component not found: {0}")]
    ComponentNotFound(String),

    #[error("no suitable base build: {0}")]
    NoBaseBuild(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("CI platform error: {0}")]
    Platform(String),

    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("invalid glob pattern: {0}")]
    Glob(String),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SelectError {
    /// Errors that must abort the whole evaluation, with no partial pipeline.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SelectError::Cycle { .. }
                | SelectError::UnresolvedArtifact { .. }
                | SelectError::AmbiguousArtifact { .. }
                | SelectError::UnresolvedDependency { .. }
                | SelectError::DuplicateComponent { .. }
                | SelectError::InvalidEnv { .. }
        )
    }
}

impl From<CacheError> for SelectError {
    fn from(err: CacheError) -> Self {
        SelectError::CacheUnavailable(err.to_string())
    }
}

impl From<reqwest::Error> for SelectError {
    fn from(err: reqwest::Error) -> Self {
        SelectError::Platform(err.to_string())
    }
}

impl From<globset::Error> for SelectError {
    fn from(err: globset::Error) -> Self {
        SelectError::Glob(err.to_string())
    }
}

/// Result type for selection operations.
pub type Result<T> = std::result::Result<T, SelectError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_error_names_edge() {
        let err = SelectError::Cycle {
            from: "api".to_string(),
            to: "web".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("api -> web"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unresolved_artifact_names_artifact_and_consumer() {
        let err = SelectError::UnresolvedArtifact {
            artifact: "dist.tar".to_string(),
            component: "deploy".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("dist.tar"));
        assert!(msg.contains("deploy"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_recoverable_errors_are_not_fatal() {
        assert!(!SelectError::NoBaseBuild("none".to_string()).is_fatal());
        assert!(!SelectError::CacheUnavailable("down".to_string()).is_fatal());
        assert!(!SelectError::Config {
            path: ".buildkite/pipeline.x.yml".to_string(),
            detail: "bad yaml".to_string()
        }
        .is_fatal());
    }

    #[test]
    fn test_cache_error_maps_to_unavailable() {
        let err: SelectError = CacheError::Unavailable("timeout".to_string()).into();
        assert!(matches!(err, SelectError::CacheUnavailable(_)));
    }
}
