//! Monoselect Core Library
//!
//! Decides which components of a monorepo a CI build must run, and merges
//! their pipeline steps. See [`Evaluator`] for the end-to-end flow.

pub mod component;
pub mod context;
pub mod decision;
pub mod error;
pub mod evaluate;
pub mod fakes;
pub mod files;
pub mod git;
pub mod graph;
pub mod hash;
pub mod matcher;
pub mod merge;
pub mod obs;
pub mod overrides;
pub mod platform;
pub mod pure_cache;
pub mod registry;
pub mod resolver;
pub mod telemetry;

pub use component::{Component, Matches};
pub use context::BuildContext;
pub use decision::{Decision, Inclusion};
pub use error::{Result, SelectError};
pub use evaluate::{Evaluation, Evaluator};
pub use git::{GitAccessor, GitCli};
pub use graph::{sort_components, ComponentGraph};
pub use hash::{component_hash, ContentHash};
pub use matcher::{compute_matches, PatternSet};
pub use merge::{Pipeline, Selection};
pub use overrides::Overrides;
pub use platform::{Build, BuildFilter, BuildkiteClient, BuildkiteConfig, CiPlatform};
pub use pure_cache::PureCache;
pub use registry::Registry;
pub use resolver::{BaseBuildResolver, BranchKind, ResolverLimits};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
