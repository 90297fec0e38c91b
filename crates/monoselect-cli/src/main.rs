//! Monoselect CLI
//!
//! Run from a CI step to decide which monorepo components to build and emit
//! the merged pipeline:
//!
//! ```text
//! monoselect pipeline | buildkite-agent pipeline upload
//! ```
//!
//! ## Commands
//!
//! - `pipeline`: evaluate and print the merged pipeline as YAML
//! - `hash`: print a component's content hash
//! - `record`: record a successful build of a pure component in the cache
//! - `order`: print components in dependency order

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use monoselect_core::{
    component_hash, BuildContext, BuildkiteClient, BuildkiteConfig, Evaluator, GitCli, Overrides,
    Registry,
};
use monoselect_core::pure_cache::PureCache;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "monoselect")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Select which monorepo components a CI build runs", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Repository root
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every component and print the merged pipeline
    Pipeline {
        #[command(flatten)]
        build: BuildArgs,

        #[command(flatten)]
        buildkite: BuildkiteArgs,

        /// Print per-component decisions as JSON instead of the pipeline
        #[arg(long)]
        decisions: bool,
    },

    /// Print the content hash of a component
    Hash {
        /// Component name
        component: String,
    },

    /// Record that a build produced a pure component's current content
    Record {
        /// Component name
        component: String,

        /// Id of the successful build
        #[arg(long, env = "BUILDKITE_BUILD_ID")]
        build_id: String,

        /// Pipeline slug used to namespace the cache key
        #[arg(long, env = "BUILDKITE_PIPELINE_SLUG")]
        pipeline: String,
    },

    /// Print component names in dependency order
    Order,
}

#[derive(Args)]
struct BuildArgs {
    /// Branch being built
    #[arg(long, env = "BUILDKITE_BRANCH")]
    branch: String,

    /// Commit being built
    #[arg(long, env = "BUILDKITE_COMMIT")]
    commit: String,

    /// Default branch of the pipeline
    #[arg(long, env = "BUILDKITE_PIPELINE_DEFAULT_BRANCH", default_value = "main")]
    default_branch: String,

    /// Long-lived integration branch, if any
    #[arg(long, env = "MONOSELECT_INTEGRATION_BRANCH")]
    integration_branch: Option<String>,
}

#[derive(Args)]
struct BuildkiteArgs {
    /// Buildkite organization slug
    #[arg(long, env = "BUILDKITE_ORGANIZATION_SLUG")]
    organization: String,

    /// Buildkite pipeline slug
    #[arg(long, env = "BUILDKITE_PIPELINE_SLUG")]
    pipeline: String,

    /// Buildkite REST API token (read_builds scope)
    #[arg(long, env = "BUILDKITE_API_ACCESS_TOKEN", hide_env_values = true)]
    api_token: String,

    /// Buildkite REST API base URL
    #[arg(long, env = "BUILDKITE_API_URL", default_value = BuildkiteConfig::DEFAULT_API_URL)]
    api_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    monoselect_core::telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Pipeline {
            build,
            buildkite,
            decisions,
        } => cmd_pipeline(&cli.root, build, buildkite, decisions).await,
        Commands::Hash { component } => cmd_hash(&cli.root, &component).await,
        Commands::Record {
            component,
            build_id,
            pipeline,
        } => cmd_record(&cli.root, &component, &build_id, &pipeline).await,
        Commands::Order => cmd_order(&cli.root).await,
    }
}

async fn cmd_pipeline(
    root: &Path,
    build: BuildArgs,
    buildkite: BuildkiteArgs,
    decisions: bool,
) -> Result<()> {
    let mut ctx = BuildContext::new(
        &build.branch,
        &build.commit,
        &build.default_branch,
        &buildkite.pipeline,
    );
    if let Some(branch) = &build.integration_branch {
        ctx = ctx.with_integration_branch(branch);
    }

    let config = BuildkiteConfig::new(&buildkite.organization, &buildkite.pipeline, &buildkite.api_token)
        .with_api_url(&buildkite.api_url);
    let platform = BuildkiteClient::new(config).context("Failed to create Buildkite client")?;

    let mut evaluator = Evaluator::new(root, Arc::new(GitCli::new(root)), Arc::new(platform));
    if let Some(store) = monoselect_cache::store_from_env().context("Failed to open cache store")? {
        evaluator = evaluator.with_cache(store);
    }

    let overrides = Overrides::from_env();
    let evaluation = evaluator
        .evaluate(&ctx, &overrides)
        .await
        .context("Evaluation failed")?;

    let included = evaluation.selections.iter().filter(|s| s.included).count();
    info!(
        included = included,
        excluded = evaluation.selections.len() - included,
        fallback = evaluation.is_fallback(),
        "evaluation complete"
    );

    if decisions {
        println!("{}", serde_json::to_string_pretty(&evaluation.selections)?);
    } else {
        print!("{}", evaluation.pipeline().to_yaml()?);
    }
    Ok(())
}

async fn cmd_hash(root: &Path, component: &str) -> Result<()> {
    let component = Registry::new(root)
        .load_one(component)
        .await
        .with_context(|| format!("Failed to load component {component}"))?;
    let hash = component_hash(root, &component).await?;
    println!("{hash}");
    Ok(())
}

async fn cmd_record(root: &Path, component: &str, build_id: &str, pipeline: &str) -> Result<()> {
    let component = Registry::new(root)
        .load_one(component)
        .await
        .with_context(|| format!("Failed to load component {component}"))?;
    if !component.pure {
        anyhow::bail!("{} is not a pure component", component.name);
    }

    let store = monoselect_cache::store_from_env().context("Failed to open cache store")?;
    let entry = PureCache::new(root, pipeline, store)
        .record(&component, build_id)
        .await?;
    println!("{} {} {}", entry.component, entry.content_hash, entry.build_id);
    Ok(())
}

async fn cmd_order(root: &Path) -> Result<()> {
    let components = Registry::new(root)
        .load_all()
        .await
        .context("Failed to load components")?;
    for component in components {
        println!("{}", component.name);
    }
    Ok(())
}
