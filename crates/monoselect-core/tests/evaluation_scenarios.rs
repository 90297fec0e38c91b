//! End-to-end evaluation scenarios against a scratch checkout.
//!
//! Git and the CI platform are faked; descriptors and source files are real
//! files in a temp directory.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use monoselect_cache::fakes::MemoryCacheStore;
use monoselect_cache::CacheKey;
use monoselect_core::fakes::{FakeGit, FakePlatform};
use monoselect_core::{
    component_hash, BuildContext, Evaluator, Overrides, Registry, SelectError,
};
use monoselect_core::decision::NO_BASE_BUILD;
use monoselect_core::platform::Build;

const HEAD: &str = "c2";
const BASE: &str = "c1";

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn base_build() -> Build {
    Build {
        id: "base-build".to_string(),
        number: Some(100),
        commit: BASE.to_string(),
        blocked: false,
        web_url: "https://ci.example/builds/100".to_string(),
    }
}

fn ctx() -> BuildContext {
    BuildContext::new("main", HEAD, "main", "mono")
}

fn platform() -> Arc<FakePlatform> {
    Arc::new(FakePlatform::new().with_builds("main", vec![base_build()]))
}

fn git_with_changes(changes: &[&str]) -> Arc<FakeGit> {
    Arc::new(
        FakeGit::new()
            .with_history([HEAD, BASE])
            .with_diff(BASE, HEAD, changes.iter().copied()),
    )
}

/// A (produces x), B (expects x), C depends_on D, pure E.
fn checkout() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(
        root,
        ".buildkite/pipeline.a.yml",
        "monorepo:\n  matches: a/**\n  produces: x\n  excluded_steps:\n    - command: echo skip a\nsteps:\n  - command: make a\n",
    );
    write(
        root,
        ".buildkite/pipeline.b.yml",
        "monorepo:\n  matches: b/**\n  expects: x\nsteps:\n  - command: make b\n",
    );
    write(
        root,
        ".buildkite/pipeline.c.yml",
        "monorepo:\n  matches: c/**\n  depends_on: d\nsteps:\n  - command: make c\n",
    );
    write(
        root,
        ".buildkite/pipeline.d.yml",
        "monorepo:\n  matches: d/**\nsteps:\n  - command: make d\n",
    );
    write(
        root,
        ".buildkite/pipeline.e.yml",
        "monorepo:\n  matches: e/**\n  pure: true\nsteps:\n  - command: make e\nenv:\n  E_IMAGE: e\n",
    );
    for name in ["a", "b", "c", "d", "e"] {
        write(root, &format!("{name}/src.txt"), name);
    }
    dir
}

#[tokio::test]
async fn producer_is_ordered_first_and_only_changed_consumer_runs() {
    let dir = checkout();
    let evaluator = Evaluator::new(dir.path(), git_with_changes(&["b/src.txt"]), platform());

    let evaluation = evaluator.evaluate(&ctx(), &Overrides::new()).await.unwrap();
    let names: Vec<&str> = evaluation.selections.iter().map(|s| s.name.as_str()).collect();
    let a = names.iter().position(|n| *n == "a").unwrap();
    let b = names.iter().position(|n| *n == "b").unwrap();
    assert!(a < b);

    assert!(!evaluation.selection("a").unwrap().included);
    assert!(evaluation.selection("b").unwrap().included);

    // A is excluded, so its artifact is handed over from the base build.
    let a_steps = &evaluation.selection("a").unwrap().steps;
    assert_eq!(a_steps.len(), 2);
    assert!(a_steps[1]["command"].as_str().unwrap().contains("--build base-build x"));
}

#[tokio::test]
async fn depends_on_pulls_in_dependency() {
    let dir = checkout();
    let evaluator = Evaluator::new(dir.path(), git_with_changes(&["c/src.txt"]), platform());

    let evaluation = evaluator.evaluate(&ctx(), &Overrides::new()).await.unwrap();
    assert!(evaluation.selection("c").unwrap().included);
    let d = evaluation.selection("d").unwrap();
    assert!(d.included);
    assert!(d.reason.contains("pulled in by a depends_on from c"));
}

#[tokio::test]
async fn no_base_build_includes_everything() {
    let dir = checkout();
    let evaluator = Evaluator::new(
        dir.path(),
        git_with_changes(&[]),
        Arc::new(FakePlatform::new()),
    );

    let evaluation = evaluator.evaluate(&ctx(), &Overrides::new()).await.unwrap();
    assert!(evaluation.is_fallback());
    for selection in &evaluation.selections {
        assert!(selection.included, "{} should be included", selection.name);
        if selection.name != "e" {
            assert_eq!(selection.reason, NO_BASE_BUILD);
        }
    }
}

#[tokio::test]
async fn diff_failure_enters_fallback() {
    let dir = checkout();
    let git = Arc::new(FakeGit::new().with_history([HEAD, BASE]).failing_diff());
    let evaluator = Evaluator::new(dir.path(), git, platform());

    let evaluation = evaluator.evaluate(&ctx(), &Overrides::new()).await.unwrap();
    assert!(evaluation.is_fallback());
    assert!(evaluation.selections.iter().all(|s| s.included));
}

#[tokio::test]
async fn pure_cache_hit_rewires_base_build() {
    let dir = checkout();
    let e = Registry::new(dir.path()).load_one("e").await.unwrap();
    let hash = component_hash(dir.path(), &e).await.unwrap();
    let store = MemoryCacheStore::new().with_entry(CacheKey::for_component("mono", "e", hash.as_str()), "42");

    let evaluator = Evaluator::new(dir.path(), git_with_changes(&["e/src.txt"]), platform())
        .with_cache(Arc::new(store));

    let evaluation = evaluator.evaluate(&ctx(), &Overrides::new()).await.unwrap();
    let e = evaluation.selection("e").unwrap();
    assert!(!e.included);
    assert_eq!(e.base_build_id.as_deref(), Some("42"));
    assert!(e.reason.contains("42") && e.reason.contains("pure cache hit"));
    // env is carried whether or not the component runs
    assert_eq!(evaluation.pipeline().env["E_IMAGE"], "e");
}

#[tokio::test]
async fn run_all_includes_everything() {
    let dir = checkout();
    let evaluator = Evaluator::new(dir.path(), git_with_changes(&[]), platform());

    let overrides = Overrides::from_vars([("PIPELINE_RUN_ALL", "1")]);
    let evaluation = evaluator.evaluate(&ctx(), &overrides).await.unwrap();
    assert!(!evaluation.is_fallback());
    assert!(evaluation.selections.iter().all(|s| s.included));
}

#[tokio::test]
async fn no_changes_excludes_everything() {
    let dir = checkout();
    let evaluator = Evaluator::new(dir.path(), git_with_changes(&["README.md"]), platform());

    let evaluation = evaluator.evaluate(&ctx(), &Overrides::new()).await.unwrap();
    assert!(evaluation.selections.iter().all(|s| !s.included));
    let pipeline = evaluation.pipeline();
    assert!(pipeline.to_yaml().unwrap().contains("echo skip a"));
}

#[tokio::test]
async fn descriptor_edit_retriggers_component() {
    let dir = checkout();
    let evaluator = Evaluator::new(
        dir.path(),
        git_with_changes(&[".buildkite/pipeline.d.yml"]),
        platform(),
    );

    let evaluation = evaluator.evaluate(&ctx(), &Overrides::new()).await.unwrap();
    assert!(evaluation.selection("d").unwrap().included);
    assert!(!evaluation.selection("c").unwrap().included);
}

#[tokio::test]
async fn cycle_aborts_evaluation() {
    let dir = checkout();
    write(
        dir.path(),
        ".buildkite/pipeline.d.yml",
        "monorepo:\n  matches: d/**\n  depends_on: c\n",
    );
    let evaluator = Evaluator::new(dir.path(), git_with_changes(&[]), platform());

    let err = evaluator.evaluate(&ctx(), &Overrides::new()).await.unwrap_err();
    assert!(matches!(err, SelectError::Cycle { .. }));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn order_is_independent_of_descriptor_names() {
    let dir = checkout();
    let components = Registry::new(dir.path()).load_all().await.unwrap();
    let names: Vec<&str> = components.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "d", "c", "e"]);
}
