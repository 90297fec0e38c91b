//! Structured observability events for an evaluation run.
//!
//! Every event carries an `event` field so log pipelines can filter on it:
//!
//! | event | level |
//! |---|---|
//! | `base_build.resolved` | info |
//! | `base_build.fallback` | warn |
//! | `component.decided` | info |
//! | `component.pulled_in` | info |
//! | `cache.hit` / `cache.miss` | info |
//! | `cache.degraded` | warn |

use tracing::{info, warn};

/// Span covering one evaluation, tagged with branch and commit.
pub fn evaluation_span(branch: &str, commit: &str) -> tracing::Span {
    tracing::info_span!("monoselect.evaluate", branch = %branch, commit = %commit)
}

pub fn emit_base_build_resolved(strategy: &str, build_id: &str, commit: &str, web_url: &str) {
    info!(
        event = "base_build.resolved",
        strategy = %strategy,
        build_id = %build_id,
        commit = %commit,
        web_url = %web_url,
    );
}

/// Emit event: no base build, every component will be included.
pub fn emit_fallback_entered(error: &dyn std::fmt::Display) {
    warn!(event = "base_build.fallback", error = %error, "building everything");
}

pub fn emit_component_decided(component: &str, included: bool, reason: &str) {
    info!(
        event = "component.decided",
        component = %component,
        included = included,
        reason = %reason,
    );
}

pub fn emit_pulled_in(dependency: &str, dependent: &str) {
    info!(event = "component.pulled_in", component = %dependency, dependent = %dependent);
}

pub fn emit_cache_hit(component: &str, content_hash: &str, build_id: &str) {
    info!(
        event = "cache.hit",
        component = %component,
        content_hash = %content_hash,
        build_id = %build_id,
    );
}

pub fn emit_cache_miss(component: &str, content_hash: &str) {
    info!(event = "cache.miss", component = %component, content_hash = %content_hash);
}

/// Emit event: cache lookup failed and is being treated as a miss.
pub fn emit_cache_degraded(component: &str, error: &dyn std::fmt::Display) {
    warn!(event = "cache.degraded", component = %component, error = %error);
}
