//! Per-component build decisions.
//!
//! Each phase takes the previous decision set by value and returns the next
//! one; nothing is shared between phases. Decisions are index-aligned with
//! the registry's component order.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::component::Component;
use crate::obs;
use crate::overrides::Overrides;

/// Reason for a component left out because nothing it watches changed.
pub const NO_MATCHING_CHANGES: &str = "no matching changes";

/// Reason for every component when no base build could be resolved.
pub const NO_BASE_BUILD: &str = "no previous successful build";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Inclusion {
    Undecided,
    Included,
    Excluded,
}

/// The outcome of one evaluation for one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub component: String,
    /// Build to diff against and fetch artifacts from. `None` in fallback mode.
    pub base_build_id: Option<String>,
    pub matched_changes: BTreeSet<String>,
    pub inclusion: Inclusion,
    pub reason: String,
}

impl Decision {
    pub fn new(
        component: &str,
        base_build_id: Option<String>,
        matched_changes: BTreeSet<String>,
    ) -> Self {
        Self {
            component: component.to_string(),
            base_build_id,
            matched_changes,
            inclusion: Inclusion::Undecided,
            reason: NO_MATCHING_CHANGES.to_string(),
        }
    }

    pub fn is_included(&self) -> bool {
        self.inclusion == Inclusion::Included
    }

    fn decide(mut self, included: bool, reason: impl Into<String>) -> Self {
        self.inclusion = if included {
            Inclusion::Included
        } else {
            Inclusion::Excluded
        };
        self.reason = reason.into();
        self
    }
}

/// Decide one component in isolation. The first matching rule wins:
/// overrides, then fallback mode, then matched changes.
pub fn initial_decision(decision: Decision, overrides: &Overrides) -> Decision {
    if let Some(forced) = overrides.forced(&decision.component) {
        let included = forced.included();
        return decision.decide(included, forced.reason());
    }

    if decision.base_build_id.is_none() {
        return decision.decide(true, NO_BASE_BUILD);
    }

    if decision.matched_changes.is_empty() {
        return decision.decide(false, NO_MATCHING_CHANGES);
    }

    let count = decision.matched_changes.len();
    let reason = format!(
        "{count} matching change{}: {}",
        if count == 1 { "" } else { "s" },
        decision
            .matched_changes
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );
    decision.decide(true, reason)
}

pub fn decide_all(decisions: Vec<Decision>, overrides: &Overrides) -> Vec<Decision> {
    decisions
        .into_iter()
        .map(|d| initial_decision(d, overrides))
        .collect()
}

/// Include every dependency of an included component.
///
/// Sweeps `depends_on` edges in reverse registry order, repeating until a
/// sweep changes nothing, so chains of any length settle regardless of the
/// order edges are visited in. `components` and `decisions` must be
/// index-aligned.
pub fn propagate_depends_on(components: &[Component], mut decisions: Vec<Decision>) -> Vec<Decision> {
    let index: HashMap<&str, usize> = decisions
        .iter()
        .enumerate()
        .map(|(i, d)| (d.component.as_str(), i))
        .collect();

    let edges: Vec<(usize, usize)> = components
        .iter()
        .filter_map(|c| index.get(c.name.as_str()).map(|&i| (i, c)))
        .flat_map(|(dependent, c)| {
            c.depends_on
                .iter()
                .filter_map(|dep| index.get(dep.as_str()).copied())
                .map(move |dependency| (dependent, dependency))
                .collect::<Vec<_>>()
        })
        .collect();

    loop {
        let mut changed = false;
        for &(dependent, dependency) in edges.iter().rev() {
            if decisions[dependent].is_included() && !decisions[dependency].is_included() {
                let from = decisions[dependent].component.clone();
                obs::emit_pulled_in(&decisions[dependency].component, &from);
                decisions[dependency].inclusion = Inclusion::Included;
                decisions[dependency].reason = format!("pulled in by a depends_on from {from}");
                changed = true;
            }
        }
        if !changed {
            return decisions;
        }
    }
}
