//! Merging selected components into one pipeline.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_yaml::{Mapping, Value};

use crate::component::Component;
use crate::decision::Decision;
use crate::error::Result;

/// What one component contributes to the merged pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    pub name: String,
    pub included: bool,
    pub reason: String,
    pub base_build_id: Option<String>,
    pub steps: Vec<Value>,
    pub env: BTreeMap<String, String>,
}

impl Selection {
    /// Pick steps and env for `component` according to `decision`.
    ///
    /// An excluded component contributes its `excluded_steps`, its env
    /// overlaid with `excluded_env`, and a handover step per produced artifact
    /// when there is a build to take the artifacts from.
    pub fn new(component: &Component, decision: &Decision) -> Self {
        let included = decision.is_included();
        let (steps, env) = if included {
            (component.steps.clone(), component.env.clone())
        } else {
            let mut steps = component.excluded_steps.clone();
            if let Some(build_id) = &decision.base_build_id {
                steps.extend(
                    component
                        .produces
                        .iter()
                        .map(|artifact| handover_step(artifact, build_id)),
                );
            }
            let mut env = component.env.clone();
            env.extend(component.excluded_env.clone());
            (steps, env)
        };

        Self {
            name: component.name.clone(),
            included,
            reason: decision.reason.clone(),
            base_build_id: decision.base_build_id.clone(),
            steps,
            env,
        }
    }
}

/// Copy `artifact` from `build_id` into the current build.
fn handover_step(artifact: &str, build_id: &str) -> Value {
    let mut step = Mapping::new();
    step.insert(
        Value::from("label"),
        Value::from(format!(":package: {artifact}")),
    );
    step.insert(
        Value::from("command"),
        Value::from(format!(
            "buildkite-agent artifact download --build {build_id} {artifact} . && buildkite-agent artifact upload {artifact}"
        )),
    );
    Value::Mapping(step)
}

/// Pair index-aligned components and decisions into selections.
pub fn select(components: &[Component], decisions: &[Decision]) -> Vec<Selection> {
    components
        .iter()
        .zip(decisions)
        .map(|(c, d)| Selection::new(c, d))
        .collect()
}

/// The merged pipeline document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Pipeline {
    pub env: BTreeMap<String, String>,
    pub steps: Vec<Value>,
}

impl Pipeline {
    /// Concatenate steps in registry order. Env from every component is
    /// merged, later components winning on conflicting keys.
    pub fn merge(selections: &[Selection]) -> Self {
        let mut pipeline = Pipeline::default();
        for selection in selections {
            pipeline.env.extend(selection.env.clone());
            pipeline.steps.extend(selection.steps.iter().cloned());
        }
        pipeline
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn step(command: &str) -> Value {
        serde_yaml::from_str(&format!("command: {command}")).unwrap()
    }

    fn decision(name: &str, included: bool, base: Option<&str>) -> Decision {
        let changes: BTreeSet<String> = if included {
            ["x".to_string()].into()
        } else {
            BTreeSet::new()
        };
        let d = Decision::new(name, base.map(str::to_string), changes);
        crate::decision::initial_decision(d, &crate::overrides::Overrides::new())
    }

    fn component(name: &str) -> Component {
        let mut c = Component::new(name);
        c.steps = vec![step(&format!("make {name}"))];
        c.excluded_steps = vec![step(&format!("echo skip {name}"))];
        c.env.insert("SHARED".to_string(), name.to_string());
        c
    }

    #[test]
    fn test_included_uses_steps() {
        let s = Selection::new(&component("web"), &decision("web", true, Some("b1")));
        assert_eq!(s.steps, vec![step("make web")]);
    }

    #[test]
    fn test_excluded_uses_excluded_steps_and_env() {
        let mut c = component("web");
        c.excluded_env.insert("WEB_SKIPPED".to_string(), "1".to_string());
        let s = Selection::new(&c, &decision("web", false, Some("b1")));
        assert_eq!(s.steps, vec![step("echo skip web")]);
        assert_eq!(s.env["WEB_SKIPPED"], "1");
        assert_eq!(s.env["SHARED"], "web");
    }

    #[test]
    fn test_excluded_producer_hands_over_artifacts() {
        let c = component("api").producing("schema.json");
        let s = Selection::new(&c, &decision("api", false, Some("build-42")));
        assert_eq!(s.steps.len(), 2);
        let command = s.steps[1].get("command").and_then(Value::as_str).unwrap();
        assert!(command.contains("--build build-42 schema.json"));
    }

    #[test]
    fn test_included_producer_has_no_handover() {
        let c = component("api").producing("schema.json");
        let s = Selection::new(&c, &decision("api", true, Some("build-42")));
        assert_eq!(s.steps, vec![step("make api")]);
    }

    #[test]
    fn test_merge_concatenates_in_order_and_later_env_wins() {
        let selections = select(
            &[component("a"), component("b")],
            &[decision("a", true, Some("b1")), decision("b", false, Some("b1"))],
        );
        let pipeline = Pipeline::merge(&selections);
        assert_eq!(pipeline.steps, vec![step("make a"), step("echo skip b")]);
        assert_eq!(pipeline.env["SHARED"], "b");

        let yaml = pipeline.to_yaml().unwrap();
        assert!(yaml.contains("make a"));
        assert!(yaml.starts_with("env:"));
    }
}
