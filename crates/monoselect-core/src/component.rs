//! Component descriptors.
//!
//! A component is one independently buildable part of the monorepo. It is
//! declared by a YAML descriptor holding the usual pipeline `steps` and `env`
//! plus a `monorepo` section:
//!
//! ```yaml
//! monorepo:
//!   name: web            # defaults to the <name> in pipeline.<name>.yml
//!   matches: [web/**, "*.lock"]
//!   produces: web.tar.gz
//!   expects: [schema.json]
//!   depends_on: api
//!   excluded_steps: [{ command: "echo skipped" }]
//!   excluded_env: { WEB_SKIPPED: "1" }
//!   pure: true
//! steps:
//!   - command: make web
//! env:
//!   WEB_IMAGE: web
//! ```
//!
//! Descriptors are validated once here, at load time, into a typed
//! [`Component`]. Anything structurally wrong becomes a per-file
//! [`SelectError::Config`], except a list-shaped `env`, which is fatal.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_yaml::Value;
use tracing::debug;

use crate::error::{Result, SelectError};
use crate::matcher::PatternSet;

/// Which files a component considers relevant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matches {
    /// `matches: true`
    Everything,
    /// `matches: false` (or absent): only overrides and dependencies include it.
    Nothing,
    /// Author-supplied glob patterns.
    Patterns(Vec<String>),
}

/// A validated component descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub name: String,
    /// Descriptor path relative to the repository root, `/`-separated.
    pub descriptor_path: String,
    pub matches: Matches,
    pub produces: Vec<String>,
    pub expects: Vec<String>,
    pub depends_on: Vec<String>,
    pub steps: Vec<Value>,
    pub excluded_steps: Vec<Value>,
    pub env: BTreeMap<String, String>,
    pub excluded_env: BTreeMap<String, String>,
    pub pure: bool,
}

impl Component {
    /// A component with no patterns, artifacts or steps.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            descriptor_path: format!(".buildkite/pipeline.{name}.yml"),
            name,
            matches: Matches::Nothing,
            produces: Vec::new(),
            expects: Vec::new(),
            depends_on: Vec::new(),
            steps: Vec::new(),
            excluded_steps: Vec::new(),
            env: BTreeMap::new(),
            excluded_env: BTreeMap::new(),
            pure: false,
        }
    }

    pub fn with_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.matches = Matches::Patterns(patterns.into_iter().map(Into::into).collect());
        self
    }

    pub fn matching_everything(mut self) -> Self {
        self.matches = Matches::Everything;
        self
    }

    pub fn producing(mut self, artifact: &str) -> Self {
        self.produces.push(artifact.to_string());
        self
    }

    pub fn expecting(mut self, artifact: &str) -> Self {
        self.expects.push(artifact.to_string());
        self
    }

    pub fn depending_on(mut self, dependency: &str) -> Self {
        self.depends_on.push(dependency.to_string());
        self
    }

    pub fn pure(mut self) -> Self {
        self.pure = true;
        self
    }

    /// `UPPER_SNAKE_CASE` form used in override variable names.
    pub fn env_var_name(&self) -> String {
        env_var_name(&self.name)
    }

    /// Patterns used to decide whether a diff touches this component.
    ///
    /// Pattern lists implicitly include the descriptor itself, so edits to
    /// a component's configuration retrigger it. `matches: false` matches
    /// nothing at all and `matches: true` matches every file.
    pub fn match_patterns_for_changes(&self) -> Vec<String> {
        match &self.matches {
            Matches::Everything => vec!["**/*".to_string()],
            Matches::Nothing => Vec::new(),
            Matches::Patterns(patterns) => {
                let mut all = patterns.clone();
                all.push(globset::escape(&self.descriptor_path));
                all
            }
        }
    }

    /// Patterns whose files feed the content hash: the change patterns plus,
    /// always, the descriptor.
    pub fn match_patterns_for_hash(&self) -> Vec<String> {
        let mut all = self.match_patterns_for_changes();
        let descriptor = globset::escape(&self.descriptor_path);
        if !all.contains(&descriptor) {
            all.push(descriptor);
        }
        all
    }

    /// Parse and validate a descriptor.
    ///
    /// `default_name` is the `<name>` part of `pipeline.<name>.yml`, used
    /// when the descriptor does not name itself.
    pub fn from_yaml(descriptor_path: &str, default_name: Option<&str>, text: &str) -> Result<Self> {
        let config_error = |detail: String| SelectError::Config {
            path: descriptor_path.to_string(),
            detail,
        };

        let document: Value =
            serde_yaml::from_str(text).map_err(|e| config_error(format!("not valid YAML: {e}")))?;
        let Value::Mapping(mut document) = document else {
            return Err(config_error("expected a mapping at the top level".to_string()));
        };

        let monorepo = document.remove("monorepo");
        let declared_name = monorepo
            .as_ref()
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty());
        let Some(name) = declared_name.or(default_name.filter(|n| !n.is_empty())) else {
            return Err(config_error("descriptor has no component name".to_string()));
        };
        let name = name.to_string();

        let env = match document.remove("env") {
            None | Some(Value::Null) => BTreeMap::new(),
            Some(mapping @ Value::Mapping(_)) => {
                scalar_map(mapping).map_err(|e| config_error(format!("env: {e}")))?
            }
            Some(_) => return Err(SelectError::InvalidEnv { component: name }),
        };

        let steps = match document.remove("steps") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Sequence(steps)) => steps,
            Some(_) => return Err(config_error("steps must be a list".to_string())),
        };

        let Some(monorepo @ Value::Mapping(_)) = monorepo else {
            return Err(config_error(format!(
                "{name} has no monorepo configuration"
            )));
        };
        let section: MonorepoSection = serde_yaml::from_value(monorepo)
            .map_err(|e| config_error(format!("monorepo section: {e}")))?;

        if !section.unknown.is_empty() {
            debug!(
                component = %name,
                unknown = ?section.unknown.keys().collect::<Vec<_>>(),
                "ignoring unknown monorepo properties"
            );
        }

        let excluded_env = match section.excluded_env {
            None | Some(Value::Null) => BTreeMap::new(),
            Some(mapping @ Value::Mapping(_)) => {
                scalar_map(mapping).map_err(|e| config_error(format!("excluded_env: {e}")))?
            }
            Some(_) => return Err(SelectError::InvalidEnv { component: name }),
        };

        let matches = match section.matches {
            None | Some(MatchSpec::All(false)) => Matches::Nothing,
            Some(MatchSpec::All(true)) => Matches::Everything,
            Some(MatchSpec::Patterns(patterns)) => Matches::Patterns(patterns.into_vec()),
        };

        let component = Component {
            name,
            descriptor_path: descriptor_path.to_string(),
            matches,
            produces: section.produces.map(OneOrMany::into_vec).unwrap_or_default(),
            expects: section.expects.map(OneOrMany::into_vec).unwrap_or_default(),
            depends_on: section.depends_on.map(OneOrMany::into_vec).unwrap_or_default(),
            steps,
            excluded_steps: section.excluded_steps.unwrap_or_default(),
            env,
            excluded_env,
            pure: section.pure.unwrap_or(false),
        };

        // Reject unusable globs here rather than mid-evaluation.
        PatternSet::new(&component.match_patterns_for_hash())
            .map_err(|e| config_error(e.to_string()))?;

        Ok(component)
    }
}

/// `UPPER_SNAKE_CASE` form of a component name.
pub fn env_var_name(name: &str) -> String {
    name.to_uppercase().replace('-', "_")
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MatchSpec {
    All(bool),
    Patterns(OneOrMany),
}

#[derive(Debug, Deserialize)]
struct MonorepoSection {
    #[serde(default)]
    #[allow(dead_code)]
    name: Option<String>,
    #[serde(default)]
    expects: Option<OneOrMany>,
    #[serde(default)]
    produces: Option<OneOrMany>,
    #[serde(default)]
    depends_on: Option<OneOrMany>,
    #[serde(default)]
    matches: Option<MatchSpec>,
    #[serde(default)]
    excluded_steps: Option<Vec<Value>>,
    #[serde(default)]
    excluded_env: Option<Value>,
    #[serde(default)]
    pure: Option<bool>,
    #[serde(flatten)]
    unknown: BTreeMap<String, Value>,
}

/// Flatten a YAML mapping of scalars into strings.
fn scalar_map(value: Value) -> std::result::Result<BTreeMap<String, String>, String> {
    let Value::Mapping(mapping) = value else {
        return Err("expected a mapping".to_string());
    };
    let mut out = BTreeMap::new();
    for (key, value) in mapping {
        let key = scalar_string(&key).ok_or("keys must be scalars")?;
        let value = scalar_string(&value).ok_or_else(|| format!("{key} must be a scalar"))?;
        out.insert(key, value);
    }
    Ok(out)
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}
