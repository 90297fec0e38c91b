//! Manual decision overrides.
//!
//! Overrides are read once, before evaluation starts, into an immutable
//! [`Overrides`] value that the decision engine consults.
//!
//! | variable | effect |
//! |---|---|
//! | `PIPELINE_RUN_ALL` | include every component |
//! | `PIPELINE_NO_RUN_<NAME>` | exclude `<name>` |
//! | `PIPELINE_RUN_<NAME>` | include `<name>` |
//! | `PIPELINE_RUN_ONLY=<name>` | include `<name>`, exclude the rest |
//!
//! `<NAME>` is the component name upper-cased with `-` replaced by `_`. Any
//! non-empty value counts as set.

use std::collections::BTreeSet;

use crate::component::env_var_name;

const RUN_ALL: &str = "PIPELINE_RUN_ALL";
const RUN_ONLY: &str = "PIPELINE_RUN_ONLY";
const RUN_PREFIX: &str = "PIPELINE_RUN_";
const NO_RUN_PREFIX: &str = "PIPELINE_NO_RUN_";

/// Which override forced a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Forced {
    RunAll,
    Exclude(String),
    Include(String),
    Only { included: bool },
}

impl Forced {
    pub fn included(&self) -> bool {
        match self {
            Forced::RunAll | Forced::Include(_) => true,
            Forced::Exclude(_) => false,
            Forced::Only { included } => *included,
        }
    }

    pub fn reason(&self) -> String {
        match self {
            Forced::RunAll => format!("forced by {RUN_ALL}"),
            Forced::Exclude(var) => format!("forced exclude by {var}"),
            Forced::Include(var) => format!("forced include by {var}"),
            Forced::Only { .. } => format!("{RUN_ONLY} was specified"),
        }
    }
}

/// Manual overrides, keyed by `UPPER_SNAKE_CASE` component name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub run_all: bool,
    pub force_include: BTreeSet<String>,
    pub force_exclude: BTreeSet<String>,
    pub only: Option<String>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut overrides = Self::default();
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref());
            if value.is_empty() {
                continue;
            }
            if key == RUN_ALL {
                overrides.run_all = true;
            } else if key == RUN_ONLY {
                overrides.only = Some(value.to_string());
            } else if let Some(name) = key.strip_prefix(NO_RUN_PREFIX) {
                overrides.force_exclude.insert(name.to_string());
            } else if let Some(name) = key.strip_prefix(RUN_PREFIX) {
                overrides.force_include.insert(name.to_string());
            }
        }
        overrides
    }

    pub fn run_all(mut self) -> Self {
        self.run_all = true;
        self
    }

    pub fn include(mut self, component: &str) -> Self {
        self.force_include.insert(env_var_name(component));
        self
    }

    pub fn exclude(mut self, component: &str) -> Self {
        self.force_exclude.insert(env_var_name(component));
        self
    }

    pub fn only(mut self, component: &str) -> Self {
        self.only = Some(component.to_string());
        self
    }

    /// The override deciding `component`, if any, by precedence: run-all,
    /// then exclude, then include, then run-only.
    pub fn forced(&self, component: &str) -> Option<Forced> {
        if self.run_all {
            return Some(Forced::RunAll);
        }
        let var = env_var_name(component);
        if self.force_exclude.contains(&var) {
            return Some(Forced::Exclude(format!("{NO_RUN_PREFIX}{var}")));
        }
        if self.force_include.contains(&var) {
            return Some(Forced::Include(format!("{RUN_PREFIX}{var}")));
        }
        self.only.as_ref().map(|only| Forced::Only {
            included: only == component,
        })
    }
}
