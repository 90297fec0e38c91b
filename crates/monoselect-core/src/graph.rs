//! Component ordering graph.
//!
//! An edge `A → B` means "A must be applied before B": either B expects an
//! artifact A produces, or B `depends_on` A. The graph must be acyclic.
//!
//! Ordering uses Kahn's algorithm with a name-ordered ready set, so ties are
//! broken by component name and the result does not depend on the order in
//! which descriptors were found on disk.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::component::Component;
use crate::error::{Result, SelectError};

/// Directed ordering graph over component names.
#[derive(Debug, Clone, Default)]
pub struct ComponentGraph {
    nodes: BTreeSet<String>,
    /// `before → {after, ...}` (downstream adjacency)
    downstream: BTreeMap<String, BTreeSet<String>>,
    /// `after → {before, ...}` (upstream adjacency)
    upstream: BTreeMap<String, BTreeSet<String>>,
}

impl ComponentGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph from artifact and `depends_on` declarations.
    ///
    /// Fails if an expected artifact has no producer (or several), or if a
    /// dependency names an unknown component.
    pub fn from_components(components: &[Component]) -> Result<Self> {
        let mut graph = Self::new();
        for component in components {
            graph.add_node(&component.name);
        }

        let mut producers: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for component in components {
            for artifact in &component.produces {
                producers
                    .entry(artifact.as_str())
                    .or_default()
                    .push(component.name.as_str());
            }
        }

        for component in components {
            for expected in &component.expects {
                let producer = match producers.get(expected.as_str()).map(Vec::as_slice) {
                    Some([single]) => *single,
                    Some(many) if many.len() > 1 => {
                        return Err(SelectError::AmbiguousArtifact {
                            artifact: expected.clone(),
                            producers: many.iter().map(|s| s.to_string()).collect(),
                        })
                    }
                    _ => {
                        return Err(SelectError::UnresolvedArtifact {
                            artifact: expected.clone(),
                            component: component.name.clone(),
                        })
                    }
                };
                graph.add_edge(producer, &component.name);
            }

            for dependency in &component.depends_on {
                if !graph.nodes.contains(dependency) {
                    return Err(SelectError::UnresolvedDependency {
                        dependency: dependency.clone(),
                        component: component.name.clone(),
                    });
                }
                graph.add_edge(dependency, &component.name);
            }
        }

        Ok(graph)
    }

    pub fn add_node(&mut self, name: &str) {
        self.nodes.insert(name.to_string());
        self.downstream.entry(name.to_string()).or_default();
        self.upstream.entry(name.to_string()).or_default();
    }

    /// Record that `before` must precede `after`. Both must be registered.
    pub fn add_edge(&mut self, before: &str, after: &str) {
        self.downstream
            .entry(before.to_string())
            .or_default()
            .insert(after.to_string());
        self.upstream
            .entry(after.to_string())
            .or_default()
            .insert(before.to_string());
    }

    /// Names in dependency order, ties broken by name.
    ///
    /// Returns [`SelectError::Cycle`] naming one edge of a cycle.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut in_degree: BTreeMap<&str, usize> = self
            .nodes
            .iter()
            .map(|n| (n.as_str(), self.upstream.get(n).map_or(0, BTreeSet::len)))
            .collect();

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&n, _)| n)
            .collect();

        let mut sorted = Vec::with_capacity(self.nodes.len());
        while let Some(node) = ready.pop_first() {
            sorted.push(node.to_string());
            for next in self.downstream.get(node).into_iter().flatten() {
                if let Some(deg) = in_degree.get_mut(next.as_str()) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert(next.as_str());
                    }
                }
            }
        }

        if sorted.len() != self.nodes.len() {
            return Err(self.cycle_edge(&in_degree));
        }
        Ok(sorted)
    }

    /// Every unsorted node still has an unsorted predecessor. Walking
    /// predecessors from the smallest such node must revisit a node, and the
    /// step that closes the walk is an edge on the cycle itself.
    fn cycle_edge(&self, in_degree: &BTreeMap<&str, usize>) -> SelectError {
        let remaining: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, &deg)| deg > 0)
            .map(|(&n, _)| n)
            .collect();

        let mut walked: BTreeSet<&str> = BTreeSet::new();
        let mut current = remaining.first().copied();
        while let Some(to) = current {
            walked.insert(to);
            let Some(from) = self
                .predecessors_of(to)
                .into_iter()
                .find(|p| remaining.contains(p))
            else {
                break;
            };
            if walked.contains(from) {
                return SelectError::Cycle {
                    from: from.to_string(),
                    to: to.to_string(),
                };
            }
            current = Some(from);
        }

        SelectError::Cycle {
            from: "?".to_string(),
            to: remaining.first().map_or("?", |n| n).to_string(),
        }
    }

    /// Direct predecessors of `name`.
    pub fn predecessors_of(&self, name: &str) -> Vec<&str> {
        self.upstream
            .get(name)
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect()
    }
}

/// Sort components so producers and dependencies precede their consumers.
pub fn sort_components(components: Vec<Component>) -> Result<Vec<Component>> {
    let graph = ComponentGraph::from_components(&components)?;
    let order = graph.topological_order()?;

    let mut by_name: BTreeMap<String, Component> = components
        .into_iter()
        .map(|c| (c.name.clone(), c))
        .collect();

    debug!(order = ?order, "component application order");
    Ok(order
        .into_iter()
        .filter_map(|name| by_name.remove(&name))
        .collect())
}
