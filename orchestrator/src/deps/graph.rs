//! Component dependency graph

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::OrchestratorError;
use crate::models::analysis::{ComponentConfig, ComponentKind};

/// "Depends on" edge from a component to `name`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub name: String,

    /// Hard prerequisite; optional edges only wire configuration when available
    pub required: bool,
}

impl DependencyEdge {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
        }
    }
}

/// A component as declared for dependency resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub kind: ComponentKind,

    #[serde(default)]
    pub depends_on: Vec<DependencyEdge>,

    #[serde(default)]
    pub config: ComponentConfig,
}

impl ComponentSpec {
    pub fn new(kind: ComponentKind) -> Self {
        Self {
            kind,
            depends_on: Vec::new(),
            config: ComponentConfig::new(),
        }
    }

    pub fn depends_on(mut self, edge: DependencyEdge) -> Self {
        self.depends_on.push(edge);
        self
    }

    pub fn with_config(mut self, config: ComponentConfig) -> Self {
        self.config = config;
        self
    }
}

/// Acyclic graph of the components of one deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyGraph {
    deployment_id: String,
    nodes: IndexMap<String, ComponentSpec>,
    order: Vec<String>,
}

impl DependencyGraph {
    /// Validate the declared components and resolve their order.
    ///
    /// Fails with `UnknownDependency` for an edge to an undeclared component and
    /// with `CyclicDependency` (naming the cycle) when the edges loop.
    pub fn build(
        deployment_id: impl Into<String>,
        components: IndexMap<String, ComponentSpec>,
    ) -> Result<Self, OrchestratorError> {
        for (name, spec) in &components {
            for edge in &spec.depends_on {
                if !components.contains_key(&edge.name) {
                    return Err(OrchestratorError::UnknownDependency {
                        component: name.clone(),
                        dependency: edge.name.clone(),
                    });
                }
            }
        }

        let order = topological_order(&components)?;

        Ok(Self {
            deployment_id: deployment_id.into(),
            nodes: components,
            order,
        })
    }

    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    /// Deployment order: every component after all of its dependencies
    pub fn resolution_order(&self) -> &[String] {
        &self.order
    }

    pub fn component(&self, name: &str) -> Option<&ComponentSpec> {
        self.nodes.get(name)
    }

    pub(crate) fn component_mut(&mut self, name: &str) -> Option<&mut ComponentSpec> {
        self.nodes.get_mut(name)
    }

    /// Component names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Components that depend on `name`
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|(_, spec)| spec.depends_on.iter().any(|e| e.name == name))
            .map(|(n, _)| n.as_str())
            .collect()
    }
}

/// Kahn's algorithm; among ready components the lowest kind priority goes
/// first, then declaration order.
fn topological_order(
    components: &IndexMap<String, ComponentSpec>,
) -> Result<Vec<String>, OrchestratorError> {
    let mut pending: Vec<usize> = components
        .values()
        .map(|spec| {
            spec.depends_on
                .iter()
                .map(|e| e.name.as_str())
                .collect::<HashSet<_>>()
                .len()
        })
        .collect();

    let mut ready: BinaryHeap<Reverse<(u8, usize)>> = BinaryHeap::new();
    for (index, spec) in components.values().enumerate() {
        if pending[index] == 0 {
            ready.push(Reverse((spec.kind.priority(), index)));
        }
    }

    let mut order = Vec::with_capacity(components.len());
    while let Some(Reverse((_, index))) = ready.pop() {
        let Some((name, _)) = components.get_index(index) else {
            continue;
        };
        order.push(name.clone());

        for (dependent, spec) in components.values().enumerate() {
            if pending[dependent] == 0 {
                continue;
            }
            if spec.depends_on.iter().any(|e| &e.name == name) {
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    ready.push(Reverse((spec.kind.priority(), dependent)));
                }
            }
        }
    }

    if order.len() < components.len() {
        return Err(OrchestratorError::CyclicDependency(find_cycle(
            components, &pending,
        )));
    }

    Ok(order)
}

/// Walk unresolved dependencies from the first stuck component until a
/// component repeats; every stuck component has at least one stuck dependency.
fn find_cycle(components: &IndexMap<String, ComponentSpec>, pending: &[usize]) -> Vec<String> {
    let stuck = |name: &str| {
        components
            .get_index_of(name)
            .is_some_and(|i| pending[i] > 0)
    };

    let Some(start) = pending.iter().position(|p| *p > 0) else {
        return Vec::new();
    };

    let mut path: Vec<usize> = vec![start];
    loop {
        let Some((_, spec)) = components.get_index(*path.last().unwrap_or(&start)) else {
            break;
        };
        let next = spec
            .depends_on
            .iter()
            .find(|e| stuck(&e.name))
            .and_then(|e| components.get_index_of(&e.name));

        let Some(next) = next else {
            break;
        };
        if let Some(pos) = path.iter().position(|i| *i == next) {
            let mut cycle: Vec<String> = path[pos..]
                .iter()
                .filter_map(|i| components.get_index(*i).map(|(n, _)| n.clone()))
                .collect();
            if let Some(first) = cycle.first().cloned() {
                cycle.push(first);
            }
            return cycle;
        }
        path.push(next);
    }

    path.iter()
        .filter_map(|i| components.get_index(*i).map(|(n, _)| n.clone()))
        .collect()
}
