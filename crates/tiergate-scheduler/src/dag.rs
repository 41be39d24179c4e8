//! DAG resolution for workflow tiers.

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tiergate_core::workflow::{TierDefinition, WorkflowDefinition};

#[derive(Debug, Error)]
pub enum DagError {
    #[error("Cycle detected in tier dependencies: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },
    #[error("Tier '{tier}' depends on unknown tier '{dependency}'")]
    UnknownDependency { tier: String, dependency: String },
    #[error("Duplicate tier name: {0}")]
    DuplicateTier(String),
    #[error("Workflow has no tiers")]
    EmptyWorkflow,
}

impl From<DagError> for tiergate_core::Error {
    fn from(err: DagError) -> Self {
        match err {
            DagError::CycleDetected { path } => tiergate_core::Error::CyclicDependency { path },
            DagError::UnknownDependency { tier, dependency } => {
                tiergate_core::Error::UnknownDependency { tier, dependency }
            }
            DagError::DuplicateTier(name) => tiergate_core::Error::DuplicateTier(name),
            DagError::EmptyWorkflow => {
                tiergate_core::Error::InvalidWorkflow("workflow has no tiers".to_string())
            }
        }
    }
}

/// A node in the tier DAG.
#[derive(Debug, Clone)]
pub struct TierNode {
    pub name: String,
    pub definition: TierDefinition,
}

/// Directed acyclic graph of tiers. Edges point from a dependency to its dependent.
#[derive(Debug)]
pub struct TierDag {
    graph: DiGraph<TierNode, ()>,
    name_to_index: HashMap<String, NodeIndex>,
    order: Vec<NodeIndex>,
}

impl TierDag {
    /// Tiers with no dependencies.
    pub fn roots(&self) -> Vec<&TierNode> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .count()
                    == 0
            })
            .filter_map(|idx| self.graph.node_weight(idx))
            .collect()
    }

    /// Tiers `tier` directly depends on.
    pub fn predecessors(&self, tier: &str) -> Vec<&TierNode> {
        let Some(&idx) = self.name_to_index.get(tier) else {
            return vec![];
        };
        let mut nodes: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .collect();
        nodes.sort();
        nodes.dedup();
        nodes
            .into_iter()
            .filter_map(|n| self.graph.node_weight(n))
            .collect()
    }

    /// Every tier reachable downstream of `tier`.
    pub fn transitive_dependents(&self, tier: &str) -> Vec<String> {
        let Some(&start) = self.name_to_index.get(tier) else {
            return vec![];
        };
        let mut seen = HashSet::new();
        let mut stack = vec![start];
        while let Some(idx) = stack.pop() {
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if seen.insert(next) {
                    stack.push(next);
                }
            }
        }
        self.order
            .iter()
            .filter(|idx| seen.contains(idx))
            .map(|&idx| self.graph[idx].name.clone())
            .collect()
    }

    /// Tiers in dependency order.
    pub fn topological_order(&self) -> Vec<&TierNode> {
        self.order
            .iter()
            .filter_map(|&idx| self.graph.node_weight(idx))
            .collect()
    }

    /// Tiers in declaration order.
    pub fn tiers(&self) -> Vec<&TierNode> {
        self.graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx))
            .collect()
    }

    pub fn get(&self, tier: &str) -> Option<&TierNode> {
        self.name_to_index
            .get(tier)
            .and_then(|&idx| self.graph.node_weight(idx))
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Check if a tier is ready to run given the tiers that have finished.
    pub fn is_ready(&self, tier: &str, finished: &HashSet<String>) -> bool {
        self.predecessors(tier)
            .iter()
            .all(|pred| finished.contains(&pred.name))
    }
}

/// Builder for constructing tier DAGs.
pub struct DagBuilder;

impl DagBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build a DAG from a workflow definition.
    pub fn build(&self, workflow: &WorkflowDefinition) -> Result<TierDag, DagError> {
        if workflow.tiers.is_empty() {
            return Err(DagError::EmptyWorkflow);
        }

        let mut graph = DiGraph::new();
        let mut name_to_index = HashMap::new();

        for tier in &workflow.tiers {
            let node = TierNode {
                name: tier.name.clone(),
                definition: tier.clone(),
            };
            let idx = graph.add_node(node);
            if name_to_index.insert(tier.name.clone(), idx).is_some() {
                return Err(DagError::DuplicateTier(tier.name.clone()));
            }
        }

        for tier in &workflow.tiers {
            let tier_idx = name_to_index[&tier.name];
            for dep in &tier.depends_on {
                let dep_idx = name_to_index.get(dep).ok_or_else(|| DagError::UnknownDependency {
                    tier: tier.name.clone(),
                    dependency: dep.clone(),
                })?;
                graph.add_edge(*dep_idx, tier_idx, ());
            }
        }

        let order = match toposort(&graph, None) {
            Ok(order) => order,
            Err(cycle) => {
                return Err(DagError::CycleDetected {
                    path: cycle_path(&graph, cycle.node_id()),
                });
            }
        };

        Ok(TierDag {
            graph,
            name_to_index,
            order,
        })
    }
}

impl Default for DagBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Walk edges from `start` back to itself and name every tier on the way.
fn cycle_path(graph: &DiGraph<TierNode, ()>, start: NodeIndex) -> Vec<String> {
    fn walk(
        graph: &DiGraph<TierNode, ()>,
        current: NodeIndex,
        target: NodeIndex,
        path: &mut Vec<NodeIndex>,
        visited: &mut HashSet<NodeIndex>,
    ) -> bool {
        for next in graph.neighbors_directed(current, Direction::Outgoing) {
            if next == target {
                path.push(target);
                return true;
            }
            if visited.insert(next) {
                path.push(next);
                if walk(graph, next, target, path, visited) {
                    return true;
                }
                path.pop();
            }
        }
        false
    }

    let mut path = vec![start];
    let mut visited = HashSet::from([start]);
    if !walk(graph, start, start, &mut path, &mut visited) {
        path.push(start);
    }
    path.into_iter().map(|idx| graph[idx].name.clone()).collect()
}
