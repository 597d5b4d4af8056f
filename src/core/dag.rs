//! Intra-wave dependency graph.
//!
//! A wave may contain tasks that depend on other tasks of the same wave.
//! `WaveGraph` records those edges with petgraph so the orchestrator can
//! release tasks in dependency order. Dependencies on tasks outside the
//! wave are not edges here; they are checked against earlier outcomes.

use crate::core::task::Task;
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

/// Dependency graph over the tasks of one wave.
///
/// Nodes carry the task's position within the wave slice; an edge
/// `a -> b` means `b` lists `a` as a dependency.
pub struct WaveGraph {
    graph: DiGraph<usize, ()>,
    nodes: Vec<NodeIndex>,
}

impl WaveGraph {
    /// Build the graph for `wave`.
    pub fn build(wave: &[Task]) -> Self {
        let mut graph = DiGraph::with_capacity(wave.len(), 0);
        let nodes: Vec<NodeIndex> = (0..wave.len()).map(|pos| graph.add_node(pos)).collect();

        let positions: HashMap<&str, usize> = wave
            .iter()
            .enumerate()
            .map(|(pos, task)| (task.id.as_str(), pos))
            .collect();

        for (pos, task) in wave.iter().enumerate() {
            for dep in &task.dependencies {
                if let Some(&dep_pos) = positions.get(dep.as_str()) {
                    graph.add_edge(nodes[dep_pos], nodes[pos], ());
                }
            }
        }

        Self { graph, nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of dependency edges that stay inside the wave.
    pub fn internal_dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn has_cycle(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Positions not yet resolved whose in-wave dependencies are all resolved.
    ///
    /// Returned in ascending position order, i.e. submission order.
    pub fn ready_positions(&self, resolved: &HashSet<usize>) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(pos, _)| !resolved.contains(pos))
            .filter(|(_, &node)| {
                self.graph
                    .neighbors_directed(node, Direction::Incoming)
                    .all(|dep| {
                        self.graph
                            .node_weight(dep)
                            .map(|dep_pos| resolved.contains(dep_pos))
                            .unwrap_or(false)
                    })
            })
            .map(|(pos, _)| pos)
            .collect()
    }

    /// Positions that can never become ready (members of, or downstream of, a cycle).
    pub fn stuck_positions(&self, resolved: &HashSet<usize>) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|pos| !resolved.contains(pos))
            .collect()
    }
}

impl std::fmt::Debug for WaveGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaveGraph")
            .field("tasks", &self.len())
            .field("dependencies", &self.internal_dependency_count())
            .finish()
    }
}
