//! Task graph builder using petgraph.
//!
//! Edges point from a dependency to its dependent, so a topological walk
//! yields dependencies first. Node indices follow insertion order, which is
//! the tie-breaker for every ordering this crate produces.

use crate::{Error, Result, TaskNodeData};
use petgraph::Direction;
use petgraph::algo::{is_cyclic_directed, tarjan_scc};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::IntoNodeReferences;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use tracing::debug;

/// A node in the task graph.
#[derive(Debug, Clone)]
pub struct GraphNode<T> {
    /// Name of the task.
    pub name: String,
    /// The task data.
    pub task: T,
}

/// Task graph for dependency resolution and execution ordering.
///
/// This is a generic graph that can hold any task type implementing [`TaskNodeData`].
#[derive(Debug)]
pub struct TaskGraph<T: TaskNodeData> {
    /// The directed graph of tasks.
    graph: DiGraph<GraphNode<T>, ()>,
    /// Map from task names to node indices.
    name_to_node: HashMap<String, NodeIndex>,
}

impl<T: TaskNodeData> Default for TaskGraph<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TaskNodeData> TaskGraph<T> {
    /// Create a new empty task graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            name_to_node: HashMap::new(),
        }
    }

    /// Add a single task to the graph.
    ///
    /// If a task with the same name already exists, returns the existing node index.
    pub fn add_task(&mut self, name: &str, task: T) -> NodeIndex {
        if let Some(&node) = self.name_to_node.get(name) {
            return node;
        }

        let node_index = self.graph.add_node(GraphNode {
            name: name.to_string(),
            task,
        });
        self.name_to_node.insert(name.to_string(), node_index);
        debug!("Added task node '{}'", name);

        node_index
    }

    /// Add dependency edges after all tasks have been added.
    ///
    /// # Errors
    ///
    /// Returns an error if any task depends on a non-existent task.
    pub fn add_dependency_edges(&mut self) -> Result<()> {
        let mut missing_deps = Vec::new();
        let mut edges_to_add = Vec::new();

        for (node_index, node) in self.graph.node_references() {
            for dep_name in node.task.dependency_names() {
                if let Some(&dep_node_index) = self.name_to_node.get(dep_name) {
                    edges_to_add.push((dep_node_index, node_index));
                } else {
                    missing_deps.push((node.name.clone(), dep_name.to_string()));
                }
            }
        }

        if !missing_deps.is_empty() {
            return Err(Error::MissingDependencies {
                missing: missing_deps,
            });
        }

        for (from, to) in edges_to_add {
            if !self.graph.contains_edge(from, to) {
                self.graph.add_edge(from, to, ());
            }
        }

        Ok(())
    }

    /// Check if the graph has cycles. A task depending on itself is a cycle.
    #[must_use]
    pub fn has_cycles(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Every dependency cycle, as task names.
    ///
    /// Cycles are strongly connected components with more than one task, or a
    /// single task with an edge to itself. Members and cycles are listed in
    /// insertion order.
    #[must_use]
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut cycles: Vec<Vec<NodeIndex>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| match scc.as_slice() {
                [single] => self.graph.contains_edge(*single, *single),
                members => members.len() > 1,
            })
            .map(|mut scc| {
                scc.sort_unstable();
                scc
            })
            .collect();
        cycles.sort_unstable();

        cycles
            .into_iter()
            .map(|scc| scc.into_iter().map(|idx| self.graph[idx].name.clone()).collect())
            .collect()
    }

    /// Get the topologically sorted list of tasks.
    ///
    /// Kahn's algorithm over a min-heap of node indices: whenever several
    /// tasks are ready, the earliest inserted goes first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CycleDetected`] naming every cycle if the graph is not a DAG.
    pub fn topological_sort(&self) -> Result<Vec<GraphNode<T>>> {
        Ok(self
            .topological_indices()?
            .into_iter()
            .map(|idx| self.graph[idx].clone())
            .collect())
    }

    /// Node indices in the order produced by [`TaskGraph::topological_sort`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::CycleDetected`] if the graph is not a DAG.
    pub fn topological_indices(&self) -> Result<Vec<NodeIndex>> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| self.graph.edges_directed(idx, Direction::Incoming).count())
            .collect();

        let mut ready: BinaryHeap<Reverse<NodeIndex>> = self
            .graph
            .node_indices()
            .filter(|idx| in_degree[idx.index()] == 0)
            .map(Reverse)
            .collect();

        let mut sorted = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse(idx)) = ready.pop() {
            sorted.push(idx);
            for dependent in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                let degree = &mut in_degree[dependent.index()];
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        if sorted.len() < self.graph.node_count() {
            return Err(Error::CycleDetected {
                cycles: self.find_cycles(),
            });
        }

        Ok(sorted)
    }

    /// Get the number of tasks in the graph.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the node index for a task by name.
    #[must_use]
    pub fn get_node_index(&self, name: &str) -> Option<NodeIndex> {
        self.name_to_node.get(name).copied()
    }

    /// Get a reference to a task node by index.
    #[must_use]
    pub fn get_node(&self, index: NodeIndex) -> Option<&GraphNode<T>> {
        self.graph.node_weight(index)
    }

    /// Iterate over all nodes in the graph, in insertion order.
    pub fn iter_nodes(&self) -> impl Iterator<Item = (NodeIndex, &GraphNode<T>)> {
        self.graph.node_references()
    }

    /// Tasks that depend directly on `index`.
    pub fn dependents(&self, index: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(index, Direction::Outgoing)
    }

    /// Tasks `index` depends on directly.
    pub fn dependencies(&self, index: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(index, Direction::Incoming)
    }

    /// Every task that transitively depends on `index`, excluding `index`
    /// unless it sits on a cycle through itself.
    #[must_use]
    pub fn transitive_dependents(&self, index: NodeIndex) -> BTreeSet<NodeIndex> {
        let mut found = BTreeSet::new();
        let mut stack: Vec<NodeIndex> = self.dependents(index).collect();
        while let Some(current) = stack.pop() {
            if found.insert(current) {
                stack.extend(self.dependents(current));
            }
        }
        found
    }
}
