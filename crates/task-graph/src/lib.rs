//! Job ordering for wsrun.
//!
//! A [`TaskGraph`] holds one node per job and an edge from every dependency
//! to its dependent. Two consumers read it:
//!
//! - [`TaskGraph::topological_sort`] gives the stable sequential order.
//! - [`ReadyQueue`] hands out jobs dynamically as their dependencies complete,
//!   for every [`ExecutionMode`].
//!
//! Ties are always broken by insertion order, never by name.
//!
//! # Example
//!
//! ```ignore
//! use wsrun_task_graph::{ExecutionMode, FailurePolicy, Outcome, ReadyQueue, TaskGraph};
//!
//! let mut graph = TaskGraph::new();
//! graph.add_task("lib", job(&[]));
//! graph.add_task("app", job(&["lib"]));
//! graph.add_dependency_edges()?;
//!
//! let mut queue = ReadyQueue::new(&graph, ExecutionMode::ParallelTopological, FailurePolicy::default())?;
//! while let Some(next) = queue.pop_ready() {
//!     // run it, then
//!     queue.complete(next, Outcome::Success);
//! }
//! ```

mod error;
mod graph;
mod scheduler;

pub use error::{Error, Result};
pub use graph::{GraphNode, TaskGraph};
pub use petgraph::graph::NodeIndex;
pub use scheduler::{ExecutionMode, FailurePolicy, Outcome, ReadyQueue};

/// Trait for task data that can be stored in the task graph.
pub trait TaskNodeData: Clone {
    /// Returns the names of tasks this task depends on.
    fn dependency_names(&self) -> impl Iterator<Item = &str>;
}
