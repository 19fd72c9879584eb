//! Error types for task graph operations.

use thiserror::Error;

/// Result type for task graph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during task graph operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// One or more dependency cycles make an edge-respecting order impossible.
    ///
    /// Each inner list names the tasks of one cycle in insertion order.
    #[error("Cycle detected in task graph: {}", format_cycles(.cycles))]
    CycleDetected {
        /// Tasks involved, grouped per cycle.
        cycles: Vec<Vec<String>>,
    },

    /// Tasks depend on tasks that are not part of the graph.
    #[error("Missing dependencies: {}", format_missing(.missing))]
    MissingDependencies {
        /// List of (task, missing_dependency) pairs.
        missing: Vec<(String, String)>,
    },
}

impl Error {
    /// Every task named by a cycle error, flattened.
    #[must_use]
    pub fn cycle_members(&self) -> Vec<&str> {
        match self {
            Self::CycleDetected { cycles } => cycles.iter().flatten().map(String::as_str).collect(),
            Self::MissingDependencies { .. } => Vec::new(),
        }
    }
}

fn format_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|cycle| match cycle.as_slice() {
            [single] => format!("{single} -> {single}"),
            members => members.join(", "),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn format_missing(missing: &[(String, String)]) -> String {
    missing
        .iter()
        .map(|(task, dep)| format!("Task '{task}' depends on missing task '{dep}'"))
        .collect::<Vec<_>>()
        .join(", ")
}
