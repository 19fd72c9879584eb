//! Error types for selection, planning and execution.

use miette::Diagnostic;
use thiserror::Error;

/// Result type used throughout wsrun-core.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that stops a foreach run before or while it executes.
///
/// Per-job failures are not errors: they end up in
/// [`crate::tasks::RunSummary`] and only influence the exit code.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Invalid combination of options.
    #[error("{message}")]
    #[diagnostic(code(wsrun::core::configuration))]
    Configuration {
        /// Human-readable explanation, printed verbatim.
        message: String,
    },

    /// Workspace discovery failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] wsrun_workspaces::Error),

    /// The selected workspaces cannot be ordered.
    #[error("Dependency cycle detected between workspaces: {}", format_cycles(cycles))]
    #[diagnostic(
        code(wsrun::core::cycle),
        help("Break the cycle, or drop --topological to run without ordering")
    )]
    Cycle {
        /// Members of every cycle, one group per cycle.
        cycles: Vec<Vec<String>>,
    },

    /// `--since` could not be evaluated.
    #[error(transparent)]
    #[diagnostic(transparent)]
    ChangeDetection(#[from] wsrun_vcs::Error),

    /// Writing output or reading the environment failed.
    #[error("I/O error during {operation}: {source}")]
    #[diagnostic(code(wsrun::core::io))]
    Io {
        /// The underlying error.
        #[source]
        source: std::io::Error,
        /// What was being attempted.
        operation: String,
    },

    /// The run could not be carried out.
    #[error("{message}")]
    #[diagnostic(code(wsrun::core::execution))]
    Execution {
        /// Human-readable explanation.
        message: String,
    },
}

impl Error {
    /// Shorthand for [`Error::Configuration`].
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::Execution`].
    #[must_use]
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::Io`].
    #[must_use]
    pub fn io(source: std::io::Error, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            operation: operation.into(),
        }
    }
}

impl From<wsrun_task_graph::Error> for Error {
    fn from(err: wsrun_task_graph::Error) -> Self {
        match err {
            wsrun_task_graph::Error::CycleDetected { cycles } => Self::Cycle { cycles },
            other => Self::execution(other.to_string()),
        }
    }
}

fn format_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|cycle| cycle.join(" <-> "))
        .collect::<Vec<_>>()
        .join("; ")
}
