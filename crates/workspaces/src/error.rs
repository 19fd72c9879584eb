//! Error types for workspace operations.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for workspace operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while discovering workspaces or building the graph.
///
/// Every variant is fatal: a graph that failed to load never reaches the
/// scheduler.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// No `package.json` was found where one was required.
    #[error("Manifest file not found at path: {path}")]
    #[diagnostic(
        code(wsrun::workspaces::manifest_not_found),
        help("Run wsrun from inside a project that has a package.json at its root")
    )]
    ManifestNotFound {
        /// The path where the manifest was expected.
        path: PathBuf,
    },

    /// No project root could be located from the starting directory.
    #[error("No project found from {path}")]
    #[diagnostic(
        code(wsrun::workspaces::project_not_found),
        help("None of the parent directories contain a package.json")
    )]
    ProjectNotFound {
        /// The directory the search started from.
        path: PathBuf,
    },

    /// Two workspaces resolved to the same name.
    #[error("Duplicate workspace name '{name}' ({} and {})", first.display(), second.display())]
    #[diagnostic(
        code(wsrun::workspaces::duplicate_workspace),
        help("Workspace names must be unique within a project; rename one of the packages")
    )]
    DuplicateWorkspace {
        /// The conflicting name.
        name: String,
        /// Root of the workspace that claimed the name first.
        first: PathBuf,
        /// Root of the workspace that tried to claim it again.
        second: PathBuf,
    },

    /// A `workspaces` glob could not be compiled.
    #[error("Invalid workspace pattern '{pattern}' in {}: {message}", manifest.display())]
    #[diagnostic(
        code(wsrun::workspaces::invalid_pattern),
        help("Workspace patterns are globs relative to the declaring package, e.g. 'packages/*'")
    )]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Manifest that declared it.
        manifest: PathBuf,
        /// Why the pattern was rejected.
        message: String,
    },

    /// I/O error occurred.
    #[error("I/O error during {operation}{}: {source}", path.as_ref().map(|p| format!(" at {}", p.display())).unwrap_or_default())]
    #[diagnostic(
        code(wsrun::workspaces::io_error),
        help(
            "Check that the referenced paths exist and that you have permission to read them"
        )
    )]
    Io {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
        /// Optional path where the error occurred.
        path: Option<PathBuf>,
        /// Description of the operation being performed.
        operation: String,
    },

    /// A manifest is not valid JSON or does not match the expected shape.
    #[error("JSON parsing error{}: {source}", path.as_ref().map(|p| format!(" in {}", p.display())).unwrap_or_default())]
    #[diagnostic(
        code(wsrun::workspaces::json_error),
        help("Ensure the package.json has valid syntax")
    )]
    Json {
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
        /// Optional path to the file being parsed.
        path: Option<PathBuf>,
    },
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            source,
            path: None,
            operation: "file operation".to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(source: serde_json::Error) -> Self {
        Self::Json { source, path: None }
    }
}
