//! Error types for change detection.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for change detection.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures of the version-control collaborator.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The project is not inside a git work tree.
    #[error("Not a git repository: {}", path.display())]
    #[diagnostic(
        code(wsrun::vcs::repo_not_found),
        help("--since needs the project to be checked out with git")
    )]
    RepoNotFound {
        /// Directory that was probed.
        path: PathBuf,
    },

    /// No default branch exists to compare against.
    #[error("Couldn't find a base branch to compare against (tried {})", candidates.join(", "))]
    #[diagnostic(
        code(wsrun::vcs::no_base_ref),
        help("Pass an explicit reference with --since=<ref>")
    )]
    NoBaseRef {
        /// Refs that were tried, in order.
        candidates: Vec<String>,
    },

    /// A git invocation exited unsuccessfully.
    #[error("git {command} failed: {stderr}")]
    #[diagnostic(code(wsrun::vcs::command_failed))]
    CommandFailed {
        /// Arguments passed to git.
        command: String,
        /// Captured standard error.
        stderr: String,
    },

    /// git could not be started at all.
    #[error("Failed to execute git: {source}")]
    #[diagnostic(
        code(wsrun::vcs::spawn_failed),
        help("Ensure git is installed and available on PATH")
    )]
    Spawn {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
