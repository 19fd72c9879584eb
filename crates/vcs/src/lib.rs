//! Changed-file detection behind `wsrun workspaces foreach --since`.
//!
//! Selection only needs one question answered: which files differ from a
//! reference point. [`ChangeDetector`] is that seam; [`GitChangeDetector`]
//! answers it with the system `git` binary.

mod error;
mod git;

pub use error::{Error, Result};
pub use git::{DEFAULT_BASE_CANDIDATES, GitChangeDetector};

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Reports files changed relative to a reference point.
pub trait ChangeDetector {
    /// Changed files since `since`, or since the default base when `None`.
    ///
    /// # Errors
    ///
    /// Returns an error when the repository cannot be inspected or no base
    /// reference can be resolved.
    fn changed_files(&self, since: Option<&str>) -> Result<ChangedFiles>;
}

/// Absolute paths of changed files, and the commit they were compared to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangedFiles {
    /// Resolved base commit or ref.
    pub base: String,
    /// Absolute paths.
    pub files: BTreeSet<PathBuf>,
}

impl ChangedFiles {
    /// Whether nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Number of changed files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Iterates over the changed paths in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(PathBuf::as_path)
    }
}
