//! System git backend.
//!
//! Every call goes through `GitChangeDetector::git_cmd`, which runs git
//! with an isolated environment so user-level configuration cannot change
//! the output format.

use crate::{ChangeDetector, ChangedFiles, Error, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::debug;

/// Refs probed, in order, when `--since` is given without a value.
pub const DEFAULT_BASE_CANDIDATES: [&str; 6] = [
    "master",
    "origin/master",
    "upstream/master",
    "main",
    "origin/main",
    "upstream/main",
];

/// Change detection through the `git` executable.
#[derive(Debug, Clone)]
pub struct GitChangeDetector {
    /// Working tree root
    work_tree: PathBuf,
}

impl GitChangeDetector {
    /// Opens the repository containing `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RepoNotFound`] when `path` is not inside a git work
    /// tree.
    pub fn open(path: &Path) -> Result<Self> {
        let output = Self::command_in(path)
            .args(["rev-parse", "--show-toplevel"])
            .output()
            .map_err(|source| Error::Spawn { source })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("not a git repository") {
                return Err(Error::RepoNotFound {
                    path: path.to_path_buf(),
                });
            }
            return Err(Error::CommandFailed {
                command: "rev-parse --show-toplevel".to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        let work_tree = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());
        debug!(work_tree = %work_tree.display(), "Opened git repository");
        Ok(Self { work_tree })
    }

    /// Root of the work tree.
    #[must_use]
    pub fn work_tree(&self) -> &Path {
        &self.work_tree
    }

    /// Resolves the base commit used when `--since` has no value.
    ///
    /// The merge base of `HEAD` with the first candidate that exists. On the
    /// default branch itself that is `HEAD`, so only uncommitted work counts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoBaseRef`] if none of the candidates exist.
    pub fn default_base(&self) -> Result<String> {
        for candidate in DEFAULT_BASE_CANDIDATES {
            let output = self.run(&["merge-base", candidate, "HEAD"])?;
            if output.status.success() {
                let base = String::from_utf8_lossy(&output.stdout).trim().to_string();
                debug!(candidate, base = %base, "Resolved default base");
                return Ok(base);
            }
        }
        Err(Error::NoBaseRef {
            candidates: DEFAULT_BASE_CANDIDATES.iter().map(|s| (*s).to_string()).collect(),
        })
    }

    fn command_in(path: &Path) -> Command {
        let mut cmd = Command::new("git");

        cmd.arg("-C").arg(path);

        // Isolated environment (don't trust global config)
        cmd.env_clear();
        if let Ok(path) = std::env::var("PATH") {
            cmd.env("PATH", path);
        }
        if let Ok(home) = std::env::var("HOME") {
            cmd.env("HOME", home);
        }

        cmd.arg("-c").arg("core.quotePath=false"); // Don't escape non-ASCII

        cmd
    }

    /// Create a git command with isolated environment rooted at the work tree.
    fn git_cmd(&self) -> Command {
        Self::command_in(&self.work_tree)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        self.git_cmd()
            .args(args)
            .output()
            .map_err(|source| Error::Spawn { source })
    }

    fn lines(&self, args: &[&str]) -> Result<Vec<String>> {
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(Error::CommandFailed {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }
}

impl ChangeDetector for GitChangeDetector {
    fn changed_files(&self, since: Option<&str>) -> Result<ChangedFiles> {
        let base = match since {
            Some(reference) => reference.to_string(),
            None => self.default_base()?,
        };

        let mut files = BTreeSet::new();
        for line in self.lines(&["diff", "--name-only", &base, "--"])? {
            files.insert(self.work_tree.join(line));
        }
        for line in self.lines(&["ls-files", "--others", "--exclude-standard"])? {
            files.insert(self.work_tree.join(line));
        }

        debug!(base = %base, changed = files.len(), "Collected changed files");
        Ok(ChangedFiles { base, files })
    }
}
