//! Workspace selection for `workspaces foreach`.
//!
//! Filters combine as AND across classes and OR within a class:
//!
//! 1. a scope (`--all`, `--worktree`, `--from`, `--recursive`) yields the
//!    anchor pool;
//! 2. `--since` keeps the anchors owning a changed file, and `--recursive`
//!    then adds their dependents;
//! 3. without `--since`, `--recursive` adds the anchors' dependencies;
//! 4. `--include`, `--exclude` and `--no-private` narrow the result.
//!
//! Dependency traversals here follow dev dependencies too: a workspace
//! cannot be built or tested without them.

use crate::{Error, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::collections::BTreeSet;
use tracing::debug;
use wsrun_vcs::ChangedFiles;
use wsrun_workspaces::{NodeIndex, Workspace, WorkspaceGraph};

/// `--since` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Since {
    /// `--since` without a value.
    DefaultBranch,
    /// `--since=<ref>`.
    Ref(String),
}

impl Since {
    /// The explicit reference, if one was given.
    #[must_use]
    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::DefaultBranch => None,
            Self::Ref(reference) => Some(reference),
        }
    }
}

/// Selection flags of `workspaces foreach`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionFilters {
    /// `--all`
    pub all: bool,
    /// `--worktree`
    pub worktree: bool,
    /// `--recursive`
    pub recursive: bool,
    /// `--from`
    pub from: Vec<String>,
    /// `--since`
    pub since: Option<Since>,
    /// `--include`
    pub include: Vec<String>,
    /// `--exclude`
    pub exclude: Vec<String>,
    /// `--no-private`
    pub no_private: bool,
}

impl SelectionFilters {
    fn has_scope(&self) -> bool {
        self.all || self.worktree || self.recursive || !self.from.is_empty()
    }
}

/// Glob patterns matched against a workspace's name or relative path.
#[derive(Debug, Clone)]
pub struct WorkspaceMatcher {
    set: GlobSet,
}

impl WorkspaceMatcher {
    /// Compiles `patterns`; `None` when there are none.
    ///
    /// `*` never crosses a `/`, `**` does, and `{a,b}` alternates. A trailing
    /// `/**` matches the directory itself as well as everything below it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] naming the flag and the first
    /// invalid pattern.
    pub fn new(flag: &str, patterns: &[String]) -> Result<Option<Self>> {
        if patterns.is_empty() {
            return Ok(None);
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|err| {
                    Error::configuration(format!("Invalid {flag} pattern '{pattern}': {err}"))
                })?;
            builder.add(glob);

            // `dir/**` also names `dir` itself.
            if let Some(dir) = pattern.strip_suffix("/**").filter(|dir| !dir.is_empty())
                && let Ok(glob) = GlobBuilder::new(dir).literal_separator(true).build()
            {
                builder.add(glob);
            }
        }
        let set = builder
            .build()
            .map_err(|err| Error::configuration(format!("Invalid {flag} patterns: {err}")))?;
        Ok(Some(Self { set }))
    }

    /// Whether the workspace's name or relative path matches.
    #[must_use]
    pub fn matches(&self, workspace: &Workspace) -> bool {
        self.set.is_match(&workspace.name) || self.set.is_match(&workspace.relative_path)
    }
}

/// Workspaces owning at least one changed file.
///
/// A file belongs to the deepest workspace whose directory contains it;
/// files outside the project are ignored.
#[must_use]
pub fn changed_workspaces(graph: &WorkspaceGraph, changed: &ChangedFiles) -> BTreeSet<NodeIndex> {
    changed
        .iter()
        .filter_map(|path| graph.workspace_for_path(path))
        .collect()
}

/// Applies `filters` to `graph` as seen from the `current` workspace.
///
/// `changed` must be provided whenever `filters.since` is set. The result is
/// in discovery order and may be empty.
///
/// # Errors
///
/// Returns [`Error::Configuration`] when no scope is given, when `--since`
/// was requested without change information, or when a pattern is invalid.
pub fn select(
    graph: &WorkspaceGraph,
    filters: &SelectionFilters,
    current: NodeIndex,
    changed: Option<&ChangedFiles>,
) -> Result<Vec<NodeIndex>> {
    if !filters.has_scope() && filters.since.is_none() {
        return Err(Error::configuration(
            "No workspaces selected: pass --all, --worktree, --from, --recursive or --since",
        ));
    }

    let from = WorkspaceMatcher::new("--from", &filters.from)?;
    let include = WorkspaceMatcher::new("--include", &filters.include)?;
    let exclude = WorkspaceMatcher::new("--exclude", &filters.exclude)?;

    let pool: BTreeSet<NodeIndex> = if let Some(from) = &from {
        let candidates = if filters.worktree {
            graph.worktree(current)
        } else {
            graph.iter().map(|(index, _)| index).collect()
        };
        candidates
            .into_iter()
            .filter(|&index| from.matches(graph.workspace(index)))
            .collect()
    } else if filters.all {
        graph
            .iter()
            .map(|(index, _)| index)
            .filter(|&index| index != graph.root())
            .collect()
    } else if filters.worktree {
        graph.worktree(current)
    } else if filters.since.is_some() {
        graph.iter().map(|(index, _)| index).collect()
    } else {
        BTreeSet::from([current])
    };
    debug!(pool = ?graph.names(&pool).collect::<Vec<_>>(), "Resolved selection scope");

    let expanded = match (&filters.since, changed) {
        (Some(_), Some(changed)) => {
            let owners = changed_workspaces(graph, changed);
            let touched: BTreeSet<NodeIndex> = pool.intersection(&owners).copied().collect();
            debug!(
                base = %changed.base,
                changed = changed.len(),
                touched = ?graph.names(&touched).collect::<Vec<_>>(),
                "Applied --since"
            );
            if filters.recursive {
                graph.transitive_dependents(touched, true)
            } else {
                touched
            }
        }
        (Some(_), None) => {
            return Err(Error::configuration(
                "--since requires change information from version control",
            ));
        }
        (None, _) if filters.recursive => graph.transitive_dependencies(pool, true),
        (None, _) => pool,
    };

    let selected: Vec<NodeIndex> = expanded
        .into_iter()
        .filter(|&index| {
            let workspace = graph.workspace(index);
            include.as_ref().is_none_or(|m| m.matches(workspace))
                && !exclude.as_ref().is_some_and(|m| m.matches(workspace))
                && !(filters.no_private && workspace.is_private())
        })
        .collect();

    debug!(
        selected = ?graph.names(&selected).collect::<Vec<_>>(),
        "Selected workspaces"
    );
    Ok(selected)
}
