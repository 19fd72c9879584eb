//! Locating projects and expanding `workspaces` globs into directories.

use crate::error::{Error, Result};
use crate::manifest::{MANIFEST_FILE, Manifest};
use glob::{MatchOptions, Pattern};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directories never searched for workspaces.
const PRUNED_DIRS: [&str; 4] = ["node_modules", ".git", "target", "dist"];

/// `*` and `?` never cross a path separator; `**` does.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Resolves workspace glob patterns to directories under `root`.
///
/// Patterns starting with `!` exclude. A pattern that resolves to `root`
/// itself (such as `"."`) never matches, so a package listing itself as a
/// workspace adds nothing.
///
/// # Returns
///
/// A sorted list of unique, absolute paths (rooted under `root`) that match
/// the patterns and are not excluded.
///
/// # Errors
///
/// Returns [`Error::InvalidPattern`] if any glob pattern is invalid.
///
/// # Implementation Notes
///
/// This implementation uses `walkdir` for traversal and prunes common
/// heavy directories (`node_modules`, `.git`, `target`, `dist`). The walk
/// stops at the deepest level a pattern can reach unless a pattern uses `**`.
pub fn resolve_glob_patterns(root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut inclusion_patterns = Vec::new();
    let mut exclusion_patterns = Vec::new();
    let mut max_depth = Some(0_usize);

    for raw in patterns {
        let (negated, body) = match raw.strip_prefix('!') {
            Some(stripped) => (true, stripped),
            None => (false, raw.as_str()),
        };
        let body = body.trim_start_matches("./").trim_end_matches('/');
        if body.is_empty() || body == "." {
            continue;
        }

        let pattern = Pattern::new(body).map_err(|e| Error::InvalidPattern {
            pattern: raw.clone(),
            manifest: root.join(MANIFEST_FILE),
            message: e.to_string(),
        })?;

        if negated {
            exclusion_patterns.push(pattern);
        } else {
            max_depth = match max_depth {
                Some(depth) if !body.contains("**") => Some(depth.max(body.split('/').count())),
                _ => None,
            };
            inclusion_patterns.push(pattern);
        }
    }

    if inclusion_patterns.is_empty() {
        return Ok(Vec::new());
    }

    let mut walker = WalkDir::new(root).follow_links(false).sort_by_file_name();
    if let Some(depth) = max_depth {
        walker = walker.max_depth(depth);
    }

    let mut matched_paths = HashSet::new();
    for entry in walker
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_str().unwrap_or("");
            !PRUNED_DIRS.contains(&name)
        })
        .filter_map(std::result::Result::ok)
    {
        if !entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path();
        if path == root {
            continue;
        }

        let Ok(rel_path) = path.strip_prefix(root) else {
            continue;
        };

        let matches = |p: &Pattern| p.matches_path_with(rel_path, MATCH_OPTIONS);
        if exclusion_patterns.iter().any(matches) {
            continue;
        }
        if inclusion_patterns.iter().any(matches) {
            matched_paths.insert(path.to_path_buf());
        }
    }

    let mut result: Vec<PathBuf> = matched_paths.into_iter().collect();
    result.sort();
    Ok(result)
}

/// Finds the project root for a directory.
///
/// The project root is the outermost ancestor whose manifest declares
/// `workspaces`. Without one, the nearest ancestor holding a `package.json`
/// is a single-package project.
///
/// # Errors
///
/// Returns [`Error::ProjectNotFound`] when no ancestor has a manifest, or a
/// parse error if one of the manifests on the way is malformed.
pub fn find_project_root(start: &Path) -> Result<PathBuf> {
    let mut nearest = None;
    let mut outermost_with_workspaces = None;

    for dir in start.ancestors() {
        if !dir.join(MANIFEST_FILE).is_file() {
            continue;
        }
        if nearest.is_none() {
            nearest = Some(dir.to_path_buf());
        }
        if Manifest::load(dir)?.declares_workspaces() {
            outermost_with_workspaces = Some(dir.to_path_buf());
        }
    }

    outermost_with_workspaces
        .or(nearest)
        .ok_or_else(|| Error::ProjectNotFound {
            path: start.to_path_buf(),
        })
}
