//! `package.json` workspace discovery for wsrun.
//!
//! This crate turns a project's manifests into a [`WorkspaceGraph`]: every
//! workspace reachable through (possibly nested) `workspaces` globs, plus the
//! dependency edges declared with the `workspace:` protocol.
//!
//! # Discovery Behavior
//!
//! - Patterns are resolved relative to the declaring workspace, breadth-first.
//!   Node indices follow that order and every downstream tie-break uses it.
//! - Directories without a `package.json` are ignored.
//! - A workspace listing itself (`"."`) adds nothing.
//! - A malformed manifest or a duplicate name fails the whole load.
//!
//! ```rust,ignore
//! use wsrun_workspaces::WorkspaceGraph;
//!
//! let graph = WorkspaceGraph::load(Path::new("."))?;
//! for (index, workspace) in graph.iter() {
//!     println!("{} depends on {:?}", workspace.name, graph.dependencies_of(index, false));
//! }
//! ```

pub mod discovery;
pub mod error;
pub mod graph;
pub mod manifest;

pub use discovery::{find_project_root, resolve_glob_patterns};
pub use error::{Error, Result};
pub use graph::{DependencyKind, ROOT_WORKSPACE_NAME, Workspace, WorkspaceGraph};
pub use manifest::{BinField, MANIFEST_FILE, Manifest, WorkspacesField, read_json_file};
pub use petgraph::graph::NodeIndex;
