//! The workspace dependency graph.
//!
//! Nodes are workspaces in discovery order; an edge `A -> B` means `A`
//! declares a `workspace:` dependency on `B`. Discovery order is the
//! tie-breaker everywhere downstream, so node indices are handed out
//! strictly in the order workspaces are found.

use crate::discovery::resolve_glob_patterns;
use crate::error::{Error, Result};
use crate::manifest::{MANIFEST_FILE, Manifest, is_workspace_range};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name given to a project root whose manifest has no `name`.
pub const ROOT_WORKSPACE_NAME: &str = "root-workspace";

/// Kind of a dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    /// Declared under `dependencies`.
    Regular,
    /// Declared under `devDependencies`.
    Dev,
}

/// A discovered workspace.
#[derive(Debug, Clone)]
pub struct Workspace {
    /// Unique name within the project.
    pub name: String,
    /// Path relative to the project root, `.` for the root itself.
    pub relative_path: String,
    /// Absolute directory.
    pub root: PathBuf,
    /// Parsed manifest.
    pub manifest: Manifest,
    /// Workspace whose `workspaces` globs matched this one.
    pub parent: Option<NodeIndex>,
}

impl Workspace {
    /// Whether the manifest sets `private: true`.
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.manifest.private
    }

    /// Body of a declared script.
    #[must_use]
    pub fn script(&self, name: &str) -> Option<&str> {
        self.manifest.scripts.get(name).map(String::as_str)
    }
}

/// All workspaces of one project and the local dependency edges between them.
#[derive(Debug)]
pub struct WorkspaceGraph {
    graph: DiGraph<Workspace, DependencyKind>,
    name_to_node: HashMap<String, NodeIndex>,
    project_root: PathBuf,
}

impl WorkspaceGraph {
    /// Discovers every workspace reachable from `<root_dir>/package.json`.
    ///
    /// Each workspace's `workspaces` globs are resolved relative to its own
    /// directory, breadth-first, so nested declarations are followed to any
    /// depth. A directory matched more than once is registered once.
    ///
    /// # Errors
    ///
    /// Fails if the root manifest is missing, a manifest is malformed, a
    /// pattern is invalid, or two workspaces share a name.
    pub fn load(root_dir: &Path) -> Result<Self> {
        let project_root = fs::canonicalize(root_dir).map_err(|e| Error::Io {
            source: e,
            path: Some(root_dir.to_path_buf()),
            operation: "resolving project root".to_string(),
        })?;

        let mut graph = Self {
            graph: DiGraph::new(),
            name_to_node: HashMap::new(),
            project_root: project_root.clone(),
        };

        let root_manifest = Manifest::load(&project_root)?;
        let root = graph.add_workspace(project_root.clone(), root_manifest, None)?;

        let mut seen = HashSet::from([project_root]);
        let mut queue = VecDeque::from([root]);

        while let Some(current) = queue.pop_front() {
            let workspace = &graph.graph[current];
            let patterns = workspace.manifest.workspace_patterns().to_vec();
            if patterns.is_empty() {
                continue;
            }
            let dir = workspace.root.clone();

            for path in resolve_glob_patterns(&dir, &patterns)? {
                if !path.join(MANIFEST_FILE).is_file() || !seen.insert(path.clone()) {
                    continue;
                }
                let manifest = Manifest::load(&path)?;
                let child = graph.add_workspace(path, manifest, Some(current))?;
                queue.push_back(child);
            }
        }

        graph.add_dependency_edges();

        debug!(
            workspaces = graph.graph.node_count(),
            edges = graph.graph.edge_count(),
            root = %graph.project_root.display(),
            "Loaded workspace graph"
        );

        Ok(graph)
    }

    fn add_workspace(
        &mut self,
        root: PathBuf,
        manifest: Manifest,
        parent: Option<NodeIndex>,
    ) -> Result<NodeIndex> {
        let relative_path = relative_path_string(&self.project_root, &root);
        let name = match (&manifest.name, parent) {
            (Some(name), _) => name.clone(),
            (None, None) => ROOT_WORKSPACE_NAME.to_string(),
            (None, Some(_)) => relative_path.clone(),
        };

        if let Some(&existing) = self.name_to_node.get(&name) {
            return Err(Error::DuplicateWorkspace {
                name,
                first: self.graph[existing].root.clone(),
                second: root,
            });
        }

        debug!(workspace = %name, path = %relative_path, "Discovered workspace");
        let node = self.graph.add_node(Workspace {
            name: name.clone(),
            relative_path,
            root,
            manifest,
            parent,
        });
        self.name_to_node.insert(name, node);
        Ok(node)
    }

    /// Only `workspace:` ranges whose target is part of the project create edges.
    fn add_dependency_edges(&mut self) {
        let mut edges = Vec::new();
        for from in self.graph.node_indices() {
            let manifest = &self.graph[from].manifest;
            let declared = manifest
                .dependencies
                .iter()
                .map(|dep| (dep, DependencyKind::Regular))
                .chain(
                    manifest
                        .dev_dependencies
                        .iter()
                        .map(|dep| (dep, DependencyKind::Dev)),
                );
            for ((name, range), kind) in declared {
                if !is_workspace_range(range) {
                    continue;
                }
                match self.name_to_node.get(name) {
                    Some(&to) => edges.push((from, to, kind)),
                    None => debug!(
                        workspace = %self.graph[from].name,
                        dependency = %name,
                        "workspace: range points outside the project, ignoring"
                    ),
                }
            }
        }
        for (from, to, kind) in edges {
            self.graph.add_edge(from, to, kind);
        }
    }

    /// Absolute, canonical project root.
    #[must_use]
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Index of the project root workspace.
    #[must_use]
    pub fn root(&self) -> NodeIndex {
        NodeIndex::new(0)
    }

    /// Number of workspaces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Whether the graph holds no workspaces. Never true for a loaded graph.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Workspace at an index.
    ///
    /// # Panics
    ///
    /// Panics if `index` does not belong to this graph.
    #[must_use]
    pub fn workspace(&self, index: NodeIndex) -> &Workspace {
        &self.graph[index]
    }

    /// Looks a workspace up by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<NodeIndex> {
        self.name_to_node.get(name).copied()
    }

    /// Every workspace in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeIndex, &Workspace)> {
        self.graph
            .node_indices()
            .map(move |index| (index, &self.graph[index]))
    }

    /// Workspace-local dependencies of `index`, in discovery order.
    #[must_use]
    pub fn dependencies_of(&self, index: NodeIndex, include_dev: bool) -> Vec<NodeIndex> {
        self.neighbors(index, Direction::Outgoing, include_dev)
    }

    /// Workspaces declaring a workspace-local dependency on `index`, in discovery order.
    #[must_use]
    pub fn dependents_of(&self, index: NodeIndex, include_dev: bool) -> Vec<NodeIndex> {
        self.neighbors(index, Direction::Incoming, include_dev)
    }

    fn neighbors(&self, index: NodeIndex, direction: Direction, include_dev: bool) -> Vec<NodeIndex> {
        let set: BTreeSet<NodeIndex> = self
            .graph
            .edges_directed(index, direction)
            .filter(|edge| include_dev || *edge.weight() == DependencyKind::Regular)
            .map(|edge| match direction {
                Direction::Outgoing => edge.target(),
                Direction::Incoming => edge.source(),
            })
            .collect();
        set.into_iter().collect()
    }

    /// `seeds` plus everything they transitively depend on.
    #[must_use]
    pub fn transitive_dependencies(
        &self,
        seeds: impl IntoIterator<Item = NodeIndex>,
        include_dev: bool,
    ) -> BTreeSet<NodeIndex> {
        self.closure(seeds, Direction::Outgoing, include_dev)
    }

    /// `seeds` plus everything that transitively depends on them.
    #[must_use]
    pub fn transitive_dependents(
        &self,
        seeds: impl IntoIterator<Item = NodeIndex>,
        include_dev: bool,
    ) -> BTreeSet<NodeIndex> {
        self.closure(seeds, Direction::Incoming, include_dev)
    }

    fn closure(
        &self,
        seeds: impl IntoIterator<Item = NodeIndex>,
        direction: Direction,
        include_dev: bool,
    ) -> BTreeSet<NodeIndex> {
        let mut visited = BTreeSet::new();
        let mut stack: Vec<NodeIndex> = seeds.into_iter().collect();
        while let Some(current) = stack.pop() {
            if visited.insert(current) {
                stack.extend(self.neighbors(current, direction, include_dev));
            }
        }
        visited
    }

    /// Workspaces directly declared by `index`'s `workspaces` globs.
    #[must_use]
    pub fn children_of(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|&candidate| self.graph[candidate].parent == Some(index))
            .collect()
    }

    /// `index` plus every workspace nested under it through `workspaces` globs.
    #[must_use]
    pub fn worktree(&self, index: NodeIndex) -> BTreeSet<NodeIndex> {
        let mut members = BTreeSet::from([index]);
        let mut queue = VecDeque::from([index]);
        while let Some(current) = queue.pop_front() {
            for child in self.children_of(current) {
                if members.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        members
    }

    /// The deepest workspace whose directory contains `path`.
    #[must_use]
    pub fn workspace_for_path(&self, path: &Path) -> Option<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|&index| path.starts_with(&self.graph[index].root))
            .max_by_key(|&index| self.graph[index].root.components().count())
    }

    /// Names of a set of workspaces, in the given order.
    pub fn names<'a>(
        &'a self,
        indices: impl IntoIterator<Item = &'a NodeIndex> + 'a,
    ) -> impl Iterator<Item = &'a str> + 'a {
        indices
            .into_iter()
            .map(|&index| self.graph[index].name.as_str())
    }
}

fn relative_path_string(project_root: &Path, path: &Path) -> String {
    match path.strip_prefix(project_root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => path.display().to_string(),
    }
}
