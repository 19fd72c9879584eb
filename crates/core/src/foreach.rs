//! Turning a `workspaces foreach` request into a job graph.
//!
//! ```rust,ignore
//! let project = Project::discover(Invocation::from_process()?)?;
//! let settings = options.validate()?;
//! if let Some(job) = project.plan_nested(&request.command)? {
//!     return run_attached(&job).await;
//! }
//! let plan = project.plan_foreach(&request, settings, changed.as_ref())?;
//! let summary = tasks::execute(&plan.jobs, &plan.settings, &mut sink, &cancel).await?;
//! ```

use crate::config::RunSettings;
use crate::environment::{Environment, Invocation};
use crate::selector::{self, SelectionFilters};
use crate::tasks::{CommandRequest, CommandResolver, Job, ResolvedCommand, SkipReason};
use crate::{Error, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::debug;
use wsrun_task_graph::TaskGraph;
use wsrun_vcs::ChangedFiles;
use wsrun_workspaces::{NodeIndex, WorkspaceGraph, find_project_root};

/// What to run and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeachRequest {
    /// Workspace selection.
    pub filters: SelectionFilters,
    /// Command for every selected workspace.
    pub command: CommandRequest,
}

/// A validated, resolved run, ready for [`crate::tasks::execute`].
#[derive(Debug)]
pub struct ForeachPlan {
    /// One job per selected workspace, in discovery order.
    pub jobs: TaskGraph<Job>,
    /// Execution settings.
    pub settings: RunSettings,
}

impl ForeachPlan {
    /// Names of the selected workspaces, in discovery order.
    pub fn workspaces(&self) -> impl Iterator<Item = &str> {
        self.jobs.iter_nodes().map(|(_, node)| node.name.as_str())
    }
}

/// A loaded project seen from the invocation directory.
#[derive(Debug)]
pub struct Project {
    graph: WorkspaceGraph,
    current: NodeIndex,
    invocation: Invocation,
}

impl Project {
    /// Finds and loads the project containing `invocation.cwd`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Graph`] when no project is found or discovery fails.
    pub fn discover(invocation: Invocation) -> Result<Self> {
        let root = find_project_root(&invocation.cwd)?;
        let graph = WorkspaceGraph::load(&root)?;
        let cwd = fs::canonicalize(&invocation.cwd)
            .map_err(|e| Error::io(e, "resolving current directory"))?;
        let current = graph
            .workspace_for_path(&cwd)
            .unwrap_or_else(|| graph.root());

        debug!(
            root = %graph.project_root().display(),
            current = %graph.workspace(current).name,
            "Loaded project"
        );
        Ok(Self {
            graph,
            current,
            invocation,
        })
    }

    /// The workspace graph.
    #[must_use]
    pub const fn graph(&self) -> &WorkspaceGraph {
        &self.graph
    }

    /// The workspace containing the invocation directory.
    #[must_use]
    pub const fn current(&self) -> NodeIndex {
        self.current
    }

    /// Absolute project root.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.graph.project_root()
    }

    /// Script and workspace that started this process, when it was started
    /// by a wsrun script.
    fn reentrant(&self) -> Option<(&str, NodeIndex)> {
        let script = self.invocation.lifecycle_event.as_deref()?;
        let workspace = self
            .invocation
            .invoking_workspace
            .as_deref()
            .and_then(|name| self.graph.find(name))
            .unwrap_or(self.current);
        Some((script, workspace))
    }

    /// The job to run directly instead of a new batch, when this foreach was
    /// started by a job running the same script it asks for.
    ///
    /// The job belongs to the invoking workspace and resolves to
    /// [`SkipReason::Reentrant`], so a script calling
    /// `workspaces foreach ... run <itself>` adds nothing to the outer batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the job environment cannot be
    /// built.
    pub fn plan_nested(&self, command: &CommandRequest) -> Result<Option<Job>> {
        if matches!(command, CommandRequest::Exec { .. }) {
            return Ok(None);
        }
        let Some((script, invoking)) = self.reentrant() else {
            return Ok(None);
        };
        if script != command.name() {
            return Ok(None);
        }
        debug!(
            script,
            workspace = %self.graph.workspace(invoking).name,
            "Nested foreach of the running script, not starting a new batch"
        );
        let resolver = CommandResolver::new(&self.graph, Some((script, invoking)));
        let resolved = resolver.resolve(invoking, command);
        self.job(invoking, resolved, Vec::new()).map(Some)
    }

    /// Selects workspaces, resolves the command in each, and links the jobs
    /// along the dependency edges between selected workspaces.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for invalid selection flags and
    /// [`Error::Execution`] if the job graph cannot be linked.
    pub fn plan_foreach(
        &self,
        request: &ForeachRequest,
        settings: RunSettings,
        changed: Option<&ChangedFiles>,
    ) -> Result<ForeachPlan> {
        let selected = selector::select(&self.graph, &request.filters, self.current, changed)?;
        let members: BTreeSet<NodeIndex> = selected.iter().copied().collect();
        let resolver = CommandResolver::new(&self.graph, self.reentrant());

        let mut jobs = TaskGraph::new();
        for &index in &selected {
            let depends_on = self
                .graph
                .dependencies_of(index, settings.include_dev_edges)
                .into_iter()
                .filter(|dependency| members.contains(dependency))
                .map(|dependency| self.graph.workspace(dependency).name.clone())
                .collect();
            let command = resolver.resolve(index, &request.command);
            let job = self.job(index, command, depends_on)?;
            let name = job.workspace.clone();
            jobs.add_task(&name, job);
        }
        jobs.add_dependency_edges()?;

        debug!(
            command = request.command.name(),
            jobs = jobs.task_count(),
            "Planned foreach"
        );
        Ok(ForeachPlan { jobs, settings })
    }

    /// Resolves `run <script>` in the current workspace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the workspace has no such
    /// script and no dependency exposes a binary of that name.
    pub fn plan_run(&self, request: &CommandRequest) -> Result<Job> {
        let resolver = CommandResolver::new(&self.graph, None);
        let command = resolver.resolve(self.current, request);
        if command == ResolvedCommand::Skip(SkipReason::NotDeclared) {
            return Err(Error::configuration(format!(
                "Couldn't find a script named \"{}\" in {}",
                request.name(),
                self.graph.workspace(self.current).name
            )));
        }
        self.job(self.current, command, Vec::new())
    }

    fn job(
        &self,
        index: NodeIndex,
        command: ResolvedCommand,
        depends_on: Vec<String>,
    ) -> Result<Job> {
        let workspace = self.graph.workspace(index);
        let env = Environment::for_job(
            &self.invocation,
            self.graph.project_root(),
            workspace,
            command.lifecycle_event(),
        )?;
        Ok(Job {
            workspace: workspace.name.clone(),
            cwd: workspace.root.clone(),
            command,
            env,
            depends_on,
        })
    }
}
