//! `wsrun workspaces foreach`

use crate::cli::{CliError, ForeachArgs};
use std::io::{self, IsTerminal};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use wsrun_core::tasks::{CommandRequest, MARKER, OutputSink, execute, run_attached};
use wsrun_core::{ForeachRequest, Invocation, Project};
use wsrun_vcs::{ChangeDetector, ChangedFiles, GitChangeDetector};

/// Selects workspaces, runs the command in each and returns the aggregate
/// exit code.
///
/// Flag combinations are checked before the project is even loaded, so a
/// rejected invocation never starts a job. A foreach started by a job running
/// the same script runs that script directly instead of a second batch.
///
/// # Errors
///
/// Returns an error for invalid flags, discovery or change-detection
/// failures and dependency cycles.
#[instrument(name = "foreach", skip_all, fields(command = ?args.command))]
pub async fn execute_foreach(args: &ForeachArgs, cancel: &CancellationToken) -> Result<i32, CliError> {
    let options = args.options(io::stdout().is_terminal());
    let settings = options.validate()?;
    let command = CommandRequest::from_words(&args.command)?;
    let filters = args.filters();

    let project = Project::discover(Invocation::from_process()?)?;
    if let Some(job) = project.plan_nested(&command)? {
        return run_attached(&job).await.map_err(CliError::from);
    }

    let changed = match &filters.since {
        Some(since) => Some(changed_files(&project, since.reference())?),
        None => None,
    };

    let plan = project.plan_foreach(&ForeachRequest { filters, command }, settings, changed.as_ref())?;
    debug!(workspaces = ?plan.workspaces().collect::<Vec<_>>(), "Selected workspaces");

    if plan.jobs.task_count() == 0 {
        info!("No workspace matched the selection");
        if plan.settings.presentation.verbose {
            eprintln!("{MARKER} No workspace matched the selection");
        }
    }

    let mut sink = OutputSink::new(io::stdout(), io::stderr(), plan.settings.presentation);
    let summary = execute(&plan.jobs, &plan.settings, &mut sink, cancel).await?;
    Ok(summary.exit_code())
}

fn changed_files(project: &Project, since: Option<&str>) -> Result<ChangedFiles, CliError> {
    let detector = GitChangeDetector::open(project.root())?;
    let changed = detector.changed_files(since)?;
    debug!(base = %changed.base, files = changed.len(), "Detected changes");
    Ok(changed)
}
