//! `wsrun run`, the entry point nested scripts call.

use crate::cli::CliError;
use tracing::instrument;
use wsrun_core::tasks::{CommandRequest, run_attached};
use wsrun_core::{Invocation, Project};

/// Runs one script of the current workspace with the terminal attached.
///
/// # Errors
///
/// Returns an error when the project cannot be loaded or the workspace has
/// no such script.
#[instrument(name = "run", skip(args))]
pub async fn execute_run(script: String, args: Vec<String>) -> Result<i32, CliError> {
    let project = Project::discover(Invocation::from_process()?)?;
    let job = project.plan_run(&CommandRequest::Run { script, args })?;
    Ok(run_attached(&job).await?)
}
