//! Subcommand implementations.

pub mod foreach;
pub mod run;

use crate::cli::{CliError, Commands, WorkspacesCommands};
use tokio_util::sync::CancellationToken;

/// Runs a parsed subcommand and returns the process exit code.
///
/// # Errors
///
/// Returns an error when the command cannot be planned or started. Failing
/// jobs are not errors; they only shape the exit code.
pub async fn execute(command: Commands, cancel: &CancellationToken) -> Result<i32, CliError> {
    match command {
        Commands::Workspaces {
            subcommand: WorkspacesCommands::Foreach(args),
        } => foreach::execute_foreach(&args, cancel).await,
        Commands::Run { script, args } => run::execute_run(script, args).await,
    }
}
