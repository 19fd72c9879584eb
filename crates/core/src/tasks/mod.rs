//! Command resolution, job execution and output presentation.

pub mod command;
pub mod executor;
pub mod output;
pub mod process_registry;

pub use command::{CommandRequest, CommandResolver, ResolvedCommand, SkipReason};
pub use executor::{
    ExecutionResult, INTERRUPTED_EXIT_CODE, Job, RunSummary, SPAWN_FAILURE_EXIT_CODE, execute,
    run_attached,
};
pub use output::{MARKER, OutputLine, OutputSink, Stream, format_duration};
pub use process_registry::ProcessRegistry;
