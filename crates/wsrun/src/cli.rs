use clap::{Args, Parser, Subcommand};
use miette::{Diagnostic, Report};
use serde::Serialize;
use std::io::{self, Write};
use thiserror::Error;
use wsrun_core::{ForeachOptions, Jobs, SelectionFilters, Since};

/// Exit code of a successful run.
pub const EXIT_OK: i32 = 0;
/// Exit code when wsrun itself fails before or while running jobs.
pub const EXIT_FAILURE: i32 = 1;

/// Errors reported at the binary boundary.
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Selection, planning or execution failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Core(#[from] wsrun_core::Error),

    /// Anything outside the core, such as runtime start-up.
    #[error("{message}")]
    #[diagnostic(code(wsrun::cli::other))]
    Other {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    /// Create a new other error
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            help: None,
        }
    }
}

impl From<wsrun_vcs::Error> for CliError {
    fn from(err: wsrun_vcs::Error) -> Self {
        Self::Core(err.into())
    }
}

/// Map CLI error to its exit code
#[must_use]
pub const fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Core(_) | CliError::Other { .. } => EXIT_FAILURE,
    }
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    status: &'static str,
    code: Option<String>,
    message: &'a str,
}

/// Writes `err` to stderr, as a miette report or as one JSON object.
///
/// Stdout is left to job output in both modes.
pub fn render_error(err: CliError, json_mode: bool) {
    if json_mode {
        let message = err.to_string();
        let envelope = ErrorEnvelope {
            status: "error",
            code: err.code().map(|code| code.to_string()),
            message: &message,
        };
        match serde_json::to_string(&envelope) {
            Ok(json) => eprintln!("{json}"),
            Err(_) => eprintln!("Error serializing error response"),
        }
    } else {
        let report = Report::new(err);
        eprintln!("{report:?}");
    }
    let _ = io::stderr().flush();
}

#[derive(Parser, Debug)]
#[command(name = "wsrun")]
#[command(about = "Run commands across the workspaces of a package.json monorepo")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'l',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        env = "WSRUN_LOG_LEVEL",
        value_enum
    )]
    pub level: crate::tracing::LogLevel,

    #[arg(
        long,
        global = true,
        help = "Log line format",
        default_value = "compact",
        value_enum
    )]
    pub log_format: crate::tracing::TracingFormat,

    #[arg(long, global = true, help = "Output logs and errors in JSON format")]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Workspace operations")]
    Workspaces {
        #[command(subcommand)]
        subcommand: WorkspacesCommands,
    },
    #[command(about = "Run a script of the current workspace")]
    Run {
        #[arg(help = "Script name, or a binary exposed by a dependency")]
        script: String,
        #[arg(
            help = "Arguments passed to the script",
            trailing_var_arg = true,
            allow_hyphen_values = true
        )]
        args: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum WorkspacesCommands {
    #[command(about = "Run a command in each selected workspace")]
    Foreach(ForeachArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ForeachArgs {
    #[arg(short = 'A', long, help = "Run on all workspaces of the project")]
    pub all: bool,

    #[arg(short = 'W', long, help = "Run on the current workspace and its descendants")]
    pub worktree: bool,

    #[arg(
        short = 'R',
        long,
        help = "Run on the selection and its dependencies (dependents with --since)"
    )]
    pub recursive: bool,

    #[arg(
        long,
        value_name = "PATTERN",
        help = "Start from workspaces matching the glob (name or path)"
    )]
    pub from: Vec<String>,

    #[arg(
        long,
        value_name = "REF",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "",
        help = "Only run on workspaces changed since REF (default branch when omitted)"
    )]
    pub since: Option<String>,

    #[arg(long, value_name = "GLOB", help = "Keep only matching workspaces")]
    pub include: Vec<String>,

    #[arg(long, value_name = "GLOB", help = "Drop matching workspaces")]
    pub exclude: Vec<String>,

    #[arg(long, help = "Drop private workspaces")]
    pub no_private: bool,

    #[arg(short = 'p', long, help = "Run jobs in parallel")]
    pub parallel: bool,

    #[arg(short = 't', long, help = "Wait for dependencies to finish first")]
    pub topological: bool,

    #[arg(long, help = "Like --topological, also following devDependencies")]
    pub topological_dev: bool,

    #[arg(short = 'i', long, help = "Write output lines as they arrive")]
    pub interlaced: bool,

    #[arg(
        short = 'j',
        long,
        value_name = "N|unlimited",
        help = "Maximum number of parallel jobs"
    )]
    pub jobs: Option<Jobs>,

    #[arg(
        short = 'v',
        long,
        overrides_with = "no_verbose",
        help = "Prefix output with workspace names and report timings"
    )]
    pub verbose: bool,

    #[arg(long, overrides_with = "verbose", help = "Plain output")]
    pub no_verbose: bool,

    #[arg(long, help = "Don't run workspaces whose dependencies failed")]
    pub skip_failed_dependents: bool,

    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND",
        help = "`run <script>`, `exec <command>` or a binary name, with arguments"
    )]
    pub command: Vec<String>,
}

impl ForeachArgs {
    /// Selection flags.
    #[must_use]
    pub fn filters(&self) -> SelectionFilters {
        SelectionFilters {
            all: self.all,
            worktree: self.worktree,
            recursive: self.recursive,
            from: self.from.clone(),
            since: self.since.as_ref().map(|value| {
                if value.is_empty() {
                    Since::DefaultBranch
                } else {
                    Since::Ref(value.clone())
                }
            }),
            include: self.include.clone(),
            exclude: self.exclude.clone(),
            no_private: self.no_private,
        }
    }

    /// Execution flags. Verbose output follows the terminal unless
    /// `--verbose` or `--no-verbose` is given.
    #[must_use]
    pub fn options(&self, stdout_is_terminal: bool) -> ForeachOptions {
        let verbose = if self.verbose {
            true
        } else if self.no_verbose {
            false
        } else {
            stdout_is_terminal
        };
        ForeachOptions {
            parallel: self.parallel,
            jobs: self.jobs,
            topological: self.topological,
            topological_dev: self.topological_dev,
            interlaced: self.interlaced,
            verbose,
            skip_failed_dependents: self.skip_failed_dependents,
        }
    }
}

/// Parses the process arguments, exiting on usage errors.
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}
