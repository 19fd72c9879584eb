//! Core of wsrun: selecting workspaces, resolving what each one runs, and
//! running the resulting jobs in dependency order.
//!
//! - [`config`]: flag validation into [`RunSettings`]
//! - [`selector`]: `--all`, `--from`, `--since` and friends
//! - [`foreach`]: project discovery and job planning
//! - [`tasks`]: command resolution, execution and output

pub mod config;
pub mod environment;
pub mod error;
pub mod foreach;
pub mod selector;
pub mod tasks;

pub use config::{Concurrency, ForeachOptions, Jobs, Presentation, RunSettings};
pub use environment::{Environment, Invocation};
pub use error::{Error, Result};
pub use foreach::{ForeachPlan, ForeachRequest, Project};
pub use selector::{SelectionFilters, Since};
pub use wsrun_task_graph::{ExecutionMode, FailurePolicy};
