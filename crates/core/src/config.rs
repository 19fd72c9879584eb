//! Run settings: how many jobs run at once, in which order, and how their
//! output is presented.
//!
//! [`ForeachOptions`] mirrors the command-line flags one to one.
//! [`ForeachOptions::validate`] turns it into [`RunSettings`], rejecting
//! inconsistent combinations before anything is discovered or spawned.

use crate::{Error, Result};
use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;
use wsrun_task_graph::{ExecutionMode, FailurePolicy};

/// How long interrupted jobs get between SIGTERM and SIGKILL.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// Raw `--jobs` value.
///
/// Zero is accepted by the parser so validation can report it with the
/// other option errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jobs {
    /// A fixed number of concurrent jobs.
    Count(usize),
    /// No limit.
    Unlimited,
}

impl FromStr for Jobs {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        if value.eq_ignore_ascii_case("unlimited") {
            return Ok(Self::Unlimited);
        }
        value.parse::<usize>().map(Self::Count).map_err(|_| {
            format!("invalid --jobs value '{value}': expected a number or 'unlimited'")
        })
    }
}

impl fmt::Display for Jobs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(count) => write!(f, "{count}"),
            Self::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// Upper bound on simultaneously running jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    /// At most this many.
    Limited(NonZeroUsize),
    /// As many as are ready.
    Unlimited,
}

impl Concurrency {
    /// One job at a time.
    pub const SERIAL: Self = Self::Limited(NonZeroUsize::MIN);

    /// Default bound for `--parallel` without `--jobs`: half the available
    /// cores, at least one.
    #[must_use]
    pub fn default_parallel() -> Self {
        let cores = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
        Self::Limited(NonZeroUsize::new(cores / 2).unwrap_or(NonZeroUsize::MIN))
    }

    /// Whether another job may start while `in_flight` are running.
    #[must_use]
    pub const fn allows(self, in_flight: usize) -> bool {
        match self {
            Self::Limited(limit) => in_flight < limit.get(),
            Self::Unlimited => true,
        }
    }
}

/// How job output reaches the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Presentation {
    /// Prefix lines with the workspace name and report start/exit/timing.
    pub verbose: bool,
    /// Write lines as they arrive instead of grouping them per job.
    pub interlaced: bool,
}

/// Flags of `workspaces foreach` that control execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForeachOptions {
    /// `--parallel`
    pub parallel: bool,
    /// `--jobs`
    pub jobs: Option<Jobs>,
    /// `--topological`
    pub topological: bool,
    /// `--topological-dev`
    pub topological_dev: bool,
    /// `--interlaced`
    pub interlaced: bool,
    /// `--verbose`
    pub verbose: bool,
    /// `--skip-failed-dependents`
    pub skip_failed_dependents: bool,
}

/// Validated execution settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    /// Ordering discipline.
    pub mode: ExecutionMode,
    /// Concurrency bound.
    pub concurrency: Concurrency,
    /// Whether `devDependencies` edges order jobs.
    pub include_dev_edges: bool,
    /// What happens downstream of a failure.
    pub failure_policy: FailurePolicy,
    /// Output formatting.
    pub presentation: Presentation,
    /// Time between SIGTERM and SIGKILL on interruption.
    pub kill_grace: Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Sequential,
            concurrency: Concurrency::SERIAL,
            include_dev_edges: false,
            failure_policy: FailurePolicy::RunDependents,
            presentation: Presentation::default(),
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }
}

impl ForeachOptions {
    /// Checks flag combinations and derives the run settings.
    ///
    /// Without `--parallel` jobs run one at a time with dependencies first,
    /// whatever the topological flags say.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when `--jobs` is below one, or when
    /// `--jobs` is given without `--parallel`.
    pub fn validate(&self) -> Result<RunSettings> {
        let limit = match self.jobs {
            Some(Jobs::Count(count)) => match NonZeroUsize::new(count) {
                Some(limit) => Some(Concurrency::Limited(limit)),
                None => {
                    return Err(Error::configuration(format!(
                        "--jobs must be at least 1 (got {count})"
                    )));
                }
            },
            Some(Jobs::Unlimited) => Some(Concurrency::Unlimited),
            None => None,
        };

        if limit.is_some() && !self.parallel {
            return Err(Error::configuration(
                "--parallel must be set when using --jobs",
            ));
        }

        let topological = self.topological || self.topological_dev;
        let (mode, concurrency) = if self.parallel {
            let mode = if topological {
                ExecutionMode::ParallelTopological
            } else {
                ExecutionMode::Parallel
            };
            (mode, limit.unwrap_or_else(Concurrency::default_parallel))
        } else {
            (ExecutionMode::Sequential, Concurrency::SERIAL)
        };

        let failure_policy = if self.skip_failed_dependents {
            FailurePolicy::SkipDependents
        } else {
            FailurePolicy::RunDependents
        };

        Ok(RunSettings {
            mode,
            concurrency,
            include_dev_edges: self.topological_dev,
            failure_policy,
            presentation: Presentation {
                verbose: self.verbose,
                interlaced: self.interlaced,
            },
            kill_grace: DEFAULT_KILL_GRACE,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parallel() -> ForeachOptions {
        ForeachOptions {
            parallel: true,
            ..ForeachOptions::default()
        }
    }

    #[test]
    fn test_jobs_parse() {
        assert_eq!("4".parse::<Jobs>().unwrap(), Jobs::Count(4));
        assert_eq!("0".parse::<Jobs>().unwrap(), Jobs::Count(0));
        assert_eq!("unlimited".parse::<Jobs>().unwrap(), Jobs::Unlimited);
        assert!("many".parse::<Jobs>().is_err());
        assert!("-1".parse::<Jobs>().is_err());
    }

    #[test]
    fn test_default_is_sequential() {
        let settings = ForeachOptions::default().validate().unwrap();
        assert_eq!(settings.mode, ExecutionMode::Sequential);
        assert_eq!(settings.concurrency, Concurrency::SERIAL);
        assert!(!settings.include_dev_edges);
    }

    #[test]
    fn test_topological_without_parallel_stays_sequential() {
        let options = ForeachOptions {
            topological: true,
            ..ForeachOptions::default()
        };
        let settings = options.validate().unwrap();
        assert_eq!(settings.mode, ExecutionMode::Sequential);
        assert!(settings.mode.respects_dependencies());
    }

    #[test]
    fn test_parallel_modes() {
        assert_eq!(parallel().validate().unwrap().mode, ExecutionMode::Parallel);

        let options = ForeachOptions {
            topological_dev: true,
            jobs: Some(Jobs::Count(2)),
            ..parallel()
        };
        let settings = options.validate().unwrap();
        assert_eq!(settings.mode, ExecutionMode::ParallelTopological);
        assert!(settings.include_dev_edges);
        assert_eq!(
            settings.concurrency,
            Concurrency::Limited(NonZeroUsize::new(2).unwrap())
        );
    }

    #[test]
    fn test_jobs_zero_is_rejected() {
        let options = ForeachOptions {
            jobs: Some(Jobs::Count(0)),
            ..parallel()
        };
        assert_eq!(
            options.validate().unwrap_err().to_string(),
            "--jobs must be at least 1 (got 0)"
        );
    }

    #[test]
    fn test_jobs_requires_parallel() {
        let options = ForeachOptions {
            jobs: Some(Jobs::Count(2)),
            ..ForeachOptions::default()
        };
        assert_eq!(
            options.validate().unwrap_err().to_string(),
            "--parallel must be set when using --jobs"
        );
    }

    #[test]
    fn test_unlimited() {
        let options = ForeachOptions {
            jobs: Some(Jobs::Unlimited),
            ..parallel()
        };
        let settings = options.validate().unwrap();
        assert_eq!(settings.concurrency, Concurrency::Unlimited);
        assert!(settings.concurrency.allows(10_000));
    }

    #[test]
    fn test_default_parallel_is_at_least_one() {
        assert!(Concurrency::default_parallel().allows(0));
    }

    #[test]
    fn test_skip_failed_dependents() {
        let options = ForeachOptions {
            skip_failed_dependents: true,
            ..ForeachOptions::default()
        };
        assert_eq!(
            options.validate().unwrap().failure_policy,
            FailurePolicy::SkipDependents
        );
    }
}
