//! Job execution.
//!
//! One coordinator loop owns the [`ReadyQueue`], the in-flight count and the
//! [`OutputSink`]. Every dispatched job is a tokio task owning one child
//! process; it reports its output lines and its exit through a single
//! channel, so the coordinator only ever waits on that channel or on the
//! cancellation token.

use super::command::ResolvedCommand;
use super::output::{OutputLine, OutputSink, Stream};
use super::process_registry::ProcessRegistry;
use crate::config::RunSettings;
use crate::environment::Environment;
use crate::{Error, Result};
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wsrun_task_graph::{NodeIndex, Outcome, ReadyQueue, TaskGraph, TaskNodeData};

/// Exit code of a run stopped by a signal.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Exit code recorded for a job whose process could not be started.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

/// Extra time workers give the registry before killing their own child.
const KILL_MARGIN: Duration = Duration::from_millis(500);

/// One workspace's share of a foreach run.
#[derive(Debug, Clone)]
pub struct Job {
    /// Workspace name.
    pub workspace: String,
    /// Working directory.
    pub cwd: PathBuf,
    /// What to run.
    pub command: ResolvedCommand,
    /// Environment overlay.
    pub env: Environment,
    /// Selected workspaces that must complete first.
    pub depends_on: Vec<String>,
}

impl TaskNodeData for Job {
    fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.depends_on.iter().map(String::as_str)
    }
}

/// How one job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Workspace name.
    pub workspace: String,
    /// Process exit code; 1 when killed by a signal.
    pub exit_code: i32,
    /// Whether the exit code was zero.
    pub success: bool,
    /// Wall time from spawn to exit.
    pub duration: Duration,
    /// Everything the job printed.
    pub output: Vec<OutputLine>,
}

/// Aggregate outcome of a run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Executed jobs, in completion order.
    pub results: Vec<ExecutionResult>,
    /// Workspaces with nothing to run.
    pub no_op: Vec<String>,
    /// Workspaces held back because a dependency failed.
    pub skipped: Vec<String>,
    /// Whether the run was cancelled.
    pub interrupted: bool,
    /// Wall time of the whole run.
    pub duration: Duration,
}

impl RunSummary {
    /// Whether no job ran at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Every executed job exited zero and nothing interrupted the run.
    #[must_use]
    pub fn success(&self) -> bool {
        !self.interrupted && self.results.iter().all(|result| result.success)
    }

    /// Jobs that exited non-zero, in completion order.
    pub fn failures(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.results.iter().filter(|result| !result.success)
    }

    /// Process exit code for the run.
    ///
    /// 0 on success, 130 when interrupted, else the first non-zero exit code
    /// observed.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.interrupted {
            return INTERRUPTED_EXIT_CODE;
        }
        self.failures()
            .map(|result| result.exit_code)
            .find(|&code| code != 0)
            .unwrap_or(0)
    }
}

#[derive(Debug)]
enum JobEvent {
    Output {
        job: NodeIndex,
        stream: Stream,
        text: String,
    },
    Exited {
        job: NodeIndex,
        exit_code: i32,
        duration: Duration,
    },
}

/// Runs every job of `graph` under `settings`.
///
/// Returns once every dispatched job has exited. When `cancel` fires, no
/// further job starts, running ones are terminated, and the summary is
/// marked interrupted. `Done` is written last in every case that returns a
/// summary.
///
/// # Errors
///
/// Returns [`Error::Cycle`] when the graph cannot be ordered, before
/// anything is spawned, and [`Error::Io`] when output cannot be written.
pub async fn execute<O: Write, E: Write>(
    graph: &TaskGraph<Job>,
    settings: &RunSettings,
    sink: &mut OutputSink<O, E>,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    let started = Instant::now();
    let queue = ReadyQueue::new(graph, settings.mode, settings.failure_policy)?;
    let (events, receiver) = mpsc::unbounded_channel();

    debug!(
        jobs = graph.task_count(),
        mode = ?settings.mode,
        concurrency = ?settings.concurrency,
        "Starting run"
    );

    let mut coordinator = Coordinator {
        graph,
        settings: *settings,
        sink,
        queue,
        registry: Arc::new(ProcessRegistry::new()),
        cancel: cancel.child_token(),
        events,
        receiver,
        in_flight: 0,
        terminating: false,
        summary: RunSummary::default(),
    };

    if let Err(err) = coordinator.run().await {
        coordinator.cancel.cancel();
        coordinator.registry.terminate_all(settings.kill_grace).await;
        return Err(err);
    }

    let mut summary = coordinator.summary;
    summary.interrupted = cancel.is_cancelled();
    summary.duration = started.elapsed();
    coordinator
        .sink
        .done(summary.duration)
        .map_err(|e| Error::io(e, "writing output"))?;

    info!(
        executed = summary.results.len(),
        failed = summary.failures().count(),
        skipped = summary.skipped.len(),
        interrupted = summary.interrupted,
        "Run finished"
    );
    Ok(summary)
}

struct Coordinator<'g, 's, O: Write, E: Write> {
    graph: &'g TaskGraph<Job>,
    settings: RunSettings,
    sink: &'s mut OutputSink<O, E>,
    queue: ReadyQueue,
    registry: Arc<ProcessRegistry>,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<JobEvent>,
    receiver: mpsc::UnboundedReceiver<JobEvent>,
    in_flight: usize,
    terminating: bool,
    summary: RunSummary,
}

impl<'g, O: Write, E: Write> Coordinator<'g, '_, O, E> {
    async fn run(&mut self) -> Result<()> {
        loop {
            if !self.cancel.is_cancelled() {
                self.dispatch()?;
            }

            if self.in_flight == 0 {
                if self.cancel.is_cancelled() || self.queue.is_finished() {
                    return Ok(());
                }
                self.queue.check_progress(0)?;
                continue;
            }

            tokio::select! {
                () = self.cancel.cancelled(), if !self.terminating => self.terminate(),
                Some(event) = self.receiver.recv() => self.handle(event)?,
            }
        }
    }

    fn job(&self, index: NodeIndex) -> Result<&'g Job> {
        let graph: &'g TaskGraph<Job> = self.graph;
        graph
            .get_node(index)
            .map(|node| &node.task)
            .ok_or_else(|| Error::execution(format!("Unknown job #{}", index.index())))
    }

    fn dispatch(&mut self) -> Result<()> {
        while self.settings.concurrency.allows(self.in_flight) {
            let Some(index) = self.queue.pop_ready() else {
                break;
            };
            let job = self.job(index)?;

            let Some(command) = job.command.to_command(&job.cwd, &job.env)? else {
                debug!(workspace = %job.workspace, command = ?job.command, "Nothing to run");
                self.summary.no_op.push(job.workspace.clone());
                self.queue.complete(index, Outcome::Success);
                continue;
            };

            info!(workspace = %job.workspace, "Starting job");
            self.sink
                .job_started(index.index(), &job.workspace)
                .map_err(|e| Error::io(e, "writing output"))?;

            tokio::spawn(run_job(
                index,
                job.workspace.clone(),
                command,
                self.events.clone(),
                Arc::clone(&self.registry),
                self.cancel.clone(),
                self.settings.kill_grace,
            ));
            self.in_flight += 1;
        }
        Ok(())
    }

    fn terminate(&mut self) {
        warn!(running = self.in_flight, "Interrupted, stopping running jobs");
        self.terminating = true;
        let registry = Arc::clone(&self.registry);
        let grace = self.settings.kill_grace;
        tokio::spawn(async move { registry.terminate_all(grace).await });
    }

    fn handle(&mut self, event: JobEvent) -> Result<()> {
        match event {
            JobEvent::Output { job, stream, text } => {
                let workspace = &self.job(job)?.workspace;
                self.sink
                    .line(job.index(), workspace, stream, text)
                    .map_err(|e| Error::io(e, "writing output"))
            }
            JobEvent::Exited {
                job,
                exit_code,
                duration,
            } => {
                self.in_flight -= 1;
                let workspace = &self.job(job)?.workspace;
                let output = self
                    .sink
                    .job_finished(job.index(), workspace, exit_code, duration)
                    .map_err(|e| Error::io(e, "writing output"))?;

                let success = exit_code == 0;
                if success {
                    info!(workspace = %workspace, ?duration, "Job finished");
                } else {
                    warn!(workspace = %workspace, exit_code, "Job failed");
                }
                self.summary.results.push(ExecutionResult {
                    workspace: workspace.clone(),
                    exit_code,
                    success,
                    duration,
                    output,
                });

                let outcome = if success {
                    Outcome::Success
                } else {
                    Outcome::Failure
                };
                for skipped in self.queue.complete(job, outcome) {
                    let name = self.queue.name(skipped).to_string();
                    warn!(workspace = %name, failed = %workspace, "Skipping dependent of failed job");
                    self.sink
                        .job_skipped(&name)
                        .map_err(|e| Error::io(e, "writing output"))?;
                    self.summary.skipped.push(name);
                }
                Ok(())
            }
        }
    }
}

async fn run_job(
    index: NodeIndex,
    workspace: String,
    mut command: Command,
    events: mpsc::UnboundedSender<JobEvent>,
    registry: Arc<ProcessRegistry>,
    cancel: CancellationToken,
    grace: Duration,
) {
    let started = Instant::now();
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(workspace = %workspace, error = %err, "Failed to spawn job");
            let _ = events.send(JobEvent::Output {
                job: index,
                stream: Stream::Stderr,
                text: format!("Failed to spawn process: {err}"),
            });
            let _ = events.send(JobEvent::Exited {
                job: index,
                exit_code: SPAWN_FAILURE_EXIT_CODE,
                duration: started.elapsed(),
            });
            return;
        }
    };

    let pid = child.id();
    if let Some(pid) = pid {
        registry.register(pid, workspace.clone()).await;
    }

    let readers = [
        child
            .stdout
            .take()
            .map(|out| tokio::spawn(forward_lines(out, index, Stream::Stdout, events.clone()))),
        child
            .stderr
            .take()
            .map(|err| tokio::spawn(forward_lines(err, index, Stream::Stderr, events.clone()))),
    ];

    let status = tokio::select! {
        status = child.wait() => status,
        () = cancel.cancelled() => {
            match tokio::time::timeout(grace + KILL_MARGIN, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    warn!(workspace = %workspace, "Killing job after grace period");
                    let _ = child.start_kill();
                    child.wait().await
                }
            }
        }
    };

    for reader in readers.into_iter().flatten() {
        let _ = reader.await;
    }
    if let Some(pid) = pid {
        registry.unregister(pid).await;
    }

    let exit_code = match status {
        Ok(status) => status.code().unwrap_or(1),
        Err(err) => {
            warn!(workspace = %workspace, error = %err, "Failed to wait for job");
            1
        }
    };
    let _ = events.send(JobEvent::Exited {
        job: index,
        exit_code,
        duration: started.elapsed(),
    });
}

async fn forward_lines<R: AsyncRead + Unpin>(
    reader: R,
    job: NodeIndex,
    stream: Stream,
    events: mpsc::UnboundedSender<JobEvent>,
) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = decode_line(&buf);
                if events.send(JobEvent::Output { job, stream, text }).is_err() {
                    break;
                }
            }
            Err(err) => {
                warn!(stream = ?stream, error = %err, "Failed to read job output");
                break;
            }
        }
    }
}

/// One output line without its terminator. Invalid UTF-8 is replaced, never
/// treated as the end of the stream.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Runs one job with the terminal attached and returns its exit code.
///
/// # Errors
///
/// Returns [`Error::Io`] when the process cannot be started.
pub async fn run_attached(job: &Job) -> Result<i32> {
    let Some(mut command) = job.command.to_command(&job.cwd, &job.env)? else {
        debug!(workspace = %job.workspace, command = ?job.command, "Nothing to run");
        return Ok(0);
    };
    command
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    info!(workspace = %job.workspace, "Running attached");
    let status = command
        .status()
        .await
        .map_err(|e| Error::io(e, format!("running a command in {}", job.workspace)))?;
    Ok(status.code().unwrap_or(1))
}
