//! Dynamic ready-queue scheduling over a [`TaskGraph`].
//!
//! The executor drives a [`ReadyQueue`]: it pops ready tasks while it has
//! free slots and reports every completion back. Completions decrement the
//! in-degree counters of dependents and release the ones reaching zero.
//! Ready tasks always pop in insertion order, so with one slot the queue
//! reproduces [`TaskGraph::topological_sort`] exactly.

use crate::{Error, Result, TaskGraph, TaskNodeData};
use petgraph::graph::NodeIndex;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tracing::debug;

/// How jobs are ordered relative to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// One job at a time, dependencies first.
    #[default]
    Sequential,
    /// Concurrent, no ordering beyond the concurrency bound.
    Parallel,
    /// Concurrent, a job starts only once all of its dependencies completed.
    ParallelTopological,
}

impl ExecutionMode {
    /// Whether dependency edges gate dispatch in this mode.
    #[must_use]
    pub const fn respects_dependencies(self) -> bool {
        !matches!(self, Self::Parallel)
    }
}

/// What happens to the dependents of a job that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Dependents still run once the failed job has completed.
    #[default]
    RunDependents,
    /// Every transitive dependent of a failed job is skipped.
    SkipDependents,
}

/// How a dispatched job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Exit code zero.
    Success,
    /// Anything else.
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Waiting,
    Ready,
    Running,
    Done,
    Skipped,
}

/// In-degree counters plus a min-heap of dispatchable jobs.
#[derive(Debug)]
pub struct ReadyQueue {
    mode: ExecutionMode,
    policy: FailurePolicy,
    names: Vec<String>,
    dependents: Vec<Vec<NodeIndex>>,
    in_degree: Vec<usize>,
    state: Vec<JobState>,
    ready: BinaryHeap<Reverse<NodeIndex>>,
    unfinished: usize,
}

impl ReadyQueue {
    /// Builds the queue for every task of `graph`.
    ///
    /// # Errors
    ///
    /// In edge-respecting modes, returns [`Error::CycleDetected`] naming the
    /// tasks of every cycle before anything is dispatched.
    pub fn new<T: TaskNodeData>(
        graph: &TaskGraph<T>,
        mode: ExecutionMode,
        policy: FailurePolicy,
    ) -> Result<Self> {
        let gated = mode.respects_dependencies();
        if gated && graph.has_cycles() {
            return Err(Error::CycleDetected {
                cycles: graph.find_cycles(),
            });
        }

        let count = graph.task_count();
        let mut names = Vec::with_capacity(count);
        let mut dependents = Vec::with_capacity(count);
        let mut in_degree = Vec::with_capacity(count);
        for (index, node) in graph.iter_nodes() {
            names.push(node.name.clone());
            let mut downstream: Vec<NodeIndex> = graph.dependents(index).collect();
            downstream.sort_unstable();
            dependents.push(downstream);
            in_degree.push(if gated {
                graph.dependencies(index).count()
            } else {
                0
            });
        }

        let mut queue = Self {
            mode,
            policy,
            names,
            dependents,
            in_degree,
            state: vec![JobState::Waiting; count],
            ready: BinaryHeap::with_capacity(count),
            unfinished: count,
        };
        for position in 0..count {
            if queue.in_degree[position] == 0 {
                queue.release(NodeIndex::new(position));
            }
        }
        Ok(queue)
    }

    fn release(&mut self, index: NodeIndex) {
        self.state[index.index()] = JobState::Ready;
        self.ready.push(Reverse(index));
    }

    /// Takes the earliest ready job and marks it running.
    pub fn pop_ready(&mut self) -> Option<NodeIndex> {
        while let Some(Reverse(index)) = self.ready.pop() {
            if self.state[index.index()] == JobState::Ready {
                self.state[index.index()] = JobState::Running;
                return Some(index);
            }
        }
        None
    }

    /// Whether a job is waiting to be popped.
    #[must_use]
    pub fn has_ready(&self) -> bool {
        self.ready
            .iter()
            .any(|Reverse(index)| self.state[index.index()] == JobState::Ready)
    }

    /// Records the end of a running job and releases its dependents.
    ///
    /// Returns the jobs skipped as a consequence, which only happens for a
    /// failure under [`FailurePolicy::SkipDependents`].
    pub fn complete(&mut self, index: NodeIndex, outcome: Outcome) -> Vec<NodeIndex> {
        if self.state[index.index()] != JobState::Running {
            return Vec::new();
        }
        self.state[index.index()] = JobState::Done;
        self.unfinished -= 1;

        let skipped = if outcome == Outcome::Failure && self.policy == FailurePolicy::SkipDependents
        {
            self.skip_dependents_of(index)
        } else {
            Vec::new()
        };

        if self.mode.respects_dependencies() {
            for position in 0..self.dependents[index.index()].len() {
                let dependent = self.dependents[index.index()][position];
                let degree = &mut self.in_degree[dependent.index()];
                *degree = degree.saturating_sub(1);
                if *degree == 0 && self.state[dependent.index()] == JobState::Waiting {
                    debug!(task = %self.names[dependent.index()], "Dependencies complete");
                    self.release(dependent);
                }
            }
        }

        skipped
    }

    fn skip_dependents_of(&mut self, index: NodeIndex) -> Vec<NodeIndex> {
        let mut skipped = Vec::new();
        let mut stack = self.dependents[index.index()].clone();
        while let Some(current) = stack.pop() {
            let state = &mut self.state[current.index()];
            if matches!(state, JobState::Waiting | JobState::Ready) {
                *state = JobState::Skipped;
                self.unfinished -= 1;
                skipped.push(current);
                stack.extend(self.dependents[current.index()].iter().copied());
            }
        }
        skipped.sort_unstable();
        if !skipped.is_empty() {
            debug!(
                failed = %self.names[index.index()],
                skipped = skipped.len(),
                "Skipping dependents of failed task"
            );
        }
        skipped
    }

    /// Detects a stall: nothing running, nothing ready, jobs left.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CycleDetected`] naming the jobs that can never start.
    pub fn check_progress(&self, in_flight: usize) -> Result<()> {
        if in_flight > 0 || self.unfinished == 0 || self.has_ready() {
            return Ok(());
        }
        let stuck = self
            .state
            .iter()
            .enumerate()
            .filter(|(_, state)| **state == JobState::Waiting)
            .map(|(position, _)| self.names[position].clone())
            .collect();
        Err(Error::CycleDetected {
            cycles: vec![stuck],
        })
    }

    /// Whether every job either completed or was skipped.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.unfinished == 0
    }

    /// Jobs neither completed nor skipped.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.unfinished
    }

    /// Name of a job.
    #[must_use]
    pub fn name(&self, index: NodeIndex) -> &str {
        &self.names[index.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug)]
    struct Job(Vec<String>);

    impl TaskNodeData for Job {
        fn dependency_names(&self) -> impl Iterator<Item = &str> {
            self.0.iter().map(String::as_str)
        }
    }

    fn graph(tasks: &[(&str, &[&str])]) -> TaskGraph<Job> {
        let mut graph = TaskGraph::new();
        for (name, deps) in tasks {
            graph.add_task(name, Job(deps.iter().map(|d| (*d).to_string()).collect()));
        }
        graph.add_dependency_edges().unwrap();
        graph
    }

    fn drain_one_at_a_time(queue: &mut ReadyQueue) -> Vec<String> {
        let mut order = Vec::new();
        while let Some(index) = queue.pop_ready() {
            order.push(queue.name(index).to_string());
            queue.complete(index, Outcome::Success);
        }
        order
    }

    fn pop_all(queue: &mut ReadyQueue) -> Vec<NodeIndex> {
        std::iter::from_fn(|| queue.pop_ready()).collect()
    }

    /// a; b -> a, c; c -> a; d -> b; e -> d; f -> e; g
    fn six_workspaces() -> TaskGraph<Job> {
        graph(&[
            ("a", &[]),
            ("b", &["a", "c"]),
            ("c", &["a"]),
            ("d", &["b"]),
            ("f", &["e"]),
            ("g", &[]),
            ("e", &["d"]),
        ])
    }

    #[test]
    fn test_sequential_matches_topological_sort() {
        let graph = six_workspaces();
        let mut queue =
            ReadyQueue::new(&graph, ExecutionMode::Sequential, FailurePolicy::default()).unwrap();

        let expected: Vec<String> = graph
            .topological_sort()
            .unwrap()
            .into_iter()
            .map(|node| node.name)
            .collect();
        assert_eq!(drain_one_at_a_time(&mut queue), expected);
        assert_eq!(expected, ["a", "c", "b", "d", "g", "e", "f"]);
        assert!(queue.is_finished());
    }

    #[test]
    fn test_parallel_topological_releases_in_waves() {
        let graph = six_workspaces();
        let mut queue = ReadyQueue::new(
            &graph,
            ExecutionMode::ParallelTopological,
            FailurePolicy::default(),
        )
        .unwrap();

        let first_wave = pop_all(&mut queue);
        let names: Vec<_> = first_wave.iter().map(|i| queue.name(*i)).collect();
        assert_eq!(names, ["a", "g"]);

        queue.complete(first_wave[1], Outcome::Success);
        assert!(queue.pop_ready().is_none(), "g unblocks nothing");

        queue.complete(first_wave[0], Outcome::Success);
        let c = queue.pop_ready().unwrap();
        assert_eq!(queue.name(c), "c");
        assert!(queue.pop_ready().is_none(), "b still waits for c");
    }

    #[test]
    fn test_parallel_ignores_edges() {
        let graph = six_workspaces();
        let mut queue =
            ReadyQueue::new(&graph, ExecutionMode::Parallel, FailurePolicy::default()).unwrap();
        assert_eq!(pop_all(&mut queue).len(), 7);
    }

    #[test]
    fn test_parallel_tolerates_cycles() {
        let graph = graph(&[("x", &["y"]), ("y", &["x"])]);
        let queue = ReadyQueue::new(&graph, ExecutionMode::Parallel, FailurePolicy::default());
        assert!(queue.is_ok());
    }

    #[test]
    fn test_cycle_fails_before_dispatch() {
        let graph = graph(&[("ok", &[]), ("x", &["y"]), ("y", &["x"])]);
        let err = ReadyQueue::new(&graph, ExecutionMode::ParallelTopological, FailurePolicy::default())
            .unwrap_err();
        assert_eq!(err.cycle_members(), ["x", "y"]);
    }

    #[test]
    fn test_failure_still_releases_dependents_by_default() {
        let graph = graph(&[("a", &[]), ("b", &["a"])]);
        let mut queue =
            ReadyQueue::new(&graph, ExecutionMode::Sequential, FailurePolicy::RunDependents)
                .unwrap();

        let a = queue.pop_ready().unwrap();
        assert!(queue.complete(a, Outcome::Failure).is_empty());
        let b = queue.pop_ready().unwrap();
        assert_eq!(queue.name(b), "b");
    }

    #[test]
    fn test_skip_dependents_policy() {
        let graph = graph(&[("a", &[]), ("b", &["a"]), ("c", &["b"]), ("d", &[])]);
        let mut queue = ReadyQueue::new(
            &graph,
            ExecutionMode::ParallelTopological,
            FailurePolicy::SkipDependents,
        )
        .unwrap();

        let a = queue.pop_ready().unwrap();
        let d = queue.pop_ready().unwrap();
        let skipped = queue.complete(a, Outcome::Failure);
        let names: Vec<_> = skipped.iter().map(|i| queue.name(*i)).collect();
        assert_eq!(names, ["b", "c"]);

        assert!(queue.pop_ready().is_none());
        assert!(!queue.is_finished());
        queue.complete(d, Outcome::Success);
        assert!(queue.is_finished());
    }

    #[test]
    fn test_check_progress_while_running() {
        let graph = graph(&[("a", &[]), ("b", &["a"])]);
        let mut queue =
            ReadyQueue::new(&graph, ExecutionMode::Sequential, FailurePolicy::default()).unwrap();

        let a = queue.pop_ready().unwrap();
        assert!(queue.check_progress(1).is_ok());
        queue.complete(a, Outcome::Success);
        assert!(queue.check_progress(0).is_ok(), "b became ready");
    }

    #[test]
    fn test_check_progress_reports_stall() {
        let graph = graph(&[("a", &[]), ("b", &["a"]), ("c", &["b"])]);
        let mut queue =
            ReadyQueue::new(&graph, ExecutionMode::Sequential, FailurePolicy::default()).unwrap();

        // a finishes without its dependents ever being released
        let a = queue.pop_ready().unwrap();
        queue.state[a.index()] = JobState::Done;
        queue.unfinished -= 1;

        let err = queue.check_progress(0).unwrap_err();
        assert_eq!(err.cycle_members(), ["b", "c"]);
    }

    #[test]
    fn test_complete_is_idempotent() {
        let graph = graph(&[("a", &[]), ("b", &["a"])]);
        let mut queue =
            ReadyQueue::new(&graph, ExecutionMode::Sequential, FailurePolicy::default()).unwrap();
        let a = queue.pop_ready().unwrap();
        queue.complete(a, Outcome::Success);
        queue.complete(a, Outcome::Success);
        assert_eq!(queue.remaining(), 1);
    }

    #[test]
    fn test_empty_graph_is_finished() {
        let graph = graph(&[]);
        let queue =
            ReadyQueue::new(&graph, ExecutionMode::Sequential, FailurePolicy::default()).unwrap();
        assert!(queue.is_finished());
        assert!(queue.check_progress(0).is_ok());
    }
}
