//! Benchmarks for job ordering
//!
//! Run with: cargo bench -p wsrun-task-graph

#![allow(clippy::unwrap_used)]

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use wsrun_task_graph::{ExecutionMode, FailurePolicy, Outcome, ReadyQueue, TaskGraph, TaskNodeData};

#[derive(Debug, Clone)]
struct BenchJob {
    deps: Vec<String>,
}

impl TaskNodeData for BenchJob {
    fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.deps.iter().map(String::as_str)
    }
}

/// Many packages depending on one shared library
fn generate_wide_graph(count: usize) -> TaskGraph<BenchJob> {
    let mut graph = TaskGraph::new();
    graph.add_task("shared", BenchJob { deps: vec![] });
    for i in 0..count {
        graph.add_task(
            &format!("pkg_{i}"),
            BenchJob {
                deps: vec!["shared".to_string()],
            },
        );
    }
    graph.add_dependency_edges().unwrap();
    graph
}

/// Layers of packages, each depending on every package of the layer below
fn generate_layered_graph(width: usize, depth: usize) -> TaskGraph<BenchJob> {
    let mut graph = TaskGraph::new();
    let mut previous: Vec<String> = Vec::new();
    for level in 0..depth {
        let mut current = Vec::with_capacity(width);
        for w in 0..width {
            let name = format!("level_{level}_pkg_{w}");
            graph.add_task(
                &name,
                BenchJob {
                    deps: previous.clone(),
                },
            );
            current.push(name);
        }
        previous = current;
    }
    graph.add_dependency_edges().unwrap();
    graph
}

fn drain(graph: &TaskGraph<BenchJob>) -> usize {
    let mut queue = ReadyQueue::new(
        graph,
        ExecutionMode::ParallelTopological,
        FailurePolicy::default(),
    )
    .unwrap();
    let mut dispatched = 0;
    while let Some(next) = queue.pop_ready() {
        dispatched += 1;
        queue.complete(next, Outcome::Success);
    }
    dispatched
}

fn benchmark_topological_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("topological_sort");

    for count in [50, 200, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let graph = generate_wide_graph(count);
            b.iter(|| black_box(graph.topological_indices().unwrap()));
        });
    }

    group.finish();
}

fn benchmark_ready_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("ready_queue_drain");

    for (width, depth) in [(5, 5), (10, 10), (20, 10)] {
        let label = format!("w{width}_d{depth}");
        group.bench_with_input(
            BenchmarkId::from_parameter(&label),
            &(width, depth),
            |b, &(width, depth)| {
                let graph = generate_layered_graph(width, depth);
                b.iter(|| black_box(drain(&graph)));
            },
        );
    }

    group.finish();
}

fn benchmark_cycle_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("cycle_detection");

    for count in [100, 500, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let graph = generate_wide_graph(count);
            b.iter(|| black_box(graph.find_cycles()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_topological_sort,
    benchmark_ready_queue,
    benchmark_cycle_detection,
);

criterion_main!(benches);
