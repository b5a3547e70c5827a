//! Benchmarks for task scheduling overhead

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::atomic::{AtomicU64, Ordering};
use taskgraph::prelude::*;

fn bench_graph() -> TaskGraph {
    let config = Config::builder()
        .default_workers(4)
        .background_workers(1)
        .build()
        .unwrap();
    TaskGraph::initialize(config).unwrap()
}

fn bench_parallel_for(c: &mut Criterion) {
    let graph = bench_graph();
    let mut group = c.benchmark_group("parallel_for");

    for size in [100, 1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::new("per_index", size), size, |b, &size| {
            b.iter(|| {
                let sum = AtomicU64::new(0);
                graph.parallel_for(size, |i| {
                    sum.fetch_add(black_box(i as u64 * 2), Ordering::Relaxed);
                });
                black_box(sum.load(Ordering::Relaxed))
            });
        });

        group.bench_with_input(BenchmarkId::new("batched_auto", size), size, |b, &size| {
            b.iter(|| {
                let sum = AtomicU64::new(0);
                graph.parallel_for_batched(size, 0, |i| {
                    sum.fetch_add(black_box(i as u64 * 2), Ordering::Relaxed);
                });
                black_box(sum.load(Ordering::Relaxed))
            });
        });
    }

    group.finish();
    graph.shutdown();
}

fn bench_sequential_baseline(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_for");

    for size in [100, 1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::new("sequential", size), size, |b, &size| {
            b.iter(|| {
                let sum = AtomicU64::new(0);
                (0..size).for_each(|i| {
                    sum.fetch_add(black_box(i as u64 * 2), Ordering::Relaxed);
                });
                black_box(sum.load(Ordering::Relaxed))
            });
        });
    }

    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    let graph = bench_graph();

    c.bench_function("fan_out_1000_empty", |b| {
        b.iter(|| {
            let fan_out = graph.fan_out().children((0..1000).map(|_| || {})).build();
            let root = graph.schedule_fan_out(fan_out, QueueType::Default);
            graph.wait_for_completion(root);
            graph.release(root).unwrap();
        });
    });

    graph.shutdown();
}

criterion_group!(
    benches,
    bench_parallel_for,
    bench_sequential_baseline,
    bench_fan_out
);
criterion_main!(benches);
