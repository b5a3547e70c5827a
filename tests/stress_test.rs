//! Stress tests for the task graph

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use taskgraph::prelude::*;

fn graph(default_workers: usize) -> TaskGraph {
    let config = Config::builder()
        .default_workers(default_workers)
        .background_workers(2)
        .build()
        .unwrap();
    TaskGraph::initialize(config).unwrap()
}

#[test]
#[ignore] // Run with --ignored flag
fn stress_test_many_small_tasks() {
    let graph = graph(4);

    for _ in 0..100 {
        let sum = AtomicUsize::new(0);
        graph.parallel_for(1000, |i| {
            sum.fetch_add(i, Ordering::Relaxed);
        });
        assert_eq!(sum.load(Ordering::Relaxed), 499_500);
    }

    assert_eq!(graph.live_tasks(), 0);
}

#[test]
#[ignore]
fn stress_test_nested_parallel_for() {
    let graph = graph(4);
    let counter = AtomicUsize::new(0);

    for _ in 0..10 {
        graph.parallel_for(100, |_| {
            graph.parallel_for(10, |_| {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        });
    }

    assert_eq!(counter.load(Ordering::Relaxed), 10_000);
}

#[test]
#[ignore]
fn stress_test_repeated_initialize_shutdown() {
    for i in 0..20 {
        let graph = graph(2);

        let sum = AtomicUsize::new(0);
        graph.parallel_for(100, |x| {
            sum.fetch_add(x, Ordering::Relaxed);
        });
        assert_eq!(sum.load(Ordering::Relaxed), 4950, "iteration {}", i);

        graph.shutdown();
    }
}

#[test]
#[ignore]
fn stress_test_deep_fan_out_tree() {
    let graph = graph(4);
    let leaves = Arc::new(AtomicUsize::new(0));

    // 4-ary tree, depth 5: children are registered before their parent is queued
    fn grow(
        ctx: &GraphContext,
        parent: TaskHandle,
        depth: usize,
        leaves: &Arc<AtomicUsize>,
    ) -> Vec<TaskHandle> {
        let mut all = Vec::new();
        for _ in 0..4 {
            let node = if depth == 0 {
                let leaves = leaves.clone();
                ctx.create_with_parent(parent, move || {
                    leaves.fetch_add(1, Ordering::Relaxed);
                })
            } else {
                ctx.create_with_parent(parent, || {})
            };
            if depth > 0 {
                all.extend(grow(ctx, node, depth - 1, leaves));
            }
            all.push(node);
        }
        all
    }

    let root = graph.create_empty();
    let ctx = graph.context();
    let nodes = grow(&ctx, root, 4, &leaves);
    for node in nodes {
        graph.schedule_task(node, QueueType::Default);
    }
    graph.schedule_task(root, QueueType::Default);
    graph.wait_for_completion(root);

    assert_eq!(leaves.load(Ordering::Relaxed), 4usize.pow(5));
    graph.release(root).unwrap();
    assert_eq!(graph.live_tasks(), 0);
}

#[test]
#[ignore]
fn stress_test_panic_recovery() {
    let config = Config::builder()
        .default_workers(4)
        .panic_strategy(PanicStrategy::Isolate)
        .build()
        .unwrap();
    let graph = TaskGraph::initialize(config).unwrap();

    for _ in 0..10 {
        graph.parallel_for(100, |i| {
            if i % 10 == 0 {
                panic!("Intentional panic");
            }
        });
    }

    assert_eq!(graph.metrics().tasks_panicked, 100);

    // still usable after panics
    let sum = AtomicUsize::new(0);
    graph.parallel_for(100, |i| {
        sum.fetch_add(i, Ordering::Relaxed);
    });
    assert_eq!(sum.load(Ordering::Relaxed), 4950);
}

#[test]
#[ignore]
fn stress_test_mixed_queue_classes() {
    let graph = graph(3);
    let background = Arc::new(AtomicUsize::new(0));
    let foreground = AtomicUsize::new(0);

    for _ in 0..5000 {
        let b = background.clone();
        graph.spawn(
            move || {
                b.fetch_add(1, Ordering::Relaxed);
            },
            QueueType::Background,
        );
    }
    graph.parallel_for(5000, |_| {
        foreground.fetch_add(1, Ordering::Relaxed);
    });
    graph.wait_until_graph_is_idle();

    assert_eq!(foreground.load(Ordering::Relaxed), 5000);
    assert_eq!(background.load(Ordering::Relaxed), 5000);
}
