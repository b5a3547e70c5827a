// worker thread stuff
use crate::runtime::GraphContext;
use crate::scheduler::Source;
use crate::util::{Backoff, CachePadded};
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

pub type WorkerId = usize;

/// Which queue classes a worker drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkStrategy {
    /// Default class first, then background.
    Default,
    BackgroundOnly,
}

// flags and counters shared between a worker thread and the graph
pub(crate) struct WorkerControl {
    pub(crate) id: WorkerId,
    pub(crate) strategy: WorkStrategy,
    alive: CachePadded<AtomicBool>,
    idle: CachePadded<AtomicBool>,
    tasks_executed: AtomicU64,
    tasks_stolen: AtomicU64,
}

impl WorkerControl {
    pub(crate) fn new(id: WorkerId, strategy: WorkStrategy) -> Self {
        Self {
            id,
            strategy,
            alive: CachePadded::new(AtomicBool::new(true)),
            idle: CachePadded::new(AtomicBool::new(true)),
            tasks_executed: AtomicU64::new(0),
            tasks_stolen: AtomicU64::new(0),
        }
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.idle.load(Ordering::Acquire)
    }

    pub(crate) fn stats(&self) -> WorkerStats {
        WorkerStats {
            id: self.id,
            strategy: self.strategy,
            idle: self.is_idle(),
            tasks_executed: self.tasks_executed.load(Ordering::Relaxed),
            tasks_stolen: self.tasks_stolen.load(Ordering::Relaxed),
        }
    }
}

/// Per-worker counters, see [`GraphContext::worker_stats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStats {
    pub id: WorkerId,
    pub strategy: WorkStrategy,
    pub idle: bool,
    pub tasks_executed: u64,
    pub tasks_stolen: u64,
}

/// One OS thread of the pool.
pub(crate) struct Worker {
    control: Arc<WorkerControl>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    pub(crate) fn new(control: Arc<WorkerControl>, thread: JoinHandle<()>) -> Self {
        Self {
            control,
            thread: Some(thread),
        }
    }

    pub(crate) fn id(&self) -> WorkerId {
        self.control.id
    }

    pub(crate) fn trigger_shutdown(&self) {
        self.control.alive.store(false, Ordering::Release);
    }

    pub(crate) fn wait_until_shutdown(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!(worker = self.control.id, "worker thread panicked");
            }
        }
    }

    // main loop
    pub(crate) fn run(ctx: GraphContext, control: Arc<WorkerControl>, ready: Sender<()>) {
        let registry = ctx.registry();
        registry.register_current_thread();
        let _ = ready.send(());
        drop(ready);

        // no task may be touched until every peer is a valid steal target
        let mut backoff = Backoff::new();
        while !registry.is_validated() {
            if !control.is_alive() {
                registry.unbind_current_thread();
                return;
            }
            backoff.snooze();
        }

        tracing::debug!(
            graph = registry.graph_id(),
            worker = control.id,
            strategy = ?control.strategy,
            "worker started"
        );

        backoff.reset();
        while control.is_alive() {
            match ctx.next_task(control.strategy) {
                Some((task, source)) => {
                    control.idle.store(false, Ordering::Release);
                    if let Source::Stolen(_) = source {
                        control.tasks_stolen.fetch_add(1, Ordering::Relaxed);
                        ctx.telemetry().record_task_stolen();
                    }
                    ctx.run_task(task);
                    control.tasks_executed.fetch_add(1, Ordering::Relaxed);
                    backoff.reset();
                }
                None => {
                    control.idle.store(true, Ordering::Release);
                    backoff.snooze();
                }
            }
        }

        control.idle.store(true, Ordering::Release);
        registry.unbind_current_thread();
        tracing::debug!(graph = registry.graph_id(), worker = control.id, "worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_control_is_alive_and_idle() {
        let control = WorkerControl::new(3, WorkStrategy::BackgroundOnly);
        assert!(control.is_alive());
        assert!(control.is_idle());

        let stats = control.stats();
        assert_eq!(stats.id, 3);
        assert_eq!(stats.strategy, WorkStrategy::BackgroundOnly);
        assert_eq!(stats.tasks_executed, 0);
    }

    #[test]
    fn test_trigger_shutdown_stops_the_loop_flag() {
        let control = Arc::new(WorkerControl::new(0, WorkStrategy::Default));
        let flag = control.clone();
        let thread = std::thread::spawn(move || {
            while flag.is_alive() {
                std::thread::yield_now();
            }
        });

        let mut worker = Worker::new(control.clone(), thread);
        assert_eq!(worker.id(), 0);
        worker.trigger_shutdown();
        worker.wait_until_shutdown();
        assert!(!control.is_alive());
    }
}
