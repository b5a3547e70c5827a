//! The task graph: an explicitly owned scheduler context.
//!
//! [`TaskGraph`] owns the worker threads. [`GraphContext`] is the cloneable
//! handle carrying the submission API; task functions capture one to submit
//! nested work. A graph is started by [`TaskGraph::initialize`] and stopped by
//! [`TaskGraph::shutdown`] or by dropping it.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::executor::{
    PanicHandler, QueueType, ReleasePolicy, TaskFunction, TaskHandle, TaskRecord, WorkStrategy,
    WorkerControl, WorkerPool, WorkerStats,
};
use crate::memory::TaskArena;
use crate::scheduler::{Registry, Source};
use crate::telemetry::{Metrics, MetricsSnapshot};
use crate::util::Backoff;
use parking_lot::Mutex;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Instant;

static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(1);

const RUNNING: u8 = 0;
const SHUTTING_DOWN: u8 = 1;
const STOPPED: u8 = 2;

struct GraphShared {
    id: u64,
    init_thread: ThreadId,
    registry: Registry,
    arena: TaskArena<TaskRecord>,
    workers: Vec<Arc<WorkerControl>>,
    default_workers: usize,
    panic_handler: PanicHandler,
    metrics: Metrics,
    // scheduled but not yet finished executing
    pending: AtomicUsize,
    state: AtomicU8,
}

/// Cloneable handle to a running task graph.
#[derive(Clone)]
pub struct GraphContext {
    shared: Arc<GraphShared>,
}

impl GraphContext {
    fn insert(
        &self,
        func: Option<TaskFunction>,
        parent: Option<TaskHandle>,
        policy: ReleasePolicy,
    ) -> TaskHandle {
        self.shared.metrics.record_task_created();
        let slot = self.shared.arena.insert(TaskRecord::new(func, parent, policy));
        TaskHandle::new(self.shared.id, slot)
    }

    fn check_owner(&self, task: TaskHandle) {
        assert!(
            task.graph == self.shared.id,
            "{:?} belongs to task graph {}, not {}",
            task,
            task.graph,
            self.shared.id
        );
    }

    fn record(&self, task: TaskHandle) -> Option<Arc<TaskRecord>> {
        self.check_owner(task);
        self.shared.arena.get(task.slot)
    }

    /// Creates a root task owned by the caller, who must [`release`](Self::release) it.
    pub fn create<F>(&self, f: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.insert(Some(Box::new(f)), None, ReleasePolicy::CallerOwned)
    }

    /// Creates a caller-owned root that does nothing; a join point for fan-out.
    pub fn create_empty(&self) -> TaskHandle {
        self.insert(None, None, ReleasePolicy::CallerOwned)
    }

    /// Creates a root whose slot is reclaimed by the graph once it completes.
    pub fn create_detached<F>(&self, f: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.insert(Some(Box::new(f)), None, ReleasePolicy::PoolReclaimed)
    }

    /// Creates a child of `parent`. The parent's pending count is raised before
    /// the child exists, so the parent cannot complete ahead of it.
    ///
    /// Every child must be registered before the parent is scheduled or could
    /// otherwise complete; [`fan_out`](Self::fan_out) enforces that by
    /// construction. Panics if `parent` has already completed or was released.
    pub fn create_with_parent<F>(&self, parent: TaskHandle, f: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let record = self
            .record(parent)
            .unwrap_or_else(|| panic!("parent task {:?} was already released", parent));
        let prev = record.add_child();
        assert!(
            prev > 0,
            "child registered on parent {:?} after the parent completed",
            parent
        );

        self.insert(Some(Box::new(f)), Some(parent), ReleasePolicy::PoolReclaimed)
    }

    /// Pushes `task` onto the calling thread's own queue of class `queue`.
    ///
    /// Panics after shutdown has begun, or when the calling thread is not a
    /// participant of this graph.
    pub fn schedule_task(&self, task: TaskHandle, queue: QueueType) {
        self.check_can_schedule();
        self.push(task, queue);
    }

    pub(crate) fn check_can_schedule(&self) {
        if let Some(reason) = self.schedule_refusal() {
            panic!("{}", reason);
        }
    }

    pub(crate) fn schedule_refusal(&self) -> Option<String> {
        if !self.is_running() {
            return Some(format!(
                "task scheduled on task graph {} after shutdown began",
                self.shared.id
            ));
        }
        if !self.is_registered_thread() {
            return Some(format!(
                "thread {:?} is not registered with task graph {}",
                thread::current().id(),
                self.shared.id
            ));
        }
        None
    }

    pub(crate) fn push(&self, task: TaskHandle, queue: QueueType) {
        self.check_owner(task);
        debug_assert!(self.shared.arena.contains(task.slot), "scheduling released task {:?}", task);

        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        self.shared.metrics.record_task_scheduled();
        self.shared.registry.enqueue(task, queue);
    }

    /// Fire-and-forget: creates a pool-reclaimed task and schedules it.
    pub fn spawn<F>(&self, f: F, queue: QueueType) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let task = self.create_detached(f);
        self.schedule_task(task, queue);
        task
    }

    /// True once the task and all of its registered children have finished.
    ///
    /// A handle whose slot was reclaimed reports completed: slots are only
    /// returned to the arena after completion.
    pub fn is_completed(&self, task: TaskHandle) -> bool {
        match self.record(task) {
            Some(record) => record.is_completed(),
            None => true,
        }
    }

    /// Blocks until `task` completes, running default-class tasks from any
    /// queue in the meantime.
    ///
    /// The calling thread never sleeps here; it joins the pool, so progress is
    /// guaranteed even if every worker is itself blocked in a wait. After
    /// shutdown the waiter also drains the background class, since no worker
    /// is left to do it.
    pub fn wait_for_completion(&self, task: TaskHandle) {
        let mut backoff = Backoff::new();

        while !self.is_completed(task) {
            let next = if self.is_running() {
                self.shared.registry.find(QueueType::Default)
            } else {
                self.next_task(WorkStrategy::Default)
            };

            match next {
                Some((next, source)) => {
                    if let Source::Stolen(_) = source {
                        self.shared.metrics.record_task_stolen();
                    }
                    self.run_task(next);
                    backoff.reset();
                }
                None => backoff.snooze(),
            }
        }
    }

    /// Returns a completed caller-owned task's slot to the arena.
    pub fn release(&self, task: TaskHandle) -> Result<()> {
        let record = self.record(task).ok_or(Error::StaleHandle)?;
        if record.policy() != ReleasePolicy::CallerOwned {
            return Err(Error::NotCallerOwned);
        }
        if !record.is_completed() {
            return Err(Error::TaskNotComplete);
        }
        drop(record);

        self.shared.arena.remove(task.slot).ok_or(Error::StaleHandle)?;
        self.shared.metrics.record_task_reclaimed();
        Ok(())
    }

    /// Runs a popped task on the calling thread and finishes it.
    pub(crate) fn run_task(&self, task: TaskHandle) {
        let record = self
            .record(task)
            .unwrap_or_else(|| panic!("scheduled task {:?} was released before it ran", task));

        if let Some(func) = record.take_function() {
            let start = Instant::now();
            if self.shared.panic_handler.execute(func).is_err() {
                self.shared.metrics.record_task_panic();
            }
            self.shared
                .metrics
                .record_task_execution(start.elapsed().as_nanos() as u64);
        } else {
            self.shared.metrics.record_task_execution(0);
        }
        drop(record);

        self.finish(task);
        self.shared.pending.fetch_sub(1, Ordering::AcqRel);
    }

    /// Drops one pending unit of `task`, cascading up the parent chain for
    /// every task that reaches zero.
    pub(crate) fn finish(&self, task: TaskHandle) {
        let mut current = Some(task);

        while let Some(handle) = current {
            let record = self
                .record(handle)
                .unwrap_or_else(|| panic!("finishing task {:?} whose slot was released", handle));

            if !record.complete_one() {
                return;
            }

            current = record.parent();
            if record.policy() == ReleasePolicy::PoolReclaimed {
                self.shared.arena.remove(handle.slot);
                self.shared.metrics.record_task_reclaimed();
            }
        }
    }

    /// Drops a task's function without running it and finishes it.
    pub(crate) fn discard(&self, task: TaskHandle) {
        if let Some(record) = self.record(task) {
            drop(record.take_function());
            drop(record);
            self.finish(task);
        }
    }

    pub(crate) fn next_task(&self, strategy: WorkStrategy) -> Option<(TaskHandle, Source)> {
        let registry = &self.shared.registry;
        match strategy {
            WorkStrategy::Default => registry
                .find(QueueType::Default)
                .or_else(|| registry.find(QueueType::Background)),
            WorkStrategy::BackgroundOnly => registry.find(QueueType::Background),
        }
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.shared.registry
    }

    pub(crate) fn telemetry(&self) -> &Metrics {
        &self.shared.metrics
    }

    /// Best-effort quiescence: nothing scheduled is unfinished and every
    /// worker reports idle. May be invalidated by the next enqueue.
    pub fn is_graph_idle(&self) -> bool {
        self.shared.pending.load(Ordering::Acquire) == 0
            && self.shared.workers.iter().all(|w| w.is_idle())
    }

    /// Spins until [`is_graph_idle`](Self::is_graph_idle) holds. Meant for tests.
    pub fn wait_until_graph_is_idle(&self) {
        let mut backoff = Backoff::new();
        while !self.is_graph_idle() {
            backoff.snooze();
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.load(Ordering::Acquire) == RUNNING
    }

    /// True when the calling thread owns queues in this graph.
    pub fn is_registered_thread(&self) -> bool {
        self.shared.registry.is_current_thread_bound()
    }

    pub fn num_workers(&self) -> usize {
        self.shared.workers.len()
    }

    pub fn num_default_workers(&self) -> usize {
        self.shared.default_workers
    }

    pub fn num_background_workers(&self) -> usize {
        self.shared.workers.len() - self.shared.default_workers
    }

    /// Tasks whose slots have not been reclaimed yet.
    pub fn live_tasks(&self) -> usize {
        self.shared.arena.len()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    pub fn worker_stats(&self) -> Vec<WorkerStats> {
        self.shared.workers.iter().map(|w| w.stats()).collect()
    }
}

impl fmt::Debug for GraphContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphContext")
            .field("id", &self.shared.id)
            .field("workers", &self.shared.workers.len())
            .field("live_tasks", &self.shared.arena.len())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Owner of a worker pool and its scheduling context.
///
/// Derefs to [`GraphContext`] for the submission API.
pub struct TaskGraph {
    ctx: GraphContext,
    pool: Mutex<WorkerPool>,
}

impl TaskGraph {
    /// Starts a graph with the default configuration.
    pub fn new() -> Result<Self> {
        Self::initialize(Config::default())
    }

    /// Registers the calling thread, spawns the workers, waits for each of
    /// them to register, then freezes the registry.
    pub fn initialize(config: Config) -> Result<Self> {
        config.validate()?;
        let default_workers = config.default_worker_threads()?;

        let workers: Vec<_> = (0..default_workers)
            .map(|id| Arc::new(WorkerControl::new(id, WorkStrategy::Default)))
            .chain((0..config.background_workers).map(|i| {
                Arc::new(WorkerControl::new(
                    default_workers + i,
                    WorkStrategy::BackgroundOnly,
                ))
            }))
            .collect();

        let id = NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed);
        let ctx = GraphContext {
            shared: Arc::new(GraphShared {
                id,
                init_thread: thread::current().id(),
                registry: Registry::new(id, workers.len() + 1),
                arena: TaskArena::new(),
                workers: workers.clone(),
                default_workers,
                panic_handler: PanicHandler::new(config.panic_strategy),
                metrics: Metrics::new(),
                pending: AtomicUsize::new(0),
                state: AtomicU8::new(RUNNING),
            }),
        };

        ctx.shared.registry.register_current_thread();

        let (ready_tx, ready_rx) = crossbeam_channel::bounded(workers.len());
        let spawned = WorkerPool::spawn(&config, &ctx, &workers, &ready_tx);
        drop(ready_tx);

        let mut pool = match spawned {
            Ok(pool) => pool,
            Err(e) => {
                ctx.shared.state.store(STOPPED, Ordering::Release);
                ctx.shared.registry.unbind_current_thread();
                return Err(e);
            }
        };

        for _ in 0..pool.len() {
            if ready_rx.recv().is_err() {
                ctx.shared.state.store(STOPPED, Ordering::Release);
                pool.shutdown();
                ctx.shared.registry.unbind_current_thread();
                return Err(Error::executor("worker exited before registering"));
            }
        }

        ctx.shared.registry.validate();

        tracing::info!(
            graph = id,
            default_workers,
            background_workers = config.background_workers,
            "task graph initialized"
        );

        Ok(Self {
            ctx,
            pool: Mutex::new(pool),
        })
    }

    /// A handle that task functions can capture.
    pub fn context(&self) -> GraphContext {
        self.ctx.clone()
    }

    /// Stops and joins every worker. Idempotent.
    ///
    /// Tasks still queued stay queued; a later `wait_for_completion` on this
    /// graph runs them, of either class, on the calling thread.
    pub fn shutdown(&self) {
        let shared = &self.ctx.shared;
        if shared
            .state
            .compare_exchange(RUNNING, SHUTTING_DOWN, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        tracing::info!(graph = shared.id, "shutting down task graph");
        self.pool.lock().shutdown();

        // thread-locals can only be dropped by their own thread; a retired
        // binding left on the initializing thread is pruned on its next
        // registry access
        shared.registry.retire();
        if thread::current().id() == shared.init_thread {
            shared.registry.unbind_current_thread();
        } else {
            tracing::debug!(
                graph = shared.id,
                "shut down off the initializing thread; its queue binding is released lazily"
            );
        }
        shared.state.store(STOPPED, Ordering::Release);
    }
}

impl Deref for TaskGraph {
    type Target = GraphContext;

    fn deref(&self) -> &GraphContext {
        &self.ctx
    }
}

impl Drop for TaskGraph {
    fn drop(&mut self) {
        self.shutdown();

        // queued closures may hold contexts of this graph; drop them so the
        // shared state is not kept alive by its own tasks
        let mut discarded = 0usize;
        for queue in [QueueType::Default, QueueType::Background] {
            while let Some((task, _)) = self.ctx.shared.registry.steal(queue) {
                self.ctx.discard(task);
                self.ctx.shared.pending.fetch_sub(1, Ordering::AcqRel);
                discarded += 1;
            }
        }

        if discarded > 0 {
            tracing::debug!(graph = self.ctx.shared.id, discarded, "discarded queued tasks");
        }
    }
}

impl fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskGraph").field("ctx", &self.ctx).finish()
    }
}
