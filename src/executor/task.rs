//! Task representation and completion counting.

use crate::memory::ArenaIndex;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// One unit of work. Runs on whichever participating thread pops it.
pub type TaskFunction = Box<dyn FnOnce() + Send + 'static>;

/// Copyable reference to a task slot in one graph's arena.
///
/// A handle is only meaningful to the graph that created it; passing it to
/// another graph panics.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    pub(crate) graph: u64,
    pub(crate) slot: ArenaIndex,
}

impl TaskHandle {
    pub(crate) fn new(graph: u64, slot: ArenaIndex) -> Self {
        Self { graph, slot }
    }

    /// Id of the graph that created this handle.
    pub fn graph_id(&self) -> u64 {
        self.graph
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TaskHandle(g{}:{}:{})",
            self.graph,
            self.slot.index(),
            self.slot.generation()
        )
    }
}

/// Who returns a task's slot to the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleasePolicy {
    /// The submitter calls `release` once it has observed completion.
    CallerOwned,
    /// The slot is reclaimed as soon as the task's counter reaches zero.
    PoolReclaimed,
}

/// Queue class a task is scheduled onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueueType {
    #[default]
    Default,
    Background,
}

pub(crate) struct TaskRecord {
    func: Mutex<Option<TaskFunction>>,
    parent: Option<TaskHandle>,
    unfinished: AtomicUsize,
    executed: AtomicBool,
    policy: ReleasePolicy,
}

impl TaskRecord {
    pub(crate) fn new(
        func: Option<TaskFunction>,
        parent: Option<TaskHandle>,
        policy: ReleasePolicy,
    ) -> Self {
        Self {
            func: Mutex::new(func),
            parent,
            unfinished: AtomicUsize::new(1),
            executed: AtomicBool::new(false),
            policy,
        }
    }

    pub(crate) fn parent(&self) -> Option<TaskHandle> {
        self.parent
    }

    pub(crate) fn policy(&self) -> ReleasePolicy {
        self.policy
    }

    /// Registers one more pending child. Returns the previous count.
    pub(crate) fn add_child(&self) -> usize {
        self.unfinished.fetch_add(1, Ordering::AcqRel)
    }

    /// Drops one pending unit; `true` when this call brought the count to zero.
    pub(crate) fn complete_one(&self) -> bool {
        let prev = self.unfinished.fetch_sub(1, Ordering::AcqRel);
        assert!(prev > 0, "task finished more times than it was registered");
        prev == 1
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.unfinished.load(Ordering::Acquire) == 0
    }

    pub(crate) fn unfinished(&self) -> usize {
        self.unfinished.load(Ordering::Acquire)
    }

    /// Takes the function for execution. Panics on a second attempt.
    pub(crate) fn take_function(&self) -> Option<TaskFunction> {
        let already = self.executed.swap(true, Ordering::AcqRel);
        assert!(!already, "task executed twice; was it scheduled more than once?");
        self.func.lock().take()
    }
}

impl fmt::Debug for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRecord")
            .field("parent", &self.parent)
            .field("unfinished", &self.unfinished())
            .field("executed", &self.executed.load(Ordering::Relaxed))
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_has_one_pending_unit() {
        let record = TaskRecord::new(None, None, ReleasePolicy::CallerOwned);
        assert_eq!(record.unfinished(), 1);
        assert!(!record.is_completed());
        assert!(record.complete_one());
        assert!(record.is_completed());
    }

    #[test]
    fn test_children_hold_the_count_open() {
        let record = TaskRecord::new(None, None, ReleasePolicy::CallerOwned);
        assert_eq!(record.add_child(), 1);
        assert_eq!(record.add_child(), 2);

        assert!(!record.complete_one());
        assert!(!record.complete_one());
        assert!(!record.is_completed());
        assert!(record.complete_one());
    }

    #[test]
    fn test_function_is_taken_once() {
        let record = TaskRecord::new(Some(Box::new(|| {})), None, ReleasePolicy::PoolReclaimed);
        assert!(record.take_function().is_some());
    }

    #[test]
    #[should_panic(expected = "executed twice")]
    fn test_second_take_panics() {
        let record = TaskRecord::new(None, None, ReleasePolicy::CallerOwned);
        let _ = record.take_function();
        let _ = record.take_function();
    }

    #[test]
    #[should_panic(expected = "finished more times")]
    fn test_over_completion_panics() {
        let record = TaskRecord::new(None, None, ReleasePolicy::CallerOwned);
        record.complete_one();
        record.complete_one();
    }

    #[test]
    fn test_queue_type_defaults_to_default_class() {
        assert_eq!(QueueType::default(), QueueType::Default);
    }
}
