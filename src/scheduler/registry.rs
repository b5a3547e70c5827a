//! Per-thread queue registry.
//!
//! Every participating thread (the initializing thread plus each worker)
//! registers exactly once. The owning halves of its two deques stay in a
//! thread-local binding; the stealer halves go into the shared list. Once the
//! expected number of threads has registered the list is frozen and all
//! further reads are lock-free.
//!
//! A registry is retired at shutdown. A thread-local binding can only be
//! removed by its own thread, so retired bindings are dropped the next time
//! their thread touches any registry.

use crate::executor::{QueueType, TaskHandle};
use crossbeam_deque::{Stealer, Worker as Deque};
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

/// Stealer halves of one thread's queues, visible to every participant.
pub(crate) struct ThreadTaskQueues {
    default: Stealer<TaskHandle>,
    background: Stealer<TaskHandle>,
}

impl ThreadTaskQueues {
    pub(crate) fn stealer(&self, queue: QueueType) -> &Stealer<TaskHandle> {
        match queue {
            QueueType::Default => &self.default,
            QueueType::Background => &self.background,
        }
    }
}

/// Owner halves of the current thread's queues.
pub(crate) struct LocalQueues {
    pub(crate) index: usize,
    default: Deque<TaskHandle>,
    background: Deque<TaskHandle>,
    retired: Arc<AtomicBool>,
}

impl LocalQueues {
    pub(crate) fn queue(&self, queue: QueueType) -> &Deque<TaskHandle> {
        match queue {
            QueueType::Default => &self.default,
            QueueType::Background => &self.background,
        }
    }
}

thread_local! {
    // keyed by graph id
    static LOCAL_QUEUES: RefCell<HashMap<u64, LocalQueues>> = RefCell::new(HashMap::new());
}

#[derive(Default)]
struct Entries {
    list: Vec<ThreadTaskQueues>,
    by_thread: HashMap<ThreadId, usize>,
}

pub(crate) struct Registry {
    graph_id: u64,
    expected: usize,
    pending: Mutex<Entries>,
    frozen: OnceLock<Entries>,
    retired: Arc<AtomicBool>,
}

impl Registry {
    pub(crate) fn new(graph_id: u64, expected: usize) -> Self {
        Self {
            graph_id,
            expected,
            pending: Mutex::new(Entries::default()),
            frozen: OnceLock::new(),
            retired: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn graph_id(&self) -> u64 {
        self.graph_id
    }

    /// Allocates queues for the calling thread and binds them to it.
    ///
    /// Returns the thread's position in the registry list.
    pub(crate) fn register_current_thread(&self) -> usize {
        let thread_id = thread::current().id();

        let mut pending = self.pending.lock();
        assert!(
            !self.is_validated(),
            "thread {:?} registered after the registry was validated",
            thread_id
        );
        assert!(
            !pending.by_thread.contains_key(&thread_id),
            "thread {:?} registered twice with task graph {}",
            thread_id,
            self.graph_id
        );
        assert!(
            pending.list.len() < self.expected,
            "more threads registered than the {} expected",
            self.expected
        );

        let default = Deque::new_fifo();
        let background = Deque::new_fifo();
        let index = pending.list.len();

        pending.list.push(ThreadTaskQueues {
            default: default.stealer(),
            background: background.stealer(),
        });
        pending.by_thread.insert(thread_id, index);
        drop(pending);

        LOCAL_QUEUES.with(|local| {
            let mut local = local.borrow_mut();
            local.retain(|_, queues| !queues.retired.load(Ordering::Acquire));
            local.insert(
                self.graph_id,
                LocalQueues {
                    index,
                    default,
                    background,
                    retired: self.retired.clone(),
                },
            );
        });

        tracing::debug!(graph = self.graph_id, index, "registered thread");
        index
    }

    /// Freezes the registry. Every expected thread must have registered.
    pub(crate) fn validate(&self) {
        let mut pending = self.pending.lock();
        assert_eq!(
            pending.list.len(),
            self.expected,
            "registry validated before every thread registered"
        );

        let entries = std::mem::take(&mut *pending);
        if self.frozen.set(entries).is_err() {
            panic!("task graph {} registry validated twice", self.graph_id);
        }
    }

    pub(crate) fn is_validated(&self) -> bool {
        self.frozen.get().is_some()
    }

    /// Lock-free view of every registered thread's queues.
    pub(crate) fn queues(&self) -> &[ThreadTaskQueues] {
        match self.frozen.get() {
            Some(entries) => &entries.list,
            None => panic!("task graph {} registry read before validation", self.graph_id),
        }
    }

    /// Marks every binding of this registry as dead. Queued handles stay
    /// reachable through the stealer halves.
    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    pub(crate) fn with_local<R>(&self, f: impl FnOnce(&LocalQueues) -> R) -> Option<R> {
        LOCAL_QUEUES.with(|local| {
            let mut local = local.borrow_mut();
            if self.is_retired() {
                local.remove(&self.graph_id);
                return None;
            }
            local.get(&self.graph_id).map(f)
        })
    }

    #[cfg(test)]
    pub(crate) fn has_local_entry(&self) -> bool {
        LOCAL_QUEUES.with(|local| local.borrow().contains_key(&self.graph_id))
    }

    pub(crate) fn is_current_thread_bound(&self) -> bool {
        self.with_local(|_| ()).is_some()
    }

    /// Drops the calling thread's binding. Handles still in its queues are
    /// dropped with it.
    pub(crate) fn unbind_current_thread(&self) -> bool {
        LOCAL_QUEUES
            .try_with(|local| local.borrow_mut().remove(&self.graph_id).is_some())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    // registry ids must not collide with live graphs in other tests
    fn unique_id() -> u64 {
        static NEXT: AtomicU64 = AtomicU64::new(u64::MAX / 2);
        NEXT.fetch_add(1, Ordering::Relaxed)
    }

    #[test]
    fn test_register_and_validate() {
        let registry = Arc::new(Registry::new(unique_id(), 3));
        registry.register_current_thread();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.register_current_thread())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert!(!registry.is_validated());
        registry.validate();
        assert!(registry.is_validated());
        assert_eq!(registry.queues().len(), 3);
        assert_eq!(registry.with_local(|local| local.index), Some(0));
        assert!(registry.unbind_current_thread());
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn test_double_registration_panics() {
        let registry = Registry::new(unique_id(), 2);
        registry.register_current_thread();
        registry.register_current_thread();
    }

    #[test]
    #[should_panic(expected = "before every thread registered")]
    fn test_early_validation_panics() {
        let registry = Registry::new(unique_id(), 2);
        registry.register_current_thread();
        registry.validate();
    }

    #[test]
    #[should_panic(expected = "read before validation")]
    fn test_unvalidated_read_panics() {
        let registry = Registry::new(unique_id(), 1);
        let _ = registry.queues();
    }

    #[test]
    fn test_unbound_thread_has_no_local_queues() {
        let registry = Registry::new(unique_id(), 1);
        assert!(!registry.is_current_thread_bound());
        registry.register_current_thread();
        assert!(registry.is_current_thread_bound());
        assert!(registry.unbind_current_thread());
        assert!(!registry.is_current_thread_bound());
    }

    fn bound_graphs() -> usize {
        LOCAL_QUEUES.with(|local| local.borrow().len())
    }

    #[test]
    fn test_retired_binding_released_on_next_access() {
        let registry = Arc::new(Registry::new(unique_id(), 1));
        registry.register_current_thread();
        registry.validate();
        let before = bound_graphs();

        let remote = registry.clone();
        std::thread::spawn(move || remote.retire()).join().unwrap();

        assert!(!registry.is_current_thread_bound());
        assert_eq!(bound_graphs(), before - 1);
    }

    #[test]
    fn test_registering_prunes_retired_bindings() {
        let old = Registry::new(unique_id(), 1);
        old.register_current_thread();
        old.retire();

        let new = Registry::new(unique_id(), 1);
        new.register_current_thread();

        let old_id = old.graph_id();
        assert!(!LOCAL_QUEUES.with(|local| local.borrow().contains_key(&old_id)));
        assert!(new.unbind_current_thread());
    }
}
