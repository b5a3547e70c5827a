use super::registry::Registry;
use crate::executor::{QueueType, TaskHandle};
use crossbeam_deque::Steal;
use rand::Rng;

/// Where a task was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Source {
    Local,
    /// Taken from the registry entry at this index.
    Stolen(usize),
}

impl Registry {
    /// Pushes onto the calling thread's own queue for `queue`.
    ///
    /// Panics if the calling thread never registered with this graph.
    pub(crate) fn enqueue(&self, task: TaskHandle, queue: QueueType) {
        let pushed = self.with_local(|local| local.queue(queue).push(task));
        if pushed.is_none() {
            panic!(
                "thread {:?} is not registered with task graph {}",
                std::thread::current().id(),
                self.graph_id()
            );
        }
    }

    /// Non-blocking pop from the calling thread's own queue.
    pub(crate) fn dequeue_local(&self, queue: QueueType) -> Option<TaskHandle> {
        self.with_local(|local| local.queue(queue).pop()).flatten()
    }

    /// Sweeps every registered queue of class `queue`, the caller's own
    /// included, until one yields a task.
    ///
    /// The sweep starts at a random entry so idle threads do not all hammer
    /// the same victim.
    pub(crate) fn steal(&self, queue: QueueType) -> Option<(TaskHandle, usize)> {
        let queues = self.queues();
        if queues.is_empty() {
            return None;
        }

        let start = rand::thread_rng().gen_range(0..queues.len());
        for offset in 0..queues.len() {
            let idx = (start + offset) % queues.len();
            let stealer = queues[idx].stealer(queue);

            loop {
                match stealer.steal() {
                    Steal::Success(task) => return Some((task, idx)),
                    Steal::Empty => break,
                    Steal::Retry => continue,
                }
            }
        }

        None
    }

    /// Local pop first, then a full steal sweep.
    pub(crate) fn find(&self, queue: QueueType) -> Option<(TaskHandle, Source)> {
        if let Some(task) = self.dequeue_local(queue) {
            return Some((task, Source::Local));
        }

        let own = self.with_local(|local| local.index);
        self.steal(queue).map(|(task, idx)| {
            if Some(idx) == own {
                (task, Source::Local)
            } else {
                tracing::trace!(graph = self.graph_id(), victim = idx, "stole task");
                (task, Source::Stolen(idx))
            }
        })
    }
}
