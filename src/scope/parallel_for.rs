use crate::executor::{QueueType, TaskHandle};
use crate::runtime::GraphContext;

type Body<'a> = dyn Fn(usize) + Send + Sync + 'a;

// waits for the root even when unwinding, so no child outlives the borrowed body
struct JoinGuard<'a> {
    ctx: &'a GraphContext,
    root: TaskHandle,
}

impl Drop for JoinGuard<'_> {
    fn drop(&mut self) {
        self.ctx.wait_for_completion(self.root);
        let _ = self.ctx.release(self.root);
    }
}

impl GraphContext {
    /// Calls `body(i)` for every `i` in `0..count`, one task per index, and
    /// returns once all calls have finished.
    ///
    /// Runs inline on the calling thread when `count <= 1`, the graph is no
    /// longer running, or the calling thread is not registered with it.
    pub fn parallel_for<F>(&self, count: usize, body: F)
    where
        F: Fn(usize) + Send + Sync,
    {
        if count <= 1 || !self.can_fan_out() {
            (0..count).for_each(body);
            return;
        }

        self.run_ranges(count, 1, &body);
    }

    /// Like [`parallel_for`](Self::parallel_for) but each task covers a
    /// contiguous range of `batch_size` indices. A `batch_size` of 0 picks one
    /// that gives every participating thread about four batches.
    pub fn parallel_for_batched<F>(&self, count: usize, batch_size: usize, body: F)
    where
        F: Fn(usize) + Send + Sync,
    {
        let batch = if batch_size == 0 {
            self.auto_batch_size(count)
        } else {
            batch_size
        };

        if count <= 1 || batch >= count || !self.can_fan_out() {
            (0..count).for_each(body);
            return;
        }

        self.run_ranges(count, batch, &body);
    }

    // checked before any task exists, so a refused fan-out leaks nothing
    fn can_fan_out(&self) -> bool {
        self.is_running() && self.is_registered_thread()
    }

    fn auto_batch_size(&self, count: usize) -> usize {
        let participants = self.num_default_workers() + 1;
        count.div_ceil(participants * 4).max(1)
    }

    fn run_ranges<'b>(&self, count: usize, batch: usize, body: &'b Body<'b>) {
        // SAFETY: every task created below only runs `body` before its root
        // completes, and the guard blocks this frame until the root completes,
        // on normal return and on unwind alike. The reference therefore never
        // outlives the borrow it was made from.
        let body: &'static Body<'static> =
            unsafe { std::mem::transmute::<&'b Body<'b>, &'static Body<'static>>(body) };

        let mut builder = self.fan_out();
        let mut start = 0;
        while start < count {
            let end = (start + batch).min(count);
            builder = builder.child(move || (start..end).for_each(body));
            start = end;
        }

        let root = self.schedule_fan_out(builder.build(), QueueType::Default);
        drop(JoinGuard { ctx: self, root });
    }
}
