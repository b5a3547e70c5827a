//! Fan-out construction that cannot race with parent completion.
//!
//! The root handle stays private to [`FanOutBuilder`] until [`build`] returns,
//! so nothing can schedule or observe the root while children are still being
//! registered against it.
//!
//! [`build`]: FanOutBuilder::build

use crate::executor::{QueueType, TaskHandle};
use crate::runtime::GraphContext;

#[derive(Debug)]
pub struct FanOutBuilder<'g> {
    ctx: &'g GraphContext,
    root: TaskHandle,
    children: Vec<TaskHandle>,
    built: bool,
}

impl<'g> FanOutBuilder<'g> {
    fn new(ctx: &'g GraphContext, root: TaskHandle) -> Self {
        Self {
            ctx,
            root,
            children: Vec::new(),
            built: false,
        }
    }

    pub fn child<F>(mut self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let child = self.ctx.create_with_parent(self.root, f);
        self.children.push(child);
        self
    }

    pub fn children<I, F>(mut self, fns: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() + Send + 'static,
    {
        for f in fns {
            let child = self.ctx.create_with_parent(self.root, f);
            self.children.push(child);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Freezes the child set.
    pub fn build(mut self) -> FanOut {
        self.built = true;
        FanOut {
            root: self.root,
            children: std::mem::take(&mut self.children),
        }
    }
}

impl Drop for FanOutBuilder<'_> {
    // an abandoned builder discards its tasks instead of leaking their slots
    fn drop(&mut self) {
        if self.built {
            return;
        }

        self.ctx.abandon(self.root, &self.children);
    }
}

/// A root task and its complete, immutable set of children.
#[derive(Debug)]
#[must_use = "a fan-out does nothing until it is scheduled"]
pub struct FanOut {
    root: TaskHandle,
    children: Vec<TaskHandle>,
}

impl FanOut {
    pub fn root(&self) -> TaskHandle {
        self.root
    }

    pub fn children(&self) -> &[TaskHandle] {
        &self.children
    }
}

impl GraphContext {
    /// Starts a fan-out under an empty caller-owned root.
    pub fn fan_out(&self) -> FanOutBuilder<'_> {
        FanOutBuilder::new(self, self.create_empty())
    }

    /// Starts a fan-out whose caller-owned root runs `f`.
    pub fn fan_out_with<F>(&self, f: F) -> FanOutBuilder<'_>
    where
        F: FnOnce() + Send + 'static,
    {
        FanOutBuilder::new(self, self.create(f))
    }

    /// Schedules every child, then the root. Returns the root, which the
    /// caller waits on and finally releases.
    ///
    /// Preconditions are checked once up front, so either the whole fan-out
    /// is queued or none of it is. A refused fan-out is discarded before the
    /// panic.
    pub fn schedule_fan_out(&self, fan_out: FanOut, queue: QueueType) -> TaskHandle {
        if let Some(reason) = self.schedule_refusal() {
            self.abandon(fan_out.root, &fan_out.children);
            panic!("{}", reason);
        }
        for &child in &fan_out.children {
            self.push(child, queue);
        }
        self.push(fan_out.root, queue);
        fan_out.root
    }

    fn abandon(&self, root: TaskHandle, children: &[TaskHandle]) {
        for &child in children {
            self.discard(child);
        }
        self.discard(root);
        let _ = self.release(root);
    }
}
