use super::worker::{Worker, WorkerControl, WorkStrategy};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::runtime::GraphContext;
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::thread;

/// The long-lived worker threads of one graph.
pub(crate) struct WorkerPool {
    workers: Vec<Worker>,
}

impl WorkerPool {
    /// Spawns one thread per control. Each thread signals `ready` once it has
    /// registered its queues.
    ///
    /// On a spawn failure the threads already started are stopped and joined.
    pub(crate) fn spawn(
        config: &Config,
        ctx: &GraphContext,
        controls: &[Arc<WorkerControl>],
        ready: &Sender<()>,
    ) -> Result<Self> {
        let mut pool = Self {
            workers: Vec::with_capacity(controls.len()),
        };

        for control in controls {
            let name = match control.strategy {
                WorkStrategy::Default => format!("{}-{}", config.thread_name_prefix, control.id),
                WorkStrategy::BackgroundOnly => {
                    format!("{}-bg-{}", config.thread_name_prefix, control.id)
                }
            };

            let mut builder = thread::Builder::new().name(name);
            if let Some(stack_size) = config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            let ctx_clone = ctx.clone();
            let control_clone = control.clone();
            let ready_clone = ready.clone();

            let spawned = builder.spawn(move || {
                Worker::run(ctx_clone, control_clone, ready_clone);
            });

            match spawned {
                Ok(thread) => pool.workers.push(Worker::new(control.clone(), thread)),
                Err(e) => {
                    pool.shutdown();
                    return Err(Error::executor(format!("spawn failed: {}", e)));
                }
            }
        }

        Ok(pool)
    }

    pub(crate) fn len(&self) -> usize {
        self.workers.len()
    }

    /// Signals every worker, then joins them all.
    pub(crate) fn shutdown(&mut self) {
        for worker in &self.workers {
            worker.trigger_shutdown();
        }

        for worker in &mut self.workers {
            worker.wait_until_shutdown();
            tracing::trace!(worker = worker.id(), "joined worker");
        }

        self.workers.clear();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
