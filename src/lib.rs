//! taskgraph - in-process work-stealing task scheduler
//!
//! A fixed pool of worker threads drains per-thread task queues, stealing
//! from each other when their own queues run dry. Tasks form join trees:
//! a parent counts its registered children and completes only after all of
//! them have. A thread that waits on a task joins the pool until that task
//! completes instead of sleeping.
//!
//! # Quick Start
//!
//! ```no_run
//! use taskgraph::prelude::*;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let graph = TaskGraph::new().unwrap();
//!
//! let hits = AtomicUsize::new(0);
//! graph.parallel_for(10_000, |_| {
//!     hits.fetch_add(1, Ordering::Relaxed);
//! });
//! assert_eq!(hits.load(Ordering::Relaxed), 10_000);
//!
//! let fan_out = graph
//!     .fan_out()
//!     .child(|| println!("decode mesh"))
//!     .child(|| println!("compress texture"))
//!     .build();
//! let root = graph.schedule_fan_out(fan_out, QueueType::Default);
//! graph.wait_for_completion(root);
//! graph.release(root).unwrap();
//! ```
//!
//! # Features
//!
//! - **Local-first queues**: submission never touches another thread's queue
//! - **Two queue classes**: default work and background work, with
//!   background-only workers
//! - **Cooperative waiting**: waiters execute pending tasks
//! - **Generation-checked task slots**: stale handles are detected, never aliased

#![warn(missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod executor;
pub mod memory;
pub mod prelude;
pub mod runtime;
pub(crate) mod scheduler;
pub mod scope;
pub mod telemetry;
pub mod util;

pub use config::{Config, ConfigBuilder};
pub use error::{Error, Result};
pub use executor::{PanicStrategy, QueueType, ReleasePolicy, TaskHandle, WorkStrategy, WorkerStats};
pub use runtime::{GraphContext, TaskGraph};
pub use scope::{FanOut, FanOutBuilder};
pub use telemetry::MetricsSnapshot;
