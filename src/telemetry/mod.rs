//! Scheduler counters and task latency.

pub mod metrics;

pub use metrics::{Metrics, MetricsSnapshot};
