//! Metrics collection for the task graph.

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Metrics {
    tasks_created: AtomicU64,
    tasks_scheduled: AtomicU64,
    tasks_executed: AtomicU64,
    tasks_stolen: AtomicU64,
    tasks_panicked: AtomicU64,
    tasks_reclaimed: AtomicU64,

    // execution time of task functions, in nanoseconds
    latency_histogram: Mutex<Histogram<u64>>,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        // 1 hour max at 3 significant figures
        let histogram = Histogram::new_with_max(3_600_000_000_000, 3)
            .expect("constant histogram bounds are valid");

        Self {
            tasks_created: AtomicU64::new(0),
            tasks_scheduled: AtomicU64::new(0),
            tasks_executed: AtomicU64::new(0),
            tasks_stolen: AtomicU64::new(0),
            tasks_panicked: AtomicU64::new(0),
            tasks_reclaimed: AtomicU64::new(0),
            latency_histogram: Mutex::new(histogram),
            start_time: Instant::now(),
        }
    }

    pub fn record_task_created(&self) {
        self.tasks_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_scheduled(&self) {
        self.tasks_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_execution(&self, duration_ns: u64) {
        self.tasks_executed.fetch_add(1, Ordering::Relaxed);

        // skip the sample rather than stall a worker behind a snapshot
        if let Some(mut hist) = self.latency_histogram.try_lock() {
            let _ = hist.record(duration_ns);
        }
    }

    pub fn record_task_stolen(&self) {
        self.tasks_stolen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_panic(&self) {
        self.tasks_panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_reclaimed(&self) {
        self.tasks_reclaimed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let histogram = self.latency_histogram.lock();
        let sampled = histogram.len() > 0;

        MetricsSnapshot {
            uptime: self.start_time.elapsed(),
            tasks_created: self.tasks_created.load(Ordering::Relaxed),
            tasks_scheduled: self.tasks_scheduled.load(Ordering::Relaxed),
            tasks_executed: self.tasks_executed.load(Ordering::Relaxed),
            tasks_stolen: self.tasks_stolen.load(Ordering::Relaxed),
            tasks_panicked: self.tasks_panicked.load(Ordering::Relaxed),
            tasks_reclaimed: self.tasks_reclaimed.load(Ordering::Relaxed),
            avg_latency_ns: if sampled { histogram.mean() as u64 } else { 0 },
            p50_latency_ns: if sampled { histogram.value_at_quantile(0.50) } else { 0 },
            p99_latency_ns: if sampled { histogram.value_at_quantile(0.99) } else { 0 },
            max_latency_ns: if sampled { histogram.max() } else { 0 },
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub uptime: Duration,
    pub tasks_created: u64,
    pub tasks_scheduled: u64,
    pub tasks_executed: u64,
    pub tasks_stolen: u64,
    pub tasks_panicked: u64,
    pub tasks_reclaimed: u64,
    pub avg_latency_ns: u64,
    pub p50_latency_ns: u64,
    pub p99_latency_ns: u64,
    pub max_latency_ns: u64,
}

impl MetricsSnapshot {
    pub fn tasks_per_second(&self) -> f64 {
        let seconds = self.uptime.as_secs_f64();
        if seconds == 0.0 {
            return 0.0;
        }
        self.tasks_executed as f64 / seconds
    }

    /// Fraction of executed tasks that were taken from another thread's queue.
    pub fn steal_ratio(&self) -> f64 {
        if self.tasks_executed == 0 {
            return 0.0;
        }
        self.tasks_stolen as f64 / self.tasks_executed as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = Metrics::new();

        metrics.record_task_created();
        metrics.record_task_scheduled();
        metrics.record_task_execution(1_000);
        metrics.record_task_execution(3_000);
        metrics.record_task_stolen();
        metrics.record_task_reclaimed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tasks_created, 1);
        assert_eq!(snapshot.tasks_scheduled, 1);
        assert_eq!(snapshot.tasks_executed, 2);
        assert_eq!(snapshot.tasks_stolen, 1);
        assert_eq!(snapshot.tasks_reclaimed, 1);
        assert!(snapshot.avg_latency_ns > 0);
        assert!(snapshot.max_latency_ns >= 3_000);
        assert_eq!(snapshot.steal_ratio(), 0.5);
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = Metrics::new().snapshot();
        assert_eq!(snapshot.tasks_executed, 0);
        assert_eq!(snapshot.p99_latency_ns, 0);
        assert_eq!(snapshot.steal_ratio(), 0.0);
    }
}
