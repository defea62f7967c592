//! Metrics collection for runtime monitoring.

use hdrhistogram::Histogram;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Runtime metrics collector
#[derive(Debug)]
pub struct Metrics {
    // Pool counters
    jobs_executed: AtomicU64,
    jobs_panicked: AtomicU64,

    // Scheduler counters
    tasks_fired: AtomicU64,
    tasks_cancelled: AtomicU64,
    tasks_panicked: AtomicU64,

    // Job run latency (protected by RwLock for interior mutability)
    run_latency: RwLock<Histogram<u64>>,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        // 3 significant figures, max value of 1 hour in nanoseconds
        let histogram =
            Histogram::new_with_max(3_600_000_000_000, 3).expect("failed to create histogram");

        Self {
            jobs_executed: AtomicU64::new(0),
            jobs_panicked: AtomicU64::new(0),
            tasks_fired: AtomicU64::new(0),
            tasks_cancelled: AtomicU64::new(0),
            tasks_panicked: AtomicU64::new(0),
            run_latency: RwLock::new(histogram),
            start_time: Instant::now(),
        }
    }

    pub fn record_job_execution(&self, duration_ns: u64) {
        self.jobs_executed.fetch_add(1, Ordering::Relaxed);

        if let Some(mut hist) = self.run_latency.try_write() {
            let _ = hist.record(duration_ns);
        }
    }

    pub fn record_job_panic(&self) {
        self.jobs_panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_fired(&self) {
        self.tasks_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_cancelled(&self) {
        self.tasks_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_panic(&self) {
        self.tasks_panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let hist = self.run_latency.read();

        MetricsSnapshot {
            jobs_executed: self.jobs_executed.load(Ordering::Relaxed),
            jobs_panicked: self.jobs_panicked.load(Ordering::Relaxed),
            tasks_fired: self.tasks_fired.load(Ordering::Relaxed),
            tasks_cancelled: self.tasks_cancelled.load(Ordering::Relaxed),
            tasks_panicked: self.tasks_panicked.load(Ordering::Relaxed),
            run_latency_p50_ns: hist.value_at_quantile(0.5),
            run_latency_p99_ns: hist.value_at_quantile(0.99),
            run_latency_max_ns: hist.max(),
            uptime_secs: self.start_time.elapsed().as_secs_f64(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the collected metrics
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub jobs_executed: u64,
    pub jobs_panicked: u64,
    pub tasks_fired: u64,
    pub tasks_cancelled: u64,
    pub tasks_panicked: u64,
    pub run_latency_p50_ns: u64,
    pub run_latency_p99_ns: u64,
    pub run_latency_max_ns: u64,
    pub uptime_secs: f64,
}
