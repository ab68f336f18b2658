// surge-core/src/observability.rs
// Run-level counters for the harness

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Counters published through the `metrics` facade and mirrored locally so
/// the binary can print a summary without installing an exporter.
#[derive(Debug, Default)]
pub struct HarnessMetrics {
    rounds_completed: AtomicU64,
    size_shrinks: AtomicU64,
    workloads_skipped: AtomicU64,
    worker_failures: AtomicU64,
}

/// Point-in-time copy of [`HarnessMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub rounds_completed: u64,
    pub size_shrinks: u64,
    pub workloads_skipped: u64,
    pub worker_failures: u64,
}

impl HarnessMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_shrink(&self, from: usize, to: usize) {
        self.size_shrinks.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("surge_size_shrinks_total").increment(1);
        debug!("Recorded size shrink: {} -> {}", from, to);
    }

    pub fn record_abort(&self) {
        metrics::counter!("surge_size_aborts_total").increment(1);
    }

    pub fn record_skip(&self, test: &str) {
        self.workloads_skipped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("surge_workloads_skipped_total", "test" => test.to_string()).increment(1);
    }

    pub fn record_worker_failure(&self) {
        self.worker_failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("surge_worker_failures_total").increment(1);
    }

    pub fn record_round(&self, size_multiplier: f64, duration: Duration) {
        self.rounds_completed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("surge_rounds_total").increment(1);
        metrics::histogram!("surge_round_duration_seconds").record(duration.as_secs_f64());
        metrics::gauge!("surge_last_size_multiplier").set(size_multiplier);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rounds_completed: self.rounds_completed.load(Ordering::Relaxed),
            size_shrinks: self.size_shrinks.load(Ordering::Relaxed),
            workloads_skipped: self.workloads_skipped.load(Ordering::Relaxed),
            worker_failures: self.worker_failures.load(Ordering::Relaxed),
        }
    }
}
