//! Metrics collection for synchronization monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ratesync_store::reconcile::ReconcileOutcome;

/// Scheduler metrics.
pub struct Metrics {
    /// Total synchronization cycles run.
    pub cycles_total: AtomicU64,
    /// Cycles that fell back to secondary providers.
    pub cycles_failed_over: AtomicU64,
    /// Records created by reconciliation.
    pub records_created: AtomicU64,
    /// Records updated by reconciliation.
    pub records_updated: AtomicU64,
    /// Quotes skipped as duplicates or unusable.
    pub quotes_skipped: AtomicU64,
    /// Historical backfills run.
    pub backfills_total: AtomicU64,
    /// Historical backfills skipped because one was already running.
    pub backfills_skipped: AtomicU64,
    /// Retry timers armed after server-side failures.
    pub retries_armed: AtomicU64,
    /// Retry timers cancelled by a later successful cycle.
    pub retries_cancelled: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            cycles_total: AtomicU64::new(0),
            cycles_failed_over: AtomicU64::new(0),
            records_created: AtomicU64::new(0),
            records_updated: AtomicU64::new(0),
            quotes_skipped: AtomicU64::new(0),
            backfills_total: AtomicU64::new(0),
            backfills_skipped: AtomicU64::new(0),
            retries_armed: AtomicU64::new(0),
            retries_cancelled: AtomicU64::new(0),
        }
    }

    /// Increment cycles run.
    pub fn cycle_run(&self) {
        self.cycles_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cycle that fell back to other providers.
    pub fn cycle_failed_over(&self) {
        self.cycles_failed_over.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold a reconciliation outcome into the counters.
    pub fn record_outcome(&self, outcome: &ReconcileOutcome) {
        self.records_created
            .fetch_add(outcome.created as u64, Ordering::Relaxed);
        self.records_updated
            .fetch_add(outcome.updated as u64, Ordering::Relaxed);
        self.quotes_skipped
            .fetch_add(outcome.skipped as u64, Ordering::Relaxed);
    }

    /// Increment backfills run.
    pub fn backfill_run(&self) {
        self.backfills_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a backfill skipped on lock contention.
    pub fn backfill_skipped(&self) {
        self.backfills_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a retry timer being armed.
    pub fn retry_armed(&self) {
        self.retries_armed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a retry timer being cancelled.
    pub fn retry_cancelled(&self) {
        self.retries_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cycles_total: self.cycles_total.load(Ordering::Relaxed),
            cycles_failed_over: self.cycles_failed_over.load(Ordering::Relaxed),
            records_created: self.records_created.load(Ordering::Relaxed),
            records_updated: self.records_updated.load(Ordering::Relaxed),
            quotes_skipped: self.quotes_skipped.load(Ordering::Relaxed),
            backfills_total: self.backfills_total.load(Ordering::Relaxed),
            backfills_skipped: self.backfills_skipped.load(Ordering::Relaxed),
            retries_armed: self.retries_armed.load(Ordering::Relaxed),
            retries_cancelled: self.retries_cancelled.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP ratesync_cycles_total Total synchronization cycles run
# TYPE ratesync_cycles_total counter
ratesync_cycles_total {}

# HELP ratesync_cycles_failed_over Cycles that fell back to secondary providers
# TYPE ratesync_cycles_failed_over counter
ratesync_cycles_failed_over {}

# HELP ratesync_records_created Records created by reconciliation
# TYPE ratesync_records_created counter
ratesync_records_created {}

# HELP ratesync_records_updated Records updated by reconciliation
# TYPE ratesync_records_updated counter
ratesync_records_updated {}

# HELP ratesync_quotes_skipped Quotes skipped as duplicates or unusable
# TYPE ratesync_quotes_skipped counter
ratesync_quotes_skipped {}

# HELP ratesync_backfills_total Historical backfills run
# TYPE ratesync_backfills_total counter
ratesync_backfills_total {}

# HELP ratesync_backfills_skipped Historical backfills skipped on lock contention
# TYPE ratesync_backfills_skipped counter
ratesync_backfills_skipped {}

# HELP ratesync_retries_armed Retry timers armed after server-side failures
# TYPE ratesync_retries_armed counter
ratesync_retries_armed {}

# HELP ratesync_retries_cancelled Retry timers cancelled by a later success
# TYPE ratesync_retries_cancelled counter
ratesync_retries_cancelled {}
"#,
            snapshot.cycles_total,
            snapshot.cycles_failed_over,
            snapshot.records_created,
            snapshot.records_updated,
            snapshot.quotes_skipped,
            snapshot.backfills_total,
            snapshot.backfills_skipped,
            snapshot.retries_armed,
            snapshot.retries_cancelled,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub cycles_total: u64,
    pub cycles_failed_over: u64,
    pub records_created: u64,
    pub records_updated: u64,
    pub quotes_skipped: u64,
    pub backfills_total: u64,
    pub backfills_skipped: u64,
    pub retries_armed: u64,
    pub retries_cancelled: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;
