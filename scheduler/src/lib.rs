//! RateSync Scheduler
//!
//! The scheduler drives the daily synchronization cycle against the
//! registered rate providers, with failover across providers, a one-shot
//! retry after server-side failures, and a lock-guarded historical
//! backfill path.

pub mod config;
pub mod error;
pub mod history;
pub mod metrics;
pub mod scheduler;
pub mod state;

pub use config::{SchedulerConfig, SyncConfig};
pub use error::{SchedulerError, SchedulerResult};
pub use history::{HistoryOutcome, HistoryUpdater};
pub use metrics::{Metrics, MetricsSnapshot, SharedMetrics};
pub use scheduler::{CycleReport, SyncScheduler};
pub use state::SchedulerState;
