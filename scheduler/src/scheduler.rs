//! The daily synchronization cycle.
//!
//! One cycle fetches current rates from the active provider and reconciles
//! them into the store. An empty result or a fetch error makes the cycle
//! fall back to every other registered provider, and a server-side failure
//! additionally arms a one-shot retry of the whole cycle. The daemon loop
//! fires a cycle once a day at the configured UTC time.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use ratesync_common::CurrencyRate;
use ratesync_provider::{ProviderError, ProviderRegistry};
use ratesync_store::{ReconcileOutcome, ReconciliationEngine};

use crate::config::SyncConfig;
use crate::error::{SchedulerError, SchedulerResult};
use crate::metrics::SharedMetrics;
use crate::state::SchedulerState;

/// What one synchronization cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// The active provider the cycle started from.
    pub provider: String,
    /// Reconciliation counts aggregated across the cycle.
    pub outcome: ReconcileOutcome,
    /// Whether the cycle fell back to the other providers.
    pub failed_over: bool,
    /// Whether a one-shot retry was armed for a server-side failure.
    pub retry_armed: bool,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.outcome)?;
        if self.failed_over {
            write!(f, " (failed over)")?;
        }
        if self.retry_armed {
            write!(f, " (retry armed)")?;
        }
        Ok(())
    }
}

/// Drives scheduled synchronization of provider rates into the store.
///
/// Cheap to clone; clones share the same state, retry timer and shutdown
/// channel.
#[derive(Clone)]
pub struct SyncScheduler {
    config: SyncConfig,
    registry: Arc<ProviderRegistry>,
    engine: Arc<ReconciliationEngine>,
    metrics: SharedMetrics,
    state: Arc<RwLock<SchedulerState>>,
    retry_timer: Arc<Mutex<Option<JoinHandle<()>>>>,
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: Arc<RwLock<Option<mpsc::Receiver<()>>>>,
}

impl SyncScheduler {
    /// Create a new scheduler over a provider registry and an engine.
    pub fn new(
        registry: Arc<ProviderRegistry>,
        engine: Arc<ReconciliationEngine>,
        config: SyncConfig,
        metrics: SharedMetrics,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        Self {
            config,
            registry,
            engine,
            metrics,
            state: Arc::new(RwLock::new(SchedulerState::Starting)),
            retry_timer: Arc::new(Mutex::new(None)),
            shutdown_tx,
            shutdown_rx: Arc::new(RwLock::new(Some(shutdown_rx))),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        *self.state.read()
    }

    /// Whether a one-shot retry is waiting to fire.
    pub fn retry_pending(&self) -> bool {
        self.retry_timer.lock().is_some()
    }

    /// Run one synchronization cycle.
    ///
    /// Provider failures are handled inside the cycle and never surface to
    /// the caller; the one exception is an empty registry, which is fatal.
    /// Store failures on the active provider's batch do propagate.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> SchedulerResult<CycleReport> {
        let active = self.registry.active_provider()?;
        self.metrics.cycle_run();

        let mut report = CycleReport {
            provider: active.name().to_string(),
            outcome: ReconcileOutcome::default(),
            failed_over: false,
            retry_armed: false,
        };

        match active.current_rates().await {
            Ok(rates) if !rates.is_empty() => {
                info!(
                    provider = active.name(),
                    count = rates.len(),
                    "Fetched current rates"
                );
                report.outcome = self.reconcile(&rates).await?;
                self.cancel_retry();
            }
            Ok(_) => {
                warn!(
                    provider = active.name(),
                    "Active provider returned no rates, failing over"
                );
                report.failed_over = true;
                report.outcome = self.failover(active.name()).await;
            }
            Err(e) => {
                warn!(
                    provider = active.name(),
                    error = %e,
                    "Active provider fetch failed, failing over"
                );
                report.failed_over = true;
                report.outcome = self.failover(active.name()).await;
                if e.is_server_error() {
                    self.arm_retry();
                    report.retry_armed = true;
                }
            }
        }

        info!(%report, "Synchronization cycle complete");
        Ok(report)
    }

    /// Run the daemon loop until [`stop`](Self::stop) is called.
    ///
    /// Fires a cycle at the configured UTC time each day. Only an empty
    /// registry ends the loop early; all other cycle failures are logged
    /// and the loop waits for the next day.
    pub async fn run(&self) -> SchedulerResult<()> {
        let mut shutdown_rx = self
            .shutdown_rx
            .write()
            .take()
            .ok_or(SchedulerError::AlreadyRunning)?;

        *self.state.write() = SchedulerState::Running;
        info!(
            hour = self.config.sync_hour,
            minute = self.config.sync_minute,
            "Scheduler running"
        );

        loop {
            let now = Utc::now();
            let fire = next_fire(now, self.config.sync_hour, self.config.sync_minute);
            let wait = (fire - now).to_std().unwrap_or(std::time::Duration::ZERO);
            debug!(%fire, "Next synchronization cycle scheduled");

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = tokio::time::sleep(wait) => {
                    match self.run_cycle().await {
                        Ok(_) => {}
                        Err(SchedulerError::Provider(ProviderError::NoProviderAvailable)) => {
                            error!("No rate provider registered");
                            *self.state.write() = SchedulerState::Stopped;
                            return Err(ProviderError::NoProviderAvailable.into());
                        }
                        Err(e) => error!(error = %e, "Synchronization cycle failed"),
                    }
                }
            }
        }

        if let Some(handle) = self.retry_timer.lock().take() {
            handle.abort();
        }
        *self.state.write() = SchedulerState::Stopped;
        info!("Scheduler stopped");
        Ok(())
    }

    /// Stop the daemon loop gracefully.
    pub async fn stop(&self) {
        info!("Stopping scheduler");
        *self.state.write() = SchedulerState::ShuttingDown;
        let _ = self.shutdown_tx.send(()).await;
    }

    async fn reconcile(&self, rates: &[CurrencyRate]) -> SchedulerResult<ReconcileOutcome> {
        let outcome = self.engine.create_or_update(rates).await?;
        self.metrics.record_outcome(&outcome);
        Ok(outcome)
    }

    /// Try every other registered provider, reconciling each non-empty
    /// result independently. Failures are logged and never abort the
    /// remaining providers.
    async fn failover(&self, exclude: &str) -> ReconcileOutcome {
        self.metrics.cycle_failed_over();

        let mut total = ReconcileOutcome::default();
        for provider in self.registry.others(exclude) {
            match provider.current_rates().await {
                Ok(rates) if !rates.is_empty() => match self.reconcile(&rates).await {
                    Ok(outcome) => {
                        info!(
                            provider = provider.name(),
                            %outcome,
                            "Reconciled fallback provider rates"
                        );
                        total.absorb(outcome);
                    }
                    Err(e) => warn!(
                        provider = provider.name(),
                        error = %e,
                        "Failed to reconcile fallback rates"
                    ),
                },
                Ok(_) => warn!(provider = provider.name(), "Fallback provider returned no rates"),
                Err(e) => warn!(
                    provider = provider.name(),
                    error = %e,
                    "Fallback provider fetch failed"
                ),
            }
        }
        total
    }

    /// Arm the one-shot retry, replacing any timer already pending. When
    /// the delay elapses the whole cycle runs again.
    fn arm_retry(&self) {
        let scheduler = self.clone();
        let delay = self.config.retry_delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The timer has fired; there is nothing left to cancel.
            scheduler.retry_timer.lock().take();
            info!("Retrying synchronization cycle after server-side failure");
            if let Err(e) = scheduler.run_cycle().await {
                error!(error = %e, "Retried synchronization cycle failed");
            }
        });

        let mut slot = self.retry_timer.lock();
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
        drop(slot);

        self.metrics.retry_armed();
        info!(delay = ?self.config.retry_delay, "Armed one-shot retry");
    }

    /// Cancel a pending retry, if any. Called when a normal cycle succeeds.
    fn cancel_retry(&self) {
        if let Some(handle) = self.retry_timer.lock().take() {
            handle.abort();
            self.metrics.retry_cancelled();
            info!("Cancelled pending retry after successful cycle");
        }
    }
}

/// The next instant the daily cycle fires: the configured UTC time today
/// if it is still ahead, otherwise the same time tomorrow.
fn next_fire(now: DateTime<Utc>, hour: u32, minute: u32) -> DateTime<Utc> {
    let fire = now.date_naive().and_time(NaiveTime::MIN).and_utc()
        + Duration::hours(i64::from(hour))
        + Duration::minutes(i64::from(minute));
    if fire > now {
        fire
    } else {
        fire + Duration::days(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use chrono::{NaiveDate, TimeZone, Timelike};
    use ratesync_common::Currency;
    use ratesync_provider::MockRateProvider;
    use ratesync_store::MemoryRateStore;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::time::Duration as StdDuration;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn quote(provider: &str, currency: Currency, mid: Decimal) -> CurrencyRate {
        CurrencyRate::new(provider, currency, Some(day(2024, 1, 10)), mid)
    }

    fn server_error(provider: &str) -> ProviderError {
        ProviderError::Fetch {
            provider: provider.to_string(),
            reason: "HTTP 503".to_string(),
            server_side: true,
        }
    }

    fn build(
        registry: ProviderRegistry,
        retry_delay: StdDuration,
    ) -> (SyncScheduler, Arc<MemoryRateStore>, SharedMetrics) {
        let store = Arc::new(MemoryRateStore::new());
        let engine = Arc::new(ReconciliationEngine::new(store.clone()));
        let metrics: SharedMetrics = Arc::new(Metrics::new());
        let config = SyncConfig {
            sync_hour: 12,
            sync_minute: 0,
            retry_delay,
        };
        let scheduler = SyncScheduler::new(Arc::new(registry), engine, config, metrics.clone());
        (scheduler, store, metrics)
    }

    #[tokio::test]
    async fn test_cycle_reconciles_active_provider() {
        let provider = Arc::new(MockRateProvider::new("main"));
        provider.set_current(vec![quote("main", Currency::EUR, dec!(4.30))]);

        let mut registry = ProviderRegistry::new();
        registry.register(provider);
        let (scheduler, store, _) = build(registry, StdDuration::from_secs(60));

        let report = scheduler.run_cycle().await.unwrap();

        assert_eq!(report.provider, "main");
        assert!(!report.failed_over);
        assert!(!report.retry_armed);
        assert_eq!(report.outcome.created, 1);

        let record = store.get(Currency::EUR, day(2024, 1, 10)).unwrap();
        assert!(record.has_provider("main"));
    }

    #[tokio::test]
    async fn test_cycle_uses_default_provider() {
        let first = Arc::new(MockRateProvider::new("first"));
        let second = Arc::new(MockRateProvider::new("second"));
        second.set_current(vec![quote("second", Currency::USD, dec!(3.97))]);

        let mut registry = ProviderRegistry::new();
        registry.register(first.clone());
        registry.register(second.clone());
        registry.set_default("second");
        let (scheduler, store, _) = build(registry, StdDuration::from_secs(60));

        let report = scheduler.run_cycle().await.unwrap();

        assert_eq!(report.provider, "second");
        assert_eq!(first.current_call_count(), 0);
        assert!(store.get(Currency::USD, day(2024, 1, 10)).is_some());
    }

    #[tokio::test]
    async fn test_empty_result_fails_over_to_all_others() {
        let main = Arc::new(MockRateProvider::new("main"));
        let backup_a = Arc::new(MockRateProvider::new("backup-a"));
        let backup_b = Arc::new(MockRateProvider::new("backup-b"));
        backup_a.set_current(vec![quote("backup-a", Currency::EUR, dec!(4.30))]);
        backup_b.set_current(vec![quote("backup-b", Currency::EUR, dec!(4.31))]);

        let mut registry = ProviderRegistry::new();
        registry.register(main.clone());
        registry.register(backup_a.clone());
        registry.register(backup_b.clone());
        registry.set_default("main");
        let (scheduler, store, _) = build(registry, StdDuration::from_secs(60));

        let report = scheduler.run_cycle().await.unwrap();

        assert!(report.failed_over);
        // No server-side failure here, only an empty result.
        assert!(!report.retry_armed);
        assert!(!scheduler.retry_pending());
        assert_eq!(backup_a.current_call_count(), 1);
        assert_eq!(backup_b.current_call_count(), 1);

        let record = store.get(Currency::EUR, day(2024, 1, 10)).unwrap();
        assert!(record.has_provider("backup-a"));
        assert!(record.has_provider("backup-b"));
    }

    #[tokio::test]
    async fn test_server_error_arms_retry_and_reconciles_others() {
        let main = Arc::new(MockRateProvider::new("main"));
        main.fail_current(server_error("main"));
        let backup_a = Arc::new(MockRateProvider::new("backup-a"));
        let backup_b = Arc::new(MockRateProvider::new("backup-b"));
        backup_a.set_current(vec![quote("backup-a", Currency::EUR, dec!(4.30))]);
        backup_b.set_current(vec![quote("backup-b", Currency::CHF, dec!(4.52))]);

        let mut registry = ProviderRegistry::new();
        registry.register(main);
        registry.register(backup_a);
        registry.register(backup_b);
        registry.set_default("main");
        let (scheduler, store, metrics) = build(registry, StdDuration::from_secs(60));

        let report = scheduler.run_cycle().await.unwrap();

        assert!(report.failed_over);
        assert!(report.retry_armed);
        assert!(scheduler.retry_pending());
        assert_eq!(report.outcome.created, 2);
        assert_eq!(store.len(), 2);
        assert_eq!(metrics.snapshot().retries_armed, 1);
        assert_eq!(metrics.snapshot().cycles_failed_over, 1);
    }

    #[tokio::test]
    async fn test_client_error_does_not_arm_retry() {
        let main = Arc::new(MockRateProvider::new("main"));
        main.fail_current(ProviderError::Fetch {
            provider: "main".to_string(),
            reason: "HTTP 400".to_string(),
            server_side: false,
        });

        let mut registry = ProviderRegistry::new();
        registry.register(main);
        let (scheduler, _, metrics) = build(registry, StdDuration::from_secs(60));

        let report = scheduler.run_cycle().await.unwrap();

        assert!(report.failed_over);
        assert!(!report.retry_armed);
        assert!(!scheduler.retry_pending());
        assert_eq!(metrics.snapshot().retries_armed, 0);
    }

    #[tokio::test]
    async fn test_successful_cycle_cancels_pending_retry() {
        let main = Arc::new(MockRateProvider::new("main"));
        main.fail_current(server_error("main"));

        let mut registry = ProviderRegistry::new();
        registry.register(main.clone());
        let (scheduler, _, metrics) = build(registry, StdDuration::from_secs(60));

        scheduler.run_cycle().await.unwrap();
        assert!(scheduler.retry_pending());

        main.set_current(vec![quote("main", Currency::EUR, dec!(4.30))]);
        scheduler.run_cycle().await.unwrap();

        assert!(!scheduler.retry_pending());
        assert_eq!(metrics.snapshot().retries_cancelled, 1);
    }

    #[tokio::test]
    async fn test_retry_runs_the_cycle_again() {
        let main = Arc::new(MockRateProvider::new("main"));
        main.fail_current(server_error("main"));

        let mut registry = ProviderRegistry::new();
        registry.register(main.clone());
        let (scheduler, store, metrics) = build(registry, StdDuration::from_millis(50));

        scheduler.run_cycle().await.unwrap();
        assert!(scheduler.retry_pending());

        // The provider recovers before the retry fires.
        main.set_current(vec![quote("main", Currency::EUR, dec!(4.30))]);
        tokio::time::sleep(StdDuration::from_millis(300)).await;

        assert!(!scheduler.retry_pending());
        assert_eq!(metrics.snapshot().cycles_total, 2);
        assert!(store.get(Currency::EUR, day(2024, 1, 10)).is_some());
    }

    #[tokio::test]
    async fn test_empty_registry_is_fatal() {
        let (scheduler, _, _) = build(ProviderRegistry::new(), StdDuration::from_secs(60));

        let result = scheduler.run_cycle().await;
        assert!(matches!(
            result,
            Err(SchedulerError::Provider(ProviderError::NoProviderAvailable))
        ));
    }

    #[tokio::test]
    async fn test_failover_with_no_usable_fallback() {
        let main = Arc::new(MockRateProvider::new("main"));
        let backup = Arc::new(MockRateProvider::new("backup"));

        let mut registry = ProviderRegistry::new();
        registry.register(main);
        registry.register(backup);
        registry.set_default("main");
        let (scheduler, store, _) = build(registry, StdDuration::from_secs(60));

        let report = scheduler.run_cycle().await.unwrap();

        assert!(report.failed_over);
        assert_eq!(report.outcome, ReconcileOutcome::default());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_run_loop_start_stop() {
        let provider = Arc::new(MockRateProvider::new("main"));
        let mut registry = ProviderRegistry::new();
        registry.register(provider);

        let (scheduler, _, _) = build(registry, StdDuration::from_secs(60));
        // Keep the fire time away from "now" so the loop only waits.
        let mut scheduler = scheduler;
        scheduler.config.sync_hour = (Utc::now().hour() + 2) % 24;

        assert_eq!(scheduler.state(), SchedulerState::Starting);

        let runner = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.run().await }
        });
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        assert_eq!(scheduler.state(), SchedulerState::Running);

        scheduler.stop().await;
        runner.await.unwrap().unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Stopped);

        // The shutdown channel is consumed; the loop cannot be restarted.
        assert!(matches!(
            scheduler.run().await,
            Err(SchedulerError::AlreadyRunning)
        ));
    }

    #[test]
    fn test_next_fire_same_day() {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 10, 0, 0).unwrap();
        let fire = next_fire(now, 12, 5);
        assert_eq!(fire, Utc.with_ymd_and_hms(2024, 1, 10, 12, 5, 0).unwrap());
    }

    #[test]
    fn test_next_fire_rolls_to_next_day() {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 13, 0, 0).unwrap();
        let fire = next_fire(now, 12, 5);
        assert_eq!(fire, Utc.with_ymd_and_hms(2024, 1, 11, 12, 5, 0).unwrap());

        // Exactly at the fire time counts as already fired.
        let at = Utc.with_ymd_and_hms(2024, 1, 10, 12, 5, 0).unwrap();
        assert_eq!(
            next_fire(at, 12, 5),
            Utc.with_ymd_and_hms(2024, 1, 11, 12, 5, 0).unwrap()
        );
    }
}
