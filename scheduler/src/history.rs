//! Lock-guarded historical backfill.
//!
//! A history update replays the full published history of the active
//! provider into the store. At most one update runs at a time; a request
//! arriving while one is in flight returns immediately instead of queuing.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use ratesync_provider::{HistoricalBackfill, ProviderRegistry, RateProvider};
use ratesync_store::{ReconcileOutcome, ReconciliationEngine};

use crate::error::SchedulerResult;
use crate::metrics::SharedMetrics;

/// Result of a history update request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryOutcome {
    /// The backfill ran and reconciled the fetched history.
    Completed(ReconcileOutcome),
    /// Another backfill already held the lock; nothing was done.
    AlreadyRunning,
}

/// Runs full-history backfills, one at a time.
pub struct HistoryUpdater {
    registry: Arc<ProviderRegistry>,
    engine: Arc<ReconciliationEngine>,
    metrics: SharedMetrics,
    running: Mutex<()>,
}

impl HistoryUpdater {
    /// Create a new updater over a provider registry and an engine.
    pub fn new(
        registry: Arc<ProviderRegistry>,
        engine: Arc<ReconciliationEngine>,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            registry,
            engine,
            metrics,
            running: Mutex::new(()),
        }
    }

    /// Backfill the active provider's full history into the store.
    ///
    /// When the active provider's backfill fails, the same backfill is
    /// broadcast to every other registered provider best-effort. Only an
    /// empty registry surfaces as an error; a store failure on the active
    /// provider's batch also propagates.
    #[instrument(skip(self))]
    pub async fn update_history(&self) -> SchedulerResult<HistoryOutcome> {
        let Ok(_guard) = self.running.try_lock() else {
            warn!("History update already in progress, skipping");
            self.metrics.backfill_skipped();
            return Ok(HistoryOutcome::AlreadyRunning);
        };

        self.metrics.backfill_run();
        let active = self.registry.active_provider()?;

        let outcome = match self.backfill(active.as_ref()).await? {
            Some(outcome) => outcome,
            None => self.broadcast_others(active.name()).await,
        };

        self.metrics.record_outcome(&outcome);
        info!(%outcome, "History update complete");
        Ok(HistoryOutcome::Completed(outcome))
    }

    /// Fetch and reconcile one provider's history. Provider-side failures
    /// come back as `None`; store failures propagate.
    async fn backfill(
        &self,
        provider: &dyn RateProvider,
    ) -> SchedulerResult<Option<ReconcileOutcome>> {
        let backfill = HistoricalBackfill::for_provider(provider);
        info!(
            provider = provider.name(),
            window = %backfill.window(),
            "Fetching provider history"
        );

        let rates = match backfill.fetch_all(provider).await {
            Ok(rates) => rates,
            Err(e) => {
                warn!(
                    provider = provider.name(),
                    error = %e,
                    "History fetch failed"
                );
                return Ok(None);
            }
        };

        info!(
            provider = provider.name(),
            count = rates.len(),
            "Fetched historical rates"
        );
        Ok(Some(self.engine.save_history(&rates).await?))
    }

    /// Replay the backfill against every other registered provider. Each
    /// failure is logged and never aborts the remaining providers.
    async fn broadcast_others(&self, exclude: &str) -> ReconcileOutcome {
        let mut total = ReconcileOutcome::default();
        for provider in self.registry.others(exclude) {
            match self.backfill(provider.as_ref()).await {
                Ok(Some(outcome)) => {
                    info!(
                        provider = provider.name(),
                        %outcome,
                        "Reconciled fallback provider history"
                    );
                    total.absorb(outcome);
                }
                Ok(None) => {}
                Err(e) => warn!(
                    provider = provider.name(),
                    error = %e,
                    "Failed to reconcile fallback history"
                ),
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchedulerError;
    use crate::metrics::Metrics;
    use chrono::{Datelike, NaiveDate};
    use ratesync_common::{today, Currency, CurrencyRate};
    use ratesync_provider::{MockRateProvider, ProviderConfig, ProviderError};
    use ratesync_store::MemoryRateStore;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::time::Duration as StdDuration;

    /// Mock config whose backfill window starts a few days back, so a
    /// test backfill makes a single short range call.
    fn narrow_config() -> ProviderConfig {
        ProviderConfig::new(Currency::PLN, today().year(), 93)
    }

    fn quote(provider: &str, currency: Currency, date: NaiveDate, mid: Decimal) -> CurrencyRate {
        CurrencyRate::new(provider, currency, Some(date), mid)
    }

    fn build(registry: ProviderRegistry) -> (Arc<HistoryUpdater>, Arc<MemoryRateStore>, SharedMetrics) {
        let store = Arc::new(MemoryRateStore::new());
        let engine = Arc::new(ReconciliationEngine::new(store.clone()));
        let metrics: SharedMetrics = Arc::new(Metrics::new());
        let updater = Arc::new(HistoryUpdater::new(
            Arc::new(registry),
            engine,
            metrics.clone(),
        ));
        (updater, store, metrics)
    }

    #[tokio::test]
    async fn test_backfill_saves_provider_history() {
        let provider = Arc::new(MockRateProvider::new("main").with_config(narrow_config()));
        provider.add_rate(quote("main", Currency::EUR, today(), dec!(4.30)));
        provider.add_rate(quote("main", Currency::USD, today(), dec!(3.97)));

        let mut registry = ProviderRegistry::new();
        registry.register(provider.clone());
        let (updater, store, metrics) = build(registry);

        let outcome = updater.update_history().await.unwrap();

        match outcome {
            HistoryOutcome::Completed(outcome) => {
                assert_eq!(outcome.created, 2);
                assert_eq!(outcome.updated, 0);
            }
            HistoryOutcome::AlreadyRunning => panic!("backfill was skipped"),
        }
        assert_eq!(store.len(), 2);
        assert!(provider.range_call_count() >= 1);
        assert_eq!(metrics.snapshot().backfills_total, 1);
    }

    #[tokio::test]
    async fn test_concurrent_backfill_is_skipped() {
        let provider = Arc::new(MockRateProvider::new("main").with_config(narrow_config()));
        provider.add_rate(quote("main", Currency::EUR, today(), dec!(4.30)));
        provider.set_latency(StdDuration::from_millis(200));

        let mut registry = ProviderRegistry::new();
        registry.register(provider);
        let (updater, _, metrics) = build(registry);

        let first = tokio::spawn({
            let updater = updater.clone();
            async move { updater.update_history().await }
        });
        // Let the first request take the lock and block in the fetch.
        tokio::time::sleep(StdDuration::from_millis(50)).await;

        let second = updater.update_history().await.unwrap();
        assert_eq!(second, HistoryOutcome::AlreadyRunning);
        assert_eq!(metrics.snapshot().backfills_skipped, 1);

        let first = first.await.unwrap().unwrap();
        assert!(matches!(first, HistoryOutcome::Completed(_)));
        assert_eq!(metrics.snapshot().backfills_total, 1);
    }

    #[tokio::test]
    async fn test_failed_backfill_broadcasts_to_others() {
        let main = Arc::new(MockRateProvider::new("main").with_config(narrow_config()));
        main.fail_range_at(
            today(),
            ProviderError::Fetch {
                provider: "main".to_string(),
                reason: "HTTP 503".to_string(),
                server_side: true,
            },
        );

        let backup = Arc::new(MockRateProvider::new("backup").with_config(narrow_config()));
        backup.add_rate(quote("backup", Currency::EUR, today(), dec!(4.31)));

        let mut registry = ProviderRegistry::new();
        registry.register(main);
        registry.register(backup.clone());
        registry.set_default("main");
        let (updater, store, _) = build(registry);

        let outcome = updater.update_history().await.unwrap();

        assert_eq!(
            outcome,
            HistoryOutcome::Completed(ReconcileOutcome {
                created: 1,
                updated: 0,
                skipped: 0,
            })
        );
        let record = store.get(Currency::EUR, today()).unwrap();
        assert!(record.has_provider("backup"));
        assert!(backup.range_call_count() >= 1);
    }

    #[tokio::test]
    async fn test_empty_registry_is_fatal() {
        let (updater, _, _) = build(ProviderRegistry::new());

        let result = updater.update_history().await;
        assert!(matches!(
            result,
            Err(SchedulerError::Provider(ProviderError::NoProviderAvailable))
        ));
    }

    #[tokio::test]
    async fn test_backfill_merges_into_existing_records() {
        let date = today();

        let main = Arc::new(MockRateProvider::new("main").with_config(narrow_config()));
        main.add_rate(quote("main", Currency::EUR, date, dec!(4.30)));

        let mut registry = ProviderRegistry::new();
        registry.register(main);
        let (updater, store, _) = build(registry);

        // A record for the same day already exists from another source.
        updater
            .engine
            .save_history(&[quote("other", Currency::EUR, date, dec!(4.29))])
            .await
            .unwrap();

        let outcome = updater.update_history().await.unwrap();

        match outcome {
            HistoryOutcome::Completed(outcome) => {
                assert_eq!(outcome.created, 0);
                assert_eq!(outcome.updated, 1);
            }
            HistoryOutcome::AlreadyRunning => panic!("backfill was skipped"),
        }
        let record = store.get(Currency::EUR, date).unwrap();
        assert!(record.has_provider("other"));
        assert!(record.has_provider("main"));
        assert_eq!(record.version, 1);
    }
}
