//! Rate provider trait and provider policy configuration.

use async_trait::async_trait;
use chrono::NaiveDate;
use ratesync_common::{Currency, CurrencyRate, DateWindow};

use crate::error::ProviderResult;

/// Per-provider fetch policy.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Currency the provider quotes all rates against.
    pub base_currency: Currency,
    /// Earliest year the provider publishes data for.
    pub history_from_year: i32,
    /// Maximum number of days a single date-range request may span.
    pub max_fetch_days: u32,
}

impl ProviderConfig {
    /// Create a new provider policy.
    pub fn new(base_currency: Currency, history_from_year: i32, max_fetch_days: u32) -> Self {
        Self {
            base_currency,
            history_from_year,
            max_fetch_days,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_currency: Currency::PLN,
            history_from_year: 2002,
            max_fetch_days: 93,
        }
    }
}

/// Trait for exchange-rate providers.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Get the provider's fetch policy.
    fn config(&self) -> &ProviderConfig;

    /// Fetch the most recently published rates.
    async fn current_rates(&self) -> ProviderResult<Vec<CurrencyRate>>;

    /// Fetch rates effective on a specific day.
    async fn rates_for_date(&self, date: NaiveDate) -> ProviderResult<Vec<CurrencyRate>>;

    /// Fetch rates for an inclusive date range.
    /// The window must not span more than `config().max_fetch_days` days.
    async fn rates_for_range(&self, window: DateWindow) -> ProviderResult<Vec<CurrencyRate>>;
}

/// Mock rate provider for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateProvider {
    name: String,
    config: ProviderConfig,
    current: parking_lot::Mutex<ProviderResult<Vec<CurrencyRate>>>,
    rates_by_date: dashmap::DashMap<NaiveDate, Vec<CurrencyRate>>,
    failing_days: dashmap::DashMap<NaiveDate, crate::error::ProviderError>,
    latency: parking_lot::Mutex<Option<std::time::Duration>>,
    current_calls: std::sync::atomic::AtomicUsize,
    range_calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateProvider {
    /// Create a new mock provider.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: ProviderConfig::default(),
            current: parking_lot::Mutex::new(Ok(Vec::new())),
            rates_by_date: dashmap::DashMap::new(),
            failing_days: dashmap::DashMap::new(),
            latency: parking_lot::Mutex::new(None),
            current_calls: std::sync::atomic::AtomicUsize::new(0),
            range_calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Override the provider policy.
    pub fn with_config(mut self, config: ProviderConfig) -> Self {
        self.config = config;
        self
    }

    /// Script the reply for current-rate calls.
    pub fn set_current(&self, rates: Vec<CurrencyRate>) {
        *self.current.lock() = Ok(rates);
    }

    /// Script a failure for current-rate calls.
    pub fn fail_current(&self, error: crate::error::ProviderError) {
        *self.current.lock() = Err(error);
    }

    /// Register a dated rate served by date and range lookups.
    pub fn add_rate(&self, rate: CurrencyRate) {
        let date = rate.date.unwrap_or_else(ratesync_common::today);
        self.rates_by_date.entry(date).or_default().push(rate);
    }

    /// Make any range fetch whose window covers the given day fail.
    pub fn fail_range_at(&self, date: NaiveDate, error: crate::error::ProviderError) {
        self.failing_days.insert(date, error);
    }

    /// Delay every fetch by the given duration.
    pub fn set_latency(&self, latency: std::time::Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Number of current-rate calls made against this mock.
    pub fn current_call_count(&self) -> usize {
        self.current_calls.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Number of range calls made against this mock.
    pub fn range_call_count(&self) -> usize {
        self.range_calls.load(std::sync::atomic::Ordering::Relaxed)
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateProvider for MockRateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn current_rates(&self) -> ProviderResult<Vec<CurrencyRate>> {
        self.current_calls
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.simulate_latency().await;
        self.current.lock().clone()
    }

    async fn rates_for_date(&self, date: NaiveDate) -> ProviderResult<Vec<CurrencyRate>> {
        self.simulate_latency().await;
        Ok(self
            .rates_by_date
            .get(&date)
            .map(|r| r.clone())
            .unwrap_or_default())
    }

    async fn rates_for_range(&self, window: DateWindow) -> ProviderResult<Vec<CurrencyRate>> {
        self.range_calls
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.simulate_latency().await;

        for entry in self.failing_days.iter() {
            if window.contains(*entry.key()) {
                return Err(entry.value().clone());
            }
        }

        let mut rates = Vec::new();
        for entry in self.rates_by_date.iter() {
            if window.contains(*entry.key()) {
                rates.extend(entry.value().clone());
            }
        }
        Ok(rates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use rust_decimal_macros::dec;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_mock_current_rates() {
        let provider = MockRateProvider::new("test");
        provider.set_current(vec![CurrencyRate::new(
            "test",
            Currency::EUR,
            Some(day(2024, 1, 10)),
            dec!(4.30),
        )]);

        let rates = provider.current_rates().await.unwrap();
        assert_eq!(rates.len(), 1);
        assert_eq!(rates[0].currency, Currency::EUR);
        assert_eq!(provider.current_call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_failure_injection() {
        let provider = MockRateProvider::new("test");
        provider.fail_current(ProviderError::Fetch {
            provider: "test".to_string(),
            reason: "HTTP 503".to_string(),
            server_side: true,
        });

        let result = provider.current_rates().await;
        assert!(result.unwrap_err().is_server_error());
    }

    #[tokio::test]
    async fn test_mock_range_lookup() {
        let provider = MockRateProvider::new("test");
        provider.add_rate(CurrencyRate::new(
            "test",
            Currency::EUR,
            Some(day(2024, 1, 10)),
            dec!(4.30),
        ));
        provider.add_rate(CurrencyRate::new(
            "test",
            Currency::USD,
            Some(day(2024, 2, 1)),
            dec!(3.95),
        ));

        let window = DateWindow::new(day(2024, 1, 1), day(2024, 1, 31));
        let rates = provider.rates_for_range(window).await.unwrap();

        assert_eq!(rates.len(), 1);
        assert_eq!(rates[0].currency, Currency::EUR);
        assert_eq!(provider.range_call_count(), 1);
    }
}
