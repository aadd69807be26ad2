//! Rate provider backed by the NBP (Narodowy Bank Polski) web API.
//!
//! NBP publishes mid rates against PLN in two tables: A (liquid currencies,
//! published every business day) and B (remaining currencies, published
//! weekly). The API answers 404 for days without a published table, which is
//! mapped to an empty result rather than an error.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use ratesync_common::{Currency, CurrencyRate, DateWindow};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{ProviderConfig, RateProvider};

/// Registry name of this provider.
pub const PROVIDER_NAME: &str = "nbp";

/// Published base endpoint of the NBP web API.
pub const DEFAULT_BASE_URL: &str = "https://api.nbp.pl/api";

/// Longest range a single NBP query may span, in days.
pub const MAX_FETCH_DAYS: u32 = 93;

/// Earliest year with published NBP data.
pub const HISTORY_FROM_YEAR: i32 = 2002;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The NBP rate tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableType {
    /// Liquid currencies, published every business day.
    A,
    /// Remaining currencies, published weekly.
    B,
}

impl TableType {
    /// All tables, in fetch order.
    pub const ALL: [TableType; 2] = [TableType::A, TableType::B];

    /// Upstream path segment for this table.
    pub fn as_str(&self) -> &'static str {
        match self {
            TableType::A => "A",
            TableType::B => "B",
        }
    }

    /// Currencies covered by this table, in publication order.
    pub fn currencies(&self) -> &'static [Currency] {
        match self {
            TableType::A => &[
                Currency::THB,
                Currency::USD,
                Currency::AUD,
                Currency::HKD,
                Currency::CAD,
                Currency::NZD,
                Currency::SGD,
                Currency::EUR,
                Currency::HUF,
                Currency::CHF,
                Currency::GBP,
                Currency::UAH,
                Currency::JPY,
                Currency::CZK,
                Currency::DKK,
                Currency::ISK,
                Currency::NOK,
                Currency::SEK,
                Currency::RON,
                Currency::BGN,
                Currency::TRY,
                Currency::ILS,
                Currency::CLP,
                Currency::PHP,
                Currency::MXN,
                Currency::ZAR,
                Currency::BRL,
                Currency::MYR,
                Currency::IDR,
                Currency::INR,
                Currency::KRW,
                Currency::CNY,
                Currency::XDR,
            ],
            TableType::B => &[
                Currency::AED,
                Currency::ARS,
                Currency::BYN,
                Currency::EGP,
                Currency::GEL,
                Currency::KZT,
                Currency::RSD,
                Currency::SAR,
                Currency::TWD,
                Currency::VND,
            ],
        }
    }

    /// The table that publishes the given currency, if any. PLN itself is
    /// the quote base and appears in no table.
    pub fn for_currency(currency: Currency) -> Option<TableType> {
        TableType::ALL
            .iter()
            .copied()
            .find(|table| table.currencies().contains(&currency))
    }
}

impl std::fmt::Display for TableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One currency row in a table response.
#[derive(Debug, Deserialize)]
struct TableRateDto {
    code: String,
    mid: Decimal,
}

/// A published rate table. Range queries return one of these per day.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeTableDto {
    table: String,
    no: String,
    effective_date: NaiveDate,
    rates: Vec<TableRateDto>,
}

impl ExchangeTableDto {
    fn into_rates(self) -> Vec<CurrencyRate> {
        let mut out = Vec::with_capacity(self.rates.len());
        for row in self.rates {
            let currency = match row.code.parse::<Currency>() {
                Ok(currency) => currency,
                Err(_) => {
                    debug!(code = %row.code, "Skipping currency code outside the known set");
                    continue;
                }
            };

            out.push(
                CurrencyRate::new(PROVIDER_NAME, currency, Some(self.effective_date), row.mid)
                    .with_detail("table", self.table.as_str())
                    .with_detail("no", self.no.as_str())
                    .with_detail("effectiveDate", self.effective_date.to_string()),
            );
        }
        out
    }
}

/// One dated quote in a single-currency response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeriesRateDto {
    no: String,
    effective_date: NaiveDate,
    mid: Decimal,
}

/// Single-currency response: the quote history of one code.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrencySeriesDto {
    table: String,
    rates: Vec<SeriesRateDto>,
}

impl CurrencySeriesDto {
    fn into_rates(self, currency: Currency) -> Vec<CurrencyRate> {
        self.rates
            .into_iter()
            .map(|row| {
                CurrencyRate::new(PROVIDER_NAME, currency, Some(row.effective_date), row.mid)
                    .with_detail("table", self.table.as_str())
                    .with_detail("no", row.no.as_str())
                    .with_detail("effectiveDate", row.effective_date.to_string())
            })
            .collect()
    }
}

/// Rate provider over the NBP web API.
pub struct NbpProvider {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    config: ProviderConfig,
}

impl NbpProvider {
    /// Create a provider against the public NBP endpoint.
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a provider against a custom endpoint (proxies, tests).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
            timeout: DEFAULT_TIMEOUT,
            config: ProviderConfig::new(Currency::PLN, HISTORY_FROM_YEAR, MAX_FETCH_DAYS),
        }
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the provider policy.
    pub fn with_config(mut self, config: ProviderConfig) -> Self {
        self.config = config;
        self
    }

    fn tables_url(&self, table: TableType, suffix: &str) -> String {
        format!(
            "{}/exchangerates/tables/{}{}?format=json",
            self.base_url, table, suffix
        )
    }

    fn rates_url(&self, table: TableType, currency: Currency, suffix: &str) -> String {
        format!(
            "{}/exchangerates/rates/{}/{}{}?format=json",
            self.base_url,
            table,
            currency.code(),
            suffix
        )
    }

    /// GET a JSON document. `None` means the upstream answered 404, which
    /// NBP uses for days with no published table.
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> ProviderResult<Option<T>> {
        debug!(url = %url, "Requesting rates");

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ProviderError::Fetch {
                provider: PROVIDER_NAME.to_string(),
                reason: e.to_string(),
                server_side: false,
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ProviderError::Fetch {
                provider: PROVIDER_NAME.to_string(),
                reason: format!("HTTP {}", status),
                server_side: status.is_server_error(),
            });
        }

        let value = response.json::<T>().await.map_err(|e| ProviderError::Decode {
            provider: PROVIDER_NAME.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(value))
    }

    async fn fetch_tables(&self, table: TableType, suffix: &str) -> ProviderResult<Vec<CurrencyRate>> {
        let url = self.tables_url(table, suffix);
        let tables: Option<Vec<ExchangeTableDto>> = self.get_json(&url).await?;

        let mut rates = Vec::new();
        if let Some(tables) = tables {
            for dto in tables {
                rates.extend(dto.into_rates());
            }
        }
        Ok(rates)
    }

    fn check_window(&self, window: DateWindow) -> ProviderResult<()> {
        if !window.is_valid() {
            return Err(ProviderError::InvalidRange {
                window,
                reason: "window start is after its end".to_string(),
            });
        }
        if window.days() > self.config.max_fetch_days as i64 {
            return Err(ProviderError::InvalidRange {
                window,
                reason: format!(
                    "window spans {} days, provider limit is {}",
                    window.days(),
                    self.config.max_fetch_days
                ),
            });
        }
        Ok(())
    }

    fn table_for(&self, currency: Currency) -> ProviderResult<TableType> {
        TableType::for_currency(currency).ok_or(ProviderError::UnsupportedCurrency(currency))
    }

    /// Fetch the most recently published quote of a single currency.
    pub async fn current_rate_for(&self, currency: Currency) -> ProviderResult<Option<CurrencyRate>> {
        let table = self.table_for(currency)?;
        let url = self.rates_url(table, currency, "");
        let series: Option<CurrencySeriesDto> = self.get_json(&url).await?;
        Ok(series.and_then(|s| s.into_rates(currency).pop()))
    }

    /// Fetch a single currency's quote effective on a specific day.
    pub async fn rate_for_currency_on(
        &self,
        currency: Currency,
        date: NaiveDate,
    ) -> ProviderResult<Option<CurrencyRate>> {
        let table = self.table_for(currency)?;
        let url = self.rates_url(table, currency, &format!("/{}", date));
        let series: Option<CurrencySeriesDto> = self.get_json(&url).await?;
        Ok(series.and_then(|s| s.into_rates(currency).pop()))
    }

    /// Fetch the published history of a single currency over a date range.
    pub async fn rates_for_currency_in(
        &self,
        currency: Currency,
        window: DateWindow,
    ) -> ProviderResult<Vec<CurrencyRate>> {
        let table = self.table_for(currency)?;
        self.check_window(window)?;

        let url = self.rates_url(table, currency, &format!("/{}/{}", window.from, window.to));
        let series: Option<CurrencySeriesDto> = self.get_json(&url).await?;
        Ok(series.map(|s| s.into_rates(currency)).unwrap_or_default())
    }
}

impl Default for NbpProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateProvider for NbpProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn current_rates(&self) -> ProviderResult<Vec<CurrencyRate>> {
        let mut rates = Vec::new();
        for table in TableType::ALL {
            rates.extend(self.fetch_tables(table, "").await?);
        }

        debug!(count = rates.len(), "Fetched current rates");
        Ok(rates)
    }

    async fn rates_for_date(&self, date: NaiveDate) -> ProviderResult<Vec<CurrencyRate>> {
        let suffix = format!("/{}", date);
        let mut rates = Vec::new();
        for table in TableType::ALL {
            rates.extend(self.fetch_tables(table, &suffix).await?);
        }
        Ok(rates)
    }

    async fn rates_for_range(&self, window: DateWindow) -> ProviderResult<Vec<CurrencyRate>> {
        self.check_window(window)?;

        let suffix = format!("/{}/{}", window.from, window.to);
        let mut rates = Vec::new();
        for table in TableType::ALL {
            rates.extend(self.fetch_tables(table, &suffix).await?);
        }
        Ok(rates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_table_for_currency() {
        assert_eq!(TableType::for_currency(Currency::EUR), Some(TableType::A));
        assert_eq!(TableType::for_currency(Currency::AED), Some(TableType::B));
        assert_eq!(TableType::for_currency(Currency::PLN), None);
    }

    #[test]
    fn test_url_building() {
        let provider = NbpProvider::with_base_url("https://api.nbp.pl/api/");

        assert_eq!(
            provider.tables_url(TableType::A, ""),
            "https://api.nbp.pl/api/exchangerates/tables/A?format=json"
        );
        assert_eq!(
            provider.tables_url(TableType::B, "/2024-01-02/2024-01-31"),
            "https://api.nbp.pl/api/exchangerates/tables/B/2024-01-02/2024-01-31?format=json"
        );
        assert_eq!(
            provider.rates_url(TableType::A, Currency::EUR, "/2024-01-10"),
            "https://api.nbp.pl/api/exchangerates/rates/A/EUR/2024-01-10?format=json"
        );
    }

    #[test]
    fn test_table_response_parsing() {
        let body = r#"[{
            "table": "A",
            "no": "007/A/NBP/2024",
            "effectiveDate": "2024-01-10",
            "rates": [
                {"currency": "euro", "code": "EUR", "mid": 4.3434},
                {"currency": "dolar amerykański", "code": "USD", "mid": 3.9685},
                {"currency": "unknown unit", "code": "XYZ", "mid": 1.0}
            ]
        }]"#;

        let tables: Vec<ExchangeTableDto> = serde_json::from_str(body).unwrap();
        let rates: Vec<CurrencyRate> = tables.into_iter().flat_map(|t| t.into_rates()).collect();

        // The XYZ row is dropped, the known codes survive.
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].currency, Currency::EUR);
        assert_eq!(rates[0].rate, dec!(4.3434));
        assert_eq!(rates[0].date, Some(day(2024, 1, 10)));
        assert_eq!(rates[0].provider, PROVIDER_NAME);
        assert_eq!(rates[0].details.get("table"), Some(&"A".to_string()));
        assert_eq!(
            rates[0].details.get("no"),
            Some(&"007/A/NBP/2024".to_string())
        );
        assert_eq!(rates[1].currency, Currency::USD);
    }

    #[test]
    fn test_series_response_parsing() {
        let body = r#"{
            "table": "A",
            "currency": "euro",
            "code": "EUR",
            "rates": [
                {"no": "007/A/NBP/2024", "effectiveDate": "2024-01-10", "mid": 4.3434},
                {"no": "008/A/NBP/2024", "effectiveDate": "2024-01-11", "mid": 4.3502}
            ]
        }"#;

        let series: CurrencySeriesDto = serde_json::from_str(body).unwrap();
        let rates = series.into_rates(Currency::EUR);

        assert_eq!(rates.len(), 2);
        assert_eq!(rates[1].date, Some(day(2024, 1, 11)));
        assert_eq!(rates[1].rate, dec!(4.3502));
    }

    #[tokio::test]
    async fn test_range_rejects_oversized_window() {
        let provider = NbpProvider::new();
        let window = DateWindow::new(day(2024, 1, 1), day(2024, 6, 1));

        let result = provider.rates_for_range(window).await;
        assert!(matches!(result, Err(ProviderError::InvalidRange { .. })));
    }

    #[tokio::test]
    async fn test_range_rejects_inverted_window() {
        let provider = NbpProvider::new();
        let window = DateWindow::new(day(2024, 1, 10), day(2024, 1, 1));

        let result = provider.rates_for_range(window).await;
        assert!(matches!(result, Err(ProviderError::InvalidRange { .. })));
    }

    #[tokio::test]
    async fn test_unsupported_currency_is_rejected() {
        let provider = NbpProvider::new();

        let result = provider.current_rate_for(Currency::PLN).await;
        assert!(matches!(
            result,
            Err(ProviderError::UnsupportedCurrency(Currency::PLN))
        ));
    }
}
