//! Chunked historical fetching.
//!
//! Providers cap how many days a single range query may span, so a long
//! backfill window is split into consecutive chunks that are fetched
//! concurrently and merged into one deduplicated, ordered series.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use futures::future;
use tracing::{debug, info, warn};

use ratesync_common::{start_of_year, today, Currency, CurrencyRate, DateWindow};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::RateProvider;

/// A historical fetch plan: the window to cover and the chunk size limit.
#[derive(Debug, Clone, Copy)]
pub struct HistoricalBackfill {
    window: DateWindow,
    max_fetch_days: u32,
}

impl HistoricalBackfill {
    /// Plan a fetch of an explicit window with an explicit chunk limit.
    pub fn new(window: DateWindow, max_fetch_days: u32) -> Self {
        Self {
            window,
            max_fetch_days,
        }
    }

    /// Plan a full-history fetch for a provider: from the start of the
    /// provider's first published year up to today, chunked at the
    /// provider's range limit.
    pub fn for_provider(provider: &dyn RateProvider) -> Self {
        let config = provider.config();
        let window = DateWindow::new(start_of_year(config.history_from_year), today());
        Self::new(window, config.max_fetch_days)
    }

    /// The window this plan covers.
    pub fn window(&self) -> DateWindow {
        self.window
    }

    /// Split the window into consecutive chunks of at most
    /// `max_fetch_days` days each. Chunks cover the window exactly, in
    /// order, without gaps or overlap. An invalid window yields no chunks.
    pub fn chunks(&self) -> Vec<DateWindow> {
        if !self.window.is_valid() || self.max_fetch_days == 0 {
            return Vec::new();
        }

        let step = Duration::days(self.max_fetch_days as i64 - 1);
        let mut chunks = Vec::new();
        let mut from = self.window.from;
        while from <= self.window.to {
            let to = (from + step).min(self.window.to);
            chunks.push(DateWindow::new(from, to));
            from = to + Duration::days(1);
        }
        chunks
    }

    /// Fetch every chunk concurrently and merge the results.
    ///
    /// Duplicate quotes for the same currency and date keep the first
    /// occurrence, undated quotes are dropped, and the merged series comes
    /// back ordered by currency and date. Every chunk is attempted even when
    /// some fail; any failure makes the whole fetch fail.
    pub async fn fetch_all(&self, provider: &dyn RateProvider) -> ProviderResult<Vec<CurrencyRate>> {
        let chunks = self.chunks();
        if chunks.is_empty() {
            return Err(ProviderError::InvalidRange {
                window: self.window,
                reason: "no fetchable chunks in window".to_string(),
            });
        }

        info!(
            provider = provider.name(),
            window = %self.window,
            chunks = chunks.len(),
            "Starting historical fetch"
        );

        let fetches: Vec<_> = chunks
            .iter()
            .map(|chunk| provider.rates_for_range(*chunk))
            .collect();
        let results = future::join_all(fetches).await;

        let mut merged: BTreeMap<(Currency, NaiveDate), CurrencyRate> = BTreeMap::new();
        let mut failed = 0usize;
        for (chunk, result) in chunks.iter().zip(results) {
            match result {
                Ok(rates) => {
                    for rate in rates {
                        let date = match rate.date {
                            Some(date) => date,
                            None => {
                                debug!(currency = %rate.currency, "Dropping undated quote from historical fetch");
                                continue;
                            }
                        };
                        merged.entry((rate.currency, date)).or_insert(rate);
                    }
                }
                Err(e) => {
                    failed += 1;
                    warn!(chunk = %chunk, error = %e, "Historical chunk fetch failed");
                }
            }
        }

        if failed > 0 {
            return Err(ProviderError::HistoricalFetch {
                provider: provider.name().to_string(),
            });
        }

        info!(
            provider = provider.name(),
            quotes = merged.len(),
            "Historical fetch complete"
        );
        Ok(merged.into_values().collect())
    }
}
