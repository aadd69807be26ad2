//! The reconciled per-currency/per-day rate record.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use ratesync_common::{Currency, CurrencyRate, ProviderDetails, Rate, RecordId};

/// One reconciled record: everything every provider has reported for a
/// single currency on a single calendar day.
///
/// At most one record exists per `(currency, date)` pair; providers
/// contribute to it side by side and never overwrite each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRateRecord {
    /// Synthetic identity, assigned at creation.
    pub id: RecordId,
    /// Quoted currency. Never the base currency itself.
    pub currency: Currency,
    /// Calendar day the rates are effective on.
    pub date: NaiveDate,
    /// Provider name to the rate that provider reported.
    pub rates_by_provider: BTreeMap<String, Rate>,
    /// Provider name to that provider's free-form metadata.
    pub details_by_provider: BTreeMap<String, ProviderDetails>,
    /// Optimistic-concurrency counter, advanced on every mutation.
    pub version: i64,
    /// Set once at creation.
    pub created_at: DateTime<Utc>,
    /// Advanced on every mutation that changes the record.
    pub modified_at: DateTime<Utc>,
}

impl ExchangeRateRecord {
    /// Create an empty record for a currency and day.
    pub fn new(currency: Currency, date: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            id: RecordId::new(),
            currency,
            date,
            rates_by_provider: BTreeMap::new(),
            details_by_provider: BTreeMap::new(),
            version: 0,
            created_at: now,
            modified_at: now,
        }
    }

    /// Whether a provider has contributed to this record. A provider
    /// counts as present only when both its rate and its details are
    /// stored; a half entry does not count.
    pub fn has_provider(&self, provider: &str) -> bool {
        self.rates_by_provider.contains_key(provider)
            && self.details_by_provider.contains_key(provider)
    }

    /// Names of all contributing providers.
    pub fn providers(&self) -> Vec<&str> {
        self.rates_by_provider
            .keys()
            .filter(|name| self.details_by_provider.contains_key(name.as_str()))
            .map(|name| name.as_str())
            .collect()
    }

    /// Merge one provider's quote into this record.
    ///
    /// Returns `false` without changing anything when the provider is
    /// already present; re-deliveries never replace an earlier
    /// contribution. Does not advance `version` or `modified_at`, callers
    /// decide whether the merge counts as a mutation of a stored record.
    pub fn apply_contribution(&mut self, raw: &CurrencyRate, rate: Rate) -> bool {
        if self.has_provider(&raw.provider) {
            return false;
        }

        self.rates_by_provider.insert(raw.provider.clone(), rate);
        self.details_by_provider
            .insert(raw.provider.clone(), raw.details.clone());
        true
    }

    /// Record a mutation of an already-stored record.
    pub fn touch(&mut self) {
        self.version += 1;
        self.modified_at = Utc::now();
    }

    /// The rate a specific provider reported, if any.
    pub fn rate_from(&self, provider: &str) -> Option<&Rate> {
        self.rates_by_provider.get(provider)
    }
}

impl std::fmt::Display for ExchangeRateRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} @ {} v{} [{}]",
            self.currency,
            self.date,
            self.version,
            self.providers().join(", ")
        )
    }
}
