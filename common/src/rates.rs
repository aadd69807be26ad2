//! Raw provider-sourced rate input.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::currency::Currency;

/// Provider-specific metadata attached to a fetched rate, such as the source
/// table identifier and sequence number. Sorted map so the serialized form is
/// stable.
pub type ProviderDetails = BTreeMap<String, String>;

/// A single rate as fetched from a provider, before reconciliation.
///
/// `date` is the effective date reported upstream. Current-rate endpoints of
/// some providers omit it; reconciliation decides how to treat a missing
/// date depending on the entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyRate {
    /// Name of the provider that reported this rate.
    pub provider: String,
    /// Quoted currency.
    pub currency: Currency,
    /// Effective calendar day, when reported.
    pub date: Option<NaiveDate>,
    /// Raw mid value against the provider's base currency.
    pub rate: Decimal,
    /// Provider-specific metadata.
    pub details: ProviderDetails,
}

impl CurrencyRate {
    /// Create a new raw rate with empty details.
    pub fn new(
        provider: impl Into<String>,
        currency: Currency,
        date: Option<NaiveDate>,
        rate: Decimal,
    ) -> Self {
        Self {
            provider: provider.into(),
            currency,
            date,
            rate,
            details: ProviderDetails::new(),
        }
    }

    /// Attach a details entry.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for CurrencyRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.date {
            Some(date) => write!(f, "{} {} @ {} ({})", self.currency, self.rate, date, self.provider),
            None => write!(f, "{} {} (undated, {})", self.currency, self.rate, self.provider),
        }
    }
}
