//! Provider error types.

use ratesync_common::{Currency, DateWindow};
use thiserror::Error;

/// Errors that can occur when fetching rates from providers.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// No provider is registered at all.
    #[error("No rate provider available")]
    NoProviderAvailable,

    /// A single fetch against a provider failed.
    #[error("Provider {provider} fetch failed: {reason}")]
    Fetch {
        provider: String,
        reason: String,
        server_side: bool,
    },

    /// The upstream response could not be decoded.
    #[error("Provider {provider} returned an undecodable response: {reason}")]
    Decode { provider: String, reason: String },

    /// The provider does not publish rates for the currency.
    #[error("Currency {0} is not covered by this provider")]
    UnsupportedCurrency(Currency),

    /// The requested range is empty or exceeds the provider's per-call limit.
    #[error("Invalid date range {window}: {reason}")]
    InvalidRange { window: DateWindow, reason: String },

    /// Historical backfill failed after all chunks were attempted.
    #[error("Historical fetch failed for provider {provider}")]
    HistoricalFetch { provider: String },
}

impl ProviderError {
    /// Check whether the failure originated server-side (HTTP 5xx class).
    /// Server-side failures are transient enough to justify a scheduled
    /// retry; anything else is not retried automatically.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            ProviderError::Fetch {
                server_side: true,
                ..
            }
        )
    }
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_classification() {
        let server = ProviderError::Fetch {
            provider: "nbp".to_string(),
            reason: "HTTP 503 Service Unavailable".to_string(),
            server_side: true,
        };
        assert!(server.is_server_error());

        let client = ProviderError::Fetch {
            provider: "nbp".to_string(),
            reason: "HTTP 400 Bad Request".to_string(),
            server_side: false,
        };
        assert!(!client.is_server_error());

        assert!(!ProviderError::NoProviderAvailable.is_server_error());
    }
}
