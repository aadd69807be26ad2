//! RateSync Providers
//!
//! Exchange rate sources and historical fetching for the synchronization
//! pipeline.
//!
//! # Features
//!
//! - Provider abstraction over current, dated and ranged rate queries
//! - Registry with an active provider and failover enumeration
//! - NBP web API provider (tables A and B)
//! - Chunked, concurrent historical backfill
//!
//! # Example
//!
//! ```rust,ignore
//! use ratesync_provider::{HistoricalBackfill, NbpProvider, ProviderRegistry, RateProvider};
//! use std::sync::Arc;
//!
//! let mut registry = ProviderRegistry::new();
//! registry.register(Arc::new(NbpProvider::new()));
//!
//! // Today's published tables from the active provider
//! let provider = registry.active_provider()?;
//! let rates = provider.current_rates().await?;
//!
//! // Everything the provider has ever published
//! let history = HistoricalBackfill::for_provider(provider.as_ref())
//!     .fetch_all(provider.as_ref())
//!     .await?;
//! ```

pub mod backfill;
pub mod error;
pub mod nbp;
pub mod provider;
pub mod registry;

pub use backfill::HistoricalBackfill;
pub use error::{ProviderError, ProviderResult};
pub use nbp::{NbpProvider, TableType};
pub use provider::{ProviderConfig, RateProvider};
pub use registry::ProviderRegistry;

#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockRateProvider;
