//! RateSync Store
//!
//! Persistent per-currency/per-day rate records and the reconciliation
//! engine that merges provider quotes into them.

pub mod error;
pub mod postgres;
pub mod reconcile;
pub mod record;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use postgres::PgRateStore;
pub use reconcile::{ReconcileOutcome, ReconciliationEngine};
pub use record::ExchangeRateRecord;
pub use store::RateStore;

#[cfg(any(test, feature = "test-utils"))]
pub use store::MemoryRateStore;
