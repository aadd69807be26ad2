//! Store error types.

use chrono::NaiveDate;
use thiserror::Error;

use ratesync_common::Currency;

/// Errors raised by rate persistence and reconciliation.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// A batch passed to reconciliation carries no usable dates.
    #[error("Invalid date range: {reason}")]
    InvalidDateRange { reason: String },

    /// A read against the backing store failed.
    #[error("Query failed: {0}")]
    Query(String),

    /// A write against the backing store failed.
    #[error("Write failed: {0}")]
    Write(String),

    /// A concurrent writer advanced the record first.
    #[error("Version conflict for {currency} on {date}")]
    VersionConflict { currency: Currency, date: NaiveDate },

    /// Schema migration failed.
    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
