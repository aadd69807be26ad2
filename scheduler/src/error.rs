//! Scheduler error types.

use ratesync_provider::error::ProviderError;
use ratesync_store::error::StoreError;
use thiserror::Error;

/// Errors that can occur while driving synchronization.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A provider operation failed.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// A store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The scheduler loop was started twice.
    #[error("Scheduler is already running")]
    AlreadyRunning,

    /// Configuration rejected at startup.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;
