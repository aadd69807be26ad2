//! Scheduler configuration.

use std::time::Duration;

use ratesync_common::currency::Currency;

/// Synchronization timing configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Hour of day (UTC) at which the daily cycle fires.
    pub sync_hour: u32,
    /// Minute of the hour at which the daily cycle fires.
    pub sync_minute: u32,
    /// Delay before retrying a cycle that failed with a server-side error.
    pub retry_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_hour: 12,
            sync_minute: 5,
            retry_delay: Duration::from_secs(3600),
        }
    }
}

/// Main scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Name of the provider to prefer when several are registered.
    pub default_provider: Option<String>,
    /// Currency all quotes are expressed against.
    pub base_currency: Currency,
    /// Database URL.
    pub database_url: String,
    /// Base endpoint for the NBP provider.
    pub nbp_base_url: String,
    /// Per-request timeout for provider HTTP calls.
    pub http_timeout: Duration,
    /// First year covered by historical backfill.
    pub history_from_year: i32,
    /// Synchronization timing.
    pub sync: SyncConfig,
    /// Enable metrics reporting.
    pub metrics_enabled: bool,
    /// Log level.
    pub log_level: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_provider: None,
            base_currency: Currency::PLN,
            database_url: "postgres://localhost/ratesync".to_string(),
            nbp_base_url: ratesync_provider::nbp::DEFAULT_BASE_URL.to_string(),
            http_timeout: Duration::from_secs(30),
            history_from_year: 2002,
            sync: SyncConfig::default(),
            metrics_enabled: true,
            log_level: "info".to_string(),
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("RATESYNC_DEFAULT_PROVIDER") {
            config.default_provider = Some(name);
        }

        if let Ok(currency) = std::env::var("RATESYNC_BASE_CURRENCY") {
            if let Ok(currency) = currency.parse() {
                config.base_currency = currency;
            }
        }

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = url;
        }

        if let Ok(url) = std::env::var("RATESYNC_NBP_BASE_URL") {
            config.nbp_base_url = url;
        }

        if let Ok(secs) = std::env::var("RATESYNC_HTTP_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                config.http_timeout = Duration::from_secs(secs);
            }
        }

        if let Ok(year) = std::env::var("RATESYNC_HISTORY_FROM_YEAR") {
            if let Ok(year) = year.parse() {
                config.history_from_year = year;
            }
        }

        if let Ok(hour) = std::env::var("RATESYNC_SYNC_HOUR") {
            if let Ok(hour) = hour.parse() {
                config.sync.sync_hour = hour;
            }
        }

        if let Ok(minute) = std::env::var("RATESYNC_SYNC_MINUTE") {
            if let Ok(minute) = minute.parse() {
                config.sync.sync_minute = minute;
            }
        }

        if let Ok(secs) = std::env::var("RATESYNC_RETRY_DELAY_SECS") {
            if let Ok(secs) = secs.parse() {
                config.sync.retry_delay = Duration::from_secs(secs);
            }
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.database_url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }

        if self.sync.sync_hour > 23 {
            return Err("Sync hour must be between 0 and 23".to_string());
        }

        if self.sync.sync_minute > 59 {
            return Err("Sync minute must be between 0 and 59".to_string());
        }

        if self.sync.retry_delay.is_zero() {
            return Err("Retry delay cannot be zero".to_string());
        }

        if self.http_timeout.is_zero() {
            return Err("HTTP timeout cannot be zero".to_string());
        }

        if !(1900..=2100).contains(&self.history_from_year) {
            return Err("History start year out of range".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = SchedulerConfig::default();
        config.sync.sync_hour = 24;
        assert!(config.validate().is_err());

        let mut config = SchedulerConfig::default();
        config.database_url.clear();
        assert!(config.validate().is_err());
    }
}
