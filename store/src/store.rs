//! Persistence contract for reconciled rate records.

use async_trait::async_trait;
use chrono::NaiveDate;

use ratesync_common::{Currency, DateWindow};

use crate::error::StoreResult;
use crate::record::ExchangeRateRecord;

/// Read and write access to the reconciled rate records.
///
/// Implementations enforce the unique `(currency, date)` constraint and
/// reject writes that lose against a concurrent writer's version. All read
/// methods return records ordered by currency, then date.
#[async_trait]
pub trait RateStore: Send + Sync {
    /// Every stored record.
    async fn find_all(&self) -> StoreResult<Vec<ExchangeRateRecord>>;

    /// Every record for one currency.
    async fn find_by_currency(&self, currency: Currency) -> StoreResult<Vec<ExchangeRateRecord>>;

    /// Every record effective on one day.
    async fn find_by_date(&self, date: NaiveDate) -> StoreResult<Vec<ExchangeRateRecord>>;

    /// Every record effective inside a window, bounds inclusive.
    async fn find_by_date_between(&self, window: DateWindow)
        -> StoreResult<Vec<ExchangeRateRecord>>;

    /// The single record for a currency on a day, if present.
    async fn find_by_currency_and_date(
        &self,
        currency: Currency,
        date: NaiveDate,
    ) -> StoreResult<Option<ExchangeRateRecord>>;

    /// Records for any of the given currencies on one day.
    async fn find_by_currencies_and_date(
        &self,
        currencies: &[Currency],
        date: NaiveDate,
    ) -> StoreResult<Vec<ExchangeRateRecord>>;

    /// Records for one currency inside a window, bounds inclusive.
    async fn find_by_currency_and_date_between(
        &self,
        currency: Currency,
        window: DateWindow,
    ) -> StoreResult<Vec<ExchangeRateRecord>>;

    /// Records for any of the given currencies inside a window.
    async fn find_by_currencies_and_date_between(
        &self,
        currencies: &[Currency],
        window: DateWindow,
    ) -> StoreResult<Vec<ExchangeRateRecord>>;

    /// Persist one record. Fails with a version conflict when the stored
    /// record is at the same or a newer version.
    async fn save(&self, record: ExchangeRateRecord) -> StoreResult<()>;

    /// Persist a batch as one write. Returns the number of records written.
    async fn save_all(&self, records: Vec<ExchangeRateRecord>) -> StoreResult<usize>;
}

/// In-memory store for tests.
#[cfg(any(test, feature = "test-utils"))]
pub struct MemoryRateStore {
    records: dashmap::DashMap<(Currency, NaiveDate), ExchangeRateRecord>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MemoryRateStore {
    pub fn new() -> Self {
        Self {
            records: dashmap::DashMap::new(),
        }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Direct keyed lookup, bypassing the trait.
    pub fn get(&self, currency: Currency, date: NaiveDate) -> Option<ExchangeRateRecord> {
        self.records.get(&(currency, date)).map(|r| r.clone())
    }

    fn collect_sorted<F>(&self, filter: F) -> Vec<ExchangeRateRecord>
    where
        F: Fn(&ExchangeRateRecord) -> bool,
    {
        let mut records: Vec<ExchangeRateRecord> = self
            .records
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|r| (r.currency, r.date));
        records
    }

    /// Same guard the SQL store applies: an existing record only gives way
    /// to a strictly newer version.
    fn check_version(&self, record: &ExchangeRateRecord) -> StoreResult<()> {
        if let Some(existing) = self.records.get(&(record.currency, record.date)) {
            if existing.version >= record.version {
                return Err(crate::error::StoreError::VersionConflict {
                    currency: record.currency,
                    date: record.date,
                });
            }
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Default for MemoryRateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateStore for MemoryRateStore {
    async fn find_all(&self) -> StoreResult<Vec<ExchangeRateRecord>> {
        Ok(self.collect_sorted(|_| true))
    }

    async fn find_by_currency(&self, currency: Currency) -> StoreResult<Vec<ExchangeRateRecord>> {
        Ok(self.collect_sorted(|r| r.currency == currency))
    }

    async fn find_by_date(&self, date: NaiveDate) -> StoreResult<Vec<ExchangeRateRecord>> {
        Ok(self.collect_sorted(|r| r.date == date))
    }

    async fn find_by_date_between(
        &self,
        window: DateWindow,
    ) -> StoreResult<Vec<ExchangeRateRecord>> {
        Ok(self.collect_sorted(|r| window.contains(r.date)))
    }

    async fn find_by_currency_and_date(
        &self,
        currency: Currency,
        date: NaiveDate,
    ) -> StoreResult<Option<ExchangeRateRecord>> {
        Ok(self.records.get(&(currency, date)).map(|r| r.clone()))
    }

    async fn find_by_currencies_and_date(
        &self,
        currencies: &[Currency],
        date: NaiveDate,
    ) -> StoreResult<Vec<ExchangeRateRecord>> {
        Ok(self.collect_sorted(|r| r.date == date && currencies.contains(&r.currency)))
    }

    async fn find_by_currency_and_date_between(
        &self,
        currency: Currency,
        window: DateWindow,
    ) -> StoreResult<Vec<ExchangeRateRecord>> {
        Ok(self.collect_sorted(|r| r.currency == currency && window.contains(r.date)))
    }

    async fn find_by_currencies_and_date_between(
        &self,
        currencies: &[Currency],
        window: DateWindow,
    ) -> StoreResult<Vec<ExchangeRateRecord>> {
        Ok(self.collect_sorted(|r| currencies.contains(&r.currency) && window.contains(r.date)))
    }

    async fn save(&self, record: ExchangeRateRecord) -> StoreResult<()> {
        self.check_version(&record)?;
        self.records.insert((record.currency, record.date), record);
        Ok(())
    }

    async fn save_all(&self, records: Vec<ExchangeRateRecord>) -> StoreResult<usize> {
        for record in &records {
            self.check_version(record)?;
        }

        let count = records.len();
        for record in records {
            self.records.insert((record.currency, record.date), record);
        }
        Ok(count)
    }
}
