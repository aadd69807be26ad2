//! Postgres-backed rate store.
//!
//! Records live in one `exchange_rates` table with the provider maps stored
//! as JSONB. The unique `(currency, rate_date)` constraint backs the
//! one-record-per-pair invariant, and the version column guards updates
//! against concurrent writers.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use sqlx::FromRow;
use tracing::{info, instrument};
use uuid::Uuid;

use ratesync_common::{Currency, DateWindow, ProviderDetails, Rate, RecordId};

use crate::error::{StoreError, StoreResult};
use crate::record::ExchangeRateRecord;
use crate::store::RateStore;

const SELECT_COLUMNS: &str = "id, currency, rate_date, rates_by_provider, details_by_provider, \
                              version, created_at, modified_at";

/// Database row for one reconciled record.
#[derive(Debug, FromRow)]
struct RecordRow {
    id: Uuid,
    currency: String,
    rate_date: NaiveDate,
    rates_by_provider: Json<BTreeMap<String, Rate>>,
    details_by_provider: Json<BTreeMap<String, ProviderDetails>>,
    version: i64,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

impl RecordRow {
    fn into_record(self) -> StoreResult<ExchangeRateRecord> {
        let currency = self
            .currency
            .parse::<Currency>()
            .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(ExchangeRateRecord {
            id: RecordId::from_uuid(self.id),
            currency,
            date: self.rate_date,
            rates_by_provider: self.rates_by_provider.0,
            details_by_provider: self.details_by_provider.0,
            version: self.version,
            created_at: self.created_at,
            modified_at: self.modified_at,
        })
    }
}

fn into_records(rows: Vec<RecordRow>) -> StoreResult<Vec<ExchangeRateRecord>> {
    rows.into_iter().map(RecordRow::into_record).collect()
}

fn currency_codes(currencies: &[Currency]) -> Vec<String> {
    currencies.iter().map(|c| c.code().to_string()).collect()
}

/// `RateStore` over a Postgres connection pool.
#[derive(Clone)]
pub struct PgRateStore {
    pool: PgPool,
}

impl PgRateStore {
    /// Wrap an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))
    }
}

/// The one write statement: insert a new record, or replace an existing
/// record's maps when the incoming version is strictly newer. Touching
/// nothing on a version tie is what surfaces lost races as conflicts.
const UPSERT_SQL: &str = r#"
    INSERT INTO exchange_rates
        (id, currency, rate_date, rates_by_provider, details_by_provider, version, created_at, modified_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ON CONFLICT (currency, rate_date) DO UPDATE SET
        rates_by_provider = EXCLUDED.rates_by_provider,
        details_by_provider = EXCLUDED.details_by_provider,
        version = EXCLUDED.version,
        modified_at = EXCLUDED.modified_at
    WHERE exchange_rates.version < EXCLUDED.version
"#;

fn bind_record(
    record: &ExchangeRateRecord,
) -> sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(UPSERT_SQL)
        .bind(*record.id.as_uuid())
        .bind(record.currency.code())
        .bind(record.date)
        .bind(Json(&record.rates_by_provider))
        .bind(Json(&record.details_by_provider))
        .bind(record.version)
        .bind(record.created_at)
        .bind(record.modified_at)
}

#[async_trait]
impl RateStore for PgRateStore {
    async fn find_all(&self) -> StoreResult<Vec<ExchangeRateRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM exchange_rates ORDER BY currency, rate_date"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        into_records(rows)
    }

    async fn find_by_currency(&self, currency: Currency) -> StoreResult<Vec<ExchangeRateRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM exchange_rates WHERE currency = $1 ORDER BY rate_date"
        ))
        .bind(currency.code())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        into_records(rows)
    }

    async fn find_by_date(&self, date: NaiveDate) -> StoreResult<Vec<ExchangeRateRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM exchange_rates WHERE rate_date = $1 ORDER BY currency"
        ))
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        into_records(rows)
    }

    #[instrument(skip(self))]
    async fn find_by_date_between(
        &self,
        window: DateWindow,
    ) -> StoreResult<Vec<ExchangeRateRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM exchange_rates \
             WHERE rate_date >= $1 AND rate_date <= $2 ORDER BY currency, rate_date"
        ))
        .bind(window.from)
        .bind(window.to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        into_records(rows)
    }

    async fn find_by_currency_and_date(
        &self,
        currency: Currency,
        date: NaiveDate,
    ) -> StoreResult<Option<ExchangeRateRecord>> {
        let row: Option<RecordRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM exchange_rates WHERE currency = $1 AND rate_date = $2"
        ))
        .bind(currency.code())
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        row.map(RecordRow::into_record).transpose()
    }

    async fn find_by_currencies_and_date(
        &self,
        currencies: &[Currency],
        date: NaiveDate,
    ) -> StoreResult<Vec<ExchangeRateRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM exchange_rates \
             WHERE currency = ANY($1) AND rate_date = $2 ORDER BY currency"
        ))
        .bind(currency_codes(currencies))
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        into_records(rows)
    }

    async fn find_by_currency_and_date_between(
        &self,
        currency: Currency,
        window: DateWindow,
    ) -> StoreResult<Vec<ExchangeRateRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM exchange_rates \
             WHERE currency = $1 AND rate_date >= $2 AND rate_date <= $3 ORDER BY rate_date"
        ))
        .bind(currency.code())
        .bind(window.from)
        .bind(window.to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        into_records(rows)
    }

    async fn find_by_currencies_and_date_between(
        &self,
        currencies: &[Currency],
        window: DateWindow,
    ) -> StoreResult<Vec<ExchangeRateRecord>> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM exchange_rates \
             WHERE currency = ANY($1) AND rate_date >= $2 AND rate_date <= $3 \
             ORDER BY currency, rate_date"
        ))
        .bind(currency_codes(currencies))
        .bind(window.from)
        .bind(window.to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;
        into_records(rows)
    }

    async fn save(&self, record: ExchangeRateRecord) -> StoreResult<()> {
        let result = bind_record(&record)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Write(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::VersionConflict {
                currency: record.currency,
                date: record.date,
            });
        }
        Ok(())
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn save_all(&self, records: Vec<ExchangeRateRecord>) -> StoreResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Write(e.to_string()))?;

        for record in &records {
            let result = bind_record(record)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Write(e.to_string()))?;

            if result.rows_affected() == 0 {
                // Dropping the transaction rolls the whole batch back.
                return Err(StoreError::VersionConflict {
                    currency: record.currency,
                    date: record.date,
                });
            }
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Write(e.to_string()))?;

        info!(count = records.len(), "Persisted rate records");
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_row_conversion() {
        let mut rates = BTreeMap::new();
        rates.insert(
            "nbp".to_string(),
            Rate::from_mid(Currency::EUR, Currency::PLN, dec!(4.30)),
        );
        let mut details = BTreeMap::new();
        details.insert("nbp".to_string(), {
            let mut bag = ProviderDetails::new();
            bag.insert("table".to_string(), "A".to_string());
            bag
        });

        let row = RecordRow {
            id: Uuid::now_v7(),
            currency: "EUR".to_string(),
            rate_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            rates_by_provider: Json(rates),
            details_by_provider: Json(details),
            version: 3,
            created_at: Utc::now(),
            modified_at: Utc::now(),
        };

        let record = row.into_record().unwrap();
        assert_eq!(record.currency, Currency::EUR);
        assert_eq!(record.version, 3);
        assert!(record.has_provider("nbp"));
    }

    #[test]
    fn test_row_conversion_rejects_unknown_currency() {
        let row = RecordRow {
            id: Uuid::now_v7(),
            currency: "ZZZ".to_string(),
            rate_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            rates_by_provider: Json(BTreeMap::new()),
            details_by_provider: Json(BTreeMap::new()),
            version: 0,
            created_at: Utc::now(),
            modified_at: Utc::now(),
        };

        assert!(matches!(row.into_record(), Err(StoreError::Query(_))));
    }
}
