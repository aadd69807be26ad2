//! Merging freshly fetched provider quotes into stored records.
//!
//! The engine computes the minimal set of creates and updates so that each
//! `(currency, date)` pair ends up holding the new provider's rate and
//! details next to whatever other providers reported earlier. Nothing here
//! ever removes or replaces an existing contribution.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, instrument, warn};

use ratesync_common::{Currency, CurrencyRate, DateWindow, Rate};

use crate::error::{StoreError, StoreResult};
use crate::record::ExchangeRateRecord;
use crate::store::RateStore;

/// What one reconciliation pass did. `created` and `updated` count
/// records, `skipped` counts quotes discarded as duplicates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl ReconcileOutcome {
    /// Records written to the store.
    pub fn persisted(&self) -> usize {
        self.created + self.updated
    }

    /// Fold another pass's counts into this one.
    pub fn absorb(&mut self, other: ReconcileOutcome) {
        self.created += other.created;
        self.updated += other.updated;
        self.skipped += other.skipped;
    }
}

impl std::fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "created {}, updated {}, skipped {}",
            self.created, self.updated, self.skipped
        )
    }
}

enum PendingState {
    /// Loaded from the store and untouched so far.
    Clean,
    /// Did not exist before this pass.
    Created,
    /// Loaded from the store and mutated by this pass.
    Updated,
}

struct Pending {
    record: ExchangeRateRecord,
    state: PendingState,
}

/// Reconciles raw provider quotes against the persistent store.
pub struct ReconciliationEngine {
    store: Arc<dyn RateStore>,
    base_currency: Currency,
}

impl ReconciliationEngine {
    /// Create an engine quoting against PLN.
    pub fn new(store: Arc<dyn RateStore>) -> Self {
        Self {
            store,
            base_currency: Currency::PLN,
        }
    }

    /// Override the base currency quotes are expressed against.
    pub fn with_base_currency(mut self, base_currency: Currency) -> Self {
        self.base_currency = base_currency;
        self
    }

    /// Reconcile a dated batch, the current-day synchronization path.
    ///
    /// Every quote must carry a date; a batch with an undated quote is
    /// rejected outright. Existing records are loaded for exactly the
    /// currencies and the date span the batch covers, then each quote either
    /// creates a record, merges into one, or is skipped as a duplicate. All
    /// resulting writes land in one batch.
    #[instrument(skip(self, rates), fields(count = rates.len()))]
    pub async fn create_or_update(&self, rates: &[CurrencyRate]) -> StoreResult<ReconcileOutcome> {
        if rates.is_empty() {
            return Ok(ReconcileOutcome::default());
        }

        let mut dates = Vec::with_capacity(rates.len());
        for rate in rates {
            match rate.date {
                Some(date) => dates.push(date),
                None => {
                    return Err(StoreError::InvalidDateRange {
                        reason: format!("undated {} quote from {}", rate.currency, rate.provider),
                    })
                }
            }
        }
        let window = DateWindow::new(
            *dates.iter().min().unwrap_or(&dates[0]),
            *dates.iter().max().unwrap_or(&dates[0]),
        );

        let currencies: Vec<Currency> = rates
            .iter()
            .map(|r| r.currency)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        // Single-day batches take the keyed lookup instead of a range scan.
        let existing = if window.from == window.to {
            self.store
                .find_by_currencies_and_date(&currencies, window.from)
                .await?
        } else {
            self.store
                .find_by_currencies_and_date_between(&currencies, window)
                .await?
        };

        let mut index = index_by_day(existing);
        let mut outcome = ReconcileOutcome::default();
        for (rate, date) in rates.iter().zip(dates) {
            self.fold(&mut index, rate, date, &mut outcome);
        }

        self.persist(index).await?;
        info!(%outcome, "Reconciled rate batch");
        Ok(outcome)
    }

    /// Reconcile a full historical load.
    ///
    /// Loads the entire store rather than a date window, and tolerates
    /// undated quotes by skipping them instead of rejecting the batch.
    #[instrument(skip(self, rates), fields(count = rates.len()))]
    pub async fn save_history(&self, rates: &[CurrencyRate]) -> StoreResult<ReconcileOutcome> {
        if rates.is_empty() {
            return Ok(ReconcileOutcome::default());
        }

        let existing = self.store.find_all().await?;
        let mut index = index_by_day(existing);

        let mut outcome = ReconcileOutcome::default();
        for rate in rates {
            let date = match rate.date {
                Some(date) => date,
                None => {
                    warn!(
                        provider = %rate.provider,
                        currency = %rate.currency,
                        "Skipping undated historical quote"
                    );
                    outcome.skipped += 1;
                    continue;
                }
            };
            self.fold(&mut index, rate, date, &mut outcome);
        }

        self.persist(index).await?;
        info!(%outcome, "Reconciled historical batch");
        Ok(outcome)
    }

    /// Merge one quote into the working index.
    fn fold(
        &self,
        index: &mut BTreeMap<(Currency, NaiveDate), Pending>,
        raw: &CurrencyRate,
        date: NaiveDate,
        outcome: &mut ReconcileOutcome,
    ) {
        if raw.currency == self.base_currency {
            warn!(provider = %raw.provider, "Ignoring a quote for the base currency itself");
            outcome.skipped += 1;
            return;
        }

        let rate = Rate::from_mid(raw.currency, self.base_currency, raw.rate);
        match index.entry((raw.currency, date)) {
            Entry::Vacant(slot) => {
                let mut record = ExchangeRateRecord::new(raw.currency, date);
                record.apply_contribution(raw, rate);
                slot.insert(Pending {
                    record,
                    state: PendingState::Created,
                });
                outcome.created += 1;
            }
            Entry::Occupied(mut slot) => {
                let pending = slot.get_mut();
                if pending.record.apply_contribution(raw, rate) {
                    // One version step per pass, however many quotes land.
                    if matches!(pending.state, PendingState::Clean) {
                        pending.record.touch();
                        pending.state = PendingState::Updated;
                        outcome.updated += 1;
                    }
                } else {
                    debug!(
                        provider = %raw.provider,
                        currency = %raw.currency,
                        %date,
                        "Skipping duplicate contribution"
                    );
                    outcome.skipped += 1;
                }
            }
        }
    }

    async fn persist(&self, index: BTreeMap<(Currency, NaiveDate), Pending>) -> StoreResult<()> {
        let dirty: Vec<ExchangeRateRecord> = index
            .into_values()
            .filter(|p| !matches!(p.state, PendingState::Clean))
            .map(|p| p.record)
            .collect();

        if !dirty.is_empty() {
            self.store.save_all(dirty).await?;
        }
        Ok(())
    }
}

fn index_by_day(
    records: Vec<ExchangeRateRecord>,
) -> BTreeMap<(Currency, NaiveDate), Pending> {
    records
        .into_iter()
        .map(|record| {
            (
                (record.currency, record.date),
                Pending {
                    record,
                    state: PendingState::Clean,
                },
            )
        })
        .collect()
}
