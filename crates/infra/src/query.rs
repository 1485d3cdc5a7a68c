//! Read side: balances, low-stock list, history, reports and integrity checks.
//!
//! Queries never take product gates. Each per-product read observes a committed state
//! (balance and history together); reports spanning several products are not a global
//! snapshot.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use stock_ledger_core::{AggregateRoot, Clock, LedgerError, LedgerResult, ProductId};
use stock_ledger_inventory::{MovementFilter, MovementId, MovementRecord, ProductBalance};

use crate::config::LedgerConfig;
use crate::ledger_store::{LedgerStore, ProductSnapshot};

/// Half-open `[start, end)` range on `created_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> LedgerResult<Self> {
        if end < start {
            return Err(LedgerError::validation("range end precedes start"));
        }
        Ok(Self { start, end })
    }

    pub fn filter(&self) -> MovementFilter {
        MovementFilter::all().between(self.start, self.end)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReport {
    pub total_products: usize,
    /// Movements in the requested range, or all movements when no range was given.
    pub total_movements: usize,
    /// Movements on the current local calendar day.
    pub movements_today: usize,
    /// `Σ current_stock × purchase_cost`, in the smallest currency unit.
    pub total_stock_value: u64,
    pub low_stock_count: usize,
}

/// A product whose stored state disagrees with its movement history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceDiscrepancy {
    pub product_id: ProductId,
    pub stored_stock: i64,
    pub reconstructed_stock: i64,
    pub stored_version: u64,
    pub history_len: u64,
    /// First movement whose `resulting_stock` (or id order) breaks the running fold.
    pub broken_at: Option<MovementId>,
}

impl BalanceDiscrepancy {
    /// Audit one product's snapshot; `None` when balance and history agree.
    pub fn audit(snapshot: &ProductSnapshot) -> Option<Self> {
        let mut running: i64 = 0;
        let mut previous: Option<MovementId> = None;
        let mut broken_at = None;

        for record in &snapshot.history {
            running = running.saturating_add(record.signed_quantity());
            let out_of_order = previous.is_some_and(|p| record.id <= p);
            if broken_at.is_none() && (record.resulting_stock != running || running < 0 || out_of_order)
            {
                broken_at = Some(record.id);
            }
            previous = Some(record.id);
        }

        let balance = &snapshot.balance;
        let history_len = snapshot.history.len() as u64;
        let consistent = broken_at.is_none()
            && balance.current_stock() == running
            && balance.version() == history_len;

        (!consistent).then(|| Self {
            product_id: balance.product_id(),
            stored_stock: balance.current_stock(),
            reconstructed_stock: running,
            stored_version: balance.version(),
            history_len,
            broken_at,
        })
    }
}

#[derive(Debug)]
pub struct QueryService<S> {
    store: S,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
}

impl<S> QueryService<S>
where
    S: LedgerStore,
{
    pub fn new(store: S, clock: Arc<dyn Clock>, config: LedgerConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Committed balance of a product the ledger has observed or been configured with.
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub fn get_balance(&self, product_id: ProductId) -> LedgerResult<ProductBalance> {
        self.store
            .load_balance(product_id)?
            .ok_or(LedgerError::NotFound(product_id))
    }

    /// Low-stock products, most deficient first (ties by product id).
    #[instrument(skip(self), err)]
    pub fn list_low_stock(&self) -> LedgerResult<Vec<ProductBalance>> {
        let mut low: Vec<ProductBalance> = self
            .store
            .list_balances()?
            .into_iter()
            .filter(ProductBalance::is_low_stock)
            .collect();
        low.sort_by_key(|b| (b.surplus(), b.product_id()));
        Ok(low)
    }

    #[instrument(skip(self), err)]
    pub fn list_movements(&self, filter: &MovementFilter) -> LedgerResult<Vec<MovementRecord>> {
        Ok(self.store.movements(filter)?)
    }

    #[instrument(skip(self), err)]
    pub fn report(&self, range: Option<TimeRange>) -> LedgerResult<StockReport> {
        let balances = self.store.list_balances()?;

        let total_movements = match range {
            Some(range) => self.store.movements(&range.filter())?.len(),
            None => self.store.movements(&MovementFilter::all())?.len(),
        };

        let (today_start, today_end) = self.config.today_window(self.clock.now());
        let movements_today = self
            .store
            .movements(&MovementFilter::all().between(today_start, today_end))?
            .len();

        Ok(StockReport {
            total_products: balances.len(),
            total_movements,
            movements_today,
            total_stock_value: balances
                .iter()
                .map(ProductBalance::stock_value)
                .fold(0u64, u64::saturating_add),
            low_stock_count: balances.iter().filter(|b| b.is_low_stock()).count(),
        })
    }

    /// Signed sum of a product's history.
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub fn reconstruct_balance(&self, product_id: ProductId) -> LedgerResult<i64> {
        let snapshot = self
            .store
            .snapshot(product_id)?
            .ok_or(LedgerError::NotFound(product_id))?;
        Ok(snapshot.history.iter().map(MovementRecord::signed_quantity).sum())
    }

    /// Every product whose stored balance, version or `resulting_stock` chain disagrees
    /// with its history.
    #[instrument(skip(self), err)]
    pub fn verify_integrity(&self) -> LedgerResult<Vec<BalanceDiscrepancy>> {
        let mut discrepancies = Vec::new();

        for balance in self.store.list_balances()? {
            // Removed since listing; nothing to audit.
            let Some(snapshot) = self.store.snapshot(balance.product_id())? else {
                continue;
            };
            if let Some(discrepancy) = BalanceDiscrepancy::audit(&snapshot) {
                warn!(
                    product_id = %discrepancy.product_id,
                    stored_stock = discrepancy.stored_stock,
                    reconstructed_stock = discrepancy.reconstructed_stock,
                    "balance disagrees with movement history"
                );
                discrepancies.push(discrepancy);
            }
        }

        Ok(discrepancies)
    }
}
