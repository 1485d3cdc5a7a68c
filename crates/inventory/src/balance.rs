use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stock_ledger_core::{Aggregate, AggregateRoot, LedgerError, LedgerResult, ProductId};

use crate::movement::{MovementRecord, MovementType, RecordMovement};

/// Catalog-supplied terms for a product: replenishment thresholds and unit cost.
///
/// Zero thresholds mean "unset". `purchase_cost` is in the smallest currency unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTerms {
    #[serde(default)]
    pub minimum_stock: i64,
    #[serde(default)]
    pub maximum_stock: i64,
    #[serde(default)]
    pub purchase_cost: u64,
}

impl StockTerms {
    pub fn new(minimum_stock: i64, maximum_stock: i64, purchase_cost: u64) -> Self {
        Self {
            minimum_stock,
            maximum_stock,
            purchase_cost,
        }
    }

    /// Hard validation: thresholds cannot be negative.
    pub fn validate(&self) -> LedgerResult<()> {
        if self.minimum_stock < 0 {
            return Err(LedgerError::validation("minimum_stock cannot be negative"));
        }
        if self.maximum_stock < 0 {
            return Err(LedgerError::validation("maximum_stock cannot be negative"));
        }
        Ok(())
    }

    /// Soft constraint: `maximum_stock >= minimum_stock` when both are set.
    pub fn has_inverted_bounds(&self) -> bool {
        self.minimum_stock > 0 && self.maximum_stock > 0 && self.maximum_stock < self.minimum_stock
    }
}

/// Event: a signed change to one product's stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub product_id: ProductId,
    pub delta: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Aggregate root: the current balance of one product.
///
/// `current_stock` is a materialized fold over the product's movement history and is
/// never edited directly; `version` counts the movements folded in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductBalance {
    product_id: ProductId,
    current_stock: i64,
    #[serde(flatten)]
    terms: StockTerms,
    version: u64,
    last_movement_at: Option<DateTime<Utc>>,
}

impl ProductBalance {
    /// Balance of a product the ledger has not seen move yet.
    pub fn empty(product_id: ProductId) -> Self {
        Self::with_terms(product_id, StockTerms::default())
    }

    pub fn with_terms(product_id: ProductId, terms: StockTerms) -> Self {
        Self {
            product_id,
            current_stock: 0,
            terms,
            version: 0,
            last_movement_at: None,
        }
    }

    /// Rebuild from persisted columns (storage adapters only).
    pub fn restore(
        product_id: ProductId,
        current_stock: i64,
        terms: StockTerms,
        version: u64,
        last_movement_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            product_id,
            current_stock,
            terms,
            version,
            last_movement_at,
        }
    }

    /// Fold a product's history (in application order) into a balance.
    pub fn replay<'a>(
        product_id: ProductId,
        terms: StockTerms,
        history: impl IntoIterator<Item = &'a MovementRecord>,
    ) -> Self {
        let mut balance = Self::with_terms(product_id, terms);
        for record in history {
            balance.apply(&record.change());
        }
        balance
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn current_stock(&self) -> i64 {
        self.current_stock
    }

    pub fn minimum_stock(&self) -> i64 {
        self.terms.minimum_stock
    }

    pub fn maximum_stock(&self) -> i64 {
        self.terms.maximum_stock
    }

    pub fn purchase_cost(&self) -> u64 {
        self.terms.purchase_cost
    }

    pub fn terms(&self) -> StockTerms {
        self.terms
    }

    pub fn last_movement_at(&self) -> Option<DateTime<Utc>> {
        self.last_movement_at
    }

    /// Whether any movement was ever applied.
    pub fn has_history(&self) -> bool {
        self.version > 0
    }

    pub fn set_terms(&mut self, terms: StockTerms) {
        self.terms = terms;
    }

    /// Low stock: at or below a configured (nonzero) minimum.
    pub fn is_low_stock(&self) -> bool {
        self.terms.minimum_stock > 0 && self.current_stock <= self.terms.minimum_stock
    }

    /// `current_stock - minimum_stock`; most deficient products sort first.
    pub fn surplus(&self) -> i64 {
        self.current_stock - self.terms.minimum_stock
    }

    /// Quantity that brings the product back to its target level (maximum when set,
    /// otherwise minimum). Zero when nothing is needed.
    pub fn suggested_reorder(&self) -> i64 {
        let target = if self.terms.maximum_stock > 0 {
            self.terms.maximum_stock
        } else {
            self.terms.minimum_stock
        };
        (target - self.current_stock).max(0)
    }

    /// `current_stock * purchase_cost`, saturating.
    pub fn stock_value(&self) -> u64 {
        u64::try_from(self.current_stock)
            .unwrap_or(0)
            .saturating_mul(self.terms.purchase_cost)
    }

    /// Earliest timestamp the next movement may carry.
    pub fn next_timestamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.last_movement_at {
            Some(last) if last > now => last,
            _ => now,
        }
    }

    fn handle_record(&self, cmd: &RecordMovement) -> Result<Vec<StockChange>, LedgerError> {
        if cmd.product_id != self.product_id {
            return Err(LedgerError::invariant("product_id mismatch"));
        }
        if cmd.quantity == 0 {
            return Err(LedgerError::InvalidQuantity(0));
        }

        match cmd.movement_type {
            MovementType::Inbound => {
                self.current_stock
                    .checked_add(cmd.signed_quantity())
                    .ok_or_else(|| LedgerError::validation("stock would overflow"))?;
            }
            MovementType::Outbound => {
                let available = u64::try_from(self.current_stock).unwrap_or(0);
                if cmd.quantity > available {
                    return Err(LedgerError::InsufficientStock {
                        product_id: self.product_id,
                        available: self.current_stock,
                        requested: cmd.quantity,
                    });
                }
            }
        }

        Ok(vec![cmd.change()])
    }
}

impl AggregateRoot for ProductBalance {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.product_id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for ProductBalance {
    type Command = RecordMovement;
    type Event = StockChange;
    type Error = LedgerError;

    fn apply(&mut self, event: &Self::Event) {
        self.current_stock += event.delta;
        self.last_movement_at = Some(self.next_timestamp(event.occurred_at));

        // Deterministic version tracking: +1 per applied movement.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        self.handle_record(command)
    }
}
