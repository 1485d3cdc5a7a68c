//! Facts published after a commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stock_ledger_core::ProductId;
use stock_ledger_events::Event;

use crate::balance::ProductBalance;
use crate::movement::MovementRecord;

/// Replenishment signal payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAlert {
    pub product_id: ProductId,
    pub current_stock: i64,
    pub minimum_stock: i64,
    pub suggested_reorder: i64,
    pub occurred_at: DateTime<Utc>,
}

impl StockAlert {
    fn from_balance(balance: &ProductBalance, occurred_at: DateTime<Utc>) -> Self {
        Self {
            product_id: balance.product_id(),
            current_stock: balance.current_stock(),
            minimum_stock: balance.minimum_stock(),
            suggested_reorder: balance.suggested_reorder(),
            occurred_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum LedgerEvent {
    MovementRecorded(MovementRecord),
    LowStockReached(StockAlert),
    LowStockCleared(StockAlert),
}

impl LedgerEvent {
    /// Low-stock membership change between two states of the same product, if any.
    pub fn low_stock_transition(
        before: &ProductBalance,
        after: &ProductBalance,
        occurred_at: DateTime<Utc>,
    ) -> Option<LedgerEvent> {
        match (before.is_low_stock(), after.is_low_stock()) {
            (false, true) => Some(LedgerEvent::LowStockReached(StockAlert::from_balance(
                after,
                occurred_at,
            ))),
            (true, false) => Some(LedgerEvent::LowStockCleared(StockAlert::from_balance(
                after,
                occurred_at,
            ))),
            _ => None,
        }
    }

    pub fn product_id(&self) -> ProductId {
        match self {
            LedgerEvent::MovementRecorded(r) => r.product_id,
            LedgerEvent::LowStockReached(a) | LedgerEvent::LowStockCleared(a) => a.product_id,
        }
    }
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::MovementRecorded(_) => "stock.movement.recorded",
            LedgerEvent::LowStockReached(_) => "stock.low_stock.reached",
            LedgerEvent::LowStockCleared(_) => "stock.low_stock.cleared",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::MovementRecorded(r) => r.created_at,
            LedgerEvent::LowStockReached(a) | LedgerEvent::LowStockCleared(a) => a.occurred_at,
        }
    }
}
