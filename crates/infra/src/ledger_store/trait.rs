use std::sync::Arc;

use thiserror::Error;

use stock_ledger_core::{ExpectedVersion, LedgerError, ProductId};
use stock_ledger_inventory::{
    MovementFilter, MovementRecord, ProductBalance, RecordMovement, StockTerms,
};

/// A movement the store has made durable, together with the balance it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedMovement {
    pub record: MovementRecord,
    pub balance: ProductBalance,
}

/// A balance and the history it was folded from, read at one consistent point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSnapshot {
    pub balance: ProductBalance,
    pub history: Vec<MovementRecord>,
}

/// Ledger store operation error.
///
/// These are **infrastructure errors** (storage, concurrency) as opposed to ledger rule
/// violations, which the engine rejects before anything reaches the store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerStoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("product {0} not found")]
    NotFound(ProductId),

    #[error("product {0} has movement history")]
    HasHistory(ProductId),

    /// A commit would break a ledger invariant, or stored rows could not be decoded.
    #[error("corrupt ledger state: {0}")]
    Corrupt(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl From<LedgerStoreError> for LedgerError {
    fn from(err: LedgerStoreError) -> Self {
        match err {
            LedgerStoreError::Concurrency(msg) => LedgerError::Conflict(msg),
            LedgerStoreError::NotFound(product_id) => LedgerError::NotFound(product_id),
            LedgerStoreError::HasHistory(product_id) => LedgerError::Conflict(format!(
                "product {product_id} has movement history and cannot be removed"
            )),
            LedgerStoreError::Corrupt(msg) | LedgerStoreError::Backend(msg) => {
                LedgerError::Storage(msg)
            }
        }
    }
}

/// Durable home of balances and the append-only movement log.
///
/// ## Commit Semantics
///
/// `commit()` is the single write path for movements. It must, atomically:
/// - check `expected` against the product's current balance version
/// - apply the movement's change to the balance
/// - assign the next `MovementId` (strictly increasing, never reused)
/// - append the record and persist the updated balance
///
/// Either both the record and the balance are durable afterwards, or neither is.
///
/// ## Read Semantics
///
/// Reads never block on an in-flight commit for another product and never observe a
/// half-applied commit. `movements()` returns records in history order.
pub trait LedgerStore: Send + Sync {
    fn load_balance(&self, product_id: ProductId) -> Result<Option<ProductBalance>, LedgerStoreError>;

    fn commit(
        &self,
        movement: RecordMovement,
        expected: ExpectedVersion,
    ) -> Result<CommittedMovement, LedgerStoreError>;

    /// Create the product's balance if absent, otherwise replace its terms only.
    fn upsert_terms(
        &self,
        product_id: ProductId,
        terms: StockTerms,
    ) -> Result<ProductBalance, LedgerStoreError>;

    /// Forget a product that never moved. Fails with `HasHistory` otherwise.
    fn remove(&self, product_id: ProductId) -> Result<(), LedgerStoreError>;

    fn list_balances(&self) -> Result<Vec<ProductBalance>, LedgerStoreError>;

    fn movements(&self, filter: &MovementFilter) -> Result<Vec<MovementRecord>, LedgerStoreError>;

    fn snapshot(&self, product_id: ProductId) -> Result<Option<ProductSnapshot>, LedgerStoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn load_balance(&self, product_id: ProductId) -> Result<Option<ProductBalance>, LedgerStoreError> {
        (**self).load_balance(product_id)
    }

    fn commit(
        &self,
        movement: RecordMovement,
        expected: ExpectedVersion,
    ) -> Result<CommittedMovement, LedgerStoreError> {
        (**self).commit(movement, expected)
    }

    fn upsert_terms(
        &self,
        product_id: ProductId,
        terms: StockTerms,
    ) -> Result<ProductBalance, LedgerStoreError> {
        (**self).upsert_terms(product_id, terms)
    }

    fn remove(&self, product_id: ProductId) -> Result<(), LedgerStoreError> {
        (**self).remove(product_id)
    }

    fn list_balances(&self) -> Result<Vec<ProductBalance>, LedgerStoreError> {
        (**self).list_balances()
    }

    fn movements(&self, filter: &MovementFilter) -> Result<Vec<MovementRecord>, LedgerStoreError> {
        (**self).movements(filter)
    }

    fn snapshot(&self, product_id: ProductId) -> Result<Option<ProductSnapshot>, LedgerStoreError> {
        (**self).snapshot(product_id)
    }
}
