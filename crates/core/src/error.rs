//! Ledger error model.

use thiserror::Error;

use crate::id::ProductId;

/// Result type used across the ledger.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger-level error.
///
/// Every variant except `Storage` describes a caller-correctable request: it is reported
/// synchronously, leaves no partial effect and is never retried by the engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Movement quantity was zero or negative.
    #[error("invalid quantity {0}: movement quantity must be a positive integer")]
    InvalidQuantity(i64),

    /// Movement reason was empty or whitespace only.
    #[error("movement reason is required")]
    MissingReason,

    /// Applying the outbound movement would drive stock below zero.
    #[error("insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        available: i64,
        requested: u64,
    },

    /// The product has never been observed by the ledger.
    #[error("product {0} not found")]
    NotFound(ProductId),

    /// A concurrent update was detected (stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A value failed validation (e.g. negative thresholds).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A ledger invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The durability layer failed; nothing was committed.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Stable machine-readable code (used in logs and CLI output).
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidQuantity(_) => "invalid_quantity",
            LedgerError::MissingReason => "missing_reason",
            LedgerError::InsufficientStock { .. } => "insufficient_stock",
            LedgerError::NotFound(_) => "not_found",
            LedgerError::Conflict(_) => "conflict",
            LedgerError::Validation(_) => "validation",
            LedgerError::InvariantViolation(_) => "invariant_violation",
            LedgerError::InvalidId(_) => "invalid_id",
            LedgerError::Storage(_) => "storage",
        }
    }
}
