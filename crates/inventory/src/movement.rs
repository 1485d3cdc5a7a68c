//! Movement model: wire requests, validated commands and immutable records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stock_ledger_core::{ActorId, LedgerError, LedgerResult, ProductId};

use crate::balance::StockChange;

/// Ledger-assigned movement identifier.
///
/// Strictly increasing in acceptance order and never reused.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementId(pub u64);

impl core::fmt::Display for MovementId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Direction of a movement. The sign lives here, never in the quantity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementType {
    #[serde(rename = "entrada", alias = "inbound")]
    Inbound,
    #[serde(rename = "saida", alias = "outbound")]
    Outbound,
}

impl MovementType {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::Inbound => "entrada",
            MovementType::Outbound => "saida",
        }
    }

    /// Apply the direction to a positive quantity.
    pub fn signed(self, quantity: u64) -> i64 {
        let magnitude = i64::try_from(quantity).unwrap_or(i64::MAX);
        match self {
            MovementType::Inbound => magnitude,
            MovementType::Outbound => -magnitude,
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for MovementType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entrada" | "inbound" => Ok(MovementType::Inbound),
            "saida" | "outbound" => Ok(MovementType::Outbound),
            other => Err(LedgerError::validation(format!("unknown movement type '{other}'"))),
        }
    }
}

/// Movement submission as received from a caller (wire shape).
///
/// `quantity` is signed on the wire so that zero and negative values reach validation and
/// are rejected with `InvalidQuantity` instead of failing to parse. A missing `reason`
/// deserializes as empty and is rejected with `MissingReason`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRequest {
    pub product_id: ProductId,
    pub movement_type: MovementType,
    pub quantity: i64,
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<NaiveDate>,
}

impl MovementRequest {
    pub fn new(
        product_id: ProductId,
        movement_type: MovementType,
        quantity: i64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            product_id,
            movement_type,
            quantity,
            reason: reason.into(),
            notes: None,
            batch: None,
            expiry_date: None,
        }
    }

    pub fn inbound(product_id: ProductId, quantity: i64, reason: impl Into<String>) -> Self {
        Self::new(product_id, MovementType::Inbound, quantity, reason)
    }

    pub fn outbound(product_id: ProductId, quantity: i64, reason: impl Into<String>) -> Self {
        Self::new(product_id, MovementType::Outbound, quantity, reason)
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_batch(mut self, batch: impl Into<String>, expiry_date: Option<NaiveDate>) -> Self {
        self.batch = Some(batch.into());
        self.expiry_date = expiry_date;
        self
    }

    /// Stateless validation (quantity and reason).
    pub fn check(&self) -> LedgerResult<()> {
        if self.quantity <= 0 {
            return Err(LedgerError::InvalidQuantity(self.quantity));
        }
        if self.reason.trim().is_empty() {
            return Err(LedgerError::MissingReason);
        }
        Ok(())
    }

    /// Validate and turn into a command stamped with the acceptance time.
    pub fn validate(&self, actor: ActorId, accepted_at: DateTime<Utc>) -> LedgerResult<RecordMovement> {
        self.check()?;

        Ok(RecordMovement {
            product_id: self.product_id,
            movement_type: self.movement_type,
            quantity: self.quantity.unsigned_abs(),
            reason: self.reason.trim().to_string(),
            notes: non_blank(self.notes.as_deref()),
            batch: non_blank(self.batch.as_deref()),
            expiry_date: self.expiry_date,
            actor,
            accepted_at,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Command: record a validated movement against one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub product_id: ProductId,
    pub movement_type: MovementType,
    pub quantity: u64,
    pub reason: String,
    pub notes: Option<String>,
    pub batch: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub actor: ActorId,
    pub accepted_at: DateTime<Utc>,
}

impl RecordMovement {
    pub fn signed_quantity(&self) -> i64 {
        self.movement_type.signed(self.quantity)
    }

    /// The balance change this movement causes.
    pub fn change(&self) -> StockChange {
        StockChange {
            product_id: self.product_id,
            delta: self.signed_quantity(),
            occurred_at: self.accepted_at,
        }
    }

    /// Seal into an immutable record once the store has assigned an id.
    pub fn into_record(self, id: MovementId, resulting_stock: i64) -> MovementRecord {
        MovementRecord {
            id,
            product_id: self.product_id,
            movement_type: self.movement_type,
            quantity: self.quantity,
            reason: self.reason,
            notes: self.notes,
            batch: self.batch,
            expiry_date: self.expiry_date,
            actor: self.actor,
            created_at: self.accepted_at,
            resulting_stock,
        }
    }
}

/// An applied movement. Immutable once appended; corrections are compensating movements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub id: MovementId,
    pub product_id: ProductId,
    pub movement_type: MovementType,
    pub quantity: u64,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<NaiveDate>,
    pub actor: ActorId,
    pub created_at: DateTime<Utc>,
    /// Product balance immediately after this movement.
    pub resulting_stock: i64,
}

impl MovementRecord {
    pub fn signed_quantity(&self) -> i64 {
        self.movement_type.signed(self.quantity)
    }

    pub fn change(&self) -> StockChange {
        StockChange {
            product_id: self.product_id,
            delta: self.signed_quantity(),
            occurred_at: self.created_at,
        }
    }

    /// History ordering key: `created_at`, then `id`.
    pub fn ordering_key(&self) -> (DateTime<Utc>, MovementId) {
        (self.created_at, self.id)
    }
}

/// Sort movements into history order (`created_at` ascending, `id` as tie-break).
pub fn sort_history(records: &mut [MovementRecord]) {
    records.sort_by_key(MovementRecord::ordering_key);
}

/// Movement history filter. `start`/`end` form the half-open range `[start, end)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
    #[serde(default)]
    pub product_id: Option<ProductId>,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub movement_type: Option<MovementType>,
}

impl MovementFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_product(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
            ..Self::default()
        }
    }

    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn of_type(mut self, movement_type: MovementType) -> Self {
        self.movement_type = Some(movement_type);
        self
    }

    pub fn matches(&self, record: &MovementRecord) -> bool {
        if self.product_id.is_some_and(|p| p != record.product_id) {
            return false;
        }
        if self.movement_type.is_some_and(|t| t != record.movement_type) {
            return false;
        }
        if self.start.is_some_and(|start| record.created_at < start) {
            return false;
        }
        if self.end.is_some_and(|end| record.created_at >= end) {
            return false;
        }
        true
    }
}
