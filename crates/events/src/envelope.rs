use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stock_ledger_core::ProductId;

use crate::Event;

/// Envelope for a published ledger event, carrying stream metadata.
///
/// - The stream is one product's ledger (`product_id`).
/// - `sequence_number` is the product's balance version after the movement that produced
///   the event, so consumers can drop duplicates and detect gaps per product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    product_id: ProductId,
    event_type: String,

    /// Monotonically increasing position in the product stream.
    sequence_number: u64,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        product_id: ProductId,
        event_type: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            product_id,
            event_type: event_type.into(),
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl<E: Event> EventEnvelope<E> {
    /// Wrap a typed event, taking its type name from the `Event` contract.
    pub fn wrap(product_id: ProductId, sequence_number: u64, payload: E) -> Self {
        Self::new(
            Uuid::now_v7(),
            product_id,
            payload.event_type(),
            sequence_number,
            payload,
        )
    }
}
