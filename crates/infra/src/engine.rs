//! Movement execution pipeline.
//!
//! ```text
//! MovementRequest
//!   ↓
//! 0. Stateless checks (quantity, reason); rejected requests never take a ticket
//!   ↓
//! 1. Take the product's gate ticket (acceptance point; FIFO per product)
//!   ↓
//! 2. Load the committed balance (or start empty / NotFound in strict catalog mode)
//!   ↓
//! 3. Decide: `ProductBalance::handle` (pure; InsufficientStock leaves no trace)
//!   ↓
//! 4. Commit balance + record atomically, guarded by ExpectedVersion::Exact
//!    (on Conflict: back to 2, up to MAX_COMMIT_ATTEMPTS)
//!   ↓
//! 5. Publish LedgerEvents (best-effort, still inside the gate so per-product order holds)
//! ```

use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use stock_ledger_core::{
    ActorId, Aggregate, AggregateRoot, Clock, ExpectedVersion, LedgerError, LedgerResult,
    ProductId,
};
use stock_ledger_events::{Event, EventBus, EventEnvelope};
use stock_ledger_inventory::{LedgerEvent, MovementRecord, MovementRequest, ProductBalance, StockTerms};

use crate::config::LedgerConfig;
use crate::gate::ProductGates;
use crate::ledger_store::{CommittedMovement, LedgerStore};

/// Attempts per movement before a version conflict reaches the caller.
pub const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Envelope type carried on the ledger's event bus.
pub type LedgerEnvelope = EventEnvelope<LedgerEvent>;

/// The only writer of balances and movement history.
///
/// ## Generic Parameters
///
/// - `S`: ledger store (`InMemoryLedgerStore`, `PostgresLedgerStore`, or a shared `Arc`)
/// - `B`: event bus receiving `LedgerEnvelope`s after each commit
#[derive(Debug)]
pub struct LedgerEngine<S, B> {
    store: S,
    bus: B,
    clock: Arc<dyn Clock>,
    gates: ProductGates,
    config: LedgerConfig,
}

impl<S, B> LedgerEngine<S, B> {
    pub fn new(store: S, bus: B, clock: Arc<dyn Clock>, config: LedgerConfig) -> Self {
        Self {
            store,
            bus,
            clock,
            gates: ProductGates::new(),
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn gates(&self) -> &ProductGates {
        &self.gates
    }
}

impl<S, B> LedgerEngine<S, B>
where
    S: LedgerStore,
    B: EventBus<LedgerEnvelope>,
{
    /// Apply one movement and return its record.
    ///
    /// On any error nothing is committed and no event is published.
    #[instrument(
        skip(self, request),
        fields(
            product_id = %request.product_id,
            movement_type = %request.movement_type,
            quantity = request.quantity,
            actor = %actor,
        )
    )]
    pub fn apply(&self, request: MovementRequest, actor: ActorId) -> LedgerResult<MovementRecord> {
        if let Err(err) = request.check() {
            warn!(code = err.code(), error = %err, "movement rejected");
            return Err(err);
        }

        let turn = self.gates.enter(request.product_id);
        debug!(ticket = turn.ticket(), "product gate acquired");

        let result = self.apply_in_turn(&request, actor);
        drop(turn);

        match &result {
            Ok(record) => info!(
                movement_id = %record.id,
                resulting_stock = record.resulting_stock,
                "movement recorded"
            ),
            Err(err @ (LedgerError::Storage(_) | LedgerError::Conflict(_))) => {
                error!(code = err.code(), error = %err, "movement failed")
            }
            Err(err) => warn!(code = err.code(), error = %err, "movement rejected"),
        }

        result
    }

    // The gate only serializes writers inside this process. A store shared with other
    // processes (Postgres) can still move the balance between load and commit; those
    // conflicts are re-decided against the fresh balance a bounded number of times.
    fn apply_in_turn(&self, request: &MovementRequest, actor: ActorId) -> LedgerResult<MovementRecord> {
        let mut attempt = 1;
        loop {
            match self.decide_and_commit(request, actor) {
                Err(LedgerError::Conflict(reason)) if attempt < MAX_COMMIT_ATTEMPTS => {
                    warn!(attempt, reason = %reason, "balance moved before commit, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    fn decide_and_commit(
        &self,
        request: &MovementRequest,
        actor: ActorId,
    ) -> LedgerResult<MovementRecord> {
        let product_id = request.product_id;
        let before = match self.store.load_balance(product_id)? {
            Some(balance) => balance,
            None if self.config.strict_catalog => return Err(LedgerError::NotFound(product_id)),
            None => ProductBalance::empty(product_id),
        };

        let accepted_at = before.next_timestamp(self.clock.now());
        let command = request.validate(actor, accepted_at)?;

        // Decide against the committed balance; the store applies the same change.
        let decided = before.handle(&command)?;
        debug_assert_eq!(decided.len(), 1);

        let committed = self
            .store
            .commit(command, ExpectedVersion::Exact(before.version()))?;

        self.publish_commit(&before, &committed);
        Ok(committed.record)
    }

    /// Register or update a product's thresholds and purchase cost.
    ///
    /// Stock and history are untouched. Inverted bounds (`maximum < minimum`) are accepted
    /// with a warning.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub fn configure_product(
        &self,
        product_id: ProductId,
        terms: StockTerms,
    ) -> LedgerResult<ProductBalance> {
        if let Err(err) = terms.validate() {
            warn!(code = err.code(), error = %err, "product terms rejected");
            return Err(err);
        }
        if terms.has_inverted_bounds() {
            warn!(
                minimum_stock = terms.minimum_stock,
                maximum_stock = terms.maximum_stock,
                "maximum_stock is below minimum_stock"
            );
        }

        let _turn = self.gates.enter(product_id);

        let before = self
            .store
            .load_balance(product_id)?
            .unwrap_or_else(|| ProductBalance::empty(product_id));
        let after = self.store.upsert_terms(product_id, terms)?;

        if let Some(event) = LedgerEvent::low_stock_transition(&before, &after, self.clock.now()) {
            self.publish(product_id, after.version(), event);
        }

        info!(
            minimum_stock = after.minimum_stock(),
            maximum_stock = after.maximum_stock(),
            purchase_cost = after.purchase_cost(),
            "product terms configured"
        );
        Ok(after)
    }

    /// Forget a product. Only products that never moved can be removed.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub fn remove_product(&self, product_id: ProductId) -> LedgerResult<()> {
        let _turn = self.gates.enter(product_id);

        match self.store.remove(product_id) {
            Ok(()) => {
                info!("product removed");
                Ok(())
            }
            Err(err) => {
                let err = LedgerError::from(err);
                warn!(code = err.code(), error = %err, "product removal rejected");
                Err(err)
            }
        }
    }

    fn publish_commit(&self, before: &ProductBalance, committed: &CommittedMovement) {
        let product_id = committed.balance.product_id();
        let sequence = committed.balance.version();

        self.publish(
            product_id,
            sequence,
            LedgerEvent::MovementRecorded(committed.record.clone()),
        );

        if let Some(event) =
            LedgerEvent::low_stock_transition(before, &committed.balance, committed.record.created_at)
        {
            self.publish(product_id, sequence, event);
        }
    }

    // The ledger is authoritative; a failed publish never fails the operation.
    fn publish(&self, product_id: ProductId, sequence: u64, event: LedgerEvent) {
        let event_type = event.event_type();
        let schema_version = event.version();
        let envelope = EventEnvelope::wrap(product_id, sequence, event);
        let event_id = envelope.event_id();

        match self.bus.publish(envelope) {
            Ok(()) => debug!(%event_id, event_type, schema_version, sequence, "ledger event published"),
            Err(err) => warn!(
                product_id = %product_id,
                %event_id,
                event_type,
                error = ?err,
                "ledger event publication failed"
            ),
        }
    }
}
