//! Per-product write serialization.
//!
//! Each product has a FIFO ticket gate: taking a ticket is the point at which the engine
//! accepts a request, and tickets are served strictly in the order they were taken. Gates
//! for different products are independent, so unrelated products never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};

use stock_ledger_core::ProductId;

#[derive(Debug, Default)]
struct TicketState {
    next_ticket: u64,
    now_serving: u64,
}

/// FIFO critical section for one product.
#[derive(Debug, Default)]
pub struct ProductGate {
    state: Mutex<TicketState>,
    turn: Condvar,
}

impl ProductGate {
    pub fn new() -> Self {
        Self::default()
    }

    // The mutex only guards two counters and no code panics while holding it, so a
    // poisoned lock still holds consistent state.
    fn state(&self) -> MutexGuard<'_, TicketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a ticket and block until it is served.
    pub fn enter(&self) -> GateTurn<'_> {
        let ticket = self.wait_turn();
        GateTurn { gate: self, ticket }
    }

    fn wait_turn(&self) -> u64 {
        let mut state = self.state();
        let ticket = state.next_ticket;
        state.next_ticket += 1;

        while state.now_serving != ticket {
            state = self.turn.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        ticket
    }

    fn release(&self) {
        let mut state = self.state();
        state.now_serving += 1;
        drop(state);
        self.turn.notify_all();
    }

    /// Tickets taken but not yet released (the holder included).
    pub fn occupancy(&self) -> u64 {
        let state = self.state();
        state.next_ticket - state.now_serving
    }
}

/// Exclusive turn on a product gate; released on drop (including during unwinding).
#[derive(Debug)]
pub struct GateTurn<'a> {
    gate: &'a ProductGate,
    ticket: u64,
}

impl GateTurn<'_> {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }
}

impl Drop for GateTurn<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}

/// Gates keyed by product, created on first use and dropped again once idle.
#[derive(Debug, Default)]
pub struct ProductGates {
    gates: RwLock<HashMap<ProductId, Arc<ProductGate>>>,
}

impl ProductGates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gate(&self, product_id: ProductId) -> Arc<ProductGate> {
        {
            let gates = self.gates.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(gate) = gates.get(&product_id) {
                return gate.clone();
            }
        }

        let mut gates = self.gates.write().unwrap_or_else(PoisonError::into_inner);
        gates.entry(product_id).or_default().clone()
    }

    /// Take a ticket on `product_id`'s gate and block until it is served.
    ///
    /// When the turn ends and nobody else holds or waits on the gate, the entry is evicted,
    /// so products that are rejected or removed do not keep a gate alive.
    pub fn enter(&self, product_id: ProductId) -> ProductTurn<'_> {
        let gate = self.gate(product_id);
        let ticket = gate.wait_turn();
        ProductTurn {
            gates: self,
            product_id,
            gate: Some(gate),
            ticket,
        }
    }

    /// Number of products that currently have a gate.
    pub fn len(&self) -> usize {
        self.gates.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Turns drop their handle while holding the write lock, so the last turn to leave sees
    // the map's handle as the only one left.
    fn leave(&self, product_id: ProductId, gate: Arc<ProductGate>) {
        let mut gates = self.gates.write().unwrap_or_else(PoisonError::into_inner);
        let ours = Arc::as_ptr(&gate);
        drop(gate);

        let idle = gates.get(&product_id).is_some_and(|current| {
            std::ptr::eq(Arc::as_ptr(current), ours)
                && Arc::strong_count(current) == 1
                && current.occupancy() == 0
        });
        if idle {
            gates.remove(&product_id);
        }
    }
}

/// Exclusive turn on a product, obtained through [`ProductGates::enter`].
#[derive(Debug)]
pub struct ProductTurn<'a> {
    gates: &'a ProductGates,
    product_id: ProductId,
    gate: Option<Arc<ProductGate>>,
    ticket: u64,
}

impl ProductTurn<'_> {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }
}

impl Drop for ProductTurn<'_> {
    fn drop(&mut self) {
        if let Some(gate) = self.gate.take() {
            gate.release();
            self.gates.leave(self.product_id, gate);
        }
    }
}
