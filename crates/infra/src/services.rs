//! Wiring: one store shared by the engine (writes) and the query service (reads).

use std::sync::Arc;

use stock_ledger_core::Clock;
use stock_ledger_events::InMemoryEventBus;

use crate::config::LedgerConfig;
use crate::engine::{LedgerEngine, LedgerEnvelope};
use crate::ledger_store::{InMemoryLedgerStore, LedgerStore};
use crate::query::QueryService;

#[derive(Debug)]
pub struct LedgerServices<S, B> {
    pub engine: LedgerEngine<Arc<S>, B>,
    pub queries: QueryService<Arc<S>>,
    pub bus: B,
}

pub type InMemoryLedger = LedgerServices<InMemoryLedgerStore, Arc<InMemoryEventBus<LedgerEnvelope>>>;

impl<S, B> LedgerServices<S, B>
where
    S: LedgerStore,
    B: Clone,
{
    pub fn new(store: S, bus: B, clock: Arc<dyn Clock>, config: LedgerConfig) -> Self {
        let store = Arc::new(store);
        Self {
            engine: LedgerEngine::new(store.clone(), bus.clone(), clock.clone(), config.clone()),
            queries: QueryService::new(store, clock, config),
            bus,
        }
    }
}

/// In-memory infra wiring (dev/test): store + bus + engine + queries.
pub fn build_in_memory(config: LedgerConfig, clock: Arc<dyn Clock>) -> InMemoryLedger {
    LedgerServices::new(
        InMemoryLedgerStore::new(),
        Arc::new(InMemoryEventBus::new()),
        clock,
        config,
    )
}
