//! Infrastructure layer: ledger stores, the write engine, queries and configuration.

pub mod config;
pub mod engine;
pub mod gate;
pub mod ledger_store;
pub mod query;
pub mod services;

mod integration_tests;

pub use config::{ConfigError, LedgerConfig};
pub use engine::{LedgerEngine, LedgerEnvelope, MAX_COMMIT_ATTEMPTS};
pub use gate::{GateTurn, ProductGate, ProductGates, ProductTurn};
pub use ledger_store::{
    CommittedMovement, InMemoryLedgerStore, LedgerStore, LedgerStoreError, ProductSnapshot,
};
#[cfg(feature = "postgres")]
pub use ledger_store::PostgresLedgerStore;
pub use query::{BalanceDiscrepancy, QueryService, StockReport, TimeRange};
pub use services::{InMemoryLedger, LedgerServices, build_in_memory};
