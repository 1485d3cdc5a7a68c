//! Ledger persistence boundary.
//!
//! A store owns two things per product: the materialized balance and the append-only
//! movement log it was folded from. Both change together or not at all.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresLedgerStore;
pub use r#trait::{CommittedMovement, LedgerStore, LedgerStoreError, ProductSnapshot};
