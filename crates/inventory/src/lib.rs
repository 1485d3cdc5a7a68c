//! Stock ledger domain (pure).
//!
//! Movement model, the per-product balance aggregate and the facts published after a
//! commit. Business rules only: no IO, no storage, no clocks.

pub mod balance;
pub mod events;
pub mod movement;

pub use balance::{ProductBalance, StockChange, StockTerms};
pub use events::{LedgerEvent, StockAlert};
pub use movement::{
    MovementFilter, MovementId, MovementRecord, MovementRequest, MovementType, RecordMovement,
    sort_history,
};
