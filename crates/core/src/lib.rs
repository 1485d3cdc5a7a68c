//! `stock-ledger-core` — foundation building blocks for the stock ledger.
//!
//! This crate contains **pure** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod clock;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{LedgerError, LedgerResult};
pub use id::{ActorId, ProductId};
