//! Event publishing/subscription abstraction (mechanics only).
//!
//! Committed ledger facts are published here **after** the commit that produced them. The
//! ledger store is the source of truth; the bus is for distribution only:
//!
//! - **Transport-agnostic**: in-memory channels today, a broker later
//! - **At-least-once acceptable**: consumers must be idempotent (use the envelope's
//!   per-product `sequence_number`)
//! - **No persistence**: a lost message can always be re-derived from the ledger

use std::sync::Arc;
use std::sync::mpsc::Receiver;

/// A subscription to an event stream (broadcast semantics).
///
/// Designed for single-threaded consumption; messages arrive in publication order.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Drain every message that is already queued.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

/// Pub/sub abstraction.
///
/// `publish()` can fail; the ledger engine logs such failures and keeps the committed
/// movement, since the ledger itself remains authoritative.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
