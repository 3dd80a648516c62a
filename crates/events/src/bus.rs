//! Publish/subscribe abstraction (mechanics only).
//!
//! The bus distributes records **after** they are stored; the event log stays the
//! source of truth. Two uses in the ledger:
//!
//! - the ledger mirror (committed events, per-batch order preserved by the publisher)
//! - telemetry ingestion (sensor readings delivered by a broker, any order)
//!
//! Delivery is at-least-once and consumers must be idempotent.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// A subscription to a bus. Each subscription receives a copy of every message
/// published after it was created.
///
/// ```ignore
/// let subscription = bus.subscribe();
/// loop {
///     match subscription.recv_timeout(Duration::from_secs(1)) {
///         Ok(message) => handle(message),
///         Err(RecvTimeoutError::Timeout) => continue,
///         Err(RecvTimeoutError::Disconnected) => break,
///     }
/// }
/// ```
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Transport-agnostic pub/sub bus with broadcast semantics.
///
/// `publish()` may fail (lock poisoned, broker down); callers decide whether that
/// matters. The ledger mirror treats it as fire-and-forget.
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
