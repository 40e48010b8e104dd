//! Event publishing/subscription abstraction.
//!
//! The bus distributes committed events to consumers (live query views,
//! notification/reporting listeners). It is not storage: the event store is
//! the source of truth and events are published only after a successful append.
//!
//! Delivery is at-least-once and fan-out: every subscription gets a copy of
//! every published message. Consumers must tolerate duplicates.

use std::sync::{Arc, Weak};
use std::sync::mpsc::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// A subscription to a message stream.
///
/// Dropping the subscription cancels it: the publisher notices the closed
/// channel on its next send and stops delivering to it. Other subscriptions
/// are unaffected.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
    alive: Arc<()>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self {
            receiver,
            alive: Arc::new(()),
        }
    }

    /// Lets the publisher notice a dropped subscription without sending to it.
    pub fn liveness(&self) -> Liveness {
        Liveness(Arc::downgrade(&self.alive))
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

    /// Drain everything currently queued, returning the most recent message.
    pub fn latest(&self) -> Option<M> {
        let mut last = None;
        while let Ok(m) = self.receiver.try_recv() {
            last = Some(m);
        }
        last
    }
}

/// Publisher-side view of whether a [`Subscription`] still exists.
#[derive(Debug, Clone)]
pub struct Liveness(Weak<()>);

impl Liveness {
    pub fn is_cancelled(&self) -> bool {
        self.0.strong_count() == 0
    }
}

/// Pub/sub contract. Implementations must be safe to share across threads.
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
