use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Mutex, PoisonError};

use crate::active_lock::ActiveLock;
use crate::store::{LockTransaction, StoreError};

/// A committed change to the set of active locks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockEvent {
    Acquired(ActiveLock),
    Refreshed(ActiveLock),
    Released(ActiveLock),
    Expired(ActiveLock),
}

impl LockEvent {
    pub fn lock(&self) -> &ActiveLock {
        match self {
            LockEvent::Acquired(lock)
            | LockEvent::Refreshed(lock)
            | LockEvent::Released(lock)
            | LockEvent::Expired(lock) => lock,
        }
    }
}

/// Fan-out of lock events to channel subscribers.
#[derive(Debug, Default)]
pub(crate) struct EventHub {
    subscribers: Mutex<Vec<Sender<LockEvent>>>,
}

impl EventHub {
    pub(crate) fn subscribe(&self) -> Receiver<LockEvent> {
        let (tx, rx) = channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Commit `tx`, then deliver `events` in order.
    ///
    /// The subscriber list stays locked from before the commit until delivery
    /// ends, so the next transaction's events cannot overtake these. Nothing is
    /// delivered if the commit fails. Subscribers whose receiver is gone are
    /// dropped.
    pub(crate) fn commit<T: LockTransaction>(
        &self,
        tx: T,
        events: Vec<LockEvent>,
    ) -> Result<(), StoreError> {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        tx.commit()?;
        if !events.is_empty() {
            subscribers.retain(|sender| events.iter().all(|event| sender.send(event.clone()).is_ok()));
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
