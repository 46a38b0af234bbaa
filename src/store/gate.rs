use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use super::StoreError;

/// Single-writer gate owned by a lock store.
///
/// At most one [`GateGuard`] exists at a time. Waiters block on a `Condvar`
/// until the holder drops its guard.
#[derive(Debug, Default)]
pub struct TransactionGate {
    held: Mutex<bool>,
    wake: Condvar,
}

impl TransactionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the gate is free, then hold it.
    pub fn acquire(&self) -> Result<GateGuard<'_>, StoreError> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| StoreError::Poisoned("gate acquire"))?;
        while *held {
            held = self
                .wake
                .wait(held)
                .map_err(|_| StoreError::Poisoned("gate wait"))?;
        }
        *held = true;
        Ok(GateGuard { gate: self })
    }

    /// Hold the gate if it is free right now.
    pub fn try_acquire(&self) -> Result<Option<GateGuard<'_>>, StoreError> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| StoreError::Poisoned("gate try_acquire"))?;
        if *held {
            Ok(None)
        } else {
            *held = true;
            Ok(Some(GateGuard { gate: self }))
        }
    }

    /// Wait at most `timeout` for the gate. `Ok(None)` means the wait was given
    /// up and nothing was acquired.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<Option<GateGuard<'_>>, StoreError> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.acquire().map(Some);
        };
        let mut held = self
            .held
            .lock()
            .map_err(|_| StoreError::Poisoned("gate acquire"))?;
        while *held {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            held = self
                .wake
                .wait_timeout(held, remaining)
                .map_err(|_| StoreError::Poisoned("gate wait"))?
                .0;
        }
        *held = true;
        Ok(Some(GateGuard { gate: self }))
    }

    pub fn is_held(&self) -> bool {
        self.held.lock().map(|held| *held).unwrap_or(true)
    }

    fn release(&self) {
        let mut held = match self.held.lock() {
            Ok(held) => held,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *held {
            *held = false;
            self.wake.notify_one();
        }
    }
}

/// Proof of holding a [`TransactionGate`]; releases it on drop.
#[derive(Debug)]
pub struct GateGuard<'a> {
    gate: &'a TransactionGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}
