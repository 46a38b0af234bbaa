//! InMemoryLockStore - copy-on-write lock store for single-process servers and tests.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use super::gate::{GateGuard, TransactionGate};
use super::{LockStore, LockTransaction, StoreError};
use crate::active_lock::ActiveLock;

type LockMap = HashMap<String, ActiveLock>;

#[derive(Debug, Default)]
struct Committed {
    generation: u64,
    locks: Arc<LockMap>,
}

#[derive(Debug, Default)]
struct Inner {
    gate: TransactionGate,
    committed: RwLock<Committed>,
}

/// In-memory lock store.
///
/// The committed state is an immutable map behind an `Arc`. A transaction
/// starts from that map and copies it on its first write; `commit` swaps the
/// new map in. Clone-friendly: clones share the same state and gate.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLockStore {
    inner: Arc<Inner>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of commits so far.
    pub fn generation(&self) -> Result<u64, StoreError> {
        let committed = self
            .inner
            .committed
            .read()
            .map_err(|_| StoreError::Poisoned("generation read"))?;
        Ok(committed.generation)
    }

    fn open<'a>(&'a self, guard: GateGuard<'a>) -> Result<InMemoryTransaction<'a>, StoreError> {
        let committed = self
            .inner
            .committed
            .read()
            .map_err(|_| StoreError::Poisoned("begin"))?;
        Ok(InMemoryTransaction {
            store: &self.inner,
            locks: Arc::clone(&committed.locks),
            _guard: guard,
        })
    }
}

impl LockStore for InMemoryLockStore {
    type Transaction<'a> = InMemoryTransaction<'a>;

    fn begin(&self) -> Result<InMemoryTransaction<'_>, StoreError> {
        let guard = self.inner.gate.acquire()?;
        self.open(guard)
    }

    fn begin_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Option<InMemoryTransaction<'_>>, StoreError> {
        match self.inner.gate.acquire_timeout(timeout)? {
            Some(guard) => self.open(guard).map(Some),
            None => Ok(None),
        }
    }

    fn snapshot(&self) -> Result<Vec<ActiveLock>, StoreError> {
        let locks = {
            let committed = self
                .inner
                .committed
                .read()
                .map_err(|_| StoreError::Poisoned("snapshot read"))?;
            Arc::clone(&committed.locks)
        };
        Ok(locks.values().cloned().collect())
    }
}

/// Transaction over an [`InMemoryLockStore`]. Holds the store's gate until
/// dropped.
pub struct InMemoryTransaction<'a> {
    store: &'a Inner,
    locks: Arc<LockMap>,
    _guard: GateGuard<'a>,
}

impl LockTransaction for InMemoryTransaction<'_> {
    fn get(&self, token: &str) -> Result<Option<ActiveLock>, StoreError> {
        Ok(self.locks.get(token).cloned())
    }

    fn list(&self) -> Result<Vec<ActiveLock>, StoreError> {
        Ok(self.locks.values().cloned().collect())
    }

    fn add(&mut self, lock: ActiveLock) -> Result<(), StoreError> {
        if self.locks.contains_key(lock.state_token()) {
            return Err(StoreError::DuplicateToken(lock.state_token().to_string()));
        }
        Arc::make_mut(&mut self.locks).insert(lock.state_token().to_string(), lock);
        Ok(())
    }

    fn update(&mut self, lock: ActiveLock) -> Result<(), StoreError> {
        if !self.locks.contains_key(lock.state_token()) {
            return Err(StoreError::MissingToken(lock.state_token().to_string()));
        }
        Arc::make_mut(&mut self.locks).insert(lock.state_token().to_string(), lock);
        Ok(())
    }

    fn remove(&mut self, token: &str) -> Result<Option<ActiveLock>, StoreError> {
        if !self.locks.contains_key(token) {
            return Ok(None);
        }
        Ok(Arc::make_mut(&mut self.locks).remove(token))
    }

    fn commit(self) -> Result<(), StoreError> {
        let mut committed = self
            .store
            .committed
            .write()
            .map_err(|_| StoreError::Poisoned("commit"))?;
        committed.generation += 1;
        committed.locks = self.locks;
        Ok(())
    }
}
