use std::time::Duration;

use super::{InMemoryLockStore, InMemoryTransaction, LockStore, LockTransaction, StoreError};
#[cfg(feature = "sqlite")]
use super::{SqliteLockStore, SqliteTransaction};
use crate::active_lock::ActiveLock;

/// A lock store chosen at runtime, e.g. from configuration.
#[derive(Debug)]
pub enum AnyLockStore {
    InMemory(InMemoryLockStore),
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteLockStore),
}

pub enum AnyTransaction<'a> {
    InMemory(InMemoryTransaction<'a>),
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteTransaction<'a>),
}

impl From<InMemoryLockStore> for AnyLockStore {
    fn from(store: InMemoryLockStore) -> Self {
        AnyLockStore::InMemory(store)
    }
}

#[cfg(feature = "sqlite")]
impl From<SqliteLockStore> for AnyLockStore {
    fn from(store: SqliteLockStore) -> Self {
        AnyLockStore::Sqlite(store)
    }
}

impl LockStore for AnyLockStore {
    type Transaction<'a> = AnyTransaction<'a>;

    fn begin(&self) -> Result<AnyTransaction<'_>, StoreError> {
        match self {
            AnyLockStore::InMemory(store) => store.begin().map(AnyTransaction::InMemory),
            #[cfg(feature = "sqlite")]
            AnyLockStore::Sqlite(store) => store.begin().map(AnyTransaction::Sqlite),
        }
    }

    fn begin_timeout(&self, timeout: Duration) -> Result<Option<AnyTransaction<'_>>, StoreError> {
        match self {
            AnyLockStore::InMemory(store) => Ok(store
                .begin_timeout(timeout)?
                .map(AnyTransaction::InMemory)),
            #[cfg(feature = "sqlite")]
            AnyLockStore::Sqlite(store) => {
                Ok(store.begin_timeout(timeout)?.map(AnyTransaction::Sqlite))
            }
        }
    }

    fn snapshot(&self) -> Result<Vec<ActiveLock>, StoreError> {
        match self {
            AnyLockStore::InMemory(store) => store.snapshot(),
            #[cfg(feature = "sqlite")]
            AnyLockStore::Sqlite(store) => store.snapshot(),
        }
    }
}

impl LockTransaction for AnyTransaction<'_> {
    fn get(&self, token: &str) -> Result<Option<ActiveLock>, StoreError> {
        match self {
            AnyTransaction::InMemory(tx) => tx.get(token),
            #[cfg(feature = "sqlite")]
            AnyTransaction::Sqlite(tx) => tx.get(token),
        }
    }

    fn list(&self) -> Result<Vec<ActiveLock>, StoreError> {
        match self {
            AnyTransaction::InMemory(tx) => tx.list(),
            #[cfg(feature = "sqlite")]
            AnyTransaction::Sqlite(tx) => tx.list(),
        }
    }

    fn add(&mut self, lock: ActiveLock) -> Result<(), StoreError> {
        match self {
            AnyTransaction::InMemory(tx) => tx.add(lock),
            #[cfg(feature = "sqlite")]
            AnyTransaction::Sqlite(tx) => tx.add(lock),
        }
    }

    fn update(&mut self, lock: ActiveLock) -> Result<(), StoreError> {
        match self {
            AnyTransaction::InMemory(tx) => tx.update(lock),
            #[cfg(feature = "sqlite")]
            AnyTransaction::Sqlite(tx) => tx.update(lock),
        }
    }

    fn remove(&mut self, token: &str) -> Result<Option<ActiveLock>, StoreError> {
        match self {
            AnyTransaction::InMemory(tx) => tx.remove(token),
            #[cfg(feature = "sqlite")]
            AnyTransaction::Sqlite(tx) => tx.remove(token),
        }
    }

    fn commit(self) -> Result<(), StoreError> {
        match self {
            AnyTransaction::InMemory(tx) => tx.commit(),
            #[cfg(feature = "sqlite")]
            AnyTransaction::Sqlite(tx) => tx.commit(),
        }
    }
}
