use std::time::Duration;

use super::StoreError;
use crate::active_lock::ActiveLock;

/// One unit of lock-store mutation.
///
/// A transaction reads the state captured when it was opened plus its own
/// pending changes. Nothing becomes visible to other callers until
/// [`commit`](LockTransaction::commit); dropping an uncommitted transaction
/// discards every change and releases the store.
pub trait LockTransaction {
    /// Look up a lock by state token.
    fn get(&self, token: &str) -> Result<Option<ActiveLock>, StoreError>;

    /// Every lock in the transaction's view, expired ones included.
    fn list(&self) -> Result<Vec<ActiveLock>, StoreError>;

    /// Insert a new lock. Fails with `DuplicateToken` if the token exists.
    fn add(&mut self, lock: ActiveLock) -> Result<(), StoreError>;

    /// Replace an existing lock with the same token. Fails with `MissingToken`
    /// if there is nothing to replace.
    fn update(&mut self, lock: ActiveLock) -> Result<(), StoreError>;

    /// Remove a lock, returning it if it existed.
    fn remove(&mut self, token: &str) -> Result<Option<ActiveLock>, StoreError>;

    /// Apply every pending change atomically.
    fn commit(self) -> Result<(), StoreError>
    where
        Self: Sized;
}

/// Storage for active locks.
///
/// Implementations serialize transactions: `begin` blocks while another
/// transaction is open. Reads through [`snapshot`](LockStore::snapshot) never
/// wait for a writer.
pub trait LockStore: Send + Sync {
    type Transaction<'a>: LockTransaction
    where
        Self: 'a;

    /// Open a transaction, waiting as long as necessary.
    fn begin(&self) -> Result<Self::Transaction<'_>, StoreError>;

    /// Open a transaction, waiting at most `timeout`. `Ok(None)` means the wait
    /// was abandoned and the store is untouched.
    fn begin_timeout(&self, timeout: Duration)
        -> Result<Option<Self::Transaction<'_>>, StoreError>;

    /// The last committed state.
    fn snapshot(&self) -> Result<Vec<ActiveLock>, StoreError>;
}
