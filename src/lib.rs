//! WebDAV lock management.
//!
//! Grants, refreshes and releases shared and exclusive locks on hierarchical
//! resource paths, rejects requests that overlap incompatible locks on the path,
//! its ancestors or its descendants, and sweeps locks whose lease has run out.
//!
//! Lock state lives in a pluggable [`LockStore`]: [`InMemoryLockStore`] for a
//! single process, [`SqliteLockStore`] when locks must survive restarts.

mod active_lock;
mod cleanup;
mod clock;
mod config;
mod error;
mod manager;
pub mod path;
mod rounding;
pub mod store;

pub use active_lock::{ActiveLock, LockType, Timeout};
#[cfg(feature = "tokio")]
pub use cleanup::CleanupTask;
pub use cleanup::{CleanupStats, CleanupWorkerThread};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, LockManagerConfig, StoreConfig};
pub use error::{ConflictingLock, LockConflict, LockError, LockRelation};
pub use manager::{new_state_token, LockEvent, LockManager};
pub use rounding::TimeoutRounding;
#[cfg(feature = "sqlite")]
pub use store::SqliteLockStore;
pub use store::{
    AnyLockStore, InMemoryLockStore, LockStore, LockTransaction, StoreError,
};
