//! Lock storage.
//!
//! A [`LockStore`] hands out [`LockTransaction`]s one at a time:
//! - [`InMemoryLockStore`] keeps an immutable map and swaps it on commit
//! - [`SqliteLockStore`] persists locks in a SQLite file (`sqlite` feature)
//! - [`AnyLockStore`] picks one at runtime

mod any;
mod error;
mod gate;
mod in_memory;
mod lock_store;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use any::{AnyLockStore, AnyTransaction};
pub use error::StoreError;
pub use gate::{GateGuard, TransactionGate};
pub use in_memory::{InMemoryLockStore, InMemoryTransaction};
pub use lock_store::{LockStore, LockTransaction};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteLockStore, SqliteTransaction};
