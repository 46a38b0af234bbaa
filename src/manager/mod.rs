//! The lock state machine.
//!
//! - [`LockManager`] - grant, refresh, release, query and sweep locks
//! - [`LockEvent`] - committed changes, delivered to subscribers

mod conflict;
mod events;
mod lock_manager;

pub use events::LockEvent;
pub use lock_manager::{new_state_token, LockManager};
