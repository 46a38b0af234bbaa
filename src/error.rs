use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::active_lock::ActiveLock;
use crate::store::StoreError;

/// How an existing lock relates to the path of a rejected request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockRelation {
    /// The lock is rooted at the requested path.
    SamePath,
    /// The lock is rooted at an ancestor and reaches the requested path.
    Ancestor,
    /// The lock is rooted beneath the requested path.
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictingLock {
    pub lock: ActiveLock,
    pub relation: LockRelation,
}

/// A request that collided with existing locks.
///
/// Carries every colliding lock so the protocol layer can build a multi-status
/// response naming each one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConflict {
    pub path: String,
    pub conflicts: Vec<ConflictingLock>,
}

impl LockConflict {
    pub fn tokens(&self) -> Vec<&str> {
        self.conflicts
            .iter()
            .map(|c| c.lock.state_token())
            .collect()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.conflicts.iter().any(|c| c.lock.state_token() == token)
    }
}

impl fmt::Display for LockConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} conflicts with {} existing lock(s): {}",
            self.path,
            self.conflicts.len(),
            self.tokens().join(", ")
        )
    }
}

/// Outcome of a failed lock manager operation.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock conflict: {0}")]
    Conflict(LockConflict),

    #[error("no active lock with token {0}")]
    NotFound(String),

    #[error("lock {0} has expired")]
    Expired(String),

    #[error("lock {token} does not cover {path}")]
    RangeMismatch { token: String, path: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("lock store busy; gave up after {0:?}")]
    Busy(Duration),

    #[error("lock store failure: {0}")]
    Storage(#[from] StoreError),
}

impl LockError {
    /// The HTTP status the protocol layer is expected to answer with.
    pub fn status_hint(&self) -> u16 {
        match self {
            LockError::Conflict(_) => 423,
            LockError::NotFound(_) => 404,
            LockError::Expired(_) => 412,
            LockError::RangeMismatch { .. } => 409,
            LockError::InvalidArgument(_) => 400,
            LockError::Busy(_) => 503,
            LockError::Storage(_) => 500,
        }
    }

    pub fn conflict(&self) -> Option<&LockConflict> {
        match self {
            LockError::Conflict(conflict) => Some(conflict),
            _ => None,
        }
    }
}
