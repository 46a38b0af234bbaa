use thiserror::Error;

/// Failure inside a lock store.
///
/// A failed commit never leaves a transaction partially applied.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("lock store gate poisoned during {0}")]
    Poisoned(&'static str),

    #[error("state token {0} already exists")]
    DuplicateToken(String),

    #[error("no stored lock with token {0}")]
    MissingToken(String),

    #[error("corrupt lock record {token}: {reason}")]
    Corrupt { token: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// Whether the store is unusable and retrying is pointless.
    pub fn is_fatal(&self) -> bool {
        match self {
            StoreError::Corrupt { .. } => true,
            #[cfg(feature = "sqlite")]
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseCorrupt | rusqlite::ErrorCode::NotADatabase
            ),
            _ => false,
        }
    }
}
