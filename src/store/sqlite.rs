//! SqliteLockStore - durable lock store backed by a single SQLite file.
//!
//! Locks survive process restarts. Every transaction is a SQLite
//! `BEGIN IMMEDIATE` transaction on a dedicated writer connection; snapshot
//! reads go through a second connection and see the last committed state (WAL
//! mode).

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use super::gate::{GateGuard, TransactionGate};
use super::{LockStore, LockTransaction, StoreError};
use crate::active_lock::{ActiveLock, LockType, Timeout};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS active_locks (
    state_token  TEXT PRIMARY KEY NOT NULL,
    path         TEXT NOT NULL,
    recursive    INTEGER NOT NULL,
    lock_type    TEXT NOT NULL,
    owner        TEXT,
    issued_at    INTEGER NOT NULL,
    expires_at   INTEGER
);
";

const SELECT_COLUMNS: &str =
    "SELECT state_token, path, recursive, lock_type, owner, issued_at, expires_at FROM active_locks";

/// Durable lock store.
#[derive(Debug)]
pub struct SqliteLockStore {
    path: PathBuf,
    gate: TransactionGate,
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl SqliteLockStore {
    /// Open (or create) the lock database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let writer = Connection::open(&path)?;
        writer.busy_timeout(Duration::from_secs(5))?;
        writer.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        writer.execute_batch(SCHEMA)?;

        let reader = Connection::open(&path)?;
        reader.busy_timeout(Duration::from_secs(5))?;

        tracing::debug!(path = %path.display(), "opened sqlite lock store");
        Ok(Self {
            path,
            gate: TransactionGate::new(),
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_transaction<'a>(
        &'a self,
        guard: GateGuard<'a>,
    ) -> Result<SqliteTransaction<'a>, StoreError> {
        let conn = self
            .writer
            .lock()
            .map_err(|_| StoreError::Poisoned("sqlite begin"))?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(SqliteTransaction {
            conn,
            finished: false,
            _guard: guard,
        })
    }
}

impl LockStore for SqliteLockStore {
    type Transaction<'a> = SqliteTransaction<'a>;

    fn begin(&self) -> Result<SqliteTransaction<'_>, StoreError> {
        let guard = self.gate.acquire()?;
        self.open_transaction(guard)
    }

    fn begin_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Option<SqliteTransaction<'_>>, StoreError> {
        match self.gate.acquire_timeout(timeout)? {
            Some(guard) => self.open_transaction(guard).map(Some),
            None => Ok(None),
        }
    }

    fn snapshot(&self) -> Result<Vec<ActiveLock>, StoreError> {
        let conn = self
            .reader
            .lock()
            .map_err(|_| StoreError::Poisoned("sqlite snapshot"))?;
        select_all(&conn)
    }
}

/// A SQLite transaction on the writer connection. Rolled back on drop unless
/// committed.
pub struct SqliteTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
    _guard: GateGuard<'a>,
}

impl LockTransaction for SqliteTransaction<'_> {
    fn get(&self, token: &str) -> Result<Option<ActiveLock>, StoreError> {
        let sql = format!("{} WHERE state_token = ?1", SELECT_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![token], StoredRow::from_row)
            .optional()?;
        row.map(StoredRow::into_lock).transpose()
    }

    fn list(&self) -> Result<Vec<ActiveLock>, StoreError> {
        select_all(&self.conn)
    }

    fn add(&mut self, lock: ActiveLock) -> Result<(), StoreError> {
        let row = StoredRow::from_lock(&lock)?;
        let inserted = self.conn.execute(
            "INSERT INTO active_locks
                 (state_token, path, recursive, lock_type, owner, issued_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                row.state_token,
                row.path,
                row.recursive,
                row.lock_type,
                row.owner,
                row.issued_at,
                row.expires_at
            ],
        );
        match inserted {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation
                    && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                Err(StoreError::DuplicateToken(row.state_token))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn update(&mut self, lock: ActiveLock) -> Result<(), StoreError> {
        let row = StoredRow::from_lock(&lock)?;
        let changed = self.conn.execute(
            "UPDATE active_locks
             SET path = ?2, recursive = ?3, lock_type = ?4, owner = ?5,
                 issued_at = ?6, expires_at = ?7
             WHERE state_token = ?1",
            params![
                row.state_token,
                row.path,
                row.recursive,
                row.lock_type,
                row.owner,
                row.issued_at,
                row.expires_at
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::MissingToken(row.state_token));
        }
        Ok(())
    }

    fn remove(&mut self, token: &str) -> Result<Option<ActiveLock>, StoreError> {
        let existing = self.get(token)?;
        if existing.is_some() {
            self.conn
                .execute("DELETE FROM active_locks WHERE state_token = ?1", params![token])?;
        }
        Ok(existing)
    }

    fn commit(mut self) -> Result<(), StoreError> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(err) = self.conn.execute_batch("ROLLBACK") {
                tracing::warn!(error = %err, "failed to roll back lock store transaction");
            }
        }
    }
}

fn select_all(conn: &Connection) -> Result<Vec<ActiveLock>, StoreError> {
    let mut stmt = conn.prepare_cached(SELECT_COLUMNS)?;
    let rows = stmt.query_map([], StoredRow::from_row)?;
    let mut locks = Vec::new();
    for row in rows {
        locks.push(row?.into_lock()?);
    }
    Ok(locks)
}

/// Column-level representation of a lock. Timestamps are Unix milliseconds;
/// a NULL `expires_at` means the lock never expires.
struct StoredRow {
    state_token: String,
    path: String,
    recursive: bool,
    lock_type: String,
    owner: Option<String>,
    issued_at: i64,
    expires_at: Option<i64>,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            state_token: row.get(0)?,
            path: row.get(1)?,
            recursive: row.get(2)?,
            lock_type: row.get(3)?,
            owner: row.get(4)?,
            issued_at: row.get(5)?,
            expires_at: row.get(6)?,
        })
    }

    fn from_lock(lock: &ActiveLock) -> Result<Self, StoreError> {
        let token = lock.state_token();
        Ok(Self {
            state_token: token.to_string(),
            path: lock.path().to_string(),
            recursive: lock.recursive(),
            lock_type: lock.lock_type().as_str().to_string(),
            owner: lock.owner().map(str::to_string),
            issued_at: to_millis(token, lock.issued_at())?,
            expires_at: lock
                .expires_at()
                .map(|expires_at| to_millis(token, expires_at))
                .transpose()?,
        })
    }

    fn into_lock(self) -> Result<ActiveLock, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            token: self.state_token.clone(),
            reason,
        };

        let lock_type: LockType = self.lock_type.parse().map_err(corrupt)?;
        if self.issued_at < 0 {
            return Err(corrupt(format!("negative issued_at {}", self.issued_at)));
        }
        let timeout = match self.expires_at {
            None => Timeout::Infinite,
            Some(expires_at) if expires_at >= self.issued_at => {
                Timeout::millis((expires_at - self.issued_at) as u64)
            }
            Some(expires_at) => {
                return Err(corrupt(format!(
                    "expires_at {} precedes issued_at {}",
                    expires_at, self.issued_at
                )))
            }
        };
        let issued_at = UNIX_EPOCH + Duration::from_millis(self.issued_at as u64);

        Ok(ActiveLock::new(
            self.state_token,
            self.path,
            self.recursive,
            lock_type,
            self.owner,
            timeout,
            issued_at,
        ))
    }
}

fn to_millis(token: &str, time: SystemTime) -> Result<i64, StoreError> {
    time.duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|since| i64::try_from(since.as_millis()).ok())
        .ok_or_else(|| StoreError::Corrupt {
            token: token.to_string(),
            reason: "timestamp outside the storable range".to_string(),
        })
}
