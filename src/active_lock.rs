//! The record describing one granted lock.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// Shared or exclusive write lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockType {
    Shared,
    Exclusive,
}

impl LockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockType::Shared => "shared",
            LockType::Exclusive => "exclusive",
        }
    }
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shared" => Ok(LockType::Shared),
            "exclusive" => Ok(LockType::Exclusive),
            other => Err(format!("unknown lock type {:?}", other)),
        }
    }
}

/// Requested or granted lease length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeout {
    Infinite,
    Finite(Duration),
}

impl Timeout {
    pub fn seconds(secs: u64) -> Self {
        Timeout::Finite(Duration::from_secs(secs))
    }

    pub fn millis(millis: u64) -> Self {
        Timeout::Finite(Duration::from_millis(millis))
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, Timeout::Infinite)
    }

    /// The instant a lease issued at `issued_at` runs out, `None` if it never does.
    ///
    /// Leases too long to represent are treated as infinite.
    pub fn expires_from(&self, issued_at: SystemTime) -> Option<SystemTime> {
        match self {
            Timeout::Infinite => None,
            Timeout::Finite(duration) => issued_at.checked_add(*duration),
        }
    }
}

/// A granted lock.
///
/// Records are immutable: a refresh produces a new record with the same token,
/// path, depth, type and owner, and a new expiry. `expires_at` is always derived
/// from `issued_at` and `timeout`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveLock {
    state_token: String,
    path: String,
    recursive: bool,
    lock_type: LockType,
    owner: Option<String>,
    timeout: Timeout,
    issued_at: SystemTime,
    expires_at: Option<SystemTime>,
}

impl ActiveLock {
    /// Build a record from its stored parts. The expiry is derived.
    pub fn new(
        state_token: impl Into<String>,
        path: impl Into<String>,
        recursive: bool,
        lock_type: LockType,
        owner: Option<String>,
        timeout: Timeout,
        issued_at: SystemTime,
    ) -> Self {
        Self {
            state_token: state_token.into(),
            path: path.into(),
            recursive,
            lock_type,
            owner,
            timeout,
            issued_at,
            expires_at: timeout.expires_from(issued_at),
        }
    }

    /// The same lock re-issued at `now` with a new lease.
    pub fn refreshed(&self, now: SystemTime, timeout: Timeout) -> Self {
        Self {
            timeout,
            issued_at: now,
            expires_at: timeout.expires_from(now),
            ..self.clone()
        }
    }

    pub fn state_token(&self) -> &str {
        &self.state_token
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn recursive(&self) -> bool {
        self.recursive
    }

    pub fn lock_type(&self) -> LockType {
        self.lock_type
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn timeout(&self) -> Timeout {
        self.timeout
    }

    pub fn issued_at(&self) -> SystemTime {
        self.issued_at
    }

    pub fn expires_at(&self) -> Option<SystemTime> {
        self.expires_at
    }

    /// Expired once `expires_at` lies strictly before `now`.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at < now)
    }

    /// Whether this lock protects `path`: its own path always, descendants only
    /// when recursive.
    pub fn covers(&self, path: &str) -> bool {
        if self.recursive {
            crate::path::is_self_or_descendant(path, &self.path)
        } else {
            self.path == path
        }
    }

    /// Remaining lease at `now`; `None` for infinite locks.
    pub fn remaining(&self, now: SystemTime) -> Option<Duration> {
        self.expires_at
            .map(|expires_at| expires_at.duration_since(now).unwrap_or(Duration::ZERO))
    }
}
