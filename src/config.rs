//! Construction-time configuration.
//!
//! ```json
//! {
//!   "rounding": { "mode": "round_up", "granularity_ms": 100 },
//!   "cleanup_interval_ms": 30000,
//!   "max_wait_ms": 2000,
//!   "store": { "backend": "sqlite", "path": "/var/lib/dav/locks.db" }
//! }
//! ```
//!
//! Every field is optional; omitted fields take their defaults. Without
//! `max_wait_ms`, mutations wait for the store as long as it takes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cleanup::CleanupWorkerThread;
use crate::manager::LockManager;
use crate::rounding::TimeoutRounding;
use crate::store::{AnyLockStore, InMemoryLockStore, StoreError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Where locks are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    #[default]
    InMemory,
    Sqlite {
        path: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockManagerConfig {
    pub rounding: TimeoutRounding,
    pub cleanup_interval_ms: u64,
    pub max_wait_ms: Option<u64>,
    pub store: StoreConfig,
}

impl Default for LockManagerConfig {
    fn default() -> Self {
        Self {
            rounding: TimeoutRounding::default(),
            cleanup_interval_ms: 30_000,
            max_wait_ms: None,
            store: StoreConfig::default(),
        }
    }
}

impl LockManagerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cleanup_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "cleanup_interval_ms must be positive".to_string(),
            ));
        }
        if let TimeoutRounding::RoundUp { granularity_ms: 0 } = self.rounding {
            return Err(ConfigError::Invalid(
                "rounding granularity_ms must be positive".to_string(),
            ));
        }
        if let StoreConfig::Sqlite { path } = &self.store {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid("sqlite store path is empty".to_string()));
            }
        }
        Ok(())
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_ms.map(Duration::from_millis)
    }

    /// Open the configured store and build a manager on it.
    pub fn open(&self) -> Result<LockManager<AnyLockStore>, ConfigError> {
        self.validate()?;
        let store = match &self.store {
            StoreConfig::InMemory => AnyLockStore::from(InMemoryLockStore::new()),
            #[cfg(feature = "sqlite")]
            StoreConfig::Sqlite { path } => {
                AnyLockStore::from(crate::store::SqliteLockStore::open(path)?)
            }
            #[cfg(not(feature = "sqlite"))]
            StoreConfig::Sqlite { .. } => {
                return Err(ConfigError::Invalid(
                    "sqlite backend requires the `sqlite` feature".to_string(),
                ))
            }
        };
        let manager = LockManager::new(store).with_rounding(self.rounding);
        Ok(match self.max_wait() {
            Some(wait) => manager.with_max_wait(wait),
            None => manager,
        })
    }

    /// [`open`](Self::open) and start a cleanup worker at the configured interval.
    pub fn start(
        &self,
    ) -> Result<(Arc<LockManager<AnyLockStore>>, CleanupWorkerThread), ConfigError> {
        let manager = Arc::new(self.open()?);
        let worker = CleanupWorkerThread::spawn(&manager, self.cleanup_interval());
        Ok((manager, worker))
    }
}
