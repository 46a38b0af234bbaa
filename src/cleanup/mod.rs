//! Cleanup - periodic removal of expired locks.
//!
//! - [`CleanupWorkerThread`] - a background thread sweeping on an interval
//! - [`CleanupTask`] - the same loop as a tokio task (`tokio` feature)
//!
//! A sweep never overlaps with the previous one: the loop waits for each sweep
//! to finish before scheduling the next. Failed sweeps are logged and retried
//! on the next tick; only fatal store corruption ends the loop.

mod thread;
#[cfg(feature = "tokio")]
mod task;

use std::time::Duration;

pub use thread::CleanupWorkerThread;
#[cfg(feature = "tokio")]
pub use task::CleanupTask;

use crate::error::LockError;

/// Statistics from a cleanup worker.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupStats {
    pub sweeps: usize,
    pub removed: usize,
    pub failures: usize,
}

/// Shortest interval a worker accepts; smaller values are clamped.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

fn clamp_interval(interval: Duration) -> Duration {
    interval.max(MIN_INTERVAL)
}

/// Record one sweep outcome. Returns `false` when the loop must stop.
fn record_sweep(stats: &mut CleanupStats, outcome: Result<usize, LockError>) -> bool {
    stats.sweeps += 1;
    match outcome {
        Ok(removed) => {
            stats.removed += removed;
            true
        }
        Err(LockError::Storage(err)) if err.is_fatal() => {
            stats.failures += 1;
            tracing::error!(error = %err, "lock store is corrupt; stopping cleanup");
            false
        }
        Err(err) => {
            stats.failures += 1;
            tracing::warn!(error = %err, "lock sweep failed; retrying on next tick");
            true
        }
    }
}
