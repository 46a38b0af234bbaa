//! Threaded cleanup worker.

use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{clamp_interval, record_sweep, CleanupStats};
use crate::manager::LockManager;
use crate::store::LockStore;

/// A background thread that sweeps expired locks on a fixed interval.
///
/// The thread holds only a weak reference to the manager. Dropping the last
/// strong reference wakes the loop and ends it without waiting for the next
/// tick.
///
/// ## Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use dav_locks::{CleanupWorkerThread, InMemoryLockStore, LockManager};
///
/// let manager = Arc::new(LockManager::new(InMemoryLockStore::new()));
/// let worker = CleanupWorkerThread::spawn(&manager, Duration::from_millis(10));
///
/// // ... serve requests ...
///
/// let stats = worker.stop();
/// assert_eq!(stats.failures, 0);
/// ```
pub struct CleanupWorkerThread {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<CleanupStats>>,
}

impl CleanupWorkerThread {
    pub fn spawn<S>(manager: &Arc<LockManager<S>>, interval: Duration) -> Self
    where
        S: LockStore + 'static,
    {
        let (stop_tx, stop_rx) = channel();
        let wake = stop_tx.clone();
        manager.on_drop(move || {
            let _ = wake.send(());
        });
        let manager = Arc::downgrade(manager);
        let interval = clamp_interval(interval);

        let handle = thread::spawn(move || {
            let mut stats = CleanupStats::default();
            tracing::info!(interval_ms = interval.as_millis() as u64, "lock cleanup started");

            loop {
                match stop_rx.recv_timeout(interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }

                let Some(manager) = manager.upgrade() else {
                    tracing::debug!("lock manager dropped; stopping cleanup");
                    break;
                };
                let outcome = manager.sweep_expired_now();
                drop(manager);

                if !record_sweep(&mut stats, outcome) {
                    break;
                }
            }

            tracing::info!(
                sweeps = stats.sweeps,
                removed = stats.removed,
                failures = stats.failures,
                "lock cleanup stopped"
            );
            stats
        });

        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Signal the worker to stop and wait for the current sweep to finish.
    pub fn stop(mut self) -> CleanupStats {
        let _ = self.stop_tx.send(());
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_default(),
            None => CleanupStats::default(),
        }
    }

    /// Signal the worker to stop without waiting.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(());
    }

    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .map(JoinHandle::is_finished)
            .unwrap_or(true)
    }
}

impl Drop for CleanupWorkerThread {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}
