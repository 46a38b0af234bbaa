//! Async cleanup task for tokio runtimes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{clamp_interval, record_sweep, CleanupStats};
use crate::manager::LockManager;
use crate::store::LockStore;

/// A tokio task that sweeps expired locks on a fixed interval.
///
/// Sweeps run on the blocking pool since they may wait for the store. The loop
/// ends when stopped, or as soon as the manager is dropped.
pub struct CleanupTask {
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<CleanupStats>,
}

impl CleanupTask {
    /// Spawn onto the current tokio runtime.
    pub fn spawn<S>(manager: &Arc<LockManager<S>>, interval: Duration) -> Self
    where
        S: LockStore + 'static,
    {
        let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();
        let dropped = Arc::new(Notify::new());
        {
            let dropped = Arc::clone(&dropped);
            manager.on_drop(move || dropped.notify_one());
        }
        let manager = Arc::downgrade(manager);
        let interval = clamp_interval(interval);

        let handle = tokio::spawn(async move {
            let mut stats = CleanupStats::default();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = dropped.notified() => break,
                    _ = ticker.tick() => {}
                }

                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let outcome =
                    tokio::task::spawn_blocking(move || manager.sweep_expired_now()).await;

                match outcome {
                    Ok(outcome) => {
                        if !record_sweep(&mut stats, outcome) {
                            break;
                        }
                    }
                    Err(err) => {
                        stats.sweeps += 1;
                        stats.failures += 1;
                        tracing::warn!(error = %err, "lock sweep task panicked");
                    }
                }
            }

            stats
        });

        Self {
            shutdown: Some(shutdown),
            handle,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the task to stop and wait for the current sweep to finish.
    pub async fn stop(mut self) -> CleanupStats {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.handle.await.unwrap_or_default()
    }
}
