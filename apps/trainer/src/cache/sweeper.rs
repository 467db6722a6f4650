//! Background TTL sweeping.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::{CacheValue, ContentCache};

/// Handle to a periodic sweep task for one cache.
///
/// The task wakes on a fixed cadence and calls [`ContentCache::sweep_expired`].
/// `shutdown` stops it promptly; without it the task runs until the runtime
/// goes away.
pub struct CacheSweeper {
    stop: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl CacheSweeper {
    /// Spawn a sweeper on the current tokio runtime.
    pub fn spawn<V>(cache: Arc<ContentCache<V>>, every: Duration) -> Self
    where
        V: CacheValue + 'static,
    {
        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first interval tick completes immediately; consume it so
            // sweeps start one full period after spawn.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match cache.sweep_expired() {
                            Ok(0) => {}
                            Ok(removed) => {
                                info!(cache = cache.name(), removed, "sweep removed expired entries");
                            }
                            Err(e) => {
                                warn!(cache = cache.name(), error = %e, "sweep failed");
                            }
                        }
                    }
                    _ = stop_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self { stop: stop_tx, task }
    }

    /// Signal the task to stop and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.stop.send(()).await;
        let _ = self.task.await;
    }
}
