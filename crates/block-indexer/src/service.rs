//! Scheduled background task driving the indexer

use crate::error::{BlockIndexerError, Result};
use crate::indexer::BlockIndexer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

pub struct IndexerService;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Resolves once shutdown is signalled or the handle is dropped.
async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

impl IndexerService {
    /// Run `indexer` every `interval` until the returned handle is shut down.
    ///
    /// The first cycle starts immediately. Cycles never overlap; a failed cycle
    /// is logged by the indexer and the next tick starts a fresh one. A zero
    /// interval is raised to one millisecond.
    pub fn spawn(indexer: Arc<BlockIndexer>, interval: Duration) -> IndexerHandle {
        let interval = interval.max(MIN_INTERVAL);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("Indexer service started, polling every {:?}", interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stop_requested(&mut shutdown_rx) => break,
                }

                tokio::select! {
                    // Errors are already logged and leave the watermark intact.
                    result = indexer.run_cycle() => {
                        if let Ok(report) = result {
                            debug!("Cycle finished at watermark {}", report.end_height);
                        }
                    }
                    _ = stop_requested(&mut shutdown_rx) => {
                        info!("Shutdown requested, abandoning the cycle in progress");
                        break;
                    }
                }
            }

            info!("Indexer service stopped");
        });

        IndexerHandle { shutdown_tx, task }
    }
}

/// Control handle for a spawned [`IndexerService`].
pub struct IndexerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl IndexerHandle {
    /// Stop scheduling cycles and wait for the task to exit.
    ///
    /// A cycle in progress is dropped at its next await point; a block commit
    /// it had open is rolled back.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        self.task
            .await
            .map_err(|e| BlockIndexerError::Task(e.to_string()))
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
