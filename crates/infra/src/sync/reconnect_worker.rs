//! Replays the offline queue when connectivity returns.
//!
//! The worker mirrors the connectivity signal into the queue's online flag
//! and starts a sync pass on every offline→online transition. Replay
//! starts immediately; there is no delay or backoff between the transition
//! and the pass. Each pass first drops mutations recorded under a context
//! other than the queue's active one (see [`OfflineQueue::set_context`]).

use std::sync::Arc;
use std::time::Duration;

use superapp_common::sync::{MutationExecutor, OfflineQueue, QueueError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::connectivity::ConnectivityMonitor;
use super::errors::{WorkerError, WorkerResult};

#[derive(Debug, Clone)]
pub struct ReconnectWorkerConfig {
    /// Upper bound on a single replay pass
    pub pass_timeout: Duration,
    /// How long `stop()` waits for the task
    pub join_timeout: Duration,
    /// Run a pass at start when already online (picks up mutations left
    /// from a previous run)
    pub sync_on_start: bool,
}

impl Default for ReconnectWorkerConfig {
    fn default() -> Self {
        Self {
            pass_timeout: Duration::from_secs(300),
            join_timeout: Duration::from_secs(5),
            sync_on_start: true,
        }
    }
}

/// Connectivity-driven queue replay with explicit lifecycle
pub struct ReconnectWorker<E: MutationExecutor + 'static> {
    queue: Arc<OfflineQueue>,
    executor: Arc<E>,
    monitor: ConnectivityMonitor,
    config: ReconnectWorkerConfig,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl<E: MutationExecutor + 'static> ReconnectWorker<E> {
    pub fn new(
        queue: Arc<OfflineQueue>,
        executor: Arc<E>,
        monitor: ConnectivityMonitor,
        config: ReconnectWorkerConfig,
    ) -> Self {
        Self {
            queue,
            executor,
            monitor,
            config,
            cancellation: CancellationToken::new(),
            task_handle: None,
        }
    }

    #[instrument(skip(self))]
    pub async fn start(&mut self) -> WorkerResult<()> {
        if self.is_running() {
            return Err(WorkerError::AlreadyRunning);
        }

        self.cancellation = CancellationToken::new();
        let queue = Arc::clone(&self.queue);
        let executor = Arc::clone(&self.executor);
        let rx = self.monitor.subscribe();
        let config = self.config.clone();
        let cancel = self.cancellation.clone();

        self.task_handle = Some(tokio::spawn(async move {
            Self::run_loop(queue, executor, rx, config, cancel).await;
        }));
        info!("Reconnect worker started");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> WorkerResult<()> {
        let Some(handle) = self.task_handle.take() else {
            return Err(WorkerError::NotRunning);
        };

        self.cancellation.cancel();
        let join_timeout = self.config.join_timeout;
        match tokio::time::timeout(join_timeout, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(error = %e, "Reconnect worker task panicked");
                return Err(WorkerError::TaskPanicked(e.to_string()));
            }
            Err(_) => {
                warn!("Reconnect worker did not stop within timeout");
                return Err(WorkerError::JoinTimeout { seconds: join_timeout.as_secs() });
            }
        }

        self.cancellation = CancellationToken::new();
        info!("Reconnect worker stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    async fn run_loop(
        queue: Arc<OfflineQueue>,
        executor: Arc<E>,
        mut rx: watch::Receiver<bool>,
        config: ReconnectWorkerConfig,
        cancel: CancellationToken,
    ) {
        let mut online = *rx.borrow_and_update();
        queue.set_online(online).await;
        if online && config.sync_on_start {
            Self::replay(&queue, executor.as_ref(), config.pass_timeout, &cancel).await;
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Reconnect worker loop cancelled");
                    break;
                }
                changed = rx.changed() => {
                    if changed.is_err() {
                        debug!("Connectivity monitor dropped, stopping reconnect worker");
                        break;
                    }
                    let now_online = *rx.borrow_and_update();
                    if now_online == online {
                        continue;
                    }
                    online = now_online;
                    queue.set_online(online).await;
                    if online {
                        info!("Connectivity restored, replaying offline queue");
                        Self::replay(&queue, executor.as_ref(), config.pass_timeout, &cancel).await;
                    }
                }
            }
        }
    }

    async fn replay(
        queue: &OfflineQueue,
        executor: &E,
        pass_timeout: Duration,
        cancel: &CancellationToken,
    ) {
        let pass = tokio::time::timeout(pass_timeout, queue.sync(executor));
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Replay abandoned on shutdown");
            }
            outcome = pass => match outcome {
                Ok(Ok(report)) => {
                    info!(
                        succeeded = report.succeeded,
                        failed = report.failed,
                        skipped = report.skipped,
                        "Reconnect replay finished"
                    );
                }
                Ok(Err(QueueError::Offline | QueueError::SyncInProgress)) => {
                    debug!("Replay skipped, queue offline or already syncing");
                }
                Ok(Err(e)) => error!(error = %e, "Reconnect replay failed"),
                Err(_) => warn!(timeout_secs = pass_timeout.as_secs(), "Reconnect replay timed out"),
            }
        }
    }
}

impl<E: MutationExecutor + 'static> Drop for ReconnectWorker<E> {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}
