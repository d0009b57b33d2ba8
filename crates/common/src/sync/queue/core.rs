use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, warn};

use super::errors::{QueueError, QueueResult};
use super::executor::MutationExecutor;
use super::persistence::QueuePersistence;
use super::types::{
    MutationStatus, QueueConfig, QueueLog, QueuedMutation, SyncProgress, SyncReport, SyncStatus,
};
use crate::storage::KeyValueStore;
use crate::time::Clock;

struct QueueState {
    log: QueueLog,
    progress: Option<SyncProgress>,
    /// The in-memory log is ahead of the store
    unsaved: bool,
    /// Context every replayed mutation must belong to
    context: Option<String>,
}

/// Ends a sync pass, including one whose future was dropped mid-flight
struct SyncGuard<'a> {
    queue: &'a OfflineQueue,
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.queue.is_syncing.store(false, Ordering::Release);
        // Contended lock: the snapshot already hides progress once the flag is down.
        if let Ok(mut state) = self.queue.state.try_lock() {
            state.progress = None;
            self.queue.publish(&state);
        }
    }
}

/// Durable, ordered buffer of mutations made while offline
///
/// ## Ordering
///
/// Mutations are replayed in ascending sequence id. A failing mutation is
/// marked [`MutationStatus::Failed`] and kept; the pass continues with the
/// next one, and the failed mutation is retried on the next pass.
///
/// ## Persistence
///
/// Every state change is written through to the [`KeyValueStore`] before
/// the call returns. The log lock is never held across a backend call, so
/// `enqueue` stays responsive during a sync pass.
pub struct OfflineQueue {
    config: QueueConfig,
    persistence: QueuePersistence,
    clock: Arc<dyn Clock>,
    state: Mutex<QueueState>,
    is_online: AtomicBool,
    is_syncing: AtomicBool,
    status_tx: watch::Sender<SyncStatus>,
}

impl std::fmt::Debug for OfflineQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineQueue")
            .field("config", &self.config)
            .field("is_online", &self.is_online.load(Ordering::Relaxed))
            .field("is_syncing", &self.is_syncing.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl OfflineQueue {
    /// Open the queue, loading the persisted log
    ///
    /// Mutations older than the configured TTL are purged without replay.
    /// Mutations left in `syncing` by an interrupted pass are reset to
    /// `pending`. The queue starts in the online state.
    #[instrument(skip_all, fields(key = %config.storage_key))]
    pub async fn open(
        config: QueueConfig,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> QueueResult<Self> {
        config.validate()?;
        let persistence = QueuePersistence::new(store, config.storage_key.clone());
        let mut log = persistence.load().await?;

        let now = clock.utc_now();
        let before = log.entries.len();
        log.entries.retain(|e| !e.is_expired(now, config.entry_ttl));
        let purged = before - log.entries.len();

        let mut interrupted = 0;
        for entry in log.entries.iter_mut().filter(|e| e.status == MutationStatus::Syncing) {
            entry.status = MutationStatus::Pending;
            interrupted += 1;
        }
        log.entries.sort_by_key(|e| e.id);

        if purged > 0 || interrupted > 0 {
            persistence.save(&log).await?;
        }
        if purged > 0 {
            info!(purged, "Purged expired mutations on load");
        }
        if interrupted > 0 {
            warn!(interrupted, "Reset mutations left syncing by an interrupted pass");
        }

        let initial = SyncStatus {
            is_online: true,
            is_syncing: false,
            pending_count: log.count(MutationStatus::Pending),
            failed_count: log.count(MutationStatus::Failed),
            sync_progress: None,
        };
        let (status_tx, _) = watch::channel(initial);

        info!(entries = log.entries.len(), "Offline queue opened");
        Ok(Self {
            config,
            persistence,
            clock,
            state: Mutex::new(QueueState { log, progress: None, unsaved: false, context: None }),
            is_online: AtomicBool::new(true),
            is_syncing: AtomicBool::new(false),
            status_tx,
        })
    }

    /// Configuration the queue was opened with
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Append a mutation to the log and assign it the next sequence id
    ///
    /// Performs no network call.
    #[instrument(skip_all, fields(operation = %operation.as_ref()))]
    pub async fn enqueue(
        &self,
        operation: impl AsRef<str>,
        payload: serde_json::Value,
        context_key: Option<String>,
    ) -> QueueResult<QueuedMutation> {
        let mut state = self.state.lock().await;
        if state.log.entries.len() >= self.config.max_entries {
            warn!(max = self.config.max_entries, "Offline queue full, rejecting mutation");
            return Err(QueueError::CapacityExceeded(self.config.max_entries));
        }

        let id = state.log.next_sequence;
        let mutation = QueuedMutation::new(
            id,
            operation.as_ref(),
            payload,
            context_key,
            self.clock.utc_now(),
        );
        state.log.next_sequence += 1;
        state.log.entries.push(mutation.clone());
        if let Err(error) = self.persist(&mut state).await {
            state.log.entries.pop();
            state.log.next_sequence -= 1;
            return Err(error);
        }
        self.publish(&state);

        debug!(id, "Mutation queued");
        Ok(mutation)
    }

    /// Replay every pending and failed mutation in FIFO order
    ///
    /// Fails with [`QueueError::Offline`] when offline and with
    /// [`QueueError::SyncInProgress`] when another pass is running. If the
    /// device goes offline mid-pass, the remaining mutations are left
    /// untouched and counted as skipped.
    ///
    /// A failed write to the store does not stop the pass. The log is
    /// written again once every mutation has been attempted, and that write
    /// is the one whose error is returned.
    #[instrument(skip_all)]
    pub async fn sync<E>(&self, executor: &E) -> QueueResult<SyncReport>
    where
        E: MutationExecutor + ?Sized,
    {
        if !self.is_online() {
            return Err(QueueError::Offline);
        }
        if self
            .is_syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(QueueError::SyncInProgress);
        }
        let guard = SyncGuard { queue: self };

        let ids = self.begin_pass().await;
        let total = ids.len();
        let mut report = SyncReport::default();
        info!(total, "Sync pass started");

        for (index, id) in ids.iter().copied().enumerate() {
            if !self.is_online() {
                report.skipped = total - index;
                warn!(skipped = report.skipped, "Connectivity lost, stopping sync pass");
                break;
            }

            let Some(mutation) = self.claim(id).await else {
                // Removed by clear() or a context switch during the pass.
                continue;
            };

            let outcome = executor.execute(&mutation).await;

            let mut state = self.state.lock().await;
            match outcome {
                Ok(()) => {
                    if let Some(entry) = state.log.get_mut(id) {
                        entry.status = MutationStatus::Done;
                    }
                    state.log.entries.retain(|e| e.status != MutationStatus::Done);
                    report.succeeded += 1;
                    report.succeeded_ids.push(id);
                    debug!(id, operation = %mutation.operation, "Mutation replayed");
                }
                Err(error) => {
                    if let Some(entry) = state.log.get_mut(id) {
                        entry.mark_failed(error.to_string());
                    }
                    report.failed += 1;
                    report.failed_ids.push(id);
                    warn!(
                        id,
                        operation = %mutation.operation,
                        attempts = mutation.attempts,
                        error = %error,
                        "Mutation replay failed, keeping it queued"
                    );
                }
            }
            state.progress = Some(SyncProgress { current: index + 1, total });
            self.persist_or_defer(&mut state).await;
            self.publish(&state);
        }

        let mut state = self.state.lock().await;
        if state.unsaved {
            self.persist(&mut state).await?;
        }
        drop(state);
        drop(guard);

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            "Sync pass finished"
        );
        Ok(report)
    }

    /// Snapshot for status badges
    pub async fn status(&self) -> SyncStatus {
        let state = self.state.lock().await;
        self.snapshot(&state)
    }

    /// Watch channel carrying every status change
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    /// Last connectivity reported through [`set_online`](Self::set_online)
    pub fn is_online(&self) -> bool {
        self.is_online.load(Ordering::Acquire)
    }

    /// Whether a sync pass is running right now
    pub fn is_syncing(&self) -> bool {
        self.is_syncing.load(Ordering::Acquire)
    }

    /// Record connectivity; returns the previous value
    pub async fn set_online(&self, online: bool) -> bool {
        let previous = self.is_online.swap(online, Ordering::AcqRel);
        if previous != online {
            info!(online, "Connectivity changed");
            let state = self.state.lock().await;
            self.publish(&state);
        }
        previous
    }

    /// Discard mutations recorded under a context other than `current`
    ///
    /// Mutations without a context key are kept. Returns how many were
    /// discarded.
    #[instrument(skip(self))]
    pub async fn retain_context(&self, current: &str) -> QueueResult<usize> {
        let mut state = self.state.lock().await;
        let discarded = discard_foreign(&mut state.log, current);
        if discarded > 0 {
            self.persist(&mut state).await?;
            self.publish(&state);
            info!(discarded, "Discarded mutations from another context");
        }
        Ok(discarded)
    }

    /// Make `context` the one queued mutations must belong to
    ///
    /// Mutations recorded under another context are discarded now, and
    /// again at the start of every sync pass, so one queued after the switch
    /// never replays either. `None` lifts the restriction. Returns how many
    /// were discarded.
    #[instrument(skip(self))]
    pub async fn set_context(&self, context: Option<String>) -> QueueResult<usize> {
        let mut state = self.state.lock().await;
        let discarded = match context.as_deref() {
            Some(current) => discard_foreign(&mut state.log, current),
            None => 0,
        };
        state.context = context;
        if discarded > 0 {
            self.persist(&mut state).await?;
            self.publish(&state);
            info!(discarded, "Discarded mutations from another context");
        }
        Ok(discarded)
    }

    /// Context set through [`set_context`](Self::set_context)
    pub async fn context(&self) -> Option<String> {
        self.state.lock().await.context.clone()
    }

    /// Drop one mutation (for a manual "discard" action on a failed item)
    pub async fn discard(&self, id: u64) -> QueueResult<bool> {
        let mut state = self.state.lock().await;
        let before = state.log.entries.len();
        state.log.entries.retain(|e| e.id != id);
        let removed = state.log.entries.len() != before;
        if removed {
            self.persist(&mut state).await?;
            self.publish(&state);
        }
        Ok(removed)
    }

    /// Queued mutations in replay order
    pub async fn entries(&self) -> Vec<QueuedMutation> {
        self.state.lock().await.log.entries.clone()
    }

    /// Remove every mutation; sequence numbering continues
    pub async fn clear(&self) -> QueueResult<usize> {
        let mut state = self.state.lock().await;
        let removed = state.log.entries.len();
        state.log.entries.clear();
        self.persist(&mut state).await?;
        self.publish(&state);
        info!(removed, "Offline queue cleared");
        Ok(removed)
    }

    /// Purge expired entries and collect the ids to replay, in order
    ///
    /// Entries still marked syncing belong to a pass that was dropped before
    /// it finished; they go back to pending and are replayed in this one.
    async fn begin_pass(&self) -> Vec<u64> {
        let mut state = self.state.lock().await;
        let now = self.clock.utc_now();
        let ttl = self.config.entry_ttl;
        let before = state.log.entries.len();
        state.log.entries.retain(|e| !e.is_expired(now, ttl));
        let purged = before - state.log.entries.len();
        if purged > 0 {
            info!(purged, "Purged expired mutations before sync");
        }

        let foreign = match state.context.clone() {
            Some(current) => discard_foreign(&mut state.log, &current),
            None => 0,
        };
        if foreign > 0 {
            info!(discarded = foreign, "Discarded mutations from another context before sync");
        }

        let mut abandoned = 0;
        for entry in state.log.entries.iter_mut().filter(|e| e.status == MutationStatus::Syncing) {
            entry.status = MutationStatus::Pending;
            abandoned += 1;
        }
        if abandoned > 0 {
            warn!(abandoned, "Requeued mutations from an abandoned sync pass");
        }

        let ids: Vec<u64> =
            state.log.entries.iter().filter(|e| e.is_replayable()).map(|e| e.id).collect();
        state.progress = Some(SyncProgress { current: 0, total: ids.len() });
        if purged > 0 || foreign > 0 || abandoned > 0 || state.unsaved {
            self.persist_or_defer(&mut state).await;
        }
        self.publish(&state);
        ids
    }

    /// Mark one mutation as syncing and return a copy for the executor
    async fn claim(&self, id: u64) -> Option<QueuedMutation> {
        let mut state = self.state.lock().await;
        let now = self.clock.utc_now();
        let entry = state.log.get_mut(id)?;
        entry.mark_syncing(now);
        let claimed = entry.clone();
        self.persist_or_defer(&mut state).await;
        self.publish(&state);
        Some(claimed)
    }

    /// Write the whole log through to the store
    async fn persist(&self, state: &mut QueueState) -> QueueResult<()> {
        let result = self.persistence.save(&state.log).await;
        state.unsaved = result.is_err();
        result
    }

    /// Like [`persist`](Self::persist), but a failure only marks the log unsaved
    async fn persist_or_defer(&self, state: &mut QueueState) {
        if let Err(error) = self.persist(state).await {
            warn!(error = %error, "Queue log write failed, will retry");
        }
    }

    fn snapshot(&self, state: &QueueState) -> SyncStatus {
        SyncStatus {
            is_online: self.is_online(),
            is_syncing: self.is_syncing(),
            pending_count: state.log.count(MutationStatus::Pending)
                + state.log.count(MutationStatus::Syncing),
            failed_count: state.log.count(MutationStatus::Failed),
            sync_progress: if self.is_syncing() { state.progress } else { None },
        }
    }

    fn publish(&self, state: &QueueState) {
        self.status_tx.send_replace(self.snapshot(state));
    }
}

/// Drop entries tagged with a context other than `current`
fn discard_foreign(log: &mut QueueLog, current: &str) -> usize {
    let before = log.entries.len();
    log.entries.retain(|e| e.context_key.as_deref().map_or(true, |key| key == current));
    before - log.entries.len()
}
