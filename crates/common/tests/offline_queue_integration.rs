//! Integration tests for the offline queue and cart store
//!
//! Covers FIFO replay without head-of-line blocking, TTL expiry of queued
//! work and carts, and connectivity changes during a pass.

#![cfg(feature = "test-utils")]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use superapp_common::sync::CartStore;
use superapp_common::testing::{ExecutorFailure, MockClock, RecordingExecutor};
use superapp_common::{
    MemoryStore, MutationExecutor, MutationStatus, OfflineQueue, QueueConfig, QueueError,
    QueuedMutation,
};
use tokio::sync::Notify;

async fn open(store: &MemoryStore, clock: &MockClock) -> Arc<OfflineQueue> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    Arc::new(
        OfflineQueue::open(QueueConfig::default(), Arc::new(store.clone()), Arc::new(clock.clone()))
            .await
            .expect("queue opens"),
    )
}

/// Executor that takes the device offline after replaying one mutation
struct DropsConnection {
    queue: Arc<OfflineQueue>,
    inner: RecordingExecutor,
}

#[async_trait]
impl MutationExecutor for DropsConnection {
    type Error = ExecutorFailure;

    async fn execute(&self, mutation: &QueuedMutation) -> Result<(), ExecutorFailure> {
        let result = self.inner.execute(mutation).await;
        self.queue.set_online(false).await;
        result
    }
}

/// Executor that blocks until released
struct Gated {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl MutationExecutor for Gated {
    type Error = ExecutorFailure;

    async fn execute(&self, _mutation: &QueuedMutation) -> Result<(), ExecutorFailure> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(())
    }
}

/// Validates ordered replay with a failing middle mutation.
///
/// # Test Steps
/// 1. Enqueue M1, M2, M3 while offline
/// 2. Go online and sync with M2 failing
/// 3. Verify the replay order was M1, M2, M3 and only M2 remains
#[tokio::test]
async fn test_fifo_replay_without_head_of_line_blocking() {
    let store = MemoryStore::new();
    let clock = MockClock::new();
    let queue = open(&store, &clock).await;
    queue.set_online(false).await;

    for n in 1..=3 {
        queue.enqueue("update-order", json!({ "n": n }), None).await.unwrap();
    }
    assert_eq!(queue.status().await.pending_count, 3);

    assert!(!queue.set_online(true).await);
    let executor = RecordingExecutor::new().fail_ids([2]);
    let report = queue.sync(&executor).await.unwrap();

    assert_eq!(executor.executed(), vec![1, 2, 3]);
    assert_eq!(report.succeeded_ids, vec![1, 3]);
    assert_eq!(report.failed_ids, vec![2]);

    let remaining = queue.entries().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, 2);
    assert_eq!(remaining[0].status, MutationStatus::Failed);
    assert!(remaining[0].last_error.as_deref().unwrap_or_default().contains("rejected"));

    let status = queue.status().await;
    assert_eq!(status.failed_count, 1);
    assert_eq!(status.pending_count, 0);
    assert!(!status.is_syncing);
    assert!(status.sync_progress.is_none());
}

/// Validates that failed mutations are retried on the next pass.
#[tokio::test]
async fn test_failed_mutation_retried_next_pass() {
    let store = MemoryStore::new();
    let clock = MockClock::new();
    let queue = open(&store, &clock).await;
    queue.enqueue("a", json!(1), None).await.unwrap();
    queue.enqueue("b", json!(2), None).await.unwrap();

    let first = RecordingExecutor::new().fail_operation("b");
    queue.sync(&first).await.unwrap();

    let second = RecordingExecutor::new();
    let report = queue.sync(&second).await.unwrap();
    assert_eq!(second.executed(), vec![2]);
    assert_eq!(report.succeeded, 1);
    assert!(queue.entries().await.is_empty());
}

/// Validates that TTL-expired mutations are purged without replay.
#[tokio::test]
async fn test_expired_mutations_never_replayed() {
    let store = MemoryStore::new();
    let clock = MockClock::new();
    let queue = open(&store, &clock).await;
    queue.enqueue("stale", json!(1), None).await.unwrap();

    clock.advance(Duration::from_secs(24 * 3600 + 1));
    queue.enqueue("fresh", json!(2), None).await.unwrap();

    let executor = RecordingExecutor::new();
    queue.sync(&executor).await.unwrap();
    assert_eq!(executor.executed(), vec![2]);
    assert!(queue.entries().await.is_empty());
}

/// Validates that a cart older than 24 hours restores empty.
///
/// # Test Steps
/// 1. Save a cart and queue a mutation for the same context
/// 2. Advance the clock past 24 hours
/// 3. Verify the cart is empty and the mutation is never replayed
#[tokio::test]
async fn test_stale_cart_and_queue_discarded() {
    let store = MemoryStore::new();
    let clock = MockClock::new();
    let cart: CartStore<serde_json::Value> =
        CartStore::new(Arc::new(store.clone()), Arc::new(clock.clone()));
    cart.save(&[json!({"sku": "pizza", "qty": 1})], "restaurant-7").await.unwrap();
    let queue = open(&store, &clock).await;
    queue
        .enqueue("add-to-cart", json!({"sku": "pizza"}), Some("restaurant-7".into()))
        .await
        .unwrap();

    clock.advance(Duration::from_secs(25 * 3600));
    assert!(cart.load("restaurant-7").await.unwrap().is_empty());

    let reopened = open(&store, &clock).await;
    assert!(reopened.entries().await.is_empty());
    let executor = RecordingExecutor::new();
    reopened.sync(&executor).await.unwrap();
    assert!(executor.executed().is_empty());
}

/// Validates that connectivity loss stops the pass.
///
/// # Test Steps
/// 1. Queue three mutations
/// 2. Sync with an executor that drops the connection after the first
/// 3. Verify the rest are skipped, kept pending, and a later sync is refused
#[tokio::test]
async fn test_connectivity_lost_mid_pass() {
    let store = MemoryStore::new();
    let clock = MockClock::new();
    let queue = open(&store, &clock).await;
    for n in 1..=3 {
        queue.enqueue("op", json!(n), None).await.unwrap();
    }

    let executor = DropsConnection { queue: queue.clone(), inner: RecordingExecutor::new() };
    let report = queue.sync(&executor).await.unwrap();

    assert_eq!(report.succeeded_ids, vec![1]);
    assert_eq!(report.skipped, 2);
    assert_eq!(executor.inner.executed(), vec![1]);
    let remaining = queue.entries().await;
    assert!(remaining.iter().all(|m| m.status == MutationStatus::Pending));
    assert!(matches!(queue.sync(&RecordingExecutor::new()).await, Err(QueueError::Offline)));
}

/// Validates that overlapping passes are refused while enqueue stays open.
#[tokio::test]
async fn test_single_sync_pass_at_a_time() {
    let store = MemoryStore::new();
    let clock = MockClock::new();
    let queue = open(&store, &clock).await;
    queue.enqueue("op", json!(1), None).await.unwrap();

    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let gated = Gated { entered: entered.clone(), release: release.clone() };
    let pass = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.sync(&gated).await })
    };

    entered.notified().await;
    assert!(queue.is_syncing());
    assert!(matches!(
        queue.sync(&RecordingExecutor::new()).await,
        Err(QueueError::SyncInProgress)
    ));
    let queued_meanwhile = queue.enqueue("op", json!(2), None).await.unwrap();
    assert_eq!(queued_meanwhile.id, 2);

    release.notify_one();
    let report = pass.await.unwrap().unwrap();
    assert_eq!(report.succeeded_ids, vec![1]);
    assert!(!queue.is_syncing());
    assert_eq!(queue.entries().await.len(), 1);
}

/// Validates the status channel tracks enqueue and sync.
#[tokio::test]
async fn test_status_watch_updates() {
    let store = MemoryStore::new();
    let clock = MockClock::new();
    let queue = open(&store, &clock).await;
    let mut status = queue.subscribe();

    queue.enqueue("op", json!(1), None).await.unwrap();
    status.changed().await.unwrap();
    assert_eq!(status.borrow_and_update().pending_count, 1);

    queue.set_online(false).await;
    assert!(!status.borrow_and_update().is_online);

    queue.set_online(true).await;
    queue.sync(&RecordingExecutor::new()).await.unwrap();
    let last = status.borrow_and_update().clone();
    assert_eq!(last.pending_count, 0);
    assert!(last.is_online);
}

/// Validates context scoping of queued work.
#[tokio::test]
async fn test_retain_context_discards_foreign_mutations() {
    let store = MemoryStore::new();
    let clock = MockClock::new();
    let queue = open(&store, &clock).await;
    queue.enqueue("add", json!(1), Some("r1".into())).await.unwrap();
    queue.enqueue("add", json!(2), Some("r2".into())).await.unwrap();
    queue.enqueue("profile", json!(3), None).await.unwrap();

    assert_eq!(queue.retain_context("r2").await.unwrap(), 1);
    let ids: Vec<u64> = queue.entries().await.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![2, 3]);
}
