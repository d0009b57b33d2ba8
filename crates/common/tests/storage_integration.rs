//! Integration tests for file-backed persistence
//!
//! Every durable component is exercised against a real [`FileStore`] in a
//! temporary directory and reopened to simulate an app restart.

#![cfg(feature = "test-utils")]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use superapp_common::auth::{KeyValueSessionStore, SessionStore};
use superapp_common::sync::queue::DEFAULT_QUEUE_KEY;
use superapp_common::sync::CartStore;
use superapp_common::testing::{temp_file_store, MockClock, RecordingExecutor};
use superapp_common::{
    FileStore, KeyValueStore, MutationStatus, OfflineQueue, QueueConfig, Session, UserDataCache,
};

async fn queue(store: &FileStore, clock: &MockClock) -> OfflineQueue {
    OfflineQueue::open(QueueConfig::default(), Arc::new(store.clone()), Arc::new(clock.clone()))
        .await
        .expect("queue opens")
}

/// Validates that queued mutations survive a restart.
///
/// # Test Steps
/// 1. Enqueue two mutations and fail one sync
/// 2. Reopen the queue on a new store handle over the same directory
/// 3. Verify order, status and sequence numbering are preserved
#[tokio::test]
async fn test_queue_survives_restart() {
    let (dir, store) = temp_file_store().await.unwrap();
    let clock = MockClock::new();
    {
        let q = queue(&store, &clock).await;
        q.enqueue("create-order", json!({"total": 12}), None).await.unwrap();
        q.enqueue("rate-driver", json!({"stars": 5}), None).await.unwrap();
        q.sync(&RecordingExecutor::new().fail_ids([1])).await.unwrap();
    }

    let reopened_store = FileStore::open(dir.path()).await.unwrap();
    let q = queue(&reopened_store, &clock).await;
    let entries = q.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].operation, "create-order");
    assert_eq!(entries[0].status, MutationStatus::Failed);

    let next = q.enqueue("tip", json!(2), None).await.unwrap();
    assert_eq!(next.id, 3);
}

/// Validates recovery from a corrupted queue log.
#[tokio::test]
async fn test_corrupted_queue_log_quarantined() {
    let (_dir, store) = temp_file_store().await.unwrap();
    store.set(DEFAULT_QUEUE_KEY, "{not json".to_string()).await.unwrap();

    let q = queue(&store, &MockClock::new()).await;
    assert!(q.entries().await.is_empty());
    let quarantined = store.get(&format!("{DEFAULT_QUEUE_KEY}:corrupt")).await.unwrap();
    assert_eq!(quarantined.as_deref(), Some("{not json"));
}

/// Validates session and cart persistence on disk.
///
/// # Test Steps
/// 1. Save a session and a cart
/// 2. Reload both through fresh handles
/// 3. Verify the cart is scoped to its context
#[tokio::test]
async fn test_session_and_cart_round_trip_on_disk() {
    let (dir, store) = temp_file_store().await.unwrap();
    let clock = MockClock::at_unix_seconds(1_760_000_000);
    let session = Session::new("at", Some("rt".into()), 1_760_003_600, "u-9");
    KeyValueSessionStore::new(Arc::new(store.clone())).save(&session).await.unwrap();
    let cart: CartStore<Value> = CartStore::new(Arc::new(store.clone()), Arc::new(clock.clone()));
    cart.save(&[json!({"sku": "sushi"})], "restaurant-3").await.unwrap();

    let reopened: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(dir.path()).await.unwrap());
    let loaded = KeyValueSessionStore::new(reopened.clone()).load().await.unwrap();
    assert_eq!(loaded, Some(session));

    let cart: CartStore<Value> = CartStore::new(reopened, Arc::new(clock));
    assert_eq!(cart.load("restaurant-3").await.unwrap(), vec![json!({"sku": "sushi"})]);
}

/// Validates per-user cache entries on disk.
#[tokio::test]
async fn test_user_cache_on_disk() {
    let (_dir, store) = temp_file_store().await.unwrap();
    let clock = MockClock::new();
    let cache =
        UserDataCache::new(Arc::new(store.clone()), Arc::new(clock.clone()), Duration::from_secs(60));

    cache.put("wallet", &json!({"balance": 40}), Some("u-1")).await.unwrap();
    assert_eq!(cache.get::<Value>("wallet", Some("u-1")).await, Some(json!({"balance": 40})));

    clock.advance(Duration::from_secs(61));
    assert_eq!(cache.get::<Value>("wallet", Some("u-1")).await, None);
    assert!(store.keys_with_prefix("superapp:cache:").await.unwrap().is_empty());
}
