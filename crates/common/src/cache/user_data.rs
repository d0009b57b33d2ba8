use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::stats::{CacheStats, StatsRecorder};
use crate::storage::{KeyValueStore, KeyValueStoreExt, StorageError, StorageResult};
use crate::time::Clock;

/// Prefix of every cache key
pub const CACHE_PREFIX: &str = "superapp:cache:";

/// Default lifetime of a cached value
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Stored envelope around a cached value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEnvelope<T> {
    pub data: T,
    /// Write time in milliseconds since the UNIX epoch
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "userId")]
    pub user_id: Option<String>,
}

/// TTL- and owner-checked cache of per-user data
pub struct UserDataCache {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    stats: StatsRecorder,
}

impl std::fmt::Debug for UserDataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDataCache").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl UserDataCache {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { store, clock, ttl, stats: StatsRecorder::default() }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cache `data` under `name`, owned by `user_id` when given
    pub async fn put<T>(&self, name: &str, data: &T, user_id: Option<&str>) -> StorageResult<()>
    where
        T: Serialize + Sync,
    {
        let envelope = CacheEnvelope {
            data,
            timestamp: self.clock.millis_since_epoch(),
            user_id: user_id.map(str::to_string),
        };
        self.store.set_json(&key(name), &envelope).await
    }

    /// Read `name` for `current_user`
    ///
    /// Expired entries and entries owned by another user are deleted and
    /// read as a miss. Storage failures are logged and read as a miss.
    pub async fn get<T>(&self, name: &str, current_user: Option<&str>) -> Option<T>
    where
        T: DeserializeOwned + Send,
    {
        let key = key(name);
        let envelope = match self.store.get_json::<CacheEnvelope<T>>(&key).await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => {
                self.stats.miss();
                return None;
            }
            Err(StorageError::Corrupted { message, .. }) => {
                warn!(%key, error = %message, "Dropping unreadable cache entry");
                self.remove_quietly(&key).await;
                self.stats.miss();
                return None;
            }
            Err(e) => {
                warn!(%key, error = %e, "Cache read failed");
                self.stats.miss();
                return None;
            }
        };

        let age_ms = self.clock.millis_since_epoch().saturating_sub(envelope.timestamp);
        if u128::from(age_ms) > self.ttl.as_millis() {
            debug!(%key, age_ms, "Cache entry expired");
            self.remove_quietly(&key).await;
            self.stats.expired();
            return None;
        }

        if let Some(owner) = envelope.user_id.as_deref() {
            if current_user != Some(owner) {
                debug!(%key, "Cache entry belongs to another user");
                self.remove_quietly(&key).await;
                self.stats.foreign();
                return None;
            }
        }

        self.stats.hit();
        Some(envelope.data)
    }

    pub async fn invalidate(&self, name: &str) -> StorageResult<()> {
        self.store.remove(&key(name)).await
    }

    /// Remove every cached entry; returns how many were removed
    pub async fn clear_all(&self) -> StorageResult<usize> {
        let keys = self.store.keys_with_prefix(CACHE_PREFIX).await?;
        for key in &keys {
            self.store.remove(key).await?;
        }
        debug!(removed = keys.len(), "Cache cleared");
        Ok(keys.len())
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    async fn remove_quietly(&self, key: &str) {
        if let Err(e) = self.store.remove(key).await {
            warn!(%key, error = %e, "Failed to remove stale cache entry");
        }
    }
}

fn key(name: &str) -> String {
    format!("{CACHE_PREFIX}{name}")
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::storage::MemoryStore;
    use crate::time::MockClock;

    fn cache(store: &MemoryStore, clock: &MockClock) -> UserDataCache {
        UserDataCache::new(Arc::new(store.clone()), Arc::new(clock.clone()), DEFAULT_CACHE_TTL)
    }

    /// Validates a fresh read by the owning user.
    #[tokio::test]
    async fn test_owner_hit() {
        let store = MemoryStore::new();
        let clock = MockClock::new();
        let cache = cache(&store, &clock);
        cache.put("orders", &json!([1, 2]), Some("u1")).await.unwrap();

        let value: Option<Value> = cache.get("orders", Some("u1")).await;
        assert_eq!(value, Some(json!([1, 2])));
        assert_eq!(cache.stats().hits, 1);
    }

    /// Validates the envelope wire format.
    #[tokio::test]
    async fn test_envelope_format() {
        let store = MemoryStore::new();
        let clock = MockClock::at_unix_seconds(1_700_000_000);
        cache(&store, &clock).put("x", &json!(1), Some("u1")).await.unwrap();

        let raw: Value =
            serde_json::from_str(&store.get("superapp:cache:x").await.unwrap().unwrap()).unwrap();
        assert_eq!(raw, json!({"data": 1, "timestamp": 1_700_000_000_000u64, "userId": "u1"}));
    }

    /// Validates TTL expiry.
    ///
    /// Assertions:
    /// - Confirms a read past the TTL misses.
    /// - Confirms the entry is deleted.
    #[tokio::test]
    async fn test_expired_entry_removed() {
        let store = MemoryStore::new();
        let clock = MockClock::new();
        let cache = cache(&store, &clock);
        cache.put("orders", &json!(1), None).await.unwrap();

        clock.advance(DEFAULT_CACHE_TTL + Duration::from_millis(1));
        assert_eq!(cache.get::<Value>("orders", None).await, None);
        assert!(store.is_empty().await);
        assert_eq!(cache.stats().expired, 1);
    }

    /// Validates ownership checks.
    #[tokio::test]
    async fn test_foreign_user_rejected() {
        let store = MemoryStore::new();
        let clock = MockClock::new();
        let cache = cache(&store, &clock);
        cache.put("orders", &json!(1), Some("u1")).await.unwrap();

        assert_eq!(cache.get::<Value>("orders", Some("u2")).await, None);
        assert_eq!(cache.get::<Value>("orders", Some("u1")).await, None);
        assert_eq!(cache.stats().owner_mismatches, 1);
    }

    /// Validates shared entries and clearing.
    ///
    /// Assertions:
    /// - Confirms an entry without owner is readable anonymously.
    /// - Confirms `clear_all` only removes cache keys.
    #[tokio::test]
    async fn test_shared_entries_and_clear_all() {
        let store = MemoryStore::new();
        let clock = MockClock::new();
        let cache = cache(&store, &clock);
        cache.put("catalog", &json!(["a"]), None).await.unwrap();
        cache.put("orders", &json!(1), Some("u1")).await.unwrap();
        store.set("superapp:session", "{}".to_string()).await.unwrap();

        assert!(cache.get::<Value>("catalog", None).await.is_some());
        assert_eq!(cache.clear_all().await.unwrap(), 2);
        assert_eq!(store.keys_with_prefix("superapp:").await.unwrap(), vec!["superapp:session"]);

        cache.put("x", &json!(1), None).await.unwrap();
        cache.invalidate("x").await.unwrap();
        assert_eq!(cache.get::<Value>("x", None).await, None);
    }
}
