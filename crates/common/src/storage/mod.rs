//! Key-value storage abstraction
//!
//! The offline queue, cart store, session store and user cache persist
//! JSON-serialized state under namespaced string keys. The mechanism behind
//! those keys is swappable:
//!
//! - [`MemoryStore`]: in-process map, used in tests and ephemeral sessions
//! - [`FileStore`]: one JSON file per key with atomic replace on write
//!
//! Typed access goes through [`KeyValueStoreExt`], which is implemented for
//! every store (including `dyn KeyValueStore`).

pub mod error;
pub mod file;
pub mod keys;
pub mod memory;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use keys::{namespaced, user_scoped, NAMESPACE};
pub use memory::MemoryStore;

/// Async string key-value store
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the raw value stored under `key`
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Replace the value stored under `key`
    async fn set(&self, key: &str, value: String) -> StorageResult<()>;

    /// Delete `key`; removing a missing key is not an error
    async fn remove(&self, key: &str) -> StorageResult<()>;

    /// All keys starting with `prefix`, sorted
    async fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>>;
}

/// JSON helpers layered over any [`KeyValueStore`]
#[async_trait]
pub trait KeyValueStoreExt: KeyValueStore {
    /// Read and deserialize `key`
    ///
    /// A value that no longer parses is reported as
    /// [`StorageError::Corrupted`] so callers can decide to discard it.
    async fn get_json<T>(&self, key: &str) -> StorageResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StorageError::corrupted(key, e.to_string())),
            None => Ok(None),
        }
    }

    /// Serialize and write `value` under `key`
    async fn set_json<T>(&self, key: &str, value: &T) -> StorageResult<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        let raw = serde_json::to_string(value)?;
        self.set(key, raw).await
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}
