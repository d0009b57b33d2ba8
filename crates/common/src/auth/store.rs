//! Session store over the key-value storage abstraction

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::traits::SessionStore;
use super::types::Session;
use crate::storage::{namespaced, KeyValueStore, KeyValueStoreExt, StorageError, StorageResult};

/// Storage key of the persisted session
pub const SESSION_KEY: &str = "superapp:session";

/// [`SessionStore`] persisting the session as JSON under one key
#[derive(Clone)]
pub struct KeyValueSessionStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl KeyValueSessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store, key: SESSION_KEY.to_string() }
    }

    pub fn with_key(store: Arc<dyn KeyValueStore>, key: &str) -> Self {
        Self { store, key: namespaced(key) }
    }
}

#[async_trait]
impl SessionStore for KeyValueSessionStore {
    async fn load(&self) -> StorageResult<Option<Session>> {
        match self.store.get_json::<Session>(&self.key).await {
            Ok(session) => Ok(session),
            Err(StorageError::Corrupted { message, .. }) => {
                warn!(key = %self.key, error = %message, "Discarding unreadable session");
                self.store.remove(&self.key).await?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn save(&self, session: &Session) -> StorageResult<()> {
        self.store.set_json(&self.key, session).await?;
        debug!(user_id = %session.user_id, "Session persisted");
        Ok(())
    }

    async fn clear(&self) -> StorageResult<()> {
        self.store.remove(&self.key).await
    }
}
