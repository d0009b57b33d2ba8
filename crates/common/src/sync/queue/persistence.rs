//! Write-through persistence of the mutation log

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use super::errors::QueueResult;
use super::types::{QueueLog, QUEUE_LOG_VERSION};
use crate::storage::{KeyValueStore, KeyValueStoreExt, StorageError};

/// Suffix of the key an unreadable log is moved to
const CORRUPT_SUFFIX: &str = ":corrupt";

/// Loads and saves the [`QueueLog`] under one storage key
#[derive(Clone)]
pub struct QueuePersistence {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl QueuePersistence {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self { store, key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the log, starting empty when nothing is stored
    ///
    /// An unreadable log is moved aside to `<key>:corrupt` and replaced by an
    /// empty one, so a bad write never blocks new mutations.
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn load(&self) -> QueueResult<QueueLog> {
        match self.store.get_json::<QueueLog>(&self.key).await {
            Ok(Some(log)) => {
                if log.version > QUEUE_LOG_VERSION {
                    warn!(version = log.version, "Queue log written by a newer version");
                }
                debug!(entries = log.entries.len(), "Loaded queue log");
                Ok(log)
            }
            Ok(None) => Ok(QueueLog::default()),
            Err(StorageError::Corrupted { message, .. }) => {
                warn!(error = %message, "Queue log unreadable, moving it aside");
                if let Some(raw) = self.store.get(&self.key).await? {
                    let backup = format!("{}{CORRUPT_SUFFIX}", self.key);
                    self.store.set(&backup, raw).await?;
                }
                self.store.remove(&self.key).await?;
                Ok(QueueLog::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the stored log with `log`
    #[instrument(skip(self, log), fields(key = %self.key, entries = log.entries.len()))]
    pub async fn save(&self, log: &QueueLog) -> QueueResult<()> {
        self.store.set_json(&self.key, log).await?;
        Ok(())
    }

    /// Delete the stored log
    pub async fn remove(&self) -> QueueResult<()> {
        self.store.remove(&self.key).await?;
        Ok(())
    }
}
