//! Context-scoped cart persistence
//!
//! A cart belongs to exactly one context (for example the restaurant the
//! items were picked from). A persisted cart is only restored when its
//! context matches the current one and it has not expired; otherwise it is
//! deleted and an empty cart is returned.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::storage::{KeyValueStore, KeyValueStoreExt, StorageError, StorageResult};
use crate::time::Clock;

/// Storage key of the persisted cart
pub const DEFAULT_CART_KEY: &str = "superapp:cart";

/// Default cart lifetime
pub const DEFAULT_CART_TTL: Duration = Duration::from_secs(24 * 3600);

/// Persisted cart envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartEnvelope<T> {
    pub items: Vec<T>,
    pub context_key: String,
    pub expires_at: DateTime<Utc>,
}

/// Why a persisted cart was not restored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Discard {
    Expired,
    ContextChanged,
    Unreadable,
}

/// Cart persistence with context and TTL checks on load
pub struct CartStore<T> {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    key: String,
    ttl: Duration,
    _items: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for CartStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartStore").field("key", &self.key).field("ttl", &self.ttl).finish()
    }
}

impl<T> CartStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_options(store, clock, DEFAULT_CART_KEY, DEFAULT_CART_TTL)
    }

    pub fn with_options(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        key: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self { store, clock, key: key.into(), ttl, _items: PhantomData }
    }

    /// Restore the cart for `current_context`
    ///
    /// Returns an empty cart (and deletes the stored one) when the stored
    /// cart belongs to another context, has expired, or cannot be read.
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn load(&self, current_context: &str) -> StorageResult<Vec<T>> {
        let envelope = match self.store.get_json::<CartEnvelope<T>>(&self.key).await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => return Ok(Vec::new()),
            Err(StorageError::Corrupted { message, .. }) => {
                warn!(error = %message, "Stored cart unreadable");
                return self.discard(Discard::Unreadable).await;
            }
            Err(e) => return Err(e),
        };

        if self.clock.utc_now() >= envelope.expires_at {
            return self.discard(Discard::Expired).await;
        }
        if envelope.context_key != current_context {
            debug!(
                stored = %envelope.context_key,
                current = current_context,
                "Cart belongs to another context"
            );
            return self.discard(Discard::ContextChanged).await;
        }

        debug!(items = envelope.items.len(), "Cart restored");
        Ok(envelope.items)
    }

    /// Persist `items` for `context_key`, restarting the TTL
    pub async fn save(&self, items: &[T], context_key: &str) -> StorageResult<()> {
        let expires_at = self.clock.utc_now()
            + chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::days(1));
        let envelope = CartEnvelope::<&T> {
            items: items.iter().collect(),
            context_key: context_key.to_string(),
            expires_at,
        };
        self.store.set_json(&self.key, &envelope).await
    }

    pub async fn clear(&self) -> StorageResult<()> {
        self.store.remove(&self.key).await
    }

    async fn discard(&self, reason: Discard) -> StorageResult<Vec<T>> {
        info!(?reason, "Discarding stored cart");
        self.store.remove(&self.key).await?;
        Ok(Vec::new())
    }
}
