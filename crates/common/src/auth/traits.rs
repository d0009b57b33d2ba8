//! Traits for session persistence, session refresh and backend invocation
//!
//! These traits are the seams between the guardian and the outside world:
//! the infra crate implements them over HTTP, tests use the mocks in
//! [`crate::testing`].

use async_trait::async_trait;
use serde_json::Value;

use super::errors::{InvokeError, RefreshError};
use super::types::Session;
use crate::storage::StorageResult;

/// Durable storage for the current session
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self) -> StorageResult<Option<Session>>;

    async fn save(&self, session: &Session) -> StorageResult<()>;

    async fn clear(&self) -> StorageResult<()>;
}

/// Exchanges a refresh token for a new session
#[async_trait]
pub trait SessionRefresher: Send + Sync {
    /// Refresh `session`
    ///
    /// Implementations must not mutate any stored state; the guardian
    /// persists the returned session.
    async fn refresh(&self, session: &Session) -> Result<Session, RefreshError>;
}

/// One call to a named backend function
#[derive(Debug, Clone, Copy)]
pub struct FunctionCall<'a> {
    pub name: &'a str,
    pub payload: &'a Value,
    /// Sent with replayed mutations so the backend can drop duplicates
    pub idempotency_key: Option<&'a str>,
}

impl<'a> FunctionCall<'a> {
    pub fn new(name: &'a str, payload: &'a Value) -> Self {
        Self { name, payload, idempotency_key: None }
    }

    pub fn with_idempotency_key(mut self, key: &'a str) -> Self {
        self.idempotency_key = Some(key);
        self
    }
}

/// Invokes a backend function with a bearer credential
#[async_trait]
pub trait FunctionInvoker: Send + Sync {
    async fn invoke(
        &self,
        call: FunctionCall<'_>,
        access_token: &str,
    ) -> Result<Value, InvokeError>;
}
