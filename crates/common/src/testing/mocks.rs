//! Scripted implementations of the resilience-layer traits
//!
//! Every mock records what it was asked to do so tests can assert on call
//! counts and arguments after the fact.

// Mocks panic on poisoned locks; a poisoned lock already means a failed test.
#![allow(clippy::missing_panics_doc)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::auth::{FunctionCall, FunctionInvoker, InvokeError, RefreshError, Session, SessionRefresher};
use crate::error::CommonError;
use crate::storage::{KeyValueStore, MemoryStore, StorageError, StorageResult};
use crate::sync::{MutationExecutor, QueuedMutation};

/// Session refresher that either always succeeds or always fails
///
/// A successful refresh extends the expiry by `lifetime_secs` and hands out
/// a new access token (`access-refreshed-1`, `access-refreshed-2`, ...).
#[derive(Debug)]
pub struct MockSessionRefresher {
    lifetime_secs: Option<i64>,
    calls: AtomicUsize,
}

impl MockSessionRefresher {
    pub fn succeeding(lifetime_secs: i64) -> Self {
        Self { lifetime_secs: Some(lifetime_secs), calls: AtomicUsize::new(0) }
    }

    pub fn failing() -> Self {
        Self { lifetime_secs: None, calls: AtomicUsize::new(0) }
    }

    /// Number of refresh attempts so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionRefresher for MockSessionRefresher {
    async fn refresh(&self, session: &Session) -> Result<Session, RefreshError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let Some(lifetime) = self.lifetime_secs else {
            return Err(RefreshError::Rejected("refresh token revoked".to_string()));
        };
        Ok(Session::new(
            format!("access-refreshed-{n}"),
            session.refresh_token.clone(),
            session.expires_at + lifetime,
            session.user_id.clone(),
        ))
    }
}

/// One recorded backend invocation
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRecord {
    pub function: String,
    pub payload: Value,
    pub access_token: String,
    pub idempotency_key: Option<String>,
}

/// Backend invoker answering from a script
///
/// Responses are consumed in order; once the script runs out every call
/// succeeds with `null`.
#[derive(Debug, Default)]
pub struct MockFunctionInvoker {
    script: Mutex<VecDeque<Result<Value, InvokeError>>>,
    calls: Mutex<Vec<InvocationRecord>>,
}

impl MockFunctionInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_ok(self, value: Value) -> Self {
        self.script.lock().unwrap().push_back(Ok(value));
        self
    }

    pub fn respond_err(self, error: InvokeError) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    /// Queue a response on an invoker that is already shared
    pub fn push_response(&self, response: Result<Value, InvokeError>) {
        self.script.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> Vec<InvocationRecord> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FunctionInvoker for MockFunctionInvoker {
    async fn invoke(&self, call: FunctionCall<'_>, access_token: &str) -> Result<Value, InvokeError> {
        self.calls.lock().unwrap().push(InvocationRecord {
            function: call.name.to_string(),
            payload: call.payload.clone(),
            access_token: access_token.to_string(),
            idempotency_key: call.idempotency_key.map(str::to_string),
        });
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(Value::Null))
    }
}

/// Failure returned by [`RecordingExecutor`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("mutation {id} ({operation}) rejected")]
pub struct ExecutorFailure {
    pub id: u64,
    pub operation: String,
}

/// Mutation executor that records replay order
///
/// Mutations whose id or operation was registered with
/// [`fail_ids`](Self::fail_ids) or [`fail_operation`](Self::fail_operation)
/// fail; everything else succeeds.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    fail_ids: HashSet<u64>,
    fail_operations: HashSet<String>,
    executed: Mutex<Vec<u64>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_ids(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.fail_ids.extend(ids);
        self
    }

    pub fn fail_operation(mut self, operation: impl Into<String>) -> Self {
        self.fail_operations.insert(operation.into());
        self
    }

    /// Ids of every mutation handed to the executor, in replay order
    pub fn executed(&self) -> Vec<u64> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl MutationExecutor for RecordingExecutor {
    type Error = ExecutorFailure;

    async fn execute(&self, mutation: &QueuedMutation) -> Result<(), ExecutorFailure> {
        self.executed.lock().unwrap().push(mutation.id);
        if self.fail_ids.contains(&mutation.id) || self.fail_operations.contains(&mutation.operation)
        {
            return Err(ExecutorFailure { id: mutation.id, operation: mutation.operation.clone() });
        }
        Ok(())
    }
}

/// [`MemoryStore`] whose writes can be switched off
///
/// Reads keep working while writes are rejected, which is how a full disk
/// looks to the queue.
#[derive(Debug, Clone, Default)]
pub struct FailingWritesStore {
    inner: MemoryStore,
    reject: Arc<AtomicBool>,
}

impl FailingWritesStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self { inner, reject: Arc::default() }
    }

    pub fn reject_writes(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    fn check(&self, key: &str) -> StorageResult<()> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(StorageError::Common(CommonError::Storage {
                key: key.to_string(),
                message: "write rejected".to_string(),
            }));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FailingWritesStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String) -> StorageResult<()> {
        self.check(key)?;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.check(key)?;
        self.inner.remove(key).await
    }

    async fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.keys_with_prefix(prefix).await
    }
}
