//! Guarded backend invocation
//!
//! Composes the session guardian, the circuit breaker and a
//! [`FunctionInvoker`] into the single call path used by the application:
//!
//! ```text
//! get_valid_session ──► breaker.execute(invoke) ──► Ok
//!        │                      │
//!        ▼                      ├─► CircuitOpen            ──► CallError::CircuitOpen
//!  SessionExpired               └─► Unauthorized, retries left
//!                                     └─► force_refresh ──► invoke again
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, instrument, warn};

use super::errors::{CallError, InvokeError};
use super::guardian::SessionGuardian;
use super::retry_policy::AuthRetryPolicy;
use super::traits::{FunctionCall, FunctionInvoker};
use crate::resilience::{CircuitBreaker, ResilienceError};
use crate::sync::{MutationExecutor, QueuedMutation};
use crate::time::{Clock, SystemClock};

/// Backend call path with session refresh and circuit breaking
pub struct GuardedInvoker<C: Clock = SystemClock> {
    guardian: Arc<SessionGuardian>,
    breaker: CircuitBreaker<C>,
    invoker: Arc<dyn FunctionInvoker>,
    policy: AuthRetryPolicy,
}

impl<C: Clock> Clone for GuardedInvoker<C> {
    fn clone(&self) -> Self {
        Self {
            guardian: Arc::clone(&self.guardian),
            breaker: self.breaker.clone(),
            invoker: Arc::clone(&self.invoker),
            policy: self.policy,
        }
    }
}

impl<C: Clock> std::fmt::Debug for GuardedInvoker<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedInvoker")
            .field("breaker", &self.breaker)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<C: Clock> GuardedInvoker<C> {
    pub fn new(
        guardian: Arc<SessionGuardian>,
        breaker: CircuitBreaker<C>,
        invoker: Arc<dyn FunctionInvoker>,
    ) -> Self {
        Self { guardian, breaker, invoker, policy: AuthRetryPolicy::default() }
    }

    pub fn with_policy(mut self, policy: AuthRetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn breaker(&self) -> &CircuitBreaker<C> {
        &self.breaker
    }

    pub fn guardian(&self) -> &Arc<SessionGuardian> {
        &self.guardian
    }

    /// Invoke a backend function with a valid session
    pub async fn invoke_with_session(
        &self,
        function: &str,
        payload: Value,
    ) -> Result<Value, CallError> {
        self.invoke_call(FunctionCall::new(function, &payload)).await
    }

    /// Invoke a prepared call with a valid session
    ///
    /// An authorization failure triggers a forced refresh and another
    /// attempt while the retry policy allows it; the next authorization
    /// failure is terminal.
    #[instrument(skip(self, call), fields(function = call.name))]
    pub async fn invoke_call(&self, call: FunctionCall<'_>) -> Result<Value, CallError> {
        let mut session =
            self.guardian.get_valid_session().await.ok_or(CallError::SessionExpired)?;
        let mut retries_spent = 0;

        loop {
            let token = session.access_token.clone();
            let outcome =
                self.breaker.execute(|| self.invoker.invoke(call, token.as_str())).await;

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(ResilienceError::CircuitOpen) => {
                    warn!(function = call.name, "Call rejected, circuit open");
                    return Err(CallError::CircuitOpen);
                }
                Err(ResilienceError::OperationFailed { source }) => source,
            };

            if self.policy.should_retry(retries_spent, &error) {
                retries_spent += 1;
                info!(function = call.name, retries_spent, "Credential rejected, refreshing session");
                session =
                    self.guardian.force_refresh(&token).await.ok_or(CallError::SessionExpired)?;
                continue;
            }

            return Err(terminal(error));
        }
    }
}

fn terminal(error: InvokeError) -> CallError {
    if error.is_unauthorized() {
        CallError::Unauthorized(error)
    } else {
        CallError::Failed(error)
    }
}

#[async_trait]
impl<C: Clock + 'static> MutationExecutor for GuardedInvoker<C> {
    type Error = CallError;

    async fn execute(&self, mutation: &QueuedMutation) -> Result<(), CallError> {
        let call = FunctionCall::new(&mutation.operation, &mutation.payload)
            .with_idempotency_key(&mutation.idempotency_key);
        self.invoke_call(call).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::auth::guardian::SessionGuardianConfig;
    use crate::auth::store::KeyValueSessionStore;
    use crate::auth::types::Session;
    use crate::resilience::{CircuitBreakerConfig, CircuitState};
    use crate::storage::MemoryStore;
    use crate::testing::{MockFunctionInvoker, MockSessionRefresher};
    use crate::time::MockClock;

    const NOW: u64 = 1_700_000_000;

    struct Harness {
        invoker: GuardedInvoker<MockClock>,
        backend: Arc<MockFunctionInvoker>,
        refresher: Arc<MockSessionRefresher>,
    }

    async fn harness(backend: MockFunctionInvoker, threshold: u32) -> Harness {
        let clock = MockClock::at_unix_seconds(NOW);
        let refresher = Arc::new(MockSessionRefresher::succeeding(3600));
        let guardian = Arc::new(SessionGuardian::with_clock(
            Arc::new(KeyValueSessionStore::new(Arc::new(MemoryStore::new()))),
            refresher.clone(),
            SessionGuardianConfig::default(),
            Arc::new(clock.clone()),
        ));
        guardian
            .store_session(Session::new("token-0", Some("r".into()), NOW as i64 + 3600, "u1"))
            .await
            .unwrap();

        let config = CircuitBreakerConfig::builder()
            .failure_threshold(threshold)
            .cooldown(Duration::from_secs(30))
            .build()
            .unwrap();
        let breaker = CircuitBreaker::with_clock(config, clock).unwrap();
        let backend = Arc::new(backend);
        Harness {
            invoker: GuardedInvoker::new(guardian, breaker, backend.clone()),
            backend,
            refresher,
        }
    }

    /// Validates the happy path.
    ///
    /// Assertions:
    /// - Confirms the backend receives the current bearer token.
    #[tokio::test]
    async fn test_invoke_success() {
        let h = harness(MockFunctionInvoker::new().respond_ok(json!({"ok": true})), 5).await;
        let value = h.invoker.invoke_with_session("create-order", json!({"n": 1})).await.unwrap();
        assert_eq!(value, json!({"ok": true}));

        let calls = h.backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function, "create-order");
        assert_eq!(calls[0].access_token, "token-0");
    }

    /// Validates a single refresh-and-retry after a 401.
    ///
    /// Assertions:
    /// - Confirms the retry carries the refreshed token.
    /// - Confirms exactly one refresh.
    #[tokio::test]
    async fn test_unauthorized_then_success() {
        let backend = MockFunctionInvoker::new()
            .respond_err(InvokeError::from_status(401, "jwt expired"))
            .respond_ok(json!(1));
        let h = harness(backend, 5).await;

        assert_eq!(h.invoker.invoke_with_session("f", json!({})).await.unwrap(), json!(1));
        let calls = h.backend.calls();
        assert_eq!(calls.len(), 2);
        assert_ne!(calls[1].access_token, "token-0");
        assert_eq!(h.refresher.calls(), 1);
    }

    /// Validates that two 401s yield one refresh and a terminal error.
    #[tokio::test]
    async fn test_two_unauthorized_is_terminal() {
        let backend = MockFunctionInvoker::new()
            .respond_err(InvokeError::from_status(401, "a"))
            .respond_err(InvokeError::from_status(401, "b"));
        let h = harness(backend, 5).await;

        let err = h.invoker.invoke_with_session("f", json!({})).await.unwrap_err();
        assert!(matches!(err, CallError::Unauthorized(_)));
        assert_eq!(h.refresher.calls(), 1);
        assert_eq!(h.backend.calls().len(), 2);
    }

    /// Validates that non-authorization errors are not retried.
    #[tokio::test]
    async fn test_server_error_not_retried() {
        let backend =
            MockFunctionInvoker::new().respond_err(InvokeError::from_status(500, "boom"));
        let h = harness(backend, 5).await;

        let err = h.invoker.invoke_with_session("f", json!({})).await.unwrap_err();
        assert!(matches!(err, CallError::Failed(InvokeError::Server { status: 500, .. })));
        assert_eq!(h.refresher.calls(), 0);
        assert_eq!(h.invoker.breaker().stats().failure_count, 1);
    }

    /// Validates circuit-open short-circuiting.
    ///
    /// Assertions:
    /// - Confirms the breaker opens at the threshold.
    /// - Confirms the next call returns `CircuitOpen` without a backend call.
    #[tokio::test]
    async fn test_open_breaker_short_circuits() {
        let backend = MockFunctionInvoker::new()
            .respond_err(InvokeError::Network("down".into()))
            .respond_err(InvokeError::Network("down".into()));
        let h = harness(backend, 2).await;

        for _ in 0..2 {
            let _ = h.invoker.invoke_with_session("f", json!({})).await;
        }
        assert_eq!(h.invoker.breaker().state(), CircuitState::Open);

        let err = h.invoker.invoke_with_session("f", json!({})).await.unwrap_err();
        assert!(matches!(err, CallError::CircuitOpen));
        assert_eq!(h.backend.calls().len(), 2);
    }

    /// Validates the mutation executor path forwards the idempotency key.
    #[tokio::test]
    async fn test_mutation_executor_sends_idempotency_key() {
        let h = harness(MockFunctionInvoker::new().respond_ok(json!(null)), 5).await;
        let mutation = QueuedMutation::new(
            7,
            "add-to-cart",
            json!({"sku": "A"}),
            None,
            chrono::Utc::now(),
        );

        h.invoker.execute(&mutation).await.unwrap();
        let calls = h.backend.calls();
        assert_eq!(calls[0].idempotency_key.as_deref(), Some(mutation.idempotency_key.as_str()));
    }
}
