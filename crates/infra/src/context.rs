//! Application wiring
//!
//! [`AppContext`] builds the resilience layer from a [`Config`]: one shared
//! circuit breaker, the session guardian, the guarded backend invoker, the
//! offline queue, the cart store and the user data cache, all over the same
//! key-value store. Every component is an explicit instance owned by the
//! context; nothing is process-global.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use superapp_common::auth::{
    AuthRetryPolicy, FunctionInvoker, GuardedInvoker, KeyValueSessionStore, SessionGuardian,
    SessionGuardianConfig, SessionRefresher,
};
use superapp_common::cache::UserDataCache;
use superapp_common::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats};
use superapp_common::storage::{FileStore, KeyValueStore, MemoryStore};
use superapp_common::sync::{CartStore, OfflineQueue, QueueConfig, QueuedMutation, SyncStatus};
use superapp_common::time::{Clock, SystemClock};
use superapp_domain::constants::{CART_STORAGE_KEY, QUEUE_STORAGE_KEY};
use superapp_domain::{Config, Result, SuperAppError};
use tracing::{info, instrument};

use crate::backend::{BackendClient, HttpSessionRefresher};
use crate::errors::InfraError;
use crate::jobs::{MaintenanceScheduler, MaintenanceSchedulerConfig};
use crate::sync::{ConnectivityMonitor, ReconnectWorker, ReconnectWorkerConfig};

/// Polled snapshot for status badges and the "reset connection" action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub breaker: CircuitBreakerStats,
    /// Seconds since the breaker left CLOSED
    pub breaker_open_secs: Option<u64>,
    pub sync: SyncStatus,
}

/// What happened to a submitted mutation
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// Sent to the backend; carries the response body
    Sent(Value),
    /// Device offline; stored for replay on reconnect
    Queued(QueuedMutation),
}

/// Owner of every resilience-layer component
pub struct AppContext {
    config: Config,
    store: Arc<dyn KeyValueStore>,
    breaker: CircuitBreaker,
    guardian: Arc<SessionGuardian>,
    invoker: Arc<GuardedInvoker>,
    queue: Arc<OfflineQueue>,
    cart: CartStore<Value>,
    cache: UserDataCache,
    connectivity: ConnectivityMonitor,
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("breaker", &self.breaker)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl AppContext {
    /// Build the context with HTTP adapters and the configured store
    #[instrument(skip_all)]
    pub async fn build(config: Config) -> Result<Self> {
        config.validate()?;
        let store: Arc<dyn KeyValueStore> = if config.storage.in_memory {
            Arc::new(MemoryStore::new())
        } else {
            Arc::new(FileStore::open(&config.storage.data_dir).await.map_err(app_err)?)
        };
        let refresher = Arc::new(HttpSessionRefresher::new(&config.backend)?);
        let backend = Arc::new(BackendClient::new(&config.backend)?);
        Self::with_adapters(config, store, refresher, backend).await
    }

    /// Build the context over caller-supplied adapters
    pub async fn with_adapters(
        config: Config,
        store: Arc<dyn KeyValueStore>,
        refresher: Arc<dyn SessionRefresher>,
        backend: Arc<dyn FunctionInvoker>,
    ) -> Result<Self> {
        config.validate()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let breaker_config = CircuitBreakerConfig::builder()
            .failure_threshold(config.circuit_breaker.failure_threshold)
            .cooldown(config.circuit_breaker.cooldown())
            .build()
            .map_err(app_err)?;
        let breaker = CircuitBreaker::new(breaker_config).map_err(app_err)?;

        let guardian = Arc::new(SessionGuardian::with_clock(
            Arc::new(KeyValueSessionStore::new(Arc::clone(&store))),
            refresher,
            SessionGuardianConfig { refresh_threshold_secs: config.session.refresh_threshold_secs },
            Arc::clone(&clock),
        ));
        let restored = guardian.initialize().await.map_err(app_err)?;

        let invoker = Arc::new(
            GuardedInvoker::new(Arc::clone(&guardian), breaker.clone(), backend).with_policy(
                AuthRetryPolicy { max_auth_retries: config.session.max_auth_retries },
            ),
        );

        let queue_config = QueueConfig {
            storage_key: QUEUE_STORAGE_KEY.to_string(),
            entry_ttl: config.sync.entry_ttl(),
            max_entries: config.sync.max_entries,
        };
        let queue = Arc::new(
            OfflineQueue::open(queue_config, Arc::clone(&store), Arc::clone(&clock))
                .await
                .map_err(app_err)?,
        );
        let cart = CartStore::with_options(
            Arc::clone(&store),
            Arc::clone(&clock),
            CART_STORAGE_KEY,
            config.sync.cart_ttl(),
        );
        let cache = UserDataCache::new(Arc::clone(&store), clock, config.sync.cache_ttl());

        info!(session_restored = restored, "Application context ready");
        Ok(Self {
            config,
            store,
            breaker,
            guardian,
            invoker,
            queue,
            cart,
            cache,
            connectivity: ConnectivityMonitor::new(true),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn guardian(&self) -> &Arc<SessionGuardian> {
        &self.guardian
    }

    pub fn invoker(&self) -> &Arc<GuardedInvoker> {
        &self.invoker
    }

    pub fn queue(&self) -> &Arc<OfflineQueue> {
        &self.queue
    }

    pub fn cart(&self) -> &CartStore<Value> {
        &self.cart
    }

    pub fn cache(&self) -> &UserDataCache {
        &self.cache
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    /// Call a backend function with a valid session
    pub async fn call(&self, function: &str, payload: Value) -> Result<Value> {
        self.invoker.invoke_with_session(function, payload).await.map_err(app_err)
    }

    /// Switch the context (restaurant, store) the user is working in
    ///
    /// Queued mutations recorded under another context are dropped, and
    /// the offline queue keeps them from replaying from now on. Returns how
    /// many were dropped.
    #[instrument(skip(self))]
    pub async fn set_current_context(&self, context_key: &str) -> Result<usize> {
        self.queue.set_context(Some(context_key.to_string())).await.map_err(app_err)
    }

    /// Send a mutation now, or queue it when the device is offline
    #[instrument(skip(self, payload))]
    pub async fn submit_mutation(
        &self,
        operation: &str,
        payload: Value,
        context_key: Option<String>,
    ) -> Result<MutationOutcome> {
        if !self.connectivity.is_online() {
            let queued =
                self.queue.enqueue(operation, payload, context_key).await.map_err(app_err)?;
            return Ok(MutationOutcome::Queued(queued));
        }
        self.call(operation, payload).await.map(MutationOutcome::Sent)
    }

    pub async fn connection_status(&self) -> ConnectionStatus {
        ConnectionStatus {
            breaker: self.breaker.stats(),
            breaker_open_secs: self.breaker.open_duration().map(|d| d.as_secs()),
            sync: self.queue.status().await,
        }
    }

    /// Manual escape hatch for a tripped breaker
    pub fn reset_connection(&self) {
        self.breaker.reset();
    }

    /// Clear all local state: session, queued mutations, cart and cache
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        self.guardian.logout().await.map_err(app_err)?;
        let dropped = self.queue.clear().await.map_err(app_err)?;
        self.queue.set_context(None).await.map_err(app_err)?;
        self.cart.clear().await.map_err(app_err)?;
        let evicted = self.cache.clear_all().await.map_err(app_err)?;
        info!(dropped_mutations = dropped, evicted_cache_entries = evicted, "Logged out");
        Ok(())
    }

    /// Worker that replays the queue on reconnect (not started)
    pub fn reconnect_worker(&self) -> ReconnectWorker<GuardedInvoker> {
        let config = ReconnectWorkerConfig {
            join_timeout: self.config.sync.worker_stop_timeout(),
            ..ReconnectWorkerConfig::default()
        };
        ReconnectWorker::new(
            Arc::clone(&self.queue),
            Arc::clone(&self.invoker),
            self.connectivity.clone(),
            config,
        )
    }

    /// Maintenance scheduler when jobs are enabled (not started)
    pub async fn maintenance_scheduler(&self) -> Result<Option<MaintenanceScheduler>> {
        if !self.config.jobs.enabled {
            return Ok(None);
        }
        let config = MaintenanceSchedulerConfig::new(self.config.jobs.clone());
        let scheduler = MaintenanceScheduler::new(config, self.invoker.clone()).await?;
        Ok(Some(scheduler))
    }
}

fn app_err(err: impl Into<InfraError>) -> SuperAppError {
    let infra: InfraError = err.into();
    infra.into()
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use superapp_common::auth::{InvokeError, Session};
    use superapp_common::resilience::CircuitState;
    use superapp_common::testing::{MockFunctionInvoker, MockSessionRefresher};

    use super::*;

    async fn context(backend: Arc<MockFunctionInvoker>) -> AppContext {
        let mut config = Config::default();
        config.storage.in_memory = true;
        config.circuit_breaker.failure_threshold = 2;
        AppContext::with_adapters(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(MockSessionRefresher::succeeding(3600)),
            backend,
        )
        .await
        .unwrap()
    }

    async fn sign_in(ctx: &AppContext) {
        let expires_at = SystemClock.unix_seconds() + 3600;
        ctx.guardian()
            .store_session(Session::new("token", Some("refresh".into()), expires_at, "u1"))
            .await
            .unwrap();
    }

    /// Validates the offline branch of `submit_mutation`.
    ///
    /// Assertions:
    /// - Confirms nothing is sent while offline.
    /// - Confirms the mutation is queued with its context key.
    #[tokio::test]
    async fn offline_mutation_is_queued() {
        let backend = Arc::new(MockFunctionInvoker::new());
        let ctx = context(backend.clone()).await;
        sign_in(&ctx).await;
        ctx.connectivity().set_online(false);

        let outcome = ctx
            .submit_mutation("add-to-cart", json!({"sku": "x"}), Some("restaurant-1".into()))
            .await
            .unwrap();
        let MutationOutcome::Queued(mutation) = outcome else {
            panic!("expected queued outcome");
        };
        assert_eq!(mutation.context_key.as_deref(), Some("restaurant-1"));
        assert!(backend.calls().is_empty());
        assert_eq!(ctx.connection_status().await.sync.pending_count, 1);
    }

    #[tokio::test]
    async fn online_mutation_is_sent() {
        let backend = Arc::new(MockFunctionInvoker::new().respond_ok(json!({"ok": true})));
        let ctx = context(backend.clone()).await;
        sign_in(&ctx).await;

        let outcome = ctx.submit_mutation("place-order", json!({}), None).await.unwrap();
        assert_eq!(outcome, MutationOutcome::Sent(json!({"ok": true})));
        assert_eq!(backend.calls()[0].access_token, "token");
    }

    /// Validates status reporting and the manual reset.
    #[tokio::test]
    async fn tripped_breaker_shows_in_status_and_resets() {
        let backend = Arc::new(
            MockFunctionInvoker::new()
                .respond_err(InvokeError::Network("down".into()))
                .respond_err(InvokeError::Network("down".into())),
        );
        let ctx = context(backend).await;
        sign_in(&ctx).await;

        for _ in 0..2 {
            assert!(matches!(ctx.call("ping", json!({})).await, Err(SuperAppError::Network(_))));
        }
        assert!(matches!(ctx.call("ping", json!({})).await, Err(SuperAppError::CircuitOpen(_))));

        let status = ctx.connection_status().await;
        assert_eq!(status.breaker.state, CircuitState::Open);
        assert!(status.breaker_open_secs.is_some());

        ctx.reset_connection();
        let status = ctx.connection_status().await;
        assert_eq!(status.breaker.state, CircuitState::Closed);
        assert_eq!(status.breaker.failure_count, 0);
    }

    /// Validates that logout clears every piece of local state.
    #[tokio::test]
    async fn logout_clears_local_state() {
        let ctx = context(Arc::new(MockFunctionInvoker::new())).await;
        sign_in(&ctx).await;
        ctx.queue().enqueue("x", json!({}), None).await.unwrap();
        ctx.cart().save(&[json!({"sku": "a"})], "r1").await.unwrap();
        ctx.cache().put("orders", &json!([1]), Some("u1")).await.unwrap();

        ctx.logout().await.unwrap();

        assert!(ctx.guardian().current_session().await.is_none());
        assert!(ctx.queue().entries().await.is_empty());
        assert!(ctx.cart().load("r1").await.unwrap().is_empty());
        assert!(ctx.store().get(CART_STORAGE_KEY).await.unwrap().is_none());
        assert!(ctx.store().keys_with_prefix("superapp:cache:").await.unwrap().is_empty());
    }

    /// Validates that a context switch keeps stale mutations from replaying.
    ///
    /// Assertions:
    /// - Confirms the switch drops the mutation queued for the old context.
    /// - Confirms reconnect replays only the context-free mutation.
    #[tokio::test]
    async fn context_switch_drops_stale_mutations_before_replay() {
        let backend = Arc::new(MockFunctionInvoker::new());
        let ctx = context(backend.clone()).await;
        sign_in(&ctx).await;
        ctx.set_current_context("restaurant-a").await.unwrap();
        ctx.connectivity().set_online(false);

        ctx.submit_mutation("add-to-cart", json!({"sku": "x"}), Some("restaurant-a".into()))
            .await
            .unwrap();
        ctx.submit_mutation("update-profile", json!({"name": "n"}), None).await.unwrap();
        assert_eq!(ctx.set_current_context("restaurant-b").await.unwrap(), 1);

        let mut worker = ctx.reconnect_worker();
        worker.start().await.unwrap();
        ctx.connectivity().set_online(true);
        let mut status = ctx.queue().subscribe();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            status.wait_for(|s| s.is_online && !s.is_syncing && s.pending_count == 0),
        )
        .await
        .unwrap()
        .unwrap();
        worker.stop().await.unwrap();

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function, "update-profile");
    }

    #[tokio::test]
    async fn scheduler_only_when_enabled() {
        let ctx = context(Arc::new(MockFunctionInvoker::new())).await;
        assert!(ctx.maintenance_scheduler().await.unwrap().is_none());
    }
}
