//! Client-side resilience and offline sync for SuperApp
//!
//! Backend calls go through a [`GuardedInvoker`], which checks the session
//! with the [`SessionGuardian`] and gates the call with a
//! [`CircuitBreaker`]. Mutations made while offline wait in the
//! [`OfflineQueue`] until connectivity returns. All state that must survive
//! a restart sits behind the [`KeyValueStore`] trait.
//!
//! Features:
//! - `foundation`: [`CommonError`] and the [`Clock`] abstraction
//! - `runtime`: everything async (breaker, guardian, storage, queue, cart,
//!   user cache); implies `foundation` and `observability`
//! - `observability`: `tracing` instrumentation
//! - `test-utils`: mocks for refreshers, backends and executors

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

#[cfg(feature = "foundation")]
pub mod error;
#[cfg(feature = "foundation")]
pub mod time;

#[cfg(feature = "runtime")]
pub mod auth;
#[cfg(feature = "runtime")]
pub mod cache;
#[cfg(feature = "runtime")]
pub mod resilience;
#[cfg(feature = "runtime")]
pub mod storage;
#[cfg(feature = "runtime")]
pub mod sync;

#[cfg(any(feature = "test-utils", all(test, feature = "runtime")))]
pub mod testing;

#[cfg(feature = "runtime")]
pub use auth::{
    AuthRetryPolicy, CallError, FunctionCall, FunctionInvoker, GuardedInvoker, InvokeError,
    KeyValueSessionStore, Session, SessionEvent, SessionGuardian, SessionGuardianConfig,
    SessionRefresher, SessionStore,
};
#[cfg(feature = "runtime")]
pub use cache::UserDataCache;
#[cfg(feature = "foundation")]
pub use error::{CommonError, CommonResult, ErrorClassification, ErrorSeverity};
#[cfg(feature = "runtime")]
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState, ResilienceError,
    ResilienceResult,
};
#[cfg(feature = "runtime")]
pub use storage::{FileStore, KeyValueStore, MemoryStore};
#[cfg(feature = "runtime")]
pub use sync::{
    CartStore, MutationExecutor, MutationStatus, OfflineQueue, QueueConfig, QueueError,
    QueueResult, QueuedMutation, SyncProgress, SyncReport, SyncStatus,
};
#[cfg(feature = "foundation")]
pub use time::{Clock, MockClock, SystemClock};
