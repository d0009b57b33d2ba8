//! Session management for authenticated backend calls
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  GuardedInvoker  │  session → breaker → invoke, refresh-and-retry once
//! └────────┬─────────┘
//!          │
//!          ├──► SessionGuardian    (expiry check + proactive refresh)
//!          │         ├──► SessionStore      (persisted session)
//!          │         └──► SessionRefresher  (auth service)
//!          │
//!          ├──► CircuitBreaker     (backend health gate)
//!          └──► FunctionInvoker    (backend function surface)
//! ```
//!
//! Callers never see a stale token: [`SessionGuardian::get_valid_session`]
//! refreshes sessions within 300 seconds of expiry, and
//! [`GuardedInvoker::invoke_with_session`] retries an unauthorized call
//! exactly once after a forced refresh ([`AuthRetryPolicy`]).

pub mod errors;
pub mod guardian;
pub mod invoker;
pub mod retry_policy;
pub mod store;
pub mod traits;
pub mod types;

pub use errors::{CallError, InvokeError, RefreshError};
pub use guardian::{SessionGuardian, SessionGuardianConfig};
pub use invoker::GuardedInvoker;
pub use retry_policy::AuthRetryPolicy;
pub use store::{KeyValueSessionStore, SESSION_KEY};
pub use traits::{FunctionCall, FunctionInvoker, SessionRefresher, SessionStore};
pub use types::{ExpiryReason, Session, SessionEvent, DEFAULT_REFRESH_THRESHOLD_SECS};
