//! Resilience patterns for backend calls
//!
//! Currently this is the circuit breaker that gates every outbound call to
//! the backend's function-invocation surface. Retrying is left to callers
//! (see [`crate::auth::GuardedInvoker`] for the refresh-and-retry-once
//! policy).

pub mod circuit_breaker;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerStats,
    CircuitState, ResilienceError, ResilienceResult, DEFAULT_COOLDOWN,
    DEFAULT_FAILURE_THRESHOLD,
};
