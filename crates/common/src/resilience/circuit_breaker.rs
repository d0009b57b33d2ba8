//! Circuit breaker gating outbound backend calls
//!
//! The breaker counts failures of the wrapped operation and, once the
//! configured threshold is reached, rejects further calls without invoking
//! them. After a cooldown it admits exactly one probe (HALF_OPEN); the
//! probe's outcome decides whether the circuit closes or reopens.
//!
//! Instances are cheap to clone and every clone shares the same state, so
//! a single breaker built at startup can be handed to every call site.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::error::{CommonError, CommonResult};
use crate::time::{Clock, SystemClock};

/// Default number of failures before the circuit opens
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default cooldown before an open circuit admits a probe
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Errors produced by a breaker-wrapped operation
///
/// The breaker never swallows the operation's own error: it is returned
/// unchanged inside [`ResilienceError::OperationFailed`].
#[derive(Debug, Error)]
pub enum ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Circuit breaker is open, the operation was not invoked
    #[error("Circuit breaker is open, rejecting calls")]
    CircuitOpen,

    /// The underlying operation failed
    #[error("Operation failed: {source}")]
    OperationFailed {
        #[source]
        source: E,
    },
}

impl<E> ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// The call was rejected without running
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen)
    }

    /// Unwrap the operation's error, if the operation ran
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::CircuitOpen => None,
            Self::OperationFailed { source } => Some(source),
        }
    }
}

pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls pass through
    #[default]
    Closed,
    /// Calls are rejected without running
    Open,
    /// Cooldown elapsed, a single probe decides the next state
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Time since the last failure before an open circuit admits a probe
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: DEFAULT_FAILURE_THRESHOLD, cooldown: DEFAULT_COOLDOWN }
    }
}

impl CircuitBreakerConfig {
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::default()
    }

    /// Threshold and cooldown must both be non-zero
    pub fn validate(&self) -> CommonResult<()> {
        if self.failure_threshold == 0 {
            return Err(CommonError::config_field(
                "failure_threshold",
                "must be greater than 0",
            ));
        }
        if self.cooldown.is_zero() {
            return Err(CommonError::config_field("cooldown", "must be greater than 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.config.cooldown = cooldown;
        self
    }

    pub fn build(self) -> CommonResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Read-only snapshot for status badges and logs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub failure_count: u64,
    /// Monotonic time of the most recent failure
    #[serde(skip)]
    pub last_failure_time: Option<Instant>,
    /// Wall clock time of the most recent failure
    pub last_failure_at: Option<DateTime<Utc>>,
    pub total_calls: u64,
    pub rejected_calls: u64,
}

/// Outcome of asking the breaker for permission to run one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe,
    Rejected,
}

/// Everything that changes while the breaker runs, behind one lock so every
/// transition is observed whole
#[derive(Debug, Default)]
struct Gate {
    state: CircuitState,
    failures: u64,
    total_calls: u64,
    rejected_calls: u64,
    probe_in_flight: bool,
    last_failure: Option<(Instant, DateTime<Utc>)>,
    opened_at: Option<Instant>,
}

impl Gate {
    fn trip(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
    }
}

struct Shared<C> {
    config: CircuitBreakerConfig,
    clock: C,
    gate: Mutex<Gate>,
}

impl<C> Shared<C> {
    fn gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(|poisoned| {
            warn!("Circuit breaker lock poisoned, continuing with last state");
            poisoned.into_inner()
        })
    }
}

/// Frees the probe slot when a probe call is dropped before it reports
struct ProbeSlot<'a, C> {
    shared: &'a Shared<C>,
}

impl<C> Drop for ProbeSlot<'_, C> {
    fn drop(&mut self) {
        self.shared.gate().probe_in_flight = false;
    }
}

/// Circuit breaker over an arbitrary fallible operation
pub struct CircuitBreaker<C: Clock = SystemClock> {
    shared: Arc<Shared<C>>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gate = self.shared.gate();
        f.debug_struct("CircuitBreaker")
            .field("config", &self.shared.config)
            .field("state", &gate.state)
            .field("failures", &gate.failures)
            .finish()
    }
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl CircuitBreaker<SystemClock> {
    /// Breaker on the system clock; fails if `config` does not validate
    pub fn new(config: CircuitBreakerConfig) -> CommonResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl Default for CircuitBreaker<SystemClock> {
    fn default() -> Self {
        Self::assemble(CircuitBreakerConfig::default(), SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Breaker measuring its cooldown on `clock`
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> CommonResult<Self> {
        config.validate()?;
        Ok(Self::assemble(config, clock))
    }

    fn assemble(config: CircuitBreakerConfig, clock: C) -> Self {
        Self { shared: Arc::new(Shared { config, clock, gate: Mutex::new(Gate::default()) }) }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.shared.config
    }

    /// Whether a call made now would be admitted
    ///
    /// Has no side effects; OPEN only turns HALF_OPEN when a call is made.
    pub fn can_execute(&self) -> bool {
        let gate = self.shared.gate();
        match gate.state {
            CircuitState::Closed => true,
            CircuitState::Open => self.cooldown_elapsed(&gate),
            CircuitState::HalfOpen => !gate.probe_in_flight,
        }
    }

    /// Run `operation` unless the circuit rejects it
    #[instrument(skip(self, operation), fields(state = %self.state()))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let _slot = self.enter()?;
        self.settle(operation().await)
    }

    /// Blocking counterpart of [`execute`](Self::execute)
    #[instrument(skip(self, operation), fields(state = %self.state()))]
    pub fn call<F, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let _slot = self.enter()?;
        self.settle(operation())
    }

    fn enter<E>(&self) -> Result<Option<ProbeSlot<'_, C>>, ResilienceError<E>>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        match self.admit() {
            Admission::Rejected => Err(ResilienceError::CircuitOpen),
            Admission::Probe => Ok(Some(ProbeSlot { shared: &self.shared })),
            Admission::Normal => Ok(None),
        }
    }

    fn settle<T, E>(&self, outcome: Result<T, E>) -> ResilienceResult<T, E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        match outcome {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(source) => {
                warn!(error = %source, "Call through circuit breaker failed");
                self.record_failure();
                Err(ResilienceError::OperationFailed { source })
            }
        }
    }

    /// Close the circuit and zero the failure count
    pub fn record_success(&self) {
        let mut gate = self.shared.gate();
        let previous = gate.state;
        gate.state = CircuitState::Closed;
        gate.failures = 0;
        gate.probe_in_flight = false;
        gate.opened_at = None;
        drop(gate);

        if previous == CircuitState::Closed {
            debug!("Call succeeded");
        } else {
            info!(%previous, "Circuit closed after successful probe");
        }
    }

    /// Count one failed call; trips the breaker at the threshold, and
    /// reopens it when a half-open probe fails
    pub fn record_failure(&self) {
        let now = self.shared.clock.now();
        let mut gate = self.shared.gate();
        gate.failures += 1;
        gate.last_failure = Some((now, self.shared.clock.utc_now()));
        gate.probe_in_flight = false;

        match gate.state {
            CircuitState::Closed
                if gate.failures >= u64::from(self.shared.config.failure_threshold) =>
            {
                gate.trip(now);
                warn!(failures = gate.failures, "Circuit opened after repeated failures");
            }
            CircuitState::HalfOpen => {
                gate.trip(now);
                warn!(failures = gate.failures, "Probe failed, circuit reopened");
            }
            _ => {}
        }
    }

    /// Current state; OPEN only turns HALF_OPEN when the next call is admitted
    pub fn state(&self) -> CircuitState {
        self.shared.gate().state
    }

    /// Snapshot for status badges and logs
    pub fn stats(&self) -> CircuitBreakerStats {
        let gate = self.shared.gate();
        CircuitBreakerStats {
            state: gate.state,
            failure_count: gate.failures,
            last_failure_time: gate.last_failure.map(|(at, _)| at),
            last_failure_at: gate.last_failure.map(|(_, at)| at),
            total_calls: gate.total_calls,
            rejected_calls: gate.rejected_calls,
        }
    }

    /// How long the circuit has been away from CLOSED; `None` while closed
    pub fn open_duration(&self) -> Option<Duration> {
        let gate = self.shared.gate();
        if gate.state == CircuitState::Closed {
            return None;
        }
        gate.opened_at.map(|at| self.shared.clock.now().saturating_duration_since(at))
    }

    /// Force the circuit closed with a zero failure count
    ///
    /// Call counters are kept.
    pub fn reset(&self) {
        let mut gate = self.shared.gate();
        gate.state = CircuitState::Closed;
        gate.failures = 0;
        gate.probe_in_flight = false;
        gate.last_failure = None;
        gate.opened_at = None;
        drop(gate);
        info!("Circuit breaker manually reset");
    }

    fn cooldown_elapsed(&self, gate: &Gate) -> bool {
        gate.last_failure.map_or(true, |(at, _)| {
            self.shared.clock.now().saturating_duration_since(at) >= self.shared.config.cooldown
        })
    }

    /// Decide whether one call may run, moving OPEN to HALF_OPEN once the
    /// cooldown has passed
    fn admit(&self) -> Admission {
        let mut gate = self.shared.gate();
        let admission = match gate.state {
            CircuitState::Closed => Admission::Normal,
            CircuitState::Open if self.cooldown_elapsed(&gate) => {
                gate.state = CircuitState::HalfOpen;
                info!("Cooldown elapsed, admitting probe");
                Admission::Probe
            }
            CircuitState::HalfOpen if !gate.probe_in_flight => Admission::Probe,
            CircuitState::Open | CircuitState::HalfOpen => Admission::Rejected,
        };

        match admission {
            Admission::Rejected => {
                gate.rejected_calls += 1;
                debug!(state = %gate.state, "Call rejected by circuit breaker");
            }
            Admission::Probe => {
                gate.probe_in_flight = true;
                gate.total_calls += 1;
            }
            Admission::Normal => gate.total_calls += 1,
        }
        admission
    }
}
