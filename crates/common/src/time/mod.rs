//! Injectable time source
//!
//! Breaker cooldowns, session expiry, cart and cache TTLs and queue
//! retention all read time through [`Clock`]. Production code passes
//! [`SystemClock`]; tests pass a [`MockClock`] and move it forward by hand.
//!
//! ```
//! use std::time::Duration;
//!
//! use superapp_common::time::{Clock, MockClock};
//!
//! let clock = MockClock::at_unix_seconds(1_700_000_000);
//! let before = clock.now();
//! clock.advance(Duration::from_secs(60));
//! assert_eq!(clock.unix_seconds(), 1_700_000_060);
//! assert_eq!(clock.now() - before, Duration::from_secs(60));
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

/// Monotonic and wall-clock time
///
/// Only [`now`](Clock::now) and [`system_time`](Clock::system_time) are
/// required; the epoch helpers derive from the wall clock.
pub trait Clock: Send + Sync {
    /// Monotonic time, for measuring intervals such as breaker cooldowns
    fn now(&self) -> Instant;

    /// Wall time, for anything persisted or compared across restarts
    fn system_time(&self) -> SystemTime;

    fn millis_since_epoch(&self) -> u64 {
        since_epoch(self.system_time()).as_millis() as u64
    }

    /// Session expiry timestamps use this unit
    fn unix_seconds(&self) -> i64 {
        since_epoch(self.system_time()).as_secs() as i64
    }

    fn utc_now(&self) -> DateTime<Utc> {
        self.system_time().into()
    }
}

fn since_epoch(time: SystemTime) -> Duration {
    time.duration_since(UNIX_EPOCH).unwrap_or_default()
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now(&self) -> Instant {
        T::now(self)
    }

    fn system_time(&self) -> SystemTime {
        T::system_time(self)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Hand-driven clock for tests
///
/// Time only moves through [`advance`](MockClock::advance). Clones share
/// the same offset, so the handle given to a component and the one kept by
/// the test stay in step.
#[derive(Debug, Clone)]
pub struct MockClock {
    origin: Instant,
    wall_origin: SystemTime,
    offset: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Starts at the real current time
    pub fn new() -> Self {
        Self::starting_at(SystemTime::now())
    }

    pub fn at_unix_seconds(secs: u64) -> Self {
        Self::starting_at(UNIX_EPOCH + Duration::from_secs(secs))
    }

    fn starting_at(wall_origin: SystemTime) -> Self {
        Self { origin: Instant::now(), wall_origin, offset: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }

    /// Simulated time since creation
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        self.wall_origin + self.elapsed()
    }
}
