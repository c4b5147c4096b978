//! Time source abstraction for the circuit breaker.
//!
//! Breakers read time through [`Clock`] so that sleep windows and rolling
//! buckets can be driven by [`MockClock`] in tests without real delays.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Monotonic time source used by breakers and registries.
pub trait Clock: Send + Sync + 'static {
    /// Current monotonic instant.
    fn now(&self) -> Instant;
}

/// Real monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl<T: Clock> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Manually advanced clock for deterministic tests.
///
/// Clones share the same offset, so advancing one clone advances every
/// breaker built from it.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a mock clock anchored at the current instant.
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Create a mock clock anchored at `start`.
    pub fn starting_at(start: Instant) -> Self {
        Self { start, offset: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    /// Move time forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        *self.offset.lock() += duration;
    }

    /// Move time forward by `millis` milliseconds.
    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Total time advanced since creation.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock()
    }
}
