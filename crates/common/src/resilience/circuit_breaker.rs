//! Circuit breaker with a rolling failure-rate window
//!
//! Each breaker guards one named command. It tracks outcomes in a bucketed
//! rolling window, limits calls in flight, and fails fast while the
//! downstream service is considered unhealthy.
//!
//! # States
//! ```text
//! Closed --(volume >= request_volume_threshold
//!           && error% >= error_threshold_percentage)--> Open
//! Open --(sleep_window elapsed, next admission)--> HalfOpen
//! HalfOpen --(probe succeeds)--> Closed (stats reset)
//! HalfOpen --(probe fails or times out)--> Open (sleep window restarts)
//! ```
//!
//! Independently of the state, a call is rejected with
//! [`ResilienceError::MaxConcurrency`] when `max_concurrent_requests` calls
//! are already in flight.
//!
//! All mutable state sits behind a single lock, so an observer never sees
//! counters from one transition mixed with the state of another.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::clock::{Clock, SystemClock};
use crate::utils::serde::duration_millis;

//==============================================================================
// Error Types
//==============================================================================

/// Invalid breaker configuration
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors produced by a guarded call
///
/// Generic over the operation error `E`, which is preserved in
/// [`ResilienceError::OperationFailed`].
#[derive(Debug, Error)]
pub enum ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Admission denied: the breaker is open or a half-open probe is running
    #[error("Circuit breaker '{name}' is open, rejecting calls")]
    CircuitOpen { name: String },

    /// Admission denied: too many calls in flight
    #[error("Circuit breaker '{name}' reached its limit of {limit} concurrent calls")]
    MaxConcurrency { name: String, limit: u32 },

    /// The operation did not finish within the configured timeout
    #[error("Operation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The operation ran and failed
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
    /// True when the call was refused without running the operation.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. } | Self::MaxConcurrency { .. })
    }

    /// The operation's own error, if it ran and failed.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::OperationFailed { source } => Some(source),
            _ => None,
        }
    }
}

/// Result type for guarded calls
pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;

/// Reason an admission was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Breaker open, or a half-open probe already in flight
    CircuitOpen,
    /// In-flight calls reached the concurrency limit
    MaxConcurrency { limit: u32 },
}

impl Rejection {
    /// Convert into the error returned to callers of `name`'s breaker.
    pub fn into_error<E>(self, name: &str) -> ResilienceError<E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        match self {
            Rejection::CircuitOpen => ResilienceError::CircuitOpen { name: name.to_string() },
            Rejection::MaxConcurrency { limit } => {
                ResilienceError::MaxConcurrency { name: name.to_string(), limit }
            }
        }
    }
}

//==============================================================================
// State & Configuration
//==============================================================================

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through
    Closed,
    /// Calls are rejected until the sleep window elapses
    Open,
    /// A single probe call tests whether the service recovered
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for circuit breaker behavior
///
/// Durations serialize as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Maximum duration of one underlying call before it counts as a failure
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    /// Calls in flight at which new calls are rejected
    pub max_concurrent_requests: u32,
    /// Failure percentage (0-100) within the window that trips the breaker
    pub error_threshold_percentage: u8,
    /// Minimum requests within the window before the threshold is evaluated
    pub request_volume_threshold: u32,
    /// How long the breaker stays open before admitting a probe
    #[serde(with = "duration_millis")]
    pub sleep_window: Duration,
    /// Span of the rolling statistics window
    #[serde(with = "duration_millis")]
    pub rolling_window: Duration,
    /// Number of buckets the rolling window is split into
    pub rolling_window_buckets: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            max_concurrent_requests: 10,
            error_threshold_percentage: 50,
            request_volume_threshold: 20,
            sleep_window: Duration::from_secs(5),
            rolling_window: Duration::from_secs(10),
            rolling_window_buckets: 10,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a configuration builder
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.timeout.is_zero() {
            return Err(invalid("timeout must be greater than 0"));
        }
        if self.max_concurrent_requests == 0 {
            return Err(invalid("max_concurrent_requests must be greater than 0"));
        }
        if self.error_threshold_percentage > 100 {
            return Err(invalid("error_threshold_percentage must be between 0 and 100"));
        }
        if self.rolling_window_buckets == 0 {
            return Err(invalid("rolling_window_buckets must be greater than 0"));
        }
        if self.bucket_width().is_zero() {
            return Err(invalid("rolling_window must be at least one nanosecond per bucket"));
        }
        Ok(())
    }

    fn bucket_width(&self) -> Duration {
        self.rolling_window / self.rolling_window_buckets.max(1)
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid { message: message.to_string() }
}

/// Builder for [`CircuitBreakerConfig`]
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn max_concurrent_requests(mut self, limit: u32) -> Self {
        self.config.max_concurrent_requests = limit;
        self
    }

    pub fn error_threshold_percentage(mut self, percentage: u8) -> Self {
        self.config.error_threshold_percentage = percentage;
        self
    }

    pub fn request_volume_threshold(mut self, volume: u32) -> Self {
        self.config.request_volume_threshold = volume;
        self
    }

    pub fn sleep_window(mut self, window: Duration) -> Self {
        self.config.sleep_window = window;
        self
    }

    /// Rolling statistics span and how many buckets it is split into.
    pub fn rolling_window(mut self, window: Duration, buckets: u32) -> Self {
        self.config.rolling_window = window;
        self.config.rolling_window_buckets = buckets;
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

//==============================================================================
// Rolling Window
//==============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counts {
    successes: u64,
    failures: u64,
    timeouts: u64,
    short_circuited: u64,
}

impl Counts {
    fn requests(&self) -> u64 {
        self.successes + self.failures + self.timeouts
    }

    fn failed(&self) -> u64 {
        self.failures + self.timeouts
    }

    fn add(&mut self, other: &Counts) {
        self.successes += other.successes;
        self.failures += other.failures;
        self.timeouts += other.timeouts;
        self.short_circuited += other.short_circuited;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    Timeout,
}

/// Time-bucketed counters; buckets older than the window are dropped.
#[derive(Debug)]
struct RollingWindow {
    span: Duration,
    bucket_width: Duration,
    max_buckets: usize,
    buckets: VecDeque<(Instant, Counts)>,
}

impl RollingWindow {
    fn new(span: Duration, buckets: u32) -> Self {
        let max_buckets = usize::try_from(buckets.max(1)).unwrap_or(usize::MAX);
        Self {
            span,
            bucket_width: span / buckets.max(1),
            max_buckets,
            buckets: VecDeque::with_capacity(max_buckets),
        }
    }

    fn expire(&mut self, now: Instant) {
        while let Some((start, _)) = self.buckets.front() {
            if now.saturating_duration_since(*start) >= self.span {
                self.buckets.pop_front();
            } else {
                break;
            }
        }
    }

    fn current(&mut self, now: Instant) -> &mut Counts {
        self.expire(now);
        let needs_bucket = self
            .buckets
            .back()
            .map_or(true, |(start, _)| now.saturating_duration_since(*start) >= self.bucket_width);
        if needs_bucket {
            if self.buckets.len() == self.max_buckets {
                self.buckets.pop_front();
            }
            self.buckets.push_back((now, Counts::default()));
        }
        let last = self.buckets.len() - 1;
        &mut self.buckets[last].1
    }

    fn record(&mut self, now: Instant, outcome: Outcome) {
        let counts = self.current(now);
        match outcome {
            Outcome::Success => counts.successes += 1,
            Outcome::Failure => counts.failures += 1,
            Outcome::Timeout => counts.timeouts += 1,
        }
    }

    fn record_short_circuit(&mut self, now: Instant) {
        self.current(now).short_circuited += 1;
    }

    fn totals(&mut self, now: Instant) -> Counts {
        self.expire(now);
        let mut totals = Counts::default();
        for (_, counts) in &self.buckets {
            totals.add(counts);
        }
        totals
    }

    fn clear(&mut self) {
        self.buckets.clear();
    }
}

//==============================================================================
// Circuit Breaker
//==============================================================================

/// Point-in-time view of a breaker's rolling statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerStats {
    pub state: CircuitState,
    /// Completed calls (successes, failures, timeouts) within the window
    pub total_requests: u64,
    pub successes: u64,
    /// Failures excluding timeouts
    pub failures: u64,
    pub timeouts: u64,
    /// Calls rejected without running
    pub short_circuited: u64,
    pub in_flight: u32,
    /// Failed share of `total_requests`, 0 when there were none
    pub error_percentage: u8,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    opened_at: Option<Instant>,
    window: RollingWindow,
    in_flight: u32,
    probe_in_flight: bool,
    /// Bumped by `reset`; permits from an older generation are stale
    generation: u64,
}

impl BreakerInner {
    fn trip(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
    }
}

/// Circuit breaker for one named command
///
/// Generic over [`Clock`] so tests can drive the sleep window and rolling
/// buckets with [`MockClock`](super::MockClock).
pub struct CircuitBreaker<C: Clock = SystemClock> {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    clock: C,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a breaker for `name` using the system clock.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(name, config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a breaker with a custom clock (useful for testing)
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: C,
    ) -> ConfigResult<Self> {
        config.validate()?;
        let window = RollingWindow::new(config.rolling_window, config.rolling_window_buckets);

        Ok(Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                opened_at: None,
                window,
                in_flight: 0,
                probe_in_flight: false,
                generation: 0,
            }),
            clock,
        })
    }

    /// Command name this breaker guards
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state.
    ///
    /// An open breaker whose sleep window has elapsed still reports `Open`
    /// until the next admission attempt moves it to `HalfOpen`.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Snapshot of the rolling statistics
    pub fn stats(&self) -> BreakerStats {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let totals = inner.window.totals(now);
        let requests = totals.requests();
        let error_percentage = if requests == 0 {
            0
        } else {
            u8::try_from(totals.failed() * 100 / requests).unwrap_or(100)
        };

        BreakerStats {
            state: inner.state,
            total_requests: requests,
            successes: totals.successes,
            failures: totals.failures,
            timeouts: totals.timeouts,
            short_circuited: totals.short_circuited,
            in_flight: inner.in_flight,
            error_percentage,
        }
    }

    /// Return to `Closed` and clear the rolling window.
    ///
    /// Calls already in flight keep their slots, but the outcomes they
    /// record afterwards are discarded.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.opened_at = None;
        inner.probe_in_flight = false;
        inner.generation = inner.generation.wrapping_add(1);
        inner.window.clear();
        info!(command = %self.name, "Circuit breaker manually reset to closed state");
    }

    /// Ask for permission to run one call.
    ///
    /// The returned permit holds an in-flight slot until it is dropped;
    /// record the outcome on it before dropping to feed the state machine.
    pub fn try_acquire(&self) -> Result<CallPermit<'_, C>, Rejection> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        if inner.state == CircuitState::Open {
            let sleep_window = self.config.sleep_window;
            let sleeping = inner
                .opened_at
                .is_some_and(|opened| now.saturating_duration_since(opened) < sleep_window);
            if sleeping {
                inner.window.record_short_circuit(now);
                return Err(Rejection::CircuitOpen);
            }
            inner.state = CircuitState::HalfOpen;
            info!(command = %self.name, "Circuit breaker half-open, admitting probe");
        }

        if inner.state == CircuitState::HalfOpen && inner.probe_in_flight {
            inner.window.record_short_circuit(now);
            return Err(Rejection::CircuitOpen);
        }

        if inner.in_flight >= self.config.max_concurrent_requests {
            inner.window.record_short_circuit(now);
            return Err(Rejection::MaxConcurrency { limit: self.config.max_concurrent_requests });
        }

        let probe = inner.state == CircuitState::HalfOpen;
        if probe {
            inner.probe_in_flight = true;
        }
        inner.in_flight += 1;

        Ok(CallPermit { breaker: self, probe, generation: inner.generation, outcome: None })
    }

    fn reject<E>(&self, rejection: Rejection) -> ResilienceError<E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        debug!(command = %self.name, ?rejection, "Circuit breaker rejecting call");
        rejection.into_error(&self.name)
    }

    fn complete(&self, probe: bool, generation: u64, outcome: Option<Outcome>) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.in_flight = inner.in_flight.saturating_sub(1);

        if generation != inner.generation {
            debug!(command = %self.name, probe, ?outcome, "Discarding outcome from before reset");
            return;
        }

        if probe {
            inner.probe_in_flight = false;
        }

        let Some(outcome) = outcome else {
            debug!(command = %self.name, probe, "Call released without an outcome");
            return;
        };

        if probe {
            if outcome == Outcome::Success {
                inner.state = CircuitState::Closed;
                inner.opened_at = None;
                inner.window.clear();
                info!(command = %self.name, "Circuit breaker closed after successful probe");
            } else {
                inner.window.record(now, outcome);
                inner.trip(now);
                warn!(command = %self.name, ?outcome, "Probe failed, circuit breaker re-opened");
            }
            return;
        }

        inner.window.record(now, outcome);

        if inner.state == CircuitState::Closed {
            let totals = inner.window.totals(now);
            let requests = totals.requests();
            let threshold = u64::from(self.config.error_threshold_percentage);
            if requests > 0
                && requests >= u64::from(self.config.request_volume_threshold)
                && totals.failed() * 100 >= threshold * requests
            {
                inner.trip(now);
                warn!(
                    command = %self.name,
                    requests,
                    failed = totals.failed(),
                    "Circuit breaker opened: error threshold exceeded"
                );
            }
        }
    }

    /// Execute an async operation with breaker protection
    ///
    /// The operation runs under the configured `timeout`; a late result is
    /// dropped and counted as a timeout. Dropping the returned future releases
    /// the in-flight slot without recording an outcome.
    #[instrument(skip(self, operation), fields(command = %self.name))]
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let permit = match self.try_acquire() {
            Ok(permit) => permit,
            Err(rejection) => return Err(self.reject(rejection)),
        };

        match tokio::time::timeout(self.config.timeout, operation()).await {
            Ok(Ok(value)) => {
                permit.record_success();
                Ok(value)
            }
            Ok(Err(error)) => {
                debug!(command = %self.name, error = %error, "Guarded operation failed");
                permit.record_failure();
                Err(ResilienceError::OperationFailed { source: error })
            }
            Err(_) => {
                warn!(
                    command = %self.name,
                    timeout = ?self.config.timeout,
                    "Guarded operation timed out"
                );
                permit.record_timeout();
                Err(ResilienceError::Timeout { timeout: self.config.timeout })
            }
        }
    }

    /// Execute with a fallback for any failure
    ///
    /// The fallback receives the rejection, timeout, or operation error and
    /// its result becomes the call's result. The fallback itself is not
    /// guarded by the breaker.
    pub async fn execute_with_fallback<F, Fut, FB, FbFut, T, E>(
        &self,
        operation: F,
        fallback: FB,
    ) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce(ResilienceError<E>) -> FbFut,
        FbFut: Future<Output = ResilienceResult<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        match self.execute(operation).await {
            Ok(value) => Ok(value),
            Err(error) => {
                debug!(command = %self.name, error = %error, "Invoking fallback");
                fallback(error).await
            }
        }
    }

    /// Execute a synchronous operation with breaker protection
    ///
    /// No timeout is enforced on this path.
    pub fn call<F, T, E>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let permit = match self.try_acquire() {
            Ok(permit) => permit,
            Err(rejection) => return Err(self.reject(rejection)),
        };

        match operation() {
            Ok(value) => {
                permit.record_success();
                Ok(value)
            }
            Err(error) => {
                permit.record_failure();
                Err(ResilienceError::OperationFailed { source: error })
            }
        }
    }
}

/// In-flight slot granted by [`CircuitBreaker::try_acquire`]
///
/// Dropping the permit releases the slot. Outcomes recorded through
/// `record_*` are applied to the breaker at the same time.
#[must_use = "dropping a permit immediately releases the slot without recording an outcome"]
pub struct CallPermit<'a, C: Clock = SystemClock> {
    breaker: &'a CircuitBreaker<C>,
    probe: bool,
    generation: u64,
    outcome: Option<Outcome>,
}

impl<C: Clock> CallPermit<'_, C> {
    /// Whether this call is the half-open probe
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn record_success(mut self) {
        self.outcome = Some(Outcome::Success);
    }

    pub fn record_failure(mut self) {
        self.outcome = Some(Outcome::Failure);
    }

    pub fn record_timeout(mut self) {
        self.outcome = Some(Outcome::Timeout);
    }
}

impl<C: Clock> Drop for CallPermit<'_, C> {
    fn drop(&mut self) {
        self.breaker.complete(self.probe, self.generation, self.outcome.take());
    }
}

impl<C: Clock> fmt::Debug for CallPermit<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallPermit")
            .field("command", &self.breaker.name)
            .field("probe", &self.probe)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the breaker state machine, rolling window, and
    //! concurrency limiter.

    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::resilience::MockClock;

    fn io_failure() -> Result<(), io::Error> {
        Err(io::Error::other("downstream failure"))
    }

    fn breaker_with(
        volume: u32,
        threshold: u8,
        sleep_window: Duration,
    ) -> (CircuitBreaker<MockClock>, MockClock) {
        let clock = MockClock::new();
        let config = CircuitBreakerConfig::builder()
            .request_volume_threshold(volume)
            .error_threshold_percentage(threshold)
            .sleep_window(sleep_window)
            .build()
            .expect("test config should be valid");
        let breaker = CircuitBreaker::with_clock("test", config, clock.clone())
            .expect("breaker should build");
        (breaker, clock)
    }

    #[test]
    fn test_circuit_state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "CLOSED");
        assert_eq!(CircuitState::Open.to_string(), "OPEN");
        assert_eq!(CircuitState::HalfOpen.to_string(), "HALF_OPEN");
    }

    #[test]
    fn test_config_defaults() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(1));
        assert_eq!(config.max_concurrent_requests, 10);
        assert_eq!(config.error_threshold_percentage, 50);
        assert_eq!(config.request_volume_threshold, 20);
        assert_eq!(config.sleep_window, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    /// Validates rejection of unusable configurations.
    ///
    /// Assertions:
    /// - Zero concurrency, >100% threshold, zero buckets, zero timeout and a
    ///   window narrower than its bucket count are all errors.
    #[test]
    fn test_config_validation() {
        assert!(CircuitBreakerConfig::builder().max_concurrent_requests(0).build().is_err());
        assert!(CircuitBreakerConfig::builder().error_threshold_percentage(101).build().is_err());
        assert!(CircuitBreakerConfig::builder()
            .rolling_window(Duration::from_secs(10), 0)
            .build()
            .is_err());
        assert!(CircuitBreakerConfig::builder()
            .rolling_window(Duration::from_nanos(5), 10)
            .build()
            .is_err());
        assert!(CircuitBreakerConfig::builder().timeout(Duration::ZERO).build().is_err());
        assert!(CircuitBreakerConfig::builder().error_threshold_percentage(100).build().is_ok());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: CircuitBreakerConfig =
            serde_json::from_str(r#"{"sleep_window":250,"request_volume_threshold":3}"#)
                .expect("partial config should parse");
        assert_eq!(config.sleep_window, Duration::from_millis(250));
        assert_eq!(config.request_volume_threshold, 3);
        assert_eq!(config.max_concurrent_requests, 10);
    }

    #[test]
    fn test_new_breaker_is_closed() {
        let breaker = CircuitBreaker::new("fresh", CircuitBreakerConfig::default())
            .expect("default config is valid");
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.name(), "fresh");
        assert_eq!(breaker.stats().total_requests, 0);
    }

    #[test]
    fn test_stays_closed_below_volume_threshold() {
        let (breaker, _clock) = breaker_with(5, 50, Duration::from_secs(5));

        for _ in 0..4 {
            let _ = breaker.call(io_failure);
        }

        let stats = breaker.stats();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(stats.failures, 4);
        assert_eq!(stats.error_percentage, 100);
    }

    #[test]
    fn test_stays_closed_below_error_threshold() {
        let (breaker, _clock) = breaker_with(4, 50, Duration::from_secs(5));

        let _ = breaker.call(io_failure);
        for _ in 0..3 {
            let _ = breaker.call(|| Ok::<_, io::Error>(()));
        }

        assert_eq!(breaker.stats().error_percentage, 25);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    /// Validates the two-failures-one-success trip scenario.
    ///
    /// Assertions:
    /// - After 2 failures and 1 success with volume 3 / threshold 50 the
    ///   breaker is open.
    /// - The next call is rejected and its operation never runs.
    #[test]
    fn test_opens_at_volume_and_error_rate() {
        let (breaker, _clock) = breaker_with(3, 50, Duration::from_secs(5));
        let _ = breaker.call(io_failure);
        let _ = breaker.call(io_failure);
        assert_eq!(breaker.state(), CircuitState::Closed);
        let _ = breaker.call(|| Ok::<_, io::Error>(()));
        assert_eq!(breaker.state(), CircuitState::Open);

        let invoked = AtomicU32::new(0);
        let result = breaker.call(|| {
            invoked.fetch_add(1, Ordering::SeqCst);
            Ok::<_, io::Error>(())
        });

        assert!(matches!(result, Err(ResilienceError::CircuitOpen { ref name }) if name == "test"));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(breaker.stats().short_circuited, 1);
    }

    #[test]
    fn test_open_until_sleep_window_elapses() {
        let (breaker, clock) = breaker_with(1, 50, Duration::from_millis(500));
        let _ = breaker.call(io_failure);
        assert_eq!(breaker.state(), CircuitState::Open);

        clock.advance_millis(499);
        assert_eq!(breaker.try_acquire().err(), Some(Rejection::CircuitOpen));

        clock.advance_millis(1);
        let permit = breaker.try_acquire().expect("probe should be admitted");
        assert!(permit.is_probe());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        permit.record_success();
    }

    /// Validates single-probe admission in half-open state.
    ///
    /// Assertions:
    /// - A second caller is rejected while the probe is in flight.
    /// - A successful probe closes the breaker and clears its stats.
    #[test]
    fn test_half_open_single_probe_then_close() {
        let (breaker, clock) = breaker_with(1, 50, Duration::from_secs(1));
        let _ = breaker.call(io_failure);
        clock.advance(Duration::from_secs(1));

        let probe = breaker.try_acquire().expect("probe admitted");
        assert_eq!(breaker.try_acquire().err(), Some(Rejection::CircuitOpen));
        assert_eq!(breaker.try_acquire().err(), Some(Rejection::CircuitOpen));

        probe.record_success();

        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.short_circuited, 0);
        assert!(breaker.try_acquire().is_ok());
    }

    #[test]
    fn test_failed_probe_reopens_and_restarts_sleep_window() {
        let (breaker, clock) = breaker_with(1, 50, Duration::from_secs(1));
        let _ = breaker.call(io_failure);
        clock.advance(Duration::from_secs(1));

        let probe = breaker.try_acquire().expect("probe admitted");
        clock.advance_millis(300);
        probe.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        // Sleep window counts from the failed probe, not the original trip.
        clock.advance_millis(900);
        assert_eq!(breaker.try_acquire().err(), Some(Rejection::CircuitOpen));
        clock.advance_millis(100);
        assert!(breaker.try_acquire().is_ok());
    }

    #[test]
    fn test_dropped_probe_frees_probe_slot() {
        let (breaker, clock) = breaker_with(1, 50, Duration::from_secs(1));
        let _ = breaker.call(io_failure);
        clock.advance(Duration::from_secs(1));

        let probe = breaker.try_acquire().expect("probe admitted");
        drop(probe);

        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        let next = breaker.try_acquire().expect("a new probe may run");
        assert!(next.is_probe());
        next.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_max_concurrency_rejects_extra_calls() {
        let config = CircuitBreakerConfig::builder()
            .max_concurrent_requests(2)
            .build()
            .expect("valid config");
        let breaker = CircuitBreaker::new("bounded", config).expect("breaker");

        let first = breaker.try_acquire().expect("first slot");
        let second = breaker.try_acquire().expect("second slot");
        assert_eq!(breaker.stats().in_flight, 2);

        let rejected: ResilienceResult<(), io::Error> = breaker.call(|| Ok(()));
        assert!(matches!(rejected, Err(ResilienceError::MaxConcurrency { limit: 2, .. })));

        first.record_success();
        drop(second);
        assert_eq!(breaker.stats().in_flight, 0);
        assert!(breaker.try_acquire().is_ok());
    }

    #[test]
    fn test_rolling_window_expires_old_failures() {
        let clock = MockClock::new();
        let config = CircuitBreakerConfig::builder()
            .request_volume_threshold(3)
            .error_threshold_percentage(50)
            .rolling_window(Duration::from_secs(10), 10)
            .build()
            .expect("valid config");
        let breaker =
            CircuitBreaker::with_clock("rolling", config, clock.clone()).expect("breaker");

        let _ = breaker.call(io_failure);
        let _ = breaker.call(io_failure);
        clock.advance(Duration::from_secs(11));

        assert_eq!(breaker.stats().total_requests, 0);
        let _ = breaker.call(io_failure);
        assert_eq!(breaker.state(), CircuitState::Closed, "expired failures must not count");
        assert_eq!(breaker.stats().failures, 1);
    }

    #[test]
    fn test_reset_restores_closed_state() {
        let (breaker, _clock) = breaker_with(1, 50, Duration::from_secs(60));
        let _ = breaker.call(io_failure);
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().total_requests, 0);
    }

    #[test]
    fn test_probe_outcome_after_reset_is_discarded() {
        let (breaker, clock) = breaker_with(1, 50, Duration::from_secs(5));
        let _ = breaker.call(io_failure);
        clock.advance(Duration::from_secs(5));

        let stale = breaker.try_acquire().expect("probe admitted");
        assert!(stale.is_probe());

        breaker.reset();
        stale.record_failure();

        let stats = breaker.stats();
        assert_eq!(breaker.state(), CircuitState::Closed, "reset must survive a late probe");
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.in_flight, 0);
    }

    #[test]
    fn test_stale_probe_does_not_free_new_probe_slot() {
        let (breaker, clock) = breaker_with(1, 50, Duration::from_secs(5));
        let _ = breaker.call(io_failure);
        clock.advance(Duration::from_secs(5));
        let stale = breaker.try_acquire().expect("first probe");

        breaker.reset();
        let _ = breaker.call(io_failure);
        clock.advance(Duration::from_secs(5));
        let current = breaker.try_acquire().expect("second probe");
        assert!(current.is_probe());

        drop(stale);
        assert!(breaker.try_acquire().is_err(), "current probe still holds the slot");

        current.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn test_execute_records_success() {
        let breaker =
            CircuitBreaker::new("async", CircuitBreakerConfig::default()).expect("breaker");

        let result = breaker.execute(|| async { Ok::<_, io::Error>(42) }).await;

        assert_eq!(result.expect("operation succeeds"), 42);
        let stats = breaker.stats();
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn test_execute_times_out_slow_operation() {
        tokio::time::pause();
        let config = CircuitBreakerConfig::builder()
            .timeout(Duration::from_millis(50))
            .build()
            .expect("valid config");
        let breaker = CircuitBreaker::new("slow", config).expect("breaker");

        let result = breaker
            .execute(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, io::Error>(())
            })
            .await;

        assert!(matches!(
            result,
            Err(ResilienceError::Timeout { timeout }) if timeout == Duration::from_millis(50)
        ));
        let stats = breaker.stats();
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.error_percentage, 100);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn test_execute_with_fallback_on_rejection() {
        let (breaker, _clock) = breaker_with(1, 50, Duration::from_secs(60));
        let _ = breaker.call(io_failure);

        let result = breaker
            .execute_with_fallback(
                || async { Ok::<_, io::Error>("primary") },
                |error| async move {
                    assert!(error.is_rejection());
                    Ok("fallback")
                },
            )
            .await;

        assert_eq!(result.expect("fallback result"), "fallback");
    }

    #[tokio::test]
    async fn test_execute_with_fallback_can_propagate() {
        let breaker =
            CircuitBreaker::new("propagate", CircuitBreakerConfig::default()).expect("breaker");

        let result: ResilienceResult<(), io::Error> = breaker
            .execute_with_fallback(|| async { io_failure() }, |error| async move { Err(error) })
            .await;

        let error = result.expect_err("fallback returned the error");
        assert_eq!(
            error.into_operation_error().map(|e| e.to_string()),
            Some("downstream failure".to_string())
        );
    }
}
