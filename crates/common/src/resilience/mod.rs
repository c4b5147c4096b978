//! Resilience patterns for calling unreliable downstream services
//!
//! - **Backoff**: pluggable [`BackoffStrategy`] implementations that compute
//!   the wait between attempts without sleeping themselves
//! - **Circuit Breaker**: per-command state machine with a rolling failure
//!   window, a half-open probe, and a concurrency limit
//! - **Registry**: [`CircuitBreakerRegistry`] maps command names to breakers
//!   so every caller of a command shares one state machine
//!
//! These primitives are transport-agnostic. The HTTP executor in
//! `breakwater-http` composes them into the retrying request pipeline.

pub mod backoff;
pub mod circuit_breaker;
pub mod clock;
pub mod registry;

pub use backoff::{
    BackoffConfig, BackoffStrategy, ConstantBackoff, ExponentialBackoff, Jitter, LinearBackoff,
    NoBackoff,
};
pub use circuit_breaker::{
    BreakerStats, CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerConfigBuilder,
    CircuitState, ConfigError, ConfigResult, Rejection, ResilienceError, ResilienceResult,
};
pub use clock::{Clock, MockClock, SystemClock};
pub use registry::CircuitBreakerRegistry;
