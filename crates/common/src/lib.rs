//! Generic resilience building blocks shared across Breakwater crates.
//!
//! # Safety and Quality
//!
//! This crate forbids unsafe code and never panics on the request path.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: serde helpers
//! - `observability`: tracing instrumentation
//! - `runtime`: backoff strategies, circuit breaker, breaker registry, clocks
//!   (enabled by default)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod utils;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod resilience;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "runtime")]
pub use resilience::{
    BackoffConfig, BackoffStrategy, BreakerStats, CallPermit, CircuitBreaker,
    CircuitBreakerConfig, CircuitBreakerConfigBuilder, CircuitBreakerRegistry, CircuitState,
    Clock, ConfigError, ConstantBackoff, ExponentialBackoff, Jitter, LinearBackoff, MockClock,
    NoBackoff, ResilienceError, ResilienceResult, SystemClock,
};
#[cfg(feature = "foundation")]
pub use utils::serde::duration_millis;
