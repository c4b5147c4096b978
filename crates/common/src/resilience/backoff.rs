//! Backoff strategies for spacing out retry attempts
//!
//! A [`BackoffStrategy`] maps a 0-based attempt index to the wait before the
//! next attempt. Strategies are pure: they never sleep. Sleeping belongs to
//! the executor so the wait can be cancelled.
//!
//! | Strategy | Delay for attempt `n` |
//! |----------|-----------------------|
//! | [`NoBackoff`] | `0` |
//! | [`ConstantBackoff`] | `interval` |
//! | [`LinearBackoff`] | `min(initial + n * increment, max)` |
//! | [`ExponentialBackoff`] | `min(initial * multiplier^n, max)`, then [`Jitter`] |
//!
//! Every strategy is deterministic unless jitter is explicitly configured on
//! [`ExponentialBackoff`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::utils::serde::duration_millis;

/// Computes the wait before the next attempt.
pub trait BackoffStrategy: Send + Sync + fmt::Debug {
    /// Wait to apply after attempt `attempt` (0-based) failed.
    fn next_interval(&self, attempt: u32) -> Duration;
}

impl<B: BackoffStrategy + ?Sized> BackoffStrategy for Arc<B> {
    fn next_interval(&self, attempt: u32) -> Duration {
        (**self).next_interval(attempt)
    }
}

impl<B: BackoffStrategy + ?Sized> BackoffStrategy for Box<B> {
    fn next_interval(&self, attempt: u32) -> Duration {
        (**self).next_interval(attempt)
    }
}

/// Never waits. Used when retries should fire back to back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoBackoff;

impl BackoffStrategy for NoBackoff {
    fn next_interval(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}

/// Waits the same interval after every attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantBackoff {
    interval: Duration,
}

impl ConstantBackoff {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl BackoffStrategy for ConstantBackoff {
    fn next_interval(&self, _attempt: u32) -> Duration {
        self.interval
    }
}

/// Grows the wait by a fixed increment per attempt, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackoff {
    initial: Duration,
    increment: Duration,
    max: Duration,
}

impl LinearBackoff {
    pub fn new(initial: Duration, increment: Duration, max: Duration) -> Self {
        Self { initial, increment, max }
    }
}

impl BackoffStrategy for LinearBackoff {
    fn next_interval(&self, attempt: u32) -> Duration {
        self.initial.saturating_add(self.increment.saturating_mul(attempt)).min(self.max)
    }
}

/// Randomization applied on top of a computed delay.
///
/// Jitter is opt-in. With [`Jitter::None`] the strategy is deterministic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Jitter {
    /// Use the computed delay as-is
    #[default]
    None,
    /// Uniform in `[0, delay]`
    Full,
    /// Uniform in `[delay / 2, delay]`
    Equal,
}

impl Jitter {
    /// Apply this jitter to `delay`.
    pub fn apply(self, delay: Duration) -> Duration {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        match self {
            Jitter::None => delay,
            Jitter::Full => Duration::from_millis(random_up_to(millis)),
            Jitter::Equal => {
                let half = millis / 2;
                Duration::from_millis(half + random_up_to(millis - half))
            }
        }
    }
}

fn random_up_to(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..=max)
}

/// Doubles (or multiplies by `multiplier`) the wait after every attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackoff {
    initial: Duration,
    multiplier: f64,
    max: Duration,
    jitter: Jitter,
}

impl ExponentialBackoff {
    /// Exponential backoff without jitter.
    ///
    /// A `multiplier` below 1.0 (or NaN) is treated as 1.0 so the delay never
    /// shrinks.
    pub fn new(initial: Duration, multiplier: f64, max: Duration) -> Self {
        let multiplier = if multiplier.is_finite() && multiplier >= 1.0 { multiplier } else { 1.0 };
        Self { initial, multiplier, max, jitter: Jitter::None }
    }

    /// Enable randomized jitter.
    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = scaled.min(self.max.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max)
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn next_interval(&self, attempt: u32) -> Duration {
        self.jitter.apply(self.base_delay(attempt))
    }
}

/// Declarative backoff selection, as found in configuration files.
///
/// ```toml
/// [backoff]
/// strategy = "exponential"
/// initial = 100
/// multiplier = 2.0
/// max = 5000
/// jitter = "equal"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum BackoffConfig {
    #[default]
    None,
    Constant {
        #[serde(with = "duration_millis")]
        interval: Duration,
    },
    Linear {
        #[serde(with = "duration_millis")]
        initial: Duration,
        #[serde(with = "duration_millis")]
        increment: Duration,
        #[serde(with = "duration_millis")]
        max: Duration,
    },
    Exponential {
        #[serde(with = "duration_millis")]
        initial: Duration,
        multiplier: f64,
        #[serde(with = "duration_millis")]
        max: Duration,
        #[serde(default)]
        jitter: Jitter,
    },
}

impl BackoffConfig {
    /// Build the strategy described by this configuration.
    pub fn build(&self) -> Arc<dyn BackoffStrategy> {
        match *self {
            BackoffConfig::None => Arc::new(NoBackoff),
            BackoffConfig::Constant { interval } => Arc::new(ConstantBackoff::new(interval)),
            BackoffConfig::Linear { initial, increment, max } => {
                Arc::new(LinearBackoff::new(initial, increment, max))
            }
            BackoffConfig::Exponential { initial, multiplier, max, jitter } => {
                Arc::new(ExponentialBackoff::new(initial, multiplier, max).with_jitter(jitter))
            }
        }
    }
}
