//! Named circuit breaker registry
//!
//! Breakers are keyed by command name and created lazily on first use, so
//! every caller using the same command shares one state machine. A
//! process-wide registry is available through [`CircuitBreakerRegistry::shared`];
//! tests usually build their own with a [`MockClock`](super::MockClock).

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::{debug, info};

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, ConfigResult};
use super::clock::{Clock, SystemClock};

static SHARED_REGISTRY: Lazy<Arc<CircuitBreakerRegistry>> =
    Lazy::new(|| Arc::new(CircuitBreakerRegistry::new()));

/// Mapping from command name to its circuit breaker
pub struct CircuitBreakerRegistry<C: Clock + Clone = SystemClock> {
    breakers: DashMap<String, Arc<CircuitBreaker<C>>>,
    clock: C,
}

impl CircuitBreakerRegistry<SystemClock> {
    /// Empty registry using the system clock
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Process-wide registry, created on first access
    pub fn shared() -> Arc<Self> {
        Arc::clone(&SHARED_REGISTRY)
    }
}

impl Default for CircuitBreakerRegistry<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock + Clone> CircuitBreakerRegistry<C> {
    /// Empty registry whose breakers all read time from `clock`
    pub fn with_clock(clock: C) -> Self {
        Self { breakers: DashMap::new(), clock }
    }

    /// Breaker for `name`, creating it with `config` if absent.
    ///
    /// The first configuration registered for a name wins; later calls get
    /// the existing breaker unchanged. Use [`configure`](Self::configure) to
    /// replace it.
    pub fn get_or_create(
        &self,
        name: &str,
        config: &CircuitBreakerConfig,
    ) -> ConfigResult<Arc<CircuitBreaker<C>>> {
        if let Some(existing) = self.breakers.get(name) {
            return Ok(Arc::clone(existing.value()));
        }

        let breaker =
            Arc::new(CircuitBreaker::with_clock(name, config.clone(), self.clock.clone())?);
        let entry = self.breakers.entry(name.to_string()).or_insert_with(|| {
            debug!(command = %name, "Registered circuit breaker");
            breaker
        });
        Ok(Arc::clone(entry.value()))
    }

    /// Replace the breaker for `name` with a fresh one built from `config`.
    ///
    /// Holders of the previous `Arc` keep using the old instance.
    pub fn configure(
        &self,
        name: &str,
        config: CircuitBreakerConfig,
    ) -> ConfigResult<Arc<CircuitBreaker<C>>> {
        let breaker = Arc::new(CircuitBreaker::with_clock(name, config, self.clock.clone())?);
        self.breakers.insert(name.to_string(), Arc::clone(&breaker));
        info!(command = %name, "Configured circuit breaker");
        Ok(breaker)
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker<C>>> {
        self.breakers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, name: &str) -> Option<Arc<CircuitBreaker<C>>> {
        self.breakers.remove(name).map(|(_, breaker)| breaker)
    }

    /// Registered command names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.breakers.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Reset every registered breaker to `Closed` with empty statistics.
    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }
}

impl<C: Clock + Clone> std::fmt::Debug for CircuitBreakerRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerRegistry").field("commands", &self.names()).finish()
    }
}
