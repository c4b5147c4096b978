//! Client configuration model

use std::time::Duration;

use breakwater_common::{duration_millis, BackoffConfig, CircuitBreakerConfig};
use serde::{Deserialize, Serialize};

use crate::client::{DEFAULT_COMMAND_NAME, DEFAULT_TIMEOUT};
use crate::errors::{ClientError, ClientResult};

/// Settings for [`ResilientHttpClient`](crate::ResilientHttpClient).
///
/// Every field has a default, so a config file only needs the values it
/// changes. Durations are expressed in milliseconds.
///
/// ```toml
/// timeout = 2000
/// command_name = "inventory"
/// retry_count = 3
///
/// [backoff]
/// strategy = "constant"
/// interval = 100
///
/// [circuit_breaker]
/// error_threshold_percentage = 25
/// sleep_window = 10000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Timeout for one HTTP round trip
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    /// Name of the circuit breaker the client routes through
    pub command_name: String,
    /// Retries after the first attempt
    pub retry_count: u32,
    pub backoff: BackoffConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            command_name: DEFAULT_COMMAND_NAME.to_string(),
            retry_count: 0,
            backoff: BackoffConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Check the settings without building a client.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] for a zero timeout, an empty command
    /// name, or an invalid circuit breaker section.
    pub fn validate(&self) -> ClientResult<()> {
        if self.timeout.is_zero() {
            return Err(ClientError::Config("timeout must be greater than zero".to_string()));
        }
        if self.command_name.trim().is_empty() {
            return Err(ClientError::Config("command_name must not be empty".to_string()));
        }
        self.circuit_breaker
            .validate()
            .map_err(|err| ClientError::Config(format!("Invalid circuit_breaker section: {err}")))
    }
}
