//! Serialization utilities for configuration values
//!
//! Durations in configuration files (breaker timeouts, sleep windows, backoff
//! intervals) are written as integer milliseconds.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Serialize/deserialize a [`Duration`] as whole milliseconds (u64).
///
/// # Usage
/// ```rust
/// use std::time::Duration;
///
/// use breakwater_common::duration_millis;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct BreakerSettings {
///     #[serde(with = "duration_millis")]
///     sleep_window: Duration,
/// }
/// ```
pub mod duration_millis {
    use super::*;

    /// Serde serialization result type
    type SerializeResult<S> = Result<<S as Serializer>::Ok, <S as Serializer>::Error>;

    /// Serialize a Duration as milliseconds, saturating at `u64::MAX`
    pub fn serialize<S>(duration: &Duration, serializer: S) -> SerializeResult<S>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    /// Deserialize milliseconds (u64) into a Duration
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
