//! Configuration loader
//!
//! Loads [`ClientConfig`] from a file and/or environment variables.
//!
//! ## Loading Strategy
//! 1. Start from the file given to [`load`], or the first file found by
//!    [`probe_config_paths`], or the defaults if there is none
//! 2. Overlay any `BREAKWATER_*` environment variables that are set
//!
//! ## Environment Variables
//! - `BREAKWATER_TIMEOUT_MS`: Per-attempt timeout in milliseconds
//! - `BREAKWATER_COMMAND_NAME`: Circuit breaker command name
//! - `BREAKWATER_RETRY_COUNT`: Retries after the first attempt
//! - `BREAKWATER_BACKOFF_MS`: Constant backoff between attempts in milliseconds
//! - `BREAKWATER_MAX_CONCURRENT_REQUESTS`: Breaker concurrency limit
//! - `BREAKWATER_ERROR_THRESHOLD_PERCENTAGE`: Failure percentage that trips
//!   the breaker
//! - `BREAKWATER_REQUEST_VOLUME_THRESHOLD`: Minimum requests before tripping
//! - `BREAKWATER_SLEEP_WINDOW_MS`: Open duration before a probe in
//!   milliseconds
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./breakwater.toml` or `./breakwater.json`
//! 2. `./config/breakwater.toml` or `./config/breakwater.json`

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use breakwater_common::BackoffConfig;

use super::settings::ClientConfig;
use crate::errors::{ClientError, ClientResult};

const ENV_TIMEOUT_MS: &str = "BREAKWATER_TIMEOUT_MS";
const ENV_COMMAND_NAME: &str = "BREAKWATER_COMMAND_NAME";
const ENV_RETRY_COUNT: &str = "BREAKWATER_RETRY_COUNT";
const ENV_BACKOFF_MS: &str = "BREAKWATER_BACKOFF_MS";
const ENV_MAX_CONCURRENT_REQUESTS: &str = "BREAKWATER_MAX_CONCURRENT_REQUESTS";
const ENV_ERROR_THRESHOLD_PERCENTAGE: &str = "BREAKWATER_ERROR_THRESHOLD_PERCENTAGE";
const ENV_REQUEST_VOLUME_THRESHOLD: &str = "BREAKWATER_REQUEST_VOLUME_THRESHOLD";
const ENV_SLEEP_WINDOW_MS: &str = "BREAKWATER_SLEEP_WINDOW_MS";

/// Load configuration from a file (if any) with environment overrides
///
/// # Arguments
/// * `path` - Config file to load. If `None`, uses [`probe_config_paths`] and
///   falls back to defaults when nothing is found.
///
/// # Errors
/// Returns `ClientError::Config` if:
/// - The given file does not exist or cannot be parsed
/// - An environment variable has an invalid value
/// - The resulting configuration is invalid
pub fn load(path: Option<&Path>) -> ClientResult<ClientConfig> {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => probe_config_paths(),
    };

    let mut config = match config_path {
        Some(p) => load_from_file(&p)?,
        None => {
            tracing::debug!("No config file found, using defaults");
            ClientConfig::default()
        }
    };

    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from environment variables
///
/// Unset variables keep their default values.
///
/// # Errors
/// Returns `ClientError::Config` if a variable has an invalid value.
pub fn load_from_env() -> ClientResult<ClientConfig> {
    let mut config = ClientConfig::default();
    apply_env_overrides(&mut config)?;
    config.validate()?;
    tracing::info!(
        command = %config.command_name,
        "Configuration loaded from environment variables"
    );
    Ok(config)
}

/// Load configuration from a file
///
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `ClientError::Config` if:
/// - File not found
/// - File format is invalid
pub fn load_from_file(path: impl AsRef<Path>) -> ClientResult<ClientConfig> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ClientError::Config(format!("Config file not found: {}", path.display())));
    }

    tracing::info!(path = %path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(path)
        .map_err(|e| ClientError::Config(format!("Failed to read config file: {}", e)))?;

    parse_config(&contents, path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> ClientResult<ClientConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| ClientError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| ClientError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(ClientError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe the standard locations for a configuration file
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    probe_in(&cwd)
}

fn probe_in(base: &Path) -> Option<PathBuf> {
    let candidates = [
        base.join("breakwater.toml"),
        base.join("breakwater.json"),
        base.join("config").join("breakwater.toml"),
        base.join("config").join("breakwater.json"),
    ];

    candidates.into_iter().find(|path| path.exists())
}

/// Overlay every `BREAKWATER_*` variable that is set onto `config`
fn apply_env_overrides(config: &mut ClientConfig) -> ClientResult<()> {
    if let Some(ms) = env_parse::<u64>(ENV_TIMEOUT_MS)? {
        config.timeout = Duration::from_millis(ms);
    }
    if let Some(name) = env_opt(ENV_COMMAND_NAME) {
        config.command_name = name;
    }
    if let Some(count) = env_parse::<u32>(ENV_RETRY_COUNT)? {
        config.retry_count = count;
    }
    if let Some(ms) = env_parse::<u64>(ENV_BACKOFF_MS)? {
        config.backoff = BackoffConfig::Constant { interval: Duration::from_millis(ms) };
    }

    let breaker = &mut config.circuit_breaker;
    if let Some(limit) = env_parse::<u32>(ENV_MAX_CONCURRENT_REQUESTS)? {
        breaker.max_concurrent_requests = limit;
    }
    if let Some(percentage) = env_parse::<u8>(ENV_ERROR_THRESHOLD_PERCENTAGE)? {
        breaker.error_threshold_percentage = percentage;
    }
    if let Some(volume) = env_parse::<u32>(ENV_REQUEST_VOLUME_THRESHOLD)? {
        breaker.request_volume_threshold = volume;
    }
    if let Some(ms) = env_parse::<u64>(ENV_SLEEP_WINDOW_MS)? {
        breaker.sleep_window = Duration::from_millis(ms);
    }

    Ok(())
}

/// Get an optional environment variable, treating blank values as unset
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Parse an optional environment variable
///
/// # Errors
/// Returns `ClientError::Config` if the variable is set but does not parse.
fn env_parse<T>(key: &str) -> ClientResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| ClientError::Config(format!("Invalid value for {}: {}", key, e)))
        })
        .transpose()
}
