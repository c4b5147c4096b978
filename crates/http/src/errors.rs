//! Error types for the resilient HTTP client
//!
//! [`TransportError`] describes a failed round trip as reported by an
//! [`HttpTransport`](crate::transport::HttpTransport). [`ClientError`] is what
//! callers of [`ResilientHttpClient`](crate::ResilientHttpClient) see, with
//! classification metadata for callers that layer their own retries on top.

use std::fmt;

use breakwater_common::ResilienceError;
use thiserror::Error;

use crate::response::Response;

/// Result alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// What went wrong during a single round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The round trip exceeded its timeout
    Timeout,
    /// No connection could be established
    Connect,
    /// The response body could not be read
    Body,
    /// Any other transport failure
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Body => "body",
            Self::Other => "transport",
        };
        f.write_str(label)
    }
}

/// Failure of one HTTP round trip
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connect, message)
    }

    pub fn body(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Body, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_body() || err.is_decode() {
            TransportErrorKind::Body
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, err.to_string())
    }
}

/// Categories of client errors for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientErrorCategory {
    /// The request could not be built - non-retryable
    Request,
    /// Network/transport failures - retryable
    Network,
    /// The circuit breaker refused the call - retry after the sleep window
    CircuitBreaker,
    /// The caller cancelled the call
    Cancelled,
    /// Invalid configuration - non-retryable
    Config,
}

/// Errors returned by [`ResilientHttpClient`](crate::ResilientHttpClient)
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to build {method} request: {message}")]
    RequestConstruction { method: String, message: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Every attempt failed; only surfaced to a configured fallback
    #[error("All {attempts} attempts for '{command}' failed: {message}")]
    RetriesExhausted {
        command: String,
        attempts: u32,
        last_response: Option<Response>,
        message: String,
    },

    #[error("Circuit breaker for '{command}' is open")]
    CircuitOpen { command: String },

    #[error("Circuit breaker for '{command}' reached its concurrency limit of {limit}")]
    MaxConcurrency { command: String, limit: u32 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    pub(crate) fn request_construction(
        method: impl fmt::Display,
        message: impl fmt::Display,
    ) -> Self {
        Self::RequestConstruction { method: method.to_string(), message: message.to_string() }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ClientErrorCategory {
        match self {
            Self::RequestConstruction { .. } => ClientErrorCategory::Request,
            Self::Transport(_) | Self::RetriesExhausted { .. } => ClientErrorCategory::Network,
            Self::CircuitOpen { .. } | Self::MaxConcurrency { .. } => {
                ClientErrorCategory::CircuitBreaker
            }
            Self::Cancelled => ClientErrorCategory::Cancelled,
            Self::Config(_) => ClientErrorCategory::Config,
        }
    }

    /// Whether repeating the same call immediately could succeed.
    ///
    /// Breaker rejections are not retryable: the breaker stays open for its
    /// whole sleep window, so an immediate retry is rejected again.
    pub fn is_retryable(&self) -> bool {
        matches!(self.category(), ClientErrorCategory::Network)
    }

    /// Map a breaker rejection onto the client error taxonomy.
    ///
    /// Returns `None` for outcomes that are not rejections.
    pub(crate) fn from_rejection<E>(error: &ResilienceError<E>) -> Option<Self>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        match error {
            ResilienceError::CircuitOpen { name } => {
                Some(Self::CircuitOpen { command: name.clone() })
            }
            ResilienceError::MaxConcurrency { name, limit } => {
                Some(Self::MaxConcurrency { command: name.clone(), limit: *limit })
            }
            ResilienceError::Timeout { .. } | ResilienceError::OperationFailed { .. } => None,
        }
    }
}
