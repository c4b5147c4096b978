//! Resilient HTTP request execution.
//!
//! [`ResilientHttpClient`] sends requests through a pluggable
//! [`HttpTransport`], retries failed attempts with a configurable
//! [`BackoffStrategy`], and guards every attempt with the
//! [`CircuitBreaker`] registered for its command name.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use breakwater_http::{ConstantBackoff, ResilientHttpClient};
//!
//! # async fn run() -> breakwater_http::ClientResult<()> {
//! let client = ResilientHttpClient::builder()
//!     .command_name("inventory")
//!     .timeout(Duration::from_secs(2))
//!     .retry_count(3)
//!     .backoff(Arc::new(ConstantBackoff::new(Duration::from_millis(100))))
//!     .build()?;
//!
//! let response = client.get("http://localhost:8080/items").await?;
//! if response.is_server_error() {
//!     // every attempt failed; this is the last response observed
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod client;
pub mod config;
pub mod errors;
pub mod request;
pub mod response;
pub mod retry;
pub mod transport;

pub use breakwater_common::{
    BackoffConfig, BackoffStrategy, BreakerStats, CircuitBreaker, CircuitBreakerConfig,
    CircuitBreakerRegistry, CircuitState, ConstantBackoff, ExponentialBackoff, Jitter,
    LinearBackoff, NoBackoff,
};
pub use client::{Fallback, ResilientHttpClient, ResilientHttpClientBuilder};
pub use config::ClientConfig;
pub use errors::{
    ClientError, ClientErrorCategory, ClientResult, TransportError, TransportErrorKind,
};
pub use request::HttpRequest;
pub use response::Response;
pub use retry::RetryContext;
pub use transport::{HttpTransport, ReqwestTransport};
pub use tokio_util::sync::CancellationToken;
