//! Retrying HTTP executor guarded by a named circuit breaker
//!
//! Every attempt of a request runs through the [`CircuitBreaker`] registered
//! for the client's command name. Transport errors, breaker timeouts and 5xx
//! responses count as failures and are retried after the configured backoff.
//! When the retries run out the configured [`Fallback`] decides the result.
//! Without one, the last observed response is returned as `Ok`, so callers
//! must inspect [`Response::status_code`]. Breaker rejections end the call
//! immediately, either with the fallback or with [`ClientError::CircuitOpen`]
//! / [`ClientError::MaxConcurrency`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use breakwater_common::{
    BackoffStrategy, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, NoBackoff,
    ResilienceError,
};
use reqwest::header::HeaderMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::ClientConfig;
use crate::errors::{ClientError, ClientResult, TransportError};
use crate::request::HttpRequest;
use crate::response::Response;
use crate::retry::RetryContext;
use crate::transport::{HttpTransport, ReqwestTransport};

/// Command name used when none is configured
pub const DEFAULT_COMMAND_NAME: &str = "default";

/// Per-attempt timeout used when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Substitute result for calls that did not get a usable response.
///
/// Invoked when the circuit breaker refuses an attempt (with
/// [`ClientError::CircuitOpen`] or [`ClientError::MaxConcurrency`]) and when
/// every attempt failed (with [`ClientError::RetriesExhausted`], which carries
/// the last observed response, if any).
///
/// Closures `Fn(ClientError) -> ClientResult<Response>` implement this trait.
#[async_trait]
pub trait Fallback: Send + Sync {
    /// Produce the result of a call that failed with `error`.
    async fn fallback(&self, error: ClientError) -> ClientResult<Response>;
}

#[async_trait]
impl<F> Fallback for F
where
    F: Fn(ClientError) -> ClientResult<Response> + Send + Sync,
{
    async fn fallback(&self, error: ClientError) -> ClientResult<Response> {
        self(error)
    }
}

/// Why a single attempt counted as a failure
#[derive(Debug, Error)]
enum AttemptError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("server responded with status {}", .0.status_code())]
    ServerError(Response),
}

/// HTTP client with retries, backoff and circuit breaking.
pub struct ResilientHttpClient {
    timeout: Duration,
    command_name: String,
    retry_count: u32,
    backoff: Arc<dyn BackoffStrategy>,
    transport: Arc<dyn HttpTransport>,
    breaker: Arc<CircuitBreaker>,
    fallback: Option<Arc<dyn Fallback>>,
    default_headers: HeaderMap,
}

impl ResilientHttpClient {
    /// Start building a new client.
    pub fn builder() -> ResilientHttpClientBuilder {
        ResilientHttpClientBuilder::default()
    }

    /// Convenience constructor with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if the default transport cannot be
    /// built.
    pub fn new() -> ClientResult<Self> {
        Self::builder().build()
    }

    /// Build a client from a loaded [`ClientConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if the configuration is invalid.
    pub fn from_config(config: &ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        Self::builder()
            .timeout(config.timeout)
            .command_name(config.command_name.clone())
            .retry_count(config.retry_count)
            .backoff(config.backoff.build())
            .circuit_breaker(config.circuit_breaker.clone())
            .build()
    }

    pub fn command_name(&self) -> &str {
        &self.command_name
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Circuit breaker shared by every client using this command name
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Number of retries after the first attempt
    pub fn set_retry_count(&mut self, count: u32) {
        self.retry_count = count;
    }

    pub fn set_backoff(&mut self, backoff: Arc<dyn BackoffStrategy>) {
        self.backoff = backoff;
    }

    /// Issue a GET request.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn get(&self, url: &str) -> ClientResult<Response> {
        self.execute(HttpRequest::get(url)?).await
    }

    /// Issue a POST request with `body`.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn post(&self, url: &str, body: impl Into<Vec<u8>>) -> ClientResult<Response> {
        self.execute(HttpRequest::post(url, body)?).await
    }

    /// Issue a PUT request with `body`.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn put(&self, url: &str, body: impl Into<Vec<u8>>) -> ClientResult<Response> {
        self.execute(HttpRequest::put(url, body)?).await
    }

    /// Issue a PATCH request with `body`.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn patch(&self, url: &str, body: impl Into<Vec<u8>>) -> ClientResult<Response> {
        self.execute(HttpRequest::patch(url, body)?).await
    }

    /// Issue a DELETE request.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn delete(&self, url: &str) -> ClientResult<Response> {
        self.execute(HttpRequest::delete(url)?).await
    }

    /// Issue a HEAD request.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub async fn head(&self, url: &str) -> ClientResult<Response> {
        self.execute(HttpRequest::head(url)?).await
    }

    /// Execute `request` with retries under the command's circuit breaker.
    ///
    /// Makes at most `retry_count + 1` attempts. A response below 500 ends
    /// the call immediately. After the last failed attempt a configured
    /// [`Fallback`] receives [`ClientError::RetriesExhausted`] and its result
    /// is returned. Without a fallback the most recent response is returned
    /// as `Ok`, or [`Response::default`] if no attempt produced one.
    ///
    /// Dropping the returned future aborts the in-flight attempt and releases
    /// its breaker slot without recording an outcome.
    ///
    /// # Errors
    ///
    /// - [`ClientError::CircuitOpen`] / [`ClientError::MaxConcurrency`] when
    ///   the breaker refuses an attempt and no fallback is configured
    /// - whatever the [`Fallback`] returns when one is configured and the
    ///   call was rejected or ran out of attempts
    #[instrument(
        skip(self, request),
        fields(command = %self.command_name, method = %request.method(), url = %request.url())
    )]
    pub async fn execute(&self, request: HttpRequest) -> ClientResult<Response> {
        let request = request.with_default_headers(&self.default_headers);
        let mut context = RetryContext::new();
        let mut last_response: Option<Response> = None;

        loop {
            let attempt = context.attempt();
            debug!(attempt, "Sending request");

            match self.breaker.execute(|| self.attempt(&request)).await {
                Ok(response) => {
                    debug!(attempt, status = response.status_code(), "Request succeeded");
                    return Ok(response);
                }
                Err(ResilienceError::OperationFailed {
                    source: AttemptError::ServerError(response),
                }) => {
                    debug!(attempt, status = response.status_code(), "Server error response");
                    context.record_failure(format!("status {}", response.status_code()));
                    last_response = Some(response);
                }
                Err(error) => {
                    if let Some(rejection) = ClientError::from_rejection(&error) {
                        return self.on_rejection(rejection).await;
                    }
                    debug!(attempt, error = %error, "Attempt failed");
                    context.record_failure(error);
                }
            }

            if attempt >= self.retry_count {
                break;
            }

            let delay = self.backoff.next_interval(attempt);
            context.record_backoff(delay);
            if !delay.is_zero() {
                debug!(attempt, delay = ?delay, "Backing off before retry");
                tokio::time::sleep(delay).await;
            }
            context.next_attempt();
        }

        warn!(
            attempts = context.attempts_made(),
            elapsed = ?context.elapsed(),
            total_backoff = ?context.total_backoff(),
            last_error = context.last_error().unwrap_or("none"),
            "Retries exhausted"
        );

        match &self.fallback {
            Some(fallback) => {
                let exhausted = ClientError::RetriesExhausted {
                    command: self.command_name.clone(),
                    attempts: context.attempts_made(),
                    message: context.last_error().unwrap_or("no response").to_string(),
                    last_response,
                };
                info!(reason = %exhausted, "Using fallback after exhausting retries");
                fallback.fallback(exhausted).await
            }
            None => Ok(last_response.unwrap_or_default()),
        }
    }

    /// Like [`execute`](Self::execute), but stops as soon as `cancel` fires.
    ///
    /// Cancellation interrupts an in-flight attempt or a backoff sleep, and
    /// no further attempt is made.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Cancelled`] when cancelled, otherwise the same
    /// errors as [`execute`](Self::execute).
    pub async fn execute_cancellable(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> ClientResult<Response> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!(command = %self.command_name, "Request cancelled");
                Err(ClientError::Cancelled)
            }
            result = self.execute(request) => result,
        }
    }

    async fn attempt(&self, request: &HttpRequest) -> Result<Response, AttemptError> {
        let response = self.transport.send(request, self.timeout).await?;
        if response.is_server_error() {
            return Err(AttemptError::ServerError(response));
        }
        Ok(response)
    }

    async fn on_rejection(&self, rejection: ClientError) -> ClientResult<Response> {
        match &self.fallback {
            Some(fallback) => {
                info!(reason = %rejection, "Circuit breaker rejected request, using fallback");
                fallback.fallback(rejection).await
            }
            None => {
                warn!(reason = %rejection, "Circuit breaker rejected request");
                Err(rejection)
            }
        }
    }
}

impl fmt::Debug for ResilientHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientHttpClient")
            .field("command_name", &self.command_name)
            .field("timeout", &self.timeout)
            .field("retry_count", &self.retry_count)
            .field("backoff", &self.backoff)
            .field("transport", &self.transport)
            .field("has_fallback", &self.fallback.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ResilientHttpClient`].
pub struct ResilientHttpClientBuilder {
    timeout: Duration,
    command_name: String,
    circuit_breaker: CircuitBreakerConfig,
    retry_count: u32,
    backoff: Arc<dyn BackoffStrategy>,
    transport: Option<Arc<dyn HttpTransport>>,
    registry: Option<Arc<CircuitBreakerRegistry>>,
    fallback: Option<Arc<dyn Fallback>>,
    default_headers: HeaderMap,
}

impl Default for ResilientHttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            command_name: DEFAULT_COMMAND_NAME.to_string(),
            circuit_breaker: CircuitBreakerConfig::default(),
            retry_count: 0,
            backoff: Arc::new(NoBackoff),
            transport: None,
            registry: None,
            fallback: None,
            default_headers: HeaderMap::new(),
        }
    }
}

impl ResilientHttpClientBuilder {
    /// Timeout handed to the transport for each attempt
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Name of the circuit breaker this client routes through
    pub fn command_name(mut self, name: impl Into<String>) -> Self {
        self.command_name = name.into();
        self
    }

    /// Breaker settings, applied only if the command has no breaker yet
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }

    /// Retries after the first attempt (`0` means a single attempt)
    pub fn retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    pub fn backoff(mut self, backoff: Arc<dyn BackoffStrategy>) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Registry to resolve the breaker from; the process-wide one by default
    pub fn registry(mut self, registry: Arc<CircuitBreakerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn fallback(mut self, fallback: impl Fallback + 'static) -> Self {
        self.fallback = Some(Arc::new(fallback));
        self
    }

    /// Headers added to every request that does not set them itself
    pub fn default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = headers;
        self
    }

    /// # Errors
    ///
    /// Returns [`ClientError::Config`] for a zero timeout, an invalid breaker
    /// configuration, or a transport that cannot be built.
    pub fn build(self) -> ClientResult<ResilientHttpClient> {
        if self.timeout.is_zero() {
            return Err(ClientError::Config("timeout must be greater than zero".to_string()));
        }

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };

        let registry = self.registry.unwrap_or_else(CircuitBreakerRegistry::shared);
        let breaker = registry.get_or_create(&self.command_name, &self.circuit_breaker).map_err(
            |err| {
                ClientError::Config(format!(
                    "Invalid circuit breaker configuration for '{}': {err}",
                    self.command_name
                ))
            },
        )?;

        debug!(
            command = %self.command_name,
            retry_count = self.retry_count,
            timeout = ?self.timeout,
            "Built resilient HTTP client"
        );

        Ok(ResilientHttpClient {
            timeout: self.timeout,
            command_name: self.command_name,
            retry_count: self.retry_count,
            backoff: self.backoff,
            transport,
            breaker,
            fallback: self.fallback,
            default_headers: self.default_headers,
        })
    }
}

impl fmt::Debug for ResilientHttpClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientHttpClientBuilder")
            .field("command_name", &self.command_name)
            .field("timeout", &self.timeout)
            .field("retry_count", &self.retry_count)
            .field("circuit_breaker", &self.circuit_breaker)
            .field("has_fallback", &self.fallback.is_some())
            .finish_non_exhaustive()
    }
}
