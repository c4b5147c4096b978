//! Pluggable HTTP round-trip layer
//!
//! The client never talks to the network directly; it hands each attempt to
//! an [`HttpTransport`]. [`ReqwestTransport`] is the production
//! implementation, tests substitute scripted transports.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use tracing::debug;

use crate::errors::{ClientError, ClientResult, TransportError};
use crate::request::HttpRequest;
use crate::response::Response;

/// Performs a single HTTP round trip.
///
/// Implementations must not retry internally and must return
/// [`TransportError`] only when no HTTP response was received. Error
/// statuses are ordinary responses.
#[async_trait]
pub trait HttpTransport: Send + Sync + fmt::Debug {
    async fn send(&self, request: &HttpRequest, timeout: Duration)
        -> Result<Response, TransportError>;
}

/// [`HttpTransport`] backed by `reqwest`.
///
/// Idle connections are never pooled, so every attempt opens a fresh
/// connection.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: ReqwestClient,
}

impl ReqwestTransport {
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if the TLS backend cannot be
    /// initialised.
    pub fn new() -> ClientResult<Self> {
        let client = ReqwestClient::builder()
            .pool_max_idle_per_host(0)
            .no_proxy()
            .build()
            .map_err(|err| ClientError::Config(format!("Failed to build HTTP client: {err}")))?;
        Ok(Self { client })
    }

    /// Wrap an existing `reqwest` client, keeping its settings.
    pub fn with_client(client: ReqwestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<Response, TransportError> {
        let mut builder = self
            .client
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone())
            .timeout(timeout);

        if let Some(body) = request.body() {
            builder = builder.body(body.to_vec());
        }

        let response = builder.send().await?;
        let status = response.status();
        debug!(method = %request.method(), url = %request.url(), %status, "received HTTP response");

        let body = response.bytes().await?;
        Ok(Response::new(status.as_u16(), body.to_vec()))
    }
}
