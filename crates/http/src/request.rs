//! Request model shared by the client and transports
//!
//! An [`HttpRequest`] is fully validated when it is constructed: the URL is
//! parsed and must use `http` or `https`, and header names and values must be
//! valid. Construction failures surface as
//! [`ClientError::RequestConstruction`] before any network activity.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION};
use reqwest::Method;
use url::Url;

use crate::errors::{ClientError, ClientResult};

/// A buffered HTTP request that can be sent any number of times
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Build a request for `method` and `url`.
    ///
    /// Every request carries `Connection: close` so that a connection broken
    /// mid-exchange is never handed to the next attempt.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::RequestConstruction`] if `url` does not parse
    /// or its scheme is not `http`/`https`.
    pub fn new(method: Method, url: &str) -> ClientResult<Self> {
        let parsed =
            Url::parse(url).map_err(|err| ClientError::request_construction(&method, err))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::request_construction(
                &method,
                format!("unsupported URL scheme '{}'", parsed.scheme()),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("close"));

        Ok(Self { method, url: parsed, headers, body: None })
    }

    pub fn get(url: &str) -> ClientResult<Self> {
        Self::new(Method::GET, url)
    }

    pub fn post(url: &str, body: impl Into<Vec<u8>>) -> ClientResult<Self> {
        Ok(Self::new(Method::POST, url)?.with_body(body))
    }

    pub fn put(url: &str, body: impl Into<Vec<u8>>) -> ClientResult<Self> {
        Ok(Self::new(Method::PUT, url)?.with_body(body))
    }

    pub fn patch(url: &str, body: impl Into<Vec<u8>>) -> ClientResult<Self> {
        Ok(Self::new(Method::PATCH, url)?.with_body(body))
    }

    pub fn delete(url: &str) -> ClientResult<Self> {
        Self::new(Method::DELETE, url)
    }

    pub fn head(url: &str) -> ClientResult<Self> {
        Self::new(Method::HEAD, url)
    }

    /// Attach a body, replacing any previous one
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set a header, replacing existing values for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::RequestConstruction`] for an invalid header
    /// name or value.
    pub fn header(mut self, name: &str, value: &str) -> ClientResult<Self> {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| ClientError::request_construction(&self.method, err))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|err| ClientError::request_construction(&self.method, err))?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Add `defaults` for every header this request does not set itself.
    pub(crate) fn with_default_headers(mut self, defaults: &HeaderMap) -> Self {
        for (name, value) in defaults {
            if !self.headers.contains_key(name) {
                self.headers.insert(name.clone(), value.clone());
            }
        }
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }
}
