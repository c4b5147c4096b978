//! Buffered HTTP response

use std::borrow::Cow;

/// Status code and fully buffered body of an HTTP response.
///
/// `Response::default()` (status `0`, empty body) stands for "no response was
/// ever observed", which is what the client returns when every attempt failed
/// at the transport level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    status_code: u16,
    body: Vec<u8>,
}

impl Response {
    pub fn new(status_code: u16, body: impl Into<Vec<u8>>) -> Self {
        Self { status_code, body: body.into() }
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// `true` for 2xx statuses
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// `true` for statuses of 500 and above, which the client treats as failures
    pub fn is_server_error(&self) -> bool {
        self.status_code >= 500
    }

    /// `true` when this is the placeholder for "no response observed"
    pub fn is_empty(&self) -> bool {
        self.status_code == 0 && self.body.is_empty()
    }
}
