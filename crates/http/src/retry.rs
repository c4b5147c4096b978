//! Per-call retry bookkeeping

use std::time::Duration;

use tokio::time::Instant;

/// Transient state of one logical request across its attempts.
///
/// Created when a call starts and dropped when it returns; nothing here is
/// shared between calls.
#[derive(Debug, Clone)]
pub struct RetryContext {
    started_at: Instant,
    attempt: u32,
    total_backoff: Duration,
    last_error: Option<String>,
}

impl RetryContext {
    pub(crate) fn new() -> Self {
        Self {
            started_at: Instant::now(),
            attempt: 0,
            total_backoff: Duration::ZERO,
            last_error: None,
        }
    }

    /// Zero-based index of the current attempt
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Attempts started so far
    pub fn attempts_made(&self) -> u32 {
        self.attempt.saturating_add(1)
    }

    /// Wall time since the call started
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Sum of all backoff delays slept so far
    pub fn total_backoff(&self) -> Duration {
        self.total_backoff
    }

    /// Description of the most recent failed attempt
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub(crate) fn record_failure(&mut self, error: impl ToString) {
        self.last_error = Some(error.to_string());
    }

    pub(crate) fn record_backoff(&mut self, delay: Duration) {
        self.total_backoff = self.total_backoff.saturating_add(delay);
    }

    pub(crate) fn next_attempt(&mut self) {
        self.attempt = self.attempt.saturating_add(1);
    }
}
