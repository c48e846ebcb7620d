//! Retry policy for backend calls.
//!
//! The backend sits behind a tunnelling proxy that answers `502 Bad Gateway`
//! while the upstream is busy or restarting. That status, and transport
//! failures raised before any status arrives, are the only things retried.
//! Every other status is a final answer for the caller to branch on.

use reqwest::StatusCode;
use std::time::Duration;

/// Default number of attempts per call.
pub const MAX_RETRIES: usize = 5;

/// Default delay between attempts in milliseconds.
pub const RETRY_DELAY_MS: u64 = 2000;

/// Returns true for the statuses the client retries. Only 502 qualifies.
pub fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::BAD_GATEWAY
}

/// What to do when every attempt answered with a transient status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExhaustionPolicy {
    /// Hand the last 502 response back to the caller as a normal response.
    #[default]
    ReturnLast,
    /// Fail the call with [`RetriesExhausted`].
    Fail,
}

/// How many times a call is attempted and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first one. Values below 1 are
    /// treated as 1.
    pub max_retries: usize,
    /// Flat pause between attempts. No backoff, no jitter.
    pub retry_delay: Duration,
    /// What to do when every attempt got a 502.
    pub on_exhausted: ExhaustionPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
            on_exhausted: ExhaustionPolicy::default(),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy that returns the last 502 once attempts run out.
    pub fn new(max_retries: usize, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
            ..Self::default()
        }
    }

    /// Sets the behaviour once attempts run out.
    pub fn with_exhaustion(mut self, on_exhausted: ExhaustionPolicy) -> Self {
        self.on_exhausted = on_exhausted;
        self
    }

    /// Attempts actually made per call.
    pub fn attempts(&self) -> usize {
        self.max_retries.max(1)
    }
}

/// Every attempt of a call got a transient status back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetriesExhausted {
    pub attempts: usize,
    pub status: StatusCode,
    pub url: String,
}

impl std::fmt::Display for RetriesExhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Server kept returning HTTP {} for {} after {} attempts",
            self.status.as_u16(),
            self.url,
            self.attempts
        )
    }
}

impl std::error::Error for RetriesExhausted {}
