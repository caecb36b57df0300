//! Retry policy for rate-limited responses

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

fn is_rate_limited(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
}

/// Shared by every source in a process.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total requests allowed for one call, including the first
    pub max_attempts: u32,
    /// Pause used when `Retry-After` is absent or unparseable
    pub default_delay: Duration,
    pub retryable: fn(StatusCode) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            default_delay: Duration::from_secs(DEFAULT_RETRY_AFTER_SECS),
            retryable: is_rate_limited,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, default_delay: Duration) -> Self {
        Self {
            max_attempts,
            default_delay,
            ..Self::default()
        }
    }

    pub fn should_retry(&self, status: StatusCode) -> bool {
        (self.retryable)(status)
    }

    /// Delay requested by the server, in whole seconds
    pub fn delay_for(&self, headers: &HeaderMap) -> Duration {
        headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(self.default_delay)
    }
}
