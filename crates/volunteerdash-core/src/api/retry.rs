use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};

/// Attempts allowed for a request that keeps failing with 5xx or network errors.
const MAX_SERVER_ATTEMPTS: u32 = 3;

/// Fixed pause between server-error attempts.
const SERVER_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Wait used when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

/// Consecutive 429 waits before giving up.
const MAX_RATE_LIMIT_RETRIES: u32 = 20;

/// Bounds for the request loop in the API client.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_server_attempts: u32,
    pub server_retry_delay: Duration,
    pub default_retry_after: Duration,
    pub max_rate_limit_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_server_attempts: MAX_SERVER_ATTEMPTS,
            server_retry_delay: SERVER_RETRY_DELAY,
            default_retry_after: DEFAULT_RETRY_AFTER,
            max_rate_limit_retries: MAX_RATE_LIMIT_RETRIES,
        }
    }
}

impl RetryPolicy {
    /// Same attempt counts with every wait set to zero.
    pub fn immediate() -> Self {
        Self {
            server_retry_delay: Duration::ZERO,
            default_retry_after: Duration::ZERO,
            ..Self::default()
        }
    }

    /// How long to wait after a 429, from `Retry-After` seconds when present.
    pub fn retry_after(&self, headers: &HeaderMap) -> Duration {
        headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(self.default_retry_after)
    }
}

/// Per-request counters carried through the retry loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Attempts {
    pub server: u32,
    pub rate_limited: u32,
    pub reauthenticated: bool,
}

impl Attempts {
    pub fn server_exhausted(&self, policy: &RetryPolicy) -> bool {
        self.server >= policy.max_server_attempts
    }

    pub fn rate_limit_exhausted(&self, policy: &RetryPolicy) -> bool {
        self.rate_limited > policy.max_rate_limit_retries
    }
}
