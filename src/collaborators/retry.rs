//! Backoff for outbound notification deliveries

use std::time::{Duration, SystemTime};

/// How often and how patiently a failed delivery is retried
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry, doubled on each further attempt
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Whether an HTTP status is worth another attempt (429 and 5xx)
#[must_use]
pub fn is_recoverable(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Parse a `Retry-After` header given in whole seconds.
///
/// HTTP-date values are ignored and fall back to exponential backoff.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Delay before retry number `attempt` (zero-based).
///
/// A server-provided `retry_after` wins, capped at `max_delay`. Otherwise
/// `base_delay * 2^attempt` plus up to 25% jitter taken from the clock's
/// subsecond nanos, capped at `max_delay`.
#[must_use]
pub fn delay_for_attempt(
    policy: &RetryPolicy,
    attempt: u32,
    retry_after: Option<Duration>,
) -> Duration {
    if let Some(ra) = retry_after {
        return ra.min(policy.max_delay);
    }

    let base = policy
        .base_delay
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(policy.max_delay);

    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    let jitter = base.mul_f64(f64::from(nanos % 250) / 1000.0);

    (base + jitter).min(policy.max_delay)
}
