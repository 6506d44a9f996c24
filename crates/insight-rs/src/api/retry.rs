//! Retry with exponential backoff, and failure classification.
//!
//! Every API failure is classified into a [`FailureReason`]. Only
//! [`FailureReason::ServerError`] is retried; rate limits, bad requests,
//! quota errors, and timeouts fail fast into a fallback response.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::client::ApiError;

/// Configuration for retry behavior.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries (0 = single attempt).
    pub max_retries: u32,
    /// Delay before the first retry.
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
    /// Backoff multiplier (typically 2.0 for exponential backoff).
    pub multiplier: f64,
    /// Whether to add jitter to prevent thundering herd.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a config with the given number of retries and default backoff.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..Default::default()
        }
    }

    /// Retry without waiting between attempts.
    pub fn immediate(retries: u32) -> Self {
        Self {
            max_retries: retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
            ..Default::default()
        }
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Calculate the delay for a given retry number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        if self.jitter {
            // Deterministic jitter keyed on the attempt number.
            let jitter_factor = match attempt % 4 {
                0 => 0.75,
                1 => 0.90,
                2 => 0.60,
                _ => 0.85,
            };
            Duration::from_secs_f64(capped * jitter_factor)
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

// ── Classification ─────────────────────────────────────────────────

/// Why a request ended in a fallback instead of a completion.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    RateLimit,
    Timeout,
    InvalidRequest,
    ServerError,
    QuotaExceeded,
    Unknown,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::RateLimit => "rate_limit",
            FailureReason::Timeout => "timeout",
            FailureReason::InvalidRequest => "invalid_request",
            FailureReason::ServerError => "server_error",
            FailureReason::QuotaExceeded => "quota_exceeded",
            FailureReason::Unknown => "unknown",
        }
    }

    /// Whether a failure with this reason is worth another attempt.
    pub fn is_retryable(self) -> bool {
        self == FailureReason::ServerError
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static SERVER_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b5\d{2}\b").unwrap_or_else(|e| panic!("invalid built-in pattern: {e}"))
});

/// Classify an API failure.
///
/// HTTP errors are classified by status code first and by body text for
/// the remaining statuses. Other errors go through [`classify_message`] on
/// their display text, so provider errors delivered in a success body are
/// handled the same way.
pub fn classify_error(error: &ApiError) -> FailureReason {
    match error {
        ApiError::Timeout(_) => FailureReason::Timeout,
        ApiError::Http { status, body } => match status {
            429 => FailureReason::RateLimit,
            400 => FailureReason::InvalidRequest,
            500..=599 => FailureReason::ServerError,
            _ => classify_message(body),
        },
        other => classify_message(&other.to_string()),
    }
}

/// Classify an error message: `429` → rate limit, `400` → invalid request,
/// any `5xx` → server error, "quota" → quota exceeded, otherwise unknown.
pub fn classify_message(message: &str) -> FailureReason {
    if message.contains("429") {
        return FailureReason::RateLimit;
    }
    if message.contains("400") {
        return FailureReason::InvalidRequest;
    }
    if SERVER_STATUS.is_match(message) {
        return FailureReason::ServerError;
    }
    let lower = message.to_lowercase();
    if lower.contains("quota") {
        return FailureReason::QuotaExceeded;
    }
    if lower.contains("timed out") || lower.contains("timeout") {
        return FailureReason::Timeout;
    }
    FailureReason::Unknown
}
