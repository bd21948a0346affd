//! Retry classification and exponential backoff shared by every HTTP call site.
//!
//! This module provides the [`RetryPolicy`] and [`FailureType`] types for
//! classifying request failures and determining retry behavior. The same
//! policy object drives the [`RequestClient`](super::RequestClient) attempt loop
//! and the [`TransferEngine`](super::TransferEngine) attempt loop, so the
//! backoff math lives in exactly one place.
//!
//! # Overview
//!
//! - [`is_retriable_status`] - 408, 425, 429 and any 5xx
//! - [`is_retriable_error`] - timeouts and transient transport failures
//! - [`backoff_delay`] - `min(30s, 700ms * 2^(attempt-1))`
//!
//! # Example
//!
//! ```
//! use coursefetch_core::download::{
//!     DownloadError, FailureType, RetryDecision, RetryPolicy, classify_error,
//! };
//!
//! let policy = RetryPolicy::default();
//! let error = DownloadError::http_status("https://example.com/lecture.mp4", 503);
//! let failure_type = classify_error(&error);
//!
//! match policy.should_retry(failure_type, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::DownloadError;
use super::constants::{BACKOFF_BASE_MS, BACKOFF_CAP_MS, DEFAULT_RETRY_ATTEMPTS};

/// Classification of request failure types.
///
/// Used to determine whether a failed request or transfer should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: network timeout, idle stall, 5xx server errors, connection reset.
    Transient,

    /// Permanent failure that won't succeed regardless of retries.
    ///
    /// Examples: 404 Not Found, 400 Bad Request, invalid URL, local disk errors.
    Permanent,

    /// Authentication or authorization rejected (401/403).
    ///
    /// Retrying with the same credential cannot help; the operator must
    /// refresh the session.
    NeedsAuth,

    /// Server rate limiting (HTTP 429).
    RateLimited,
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Returns true for HTTP statuses worth retrying: 408, 425, 429 and any 5xx.
#[must_use]
pub fn is_retriable_status(status: u16) -> bool {
    matches!(status, 408 | 425 | 429) || (500..=599).contains(&status)
}

/// Returns true for timeouts and the fixed set of transient transport failures.
///
/// The transient set is connection reset/refused/aborted, timed out, broken
/// pipe, host or network unreachable, and DNS name-resolution failure.
#[must_use]
pub fn is_retriable_error(error: &reqwest::Error) -> bool {
    if error.is_timeout() || error.is_connect() {
        return true;
    }

    let mut source: Option<&(dyn StdError + 'static)> = error.source();
    while let Some(current) = source {
        if let Some(io_error) = current.downcast_ref::<io::Error>()
            && is_transient_io_kind(io_error.kind())
        {
            return true;
        }
        let text = current.to_string().to_ascii_lowercase();
        if text.contains("dns error")
            || text.contains("failed to lookup address")
            || text.contains("name or service not known")
        {
            return true;
        }
        source = current.source();
    }
    false
}

pub(crate) fn is_transient_io_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::TimedOut
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::UnexpectedEof
    )
}

/// Exponential backoff delay for a 1-indexed attempt.
///
/// `min(30000, 700 * 2^(attempt-1))` milliseconds. Attempt 0 is treated as 1.
#[must_use]
pub fn backoff_delay(attempt: u32) -> Duration {
    capped_exponential(
        Duration::from_millis(BACKOFF_BASE_MS),
        Duration::from_millis(BACKOFF_CAP_MS),
        attempt,
    )
}

fn capped_exponential(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let exponent = attempt.max(1) - 1;
    // 2^31 * 700ms already overflows any sane cap; clamp the shift.
    let factor = 1u64 << exponent.min(31);
    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    let cap_ms = u64::try_from(cap.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor).min(cap_ms))
}

/// Configuration for retry behavior with exponential backoff.
///
/// # Default Values
///
/// - `max_attempts`: 4
/// - `base_delay`: 700 milliseconds
/// - `max_delay`: 30 seconds
/// - `jitter`: none
///
/// # Delay Calculation
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random(0..=jitter)
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Base delay for the first retry.
    base_delay: Duration,

    /// Maximum delay cap.
    max_delay: Duration,

    /// Upper bound of random jitter added on top of the capped delay.
    jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            base_delay: Duration::from_millis(BACKOFF_BASE_MS),
            max_delay: Duration::from_millis(BACKOFF_CAP_MS),
            jitter: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with custom settings.
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Maximum attempts including initial (clamped to >= 1)
    /// * `base_delay` - Delay before the first retry
    /// * `max_delay` - Maximum delay cap
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            jitter: Duration::ZERO,
        }
    }

    /// Creates a policy with a custom `max_attempts`, using defaults for other settings.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Adds up to `jitter` of random delay to every retry. Cap and doubling are kept.
    #[must_use]
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the same policy with a different attempt budget.
    #[must_use]
    pub fn attempts(&self, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..self.clone()
        }
    }

    /// Determines whether to retry a failed attempt.
    ///
    /// # Arguments
    ///
    /// * `failure_type` - Classification of the failure
    /// * `attempt` - The attempt number that just failed (1-indexed)
    #[instrument(level = "debug", skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        match failure_type {
            FailureType::Permanent => {
                return RetryDecision::DoNotRetry {
                    reason: "permanent failure - retry would not help".to_string(),
                };
            }
            FailureType::NeedsAuth => {
                return RetryDecision::DoNotRetry {
                    reason: "credential rejected - retry with the same session would not help"
                        .to_string(),
                };
            }
            FailureType::Transient | FailureType::RateLimited => {}
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.delay_for(attempt);

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Delay to wait after the given failed attempt (1-indexed).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        capped_exponential(self.base_delay, self.max_delay, attempt) + self.calculate_jitter()
    }

    fn calculate_jitter(&self) -> Duration {
        if self.jitter.is_zero() {
            return Duration::ZERO;
        }
        let max_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter_ms = rand::thread_rng().gen_range(0..=max_ms);
        Duration::from_millis(jitter_ms)
    }
}

/// Classifies a download error into a failure type for retry decisions.
///
/// # HTTP Status Code Classification
///
/// | Status | Type |
/// |--------|------|
/// | 401, 403 | NeedsAuth |
/// | 408, 425 | Transient |
/// | 429 | RateLimited |
/// | 5xx | Transient |
/// | other | Permanent |
///
/// # Non-HTTP Errors
///
/// | Error | Type |
/// |-------|------|
/// | Timeout, IdleTimeout | Transient |
/// | Network | Transient when [`is_retriable_error`], else Permanent |
/// | RangeNotHonored, Integrity | Transient (the next attempt restarts or resumes) |
/// | Io, InvalidUrl | Permanent |
#[must_use]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::HttpStatus { status, .. } => classify_http_status(*status),
        DownloadError::Timeout { .. }
        | DownloadError::IdleTimeout { .. }
        | DownloadError::RangeNotHonored { .. }
        | DownloadError::Integrity { .. } => FailureType::Transient,
        DownloadError::Network { source, .. } => {
            if is_retriable_error(source) {
                FailureType::Transient
            } else {
                FailureType::Permanent
            }
        }
        DownloadError::Io { source, .. } => {
            if is_transient_io_kind(source.kind()) {
                FailureType::Transient
            } else {
                FailureType::Permanent
            }
        }
        DownloadError::InvalidUrl { .. } => FailureType::Permanent,
    }
}

/// Classifies an HTTP status code into a failure type.
#[must_use]
pub fn classify_http_status(status: u16) -> FailureType {
    match status {
        401 | 403 => FailureType::NeedsAuth,
        429 => FailureType::RateLimited,
        status if is_retriable_status(status) => FailureType::Transient,
        _ => FailureType::Permanent,
    }
}
