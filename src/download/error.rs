//! Error types for the download module.
//!
//! This module defines structured errors for every request and transfer
//! operation. Each error carries a stable machine-readable [`kind`](DownloadError::kind)
//! and a concrete [`suggestion`](DownloadError::suggestion) for the operator.

use std::borrow::Cow;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during requests and file transfers.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// No response headers arrived within the request timeout.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The response body stalled longer than the read timeout.
    #[error("no data received from {url} for {}ms", idle.as_millis())]
    IdleTimeout {
        /// The URL whose body stalled.
        url: String,
        /// The idle window that elapsed.
        idle: Duration,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} requesting {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// A ranged resume request was answered without partial content.
    #[error("server ignored byte range for {url} (HTTP {status}); partial data discarded")]
    RangeNotHonored {
        /// The URL that ignored the range.
        url: String,
        /// The status actually returned.
        status: u16,
    },

    /// Stream ended cleanly but short of the expected size.
    #[error(
        "integrity check failed for {path}: expected {expected_bytes} bytes, got {actual_bytes}"
    )]
    Integrity {
        /// Partial file that was left in place for resume.
        path: PathBuf,
        /// Expected size in bytes.
        expected_bytes: u64,
        /// Actual size in bytes.
        actual_bytes: u64,
    },

    /// File system error during download (create file, write, rename, etc.)
    #[error("IO error on {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a request timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an idle-read timeout error.
    pub fn idle_timeout(url: impl Into<String>, idle: Duration) -> Self {
        Self::IdleTimeout {
            url: url.into(),
            idle,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a range-not-honored error.
    pub fn range_not_honored(url: impl Into<String>, status: u16) -> Self {
        Self::RangeNotHonored {
            url: url.into(),
            status,
        }
    }

    /// Creates an integrity mismatch error.
    pub fn integrity(path: impl Into<PathBuf>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Integrity {
            path: path.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Stable machine-readable kind, e.g. `AUTH_401`, `SERVER_5xx`, `HTTP_404`.
    #[must_use]
    pub fn kind(&self) -> Cow<'static, str> {
        match self {
            Self::HttpStatus { status, .. } => status_kind(*status),
            Self::Network { .. } => Cow::Borrowed("NETWORK"),
            Self::Timeout { .. } => Cow::Borrowed("TIMEOUT"),
            Self::IdleTimeout { .. } => Cow::Borrowed("IDLE_TIMEOUT"),
            Self::RangeNotHonored { .. } => Cow::Borrowed("RANGE_IGNORED"),
            Self::Integrity { .. } => Cow::Borrowed("INTEGRITY"),
            Self::Io { .. } => Cow::Borrowed("IO"),
            Self::InvalidUrl { .. } => Cow::Borrowed("INVALID_URL"),
        }
    }

    /// Concrete remediation step for the operator.
    #[must_use]
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::HttpStatus { status: 401, .. } => {
                "Your session is no longer accepted. Re-run with --force-login to sign in again."
            }
            Self::HttpStatus { status: 403, .. } => {
                "Check that this account is enrolled in the course, or re-run with --force-login."
            }
            Self::HttpStatus { status: 429, .. } => {
                "The server is rate limiting. Wait a few minutes, then re-run with a larger \
                 --delay-ms."
            }
            Self::HttpStatus { status, .. } if (500..=599).contains(status) => {
                "The server is failing. Re-run later; completed files are skipped and partial \
                 ones resume."
            }
            Self::HttpStatus { .. } => {
                "Verify the course identifier and that the resource still exists, then re-run."
            }
            Self::Network { .. } | Self::Timeout { .. } | Self::IdleTimeout { .. } => {
                "Check network connectivity/VPN, then re-run; raise --retry-attempts or \
                 --read-timeout-ms on slow links."
            }
            Self::RangeNotHonored { .. } | Self::Integrity { .. } => {
                "Re-run the same command; the file will be fetched again from the start or resumed."
            }
            Self::Io { .. } => {
                "Check free disk space and write permissions for the output directory."
            }
            Self::InvalidUrl { .. } => {
                "The catalog produced a malformed URL; check the course manifest entry."
            }
        }
    }
}

fn status_kind(status: u16) -> Cow<'static, str> {
    match status {
        401 => Cow::Borrowed("AUTH_401"),
        403 => Cow::Borrowed("ACCESS_403"),
        429 => Cow::Borrowed("RATE_LIMIT_429"),
        500..=599 => Cow::Borrowed("SERVER_5xx"),
        other => Cow::Owned(format!("HTTP_{other}")),
    }
}

// No From<reqwest::Error> / From<std::io::Error>: every variant needs the URL
// or path context that the source errors don't carry.
