//! Event interface between the download core and whatever presents it.
//!
//! Retry and progress notifications flow through [`TransferObserver`], so the
//! request client and transfer engine never know whether a terminal bar, a
//! log line, or nothing at all is listening.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::progress::ProgressEvent;
use super::{DownloadError, DownloadTask, TransferStatus};

/// One scheduled retry.
#[derive(Debug, Clone)]
pub struct RetryEvent {
    /// URL being retried.
    pub url: String,
    /// Attempt that just failed (1-indexed).
    pub failed_attempt: u32,
    /// Attempt budget.
    pub max_attempts: u32,
    /// Delay before the next attempt.
    pub delay: Duration,
    /// Short description of the failure.
    pub reason: String,
}

/// Receives retry and progress events. All methods default to no-ops.
///
/// Implementations must return quickly; they are called inline on the data path.
pub trait TransferObserver: Send + Sync {
    /// A retry was scheduled.
    fn on_retry(&self, _event: &RetryEvent) {}

    /// A body transfer is about to start at `resume_offset`.
    fn on_transfer_start(&self, _task: &DownloadTask, _resume_offset: u64) {}

    /// Bytes arrived.
    fn on_progress(&self, _event: &ProgressEvent) {}

    /// A download call finished.
    fn on_transfer_end(
        &self,
        _task: &DownloadTask,
        _outcome: Result<TransferStatus, &DownloadError>,
    ) {
    }
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TransferObserver for NoopObserver {}

/// Observer that forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl TransferObserver for LoggingObserver {
    fn on_retry(&self, event: &RetryEvent) {
        warn!(
            url = %event.url,
            attempt = event.failed_attempt,
            max_attempts = event.max_attempts,
            delay_ms = event.delay.as_millis(),
            reason = %event.reason,
            "retrying"
        );
    }

    fn on_transfer_start(&self, task: &DownloadTask, resume_offset: u64) {
        debug!(url = %task.source_url, resume_offset, "transfer started");
    }

    fn on_progress(&self, event: &ProgressEvent) {
        debug!(
            transferred = event.transferred,
            expected = ?event.expected_total,
            bytes_per_sec = event.bytes_per_sec,
            "progress"
        );
    }

    fn on_transfer_end(
        &self,
        task: &DownloadTask,
        outcome: Result<TransferStatus, &DownloadError>,
    ) {
        match outcome {
            Ok(status) => info!(
                path = %task.final_path.display(),
                status = status.as_str(),
                "transfer finished"
            ),
            Err(error) => warn!(
                path = %task.final_path.display(),
                kind = %error.kind(),
                error = %error,
                "transfer failed"
            ),
        }
    }
}
