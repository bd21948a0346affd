//! Progress accounting for a single transfer.
//!
//! The tracker sits beside the write loop: it counts bytes, derives throughput
//! and ETA, and hands out throttled [`ProgressEvent`]s. It never blocks and
//! never touches the stream itself.

use std::time::{Duration, Instant};

use super::constants::{PROGRESS_CLAMP_TOLERANCE, PROGRESS_EMIT_INTERVAL};

/// Weight of the newest throughput sample in the moving average.
const RATE_SMOOTHING: f64 = 0.3;

/// Snapshot of a transfer in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// URL being transferred.
    pub url: String,
    /// Bytes on disk for this resource, clamped to `expected_total`.
    pub transferred: u64,
    /// Expected final size when known.
    pub expected_total: Option<u64>,
    /// Smoothed throughput of the current attempt.
    pub bytes_per_sec: f64,
    /// Estimated time remaining, when both total and throughput are known.
    pub eta: Option<Duration>,
}

impl ProgressEvent {
    /// Completion percentage in `0.0..=100.0`, when the total is known.
    #[must_use]
    pub fn percent(&self) -> Option<f64> {
        match self.expected_total {
            Some(0) => Some(100.0),
            #[allow(clippy::cast_precision_loss)]
            Some(total) => Some((self.transferred as f64 / total as f64 * 100.0).min(100.0)),
            None => None,
        }
    }
}

/// Expected final size of the resource, in priority order:
///
/// 1. the sample cap, when sampling
/// 2. the total declared by a `206` response's `Content-Range`
/// 3. `resume_offset + content_length` when resuming
/// 4. the plain `Content-Length`
/// 5. unknown
#[must_use]
pub fn expected_total(
    sample_cap: u64,
    content_range_total: Option<u64>,
    resume_offset: u64,
    content_length: Option<u64>,
) -> Option<u64> {
    if sample_cap > 0 {
        return Some(sample_cap);
    }
    if let Some(total) = content_range_total {
        return Some(total);
    }
    match content_length {
        Some(length) if resume_offset > 0 => Some(resume_offset.saturating_add(length)),
        Some(length) => Some(length),
        None => None,
    }
}

/// Bytes to display: snaps to the total once above it or within the tolerance.
#[must_use]
pub fn displayed_bytes(transferred: u64, expected_total: Option<u64>) -> u64 {
    match expected_total {
        Some(total) if transferred.saturating_add(PROGRESS_CLAMP_TOLERANCE) >= total => total,
        _ => transferred,
    }
}

/// Parses the total from a `Content-Range` value such as `bytes 0-0/1000`.
#[must_use]
pub fn parse_content_range_total(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (_, total) = rest.rsplit_once('/')?;
    total.trim().parse().ok()
}

/// Counts bytes for one attempt and emits throttled progress events.
#[derive(Debug)]
pub struct ProgressTracker {
    url: String,
    expected_total: Option<u64>,
    transferred: u64,
    window_start: Instant,
    window_bytes: u64,
    last_emit: Option<Instant>,
    rate: f64,
}

impl ProgressTracker {
    /// Starts tracking at `resume_offset` bytes already on disk.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        resume_offset: u64,
        expected_total: Option<u64>,
        now: Instant,
    ) -> Self {
        Self {
            url: url.into(),
            expected_total,
            transferred: resume_offset,
            window_start: now,
            window_bytes: 0,
            last_emit: None,
            rate: 0.0,
        }
    }

    /// Total bytes on disk, unclamped.
    #[must_use]
    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    /// Expected final size.
    #[must_use]
    pub fn expected_total(&self) -> Option<u64> {
        self.expected_total
    }

    /// Records `len` new bytes; returns an event when the emit interval elapsed.
    pub fn record(&mut self, len: u64, now: Instant) -> Option<ProgressEvent> {
        self.transferred = self.transferred.saturating_add(len);
        self.window_bytes = self.window_bytes.saturating_add(len);

        let due = self
            .last_emit
            .is_none_or(|last| now.saturating_duration_since(last) >= PROGRESS_EMIT_INTERVAL);
        due.then(|| self.snapshot(now))
    }

    /// Builds an event now, folding the current window into the rate.
    pub fn snapshot(&mut self, now: Instant) -> ProgressEvent {
        let elapsed = now.saturating_duration_since(self.window_start);
        if !elapsed.is_zero() {
            #[allow(clippy::cast_precision_loss)]
            let sample = self.window_bytes as f64 / elapsed.as_secs_f64();
            self.rate = if self.rate <= 0.0 {
                sample
            } else {
                RATE_SMOOTHING * sample + (1.0 - RATE_SMOOTHING) * self.rate
            };
            self.window_start = now;
            self.window_bytes = 0;
        }
        self.last_emit = Some(now);

        let shown = displayed_bytes(self.transferred, self.expected_total);
        let eta = match self.expected_total {
            Some(total) if self.rate > 0.0 => {
                #[allow(clippy::cast_precision_loss)]
                let remaining = total.saturating_sub(shown) as f64;
                Some(Duration::from_secs_f64(remaining / self.rate))
            }
            _ => None,
        };

        ProgressEvent {
            url: self.url.clone(),
            transferred: shown,
            expected_total: self.expected_total,
            bytes_per_sec: self.rate,
            eta,
        }
    }
}
