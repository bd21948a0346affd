//! Resumable, byte-cappable file transfer.
//!
//! [`TransferEngine::download`] writes into `<final>.part`, resumes from it
//! with `Range` requests when the server allows, and only ever creates the
//! final path by renaming the finished partial file. Bytes flow through an
//! idle-read watchdog, a progress counter and (for samples) a hard byte cap.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use reqwest::header::{
    ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, HeaderMap, HeaderName, HeaderValue, RANGE,
};
use reqwest::{Response, StatusCode};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};

use super::constants::{DEFAULT_READ_TIMEOUT, PARTIAL_SUFFIX};
use super::error::DownloadError;
use super::observer::{RetryEvent, TransferObserver};
use super::progress::{ProgressTracker, expected_total, parse_content_range_total};
use super::request::{RequestClient, RequestOptions};
use super::retry::{RetryDecision, classify_error};
use crate::auth::Session;

/// One file to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    /// Resource URL.
    pub source_url: String,
    /// Where the finished file lives.
    pub final_path: PathBuf,
    /// Where unfinished bytes accumulate (`final_path` + `.part`).
    pub temporary_path: PathBuf,
    /// Page the resource was discovered on.
    pub referer: Option<String>,
    /// Byte cap for sample transfers; 0 means unlimited.
    pub sample_byte_cap: u64,
}

impl DownloadTask {
    /// Full transfer of `source_url` into `final_path`.
    #[must_use]
    pub fn new(source_url: impl Into<String>, final_path: impl Into<PathBuf>) -> Self {
        let final_path = final_path.into();
        Self {
            source_url: source_url.into(),
            temporary_path: partial_path(&final_path),
            final_path,
            referer: None,
            sample_byte_cap: 0,
        }
    }

    /// Sets the `Referer` sent with every request for this file.
    #[must_use]
    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    /// Caps the transfer at `cap` bytes (0 disables the cap).
    #[must_use]
    pub fn with_sample_cap(mut self, cap: u64) -> Self {
        self.sample_byte_cap = cap;
        self
    }

    /// True when this is a capped sample transfer.
    #[must_use]
    pub fn is_sample(&self) -> bool {
        self.sample_byte_cap > 0
    }
}

fn partial_path(final_path: &Path) -> PathBuf {
    let mut name = OsString::from(final_path.as_os_str());
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Outcome of a successful [`TransferEngine::download`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// Bytes were transferred and the final file was (re)created.
    Downloaded,
    /// The final file already satisfied the request.
    Exists,
}

impl TransferStatus {
    /// `"downloaded"` or `"exists"`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Downloaded => "downloaded",
            Self::Exists => "exists",
        }
    }
}

/// What a probe learned about the remote resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteResourceInfo {
    /// Total size, when the server disclosed it.
    pub size_bytes: Option<u64>,
    /// Whether `Range` requests are honored.
    pub accepts_byte_ranges: bool,
}

/// How a body stream ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The server closed the body.
    Completed,
    /// The sample cap was reached and the rest of the body was dropped.
    Capped,
}

/// Where the next attempt starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Start {
    Fresh,
    Resume(u64),
    AlreadyComplete,
}

/// What earlier attempts of one download learned.
#[derive(Debug, Default)]
struct AttemptState {
    remote: Option<RemoteResourceInfo>,
    /// Length of a final file that was moved back to `.part` for resuming.
    promoted_final: Option<u64>,
}

/// Streams remote resources to disk with resume and retry.
#[derive(Debug, Clone)]
pub struct TransferEngine {
    client: RequestClient,
    fetch: RequestClient,
    options: RequestOptions,
}

impl TransferEngine {
    /// Creates an engine. `client` is used as-is for probes; body requests
    /// make one attempt each and are retried by the engine's own loop under
    /// the same policy.
    #[must_use]
    pub fn new(client: RequestClient, options: RequestOptions) -> Self {
        Self {
            fetch: client.single_attempt(),
            client,
            options,
        }
    }

    fn observer(&self) -> &Arc<dyn TransferObserver> {
        self.client.observer()
    }

    fn read_timeout(&self) -> Duration {
        self.options.read_timeout.unwrap_or(DEFAULT_READ_TIMEOUT)
    }

    /// Fetches `task` into its final path.
    ///
    /// Makes up to `max_retries` attempts (at least one). Retriable failures
    /// keep the partial file for the next attempt.
    ///
    /// # Errors
    ///
    /// Returns the last attempt's [`DownloadError`] once the failure is not
    /// retriable or attempts are exhausted.
    #[instrument(
        skip(self, session, task),
        fields(url = %task.source_url, path = %task.final_path.display())
    )]
    pub async fn download(
        &self,
        session: &Session,
        task: &DownloadTask,
        max_retries: u32,
    ) -> Result<TransferStatus, DownloadError> {
        let outcome = self.download_inner(session, task, max_retries).await;
        self.observer().on_transfer_end(task, outcome.as_ref().copied());
        outcome
    }

    async fn download_inner(
        &self,
        session: &Session,
        task: &DownloadTask,
        max_retries: u32,
    ) -> Result<TransferStatus, DownloadError> {
        let final_len = file_len(&task.final_path).await;
        let mut state = AttemptState::default();

        if final_len > 0 {
            if task.is_sample() {
                debug!(bytes = final_len, "sample already present");
                return Ok(TransferStatus::Exists);
            }
            let info = self.remote_info(session, task, &mut state.remote).await;
            if let Some(size) = info.size_bytes
                && final_len >= size
            {
                debug!(local = final_len, remote = size, "final file already complete");
                return Ok(TransferStatus::Exists);
            }
        }

        let policy = self.client.policy().attempts(max_retries);
        let mut attempt = 1;
        loop {
            let error = match self.attempt(session, task, &mut state).await {
                Ok(status) => return Ok(status),
                Err(error) => error,
            };

            match policy.should_retry(classify_error(&error), attempt) {
                RetryDecision::Retry { delay, attempt: next } => {
                    self.observer().on_retry(&RetryEvent {
                        url: task.source_url.clone(),
                        failed_attempt: attempt,
                        max_attempts: policy.max_attempts(),
                        delay,
                        reason: error.to_string(),
                    });
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(attempt, %reason, kind = %error.kind(), "giving up");
                    if state.promoted_final.is_some() {
                        release_partial(task, &mut state).await;
                    }
                    return Err(error);
                }
            }
        }
    }

    async fn attempt(
        &self,
        session: &Session,
        task: &DownloadTask,
        state: &mut AttemptState,
    ) -> Result<TransferStatus, DownloadError> {
        let offset = match self.plan_start(session, task, state).await? {
            Start::AlreadyComplete => {
                debug!("partial file already holds the whole resource");
                finalize(task).await?;
                return Ok(TransferStatus::Downloaded);
            }
            Start::Fresh => 0,
            Start::Resume(offset) => offset,
        };

        let mut headers = session.headers(task.referer.as_deref());
        let range = if task.is_sample() {
            Some(format!("bytes=0-{}", task.sample_byte_cap - 1))
        } else if offset > 0 {
            Some(format!("bytes={offset}-"))
        } else {
            None
        };
        if let Some(range) = &range
            && let Ok(value) = HeaderValue::from_str(range)
        {
            headers.insert(RANGE, value);
        }

        let response = self.fetch.get(&task.source_url, &headers, self.options).await?;
        let status = response.status();
        if offset > 0
            && status == StatusCode::RANGE_NOT_SATISFIABLE
            && content_range_total(response.headers()).is_none_or(|total| total <= offset)
        {
            debug!(offset, "nothing left past the resume offset");
            finalize(task).await?;
            return Ok(if state.promoted_final == Some(offset) {
                TransferStatus::Exists
            } else {
                TransferStatus::Downloaded
            });
        }
        if !status.is_success() {
            release_partial(task, state).await;
            return Err(DownloadError::http_status(&task.source_url, status.as_u16()));
        }
        if offset > 0 && status != StatusCode::PARTIAL_CONTENT {
            warn!(status = status.as_u16(), offset, "server ignored resume range");
            release_partial(task, state).await;
            return Err(DownloadError::range_not_honored(&task.source_url, status.as_u16()));
        }

        // Samples accept a full 200 answer; the cap truncates it.
        let offset = if status == StatusCode::PARTIAL_CONTENT { offset } else { 0 };
        let content_length = header_u64(response.headers(), &CONTENT_LENGTH);
        let range_total = if status == StatusCode::PARTIAL_CONTENT {
            content_range_total(response.headers())
        } else {
            None
        };
        let total = expected_total(task.sample_byte_cap, range_total, offset, content_length);

        let file = open_partial(&task.temporary_path, offset).await?;
        self.observer().on_transfer_start(task, offset);
        let tracker = ProgressTracker::new(task.source_url.clone(), offset, total, Instant::now());

        let (end, received) = self.stream_body(response, file, task, tracker).await?;

        if end == StreamEnd::Completed
            && let Some(expected) = content_length
            && received < expected
        {
            return Err(DownloadError::integrity(
                &task.temporary_path,
                offset.saturating_add(expected),
                offset.saturating_add(received),
            ));
        }

        finalize(task).await?;
        info!(
            bytes = offset.saturating_add(received),
            resumed_from = offset,
            capped = end == StreamEnd::Capped,
            "download complete"
        );
        Ok(TransferStatus::Downloaded)
    }

    async fn plan_start(
        &self,
        session: &Session,
        task: &DownloadTask,
        state: &mut AttemptState,
    ) -> Result<Start, DownloadError> {
        if task.is_sample() {
            remove_if_present(&task.temporary_path).await?;
            return Ok(Start::Fresh);
        }

        let temp_len = file_len(&task.temporary_path).await;
        if temp_len > 0 {
            let info = self.remote_info(session, task, &mut state.remote).await;
            match info.size_bytes {
                Some(size) if temp_len == size => return Ok(Start::AlreadyComplete),
                Some(size) if temp_len > size => {
                    debug!(temp_len, size, "partial file larger than remote; restarting");
                    remove_if_present(&task.temporary_path).await?;
                    return Ok(Start::Fresh);
                }
                _ => {}
            }
            if info.accepts_byte_ranges {
                return Ok(Start::Resume(temp_len));
            }
            debug!(temp_len, "remote does not accept ranges; discarding partial file");
            remove_if_present(&task.temporary_path).await?;
            return Ok(Start::Fresh);
        }

        let final_len = file_len(&task.final_path).await;
        if final_len > 0
            && self
                .remote_info(session, task, &mut state.remote)
                .await
                .accepts_byte_ranges
        {
            debug!(final_len, "resuming from existing final file");
            tokio::fs::rename(&task.final_path, &task.temporary_path)
                .await
                .map_err(|e| DownloadError::io(&task.final_path, e))?;
            state.promoted_final = Some(final_len);
            return Ok(Start::Resume(final_len));
        }
        Ok(Start::Fresh)
    }

    async fn remote_info(
        &self,
        session: &Session,
        task: &DownloadTask,
        cached: &mut Option<RemoteResourceInfo>,
    ) -> RemoteResourceInfo {
        if let Some(info) = cached {
            return *info;
        }
        let info = match self.probe(session, task).await {
            Ok(info) => info,
            Err(error) => {
                warn!(
                    kind = %error.kind(),
                    error = %error,
                    "probe failed; treating size as unknown"
                );
                RemoteResourceInfo::default()
            }
        };
        *cached = Some(info);
        info
    }

    /// Learns the remote size and range support.
    ///
    /// Uses `HEAD`; when that yields no size, falls back to a `bytes=0-0`
    /// `GET` whose `Content-Range` total gives the size.
    ///
    /// # Errors
    ///
    /// Returns the request client's error when neither request completes.
    #[instrument(level = "debug", skip(self, session, task), fields(url = %task.source_url))]
    pub async fn probe(
        &self,
        session: &Session,
        task: &DownloadTask,
    ) -> Result<RemoteResourceInfo, DownloadError> {
        let headers = session.headers(task.referer.as_deref());
        let mut info = RemoteResourceInfo::default();

        let response = self.client.head(&task.source_url, &headers, self.options).await?;
        if response.status().is_success() {
            info.size_bytes = known_length(response.headers());
            info.accepts_byte_ranges = response
                .headers()
                .get(ACCEPT_RANGES)
                .and_then(|value| value.to_str().ok())
                .is_some_and(|value| value.to_ascii_lowercase().contains("bytes"));
        }
        if info.size_bytes.is_some() {
            return Ok(info);
        }

        let mut ranged = headers;
        ranged.insert(RANGE, HeaderValue::from_static("bytes=0-0"));
        let response = self.client.get(&task.source_url, &ranged, self.options).await?;
        if response.status() == StatusCode::PARTIAL_CONTENT {
            info.accepts_byte_ranges = true;
            info.size_bytes = content_range_total(response.headers());
        } else if response.status().is_success() {
            info.size_bytes = known_length(response.headers());
        }
        debug!(
            size = ?info.size_bytes,
            ranges = info.accepts_byte_ranges,
            "probed remote resource"
        );
        Ok(info)
    }

    async fn stream_body(
        &self,
        response: Response,
        file: File,
        task: &DownloadTask,
        mut tracker: ProgressTracker,
    ) -> Result<(StreamEnd, u64), DownloadError> {
        let mut writer = BufWriter::new(file);
        let pumped = self.pump(response, &mut writer, task, &mut tracker).await;
        // Keep whatever arrived, even on failure, so the next attempt resumes from it.
        let flushed = writer
            .flush()
            .await
            .map_err(|e| DownloadError::io(&task.temporary_path, e));
        let outcome = pumped?;
        flushed?;
        self.observer().on_progress(&tracker.snapshot(Instant::now()));
        Ok(outcome)
    }

    async fn pump(
        &self,
        response: Response,
        writer: &mut BufWriter<File>,
        task: &DownloadTask,
        tracker: &mut ProgressTracker,
    ) -> Result<(StreamEnd, u64), DownloadError> {
        let idle = self.read_timeout();
        let cap = task.sample_byte_cap;
        let mut stream = response.bytes_stream();
        let mut received: u64 = 0;

        loop {
            let next = tokio::time::timeout(idle, stream.next())
                .await
                .map_err(|_| DownloadError::idle_timeout(&task.source_url, idle))?;
            let Some(chunk) = next else {
                return Ok((StreamEnd::Completed, received));
            };
            let chunk = chunk.map_err(|e| {
                if e.is_timeout() {
                    DownloadError::timeout(&task.source_url)
                } else {
                    DownloadError::network(&task.source_url, e)
                }
            })?;

            let mut bytes = &chunk[..];
            let mut capped = false;
            if cap > 0 {
                let remaining = cap.saturating_sub(received);
                if bytes.len() as u64 >= remaining {
                    bytes = &bytes[..usize::try_from(remaining).unwrap_or(bytes.len())];
                    capped = true;
                }
            }

            writer
                .write_all(bytes)
                .await
                .map_err(|e| DownloadError::io(&task.temporary_path, e))?;
            received += bytes.len() as u64;

            if let Some(event) = tracker.record(bytes.len() as u64, Instant::now()) {
                self.observer().on_progress(&event);
            }
            if capped {
                debug!(cap, "sample cap reached");
                return Ok((StreamEnd::Capped, received));
            }
        }
    }
}

fn header_u64(headers: &HeaderMap, name: &HeaderName) -> Option<u64> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

fn known_length(headers: &HeaderMap) -> Option<u64> {
    header_u64(headers, &CONTENT_LENGTH).filter(|size| *size > 0)
}

fn content_range_total(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_content_range_total)
}

async fn file_len(path: &Path) -> u64 {
    tokio::fs::metadata(path).await.map_or(0, |meta| meta.len())
}

async fn open_partial(path: &Path, offset: u64) -> Result<File, DownloadError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::io(parent, e))?;
    }
    let file = if offset > 0 {
        OpenOptions::new().append(true).open(path).await
    } else {
        File::create(path).await
    };
    file.map_err(|e| DownloadError::io(path, e))
}

async fn finalize(task: &DownloadTask) -> Result<(), DownloadError> {
    tokio::fs::rename(&task.temporary_path, &task.final_path)
        .await
        .map_err(|e| DownloadError::io(&task.final_path, e))
}

async fn remove_if_present(path: &Path) -> Result<(), DownloadError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DownloadError::io(path, e)),
    }
}

async fn discard(path: &Path) {
    if let Err(error) = remove_if_present(path).await {
        warn!(error = %error, "could not discard partial file");
    }
}

/// Drops the partial file after a rejected request, or moves it back into
/// place when it started out as the user's final file.
async fn release_partial(task: &DownloadTask, state: &mut AttemptState) {
    if state.promoted_final.take().is_none() {
        discard(&task.temporary_path).await;
        return;
    }
    if let Err(error) = tokio::fs::rename(&task.temporary_path, &task.final_path).await {
        warn!(error = %error, "could not restore final file");
    }
}
