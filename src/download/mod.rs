//! Resilient HTTP transfer: retrying requests and resumable file downloads.
//!
//! # Features
//!
//! - One [`RetryPolicy`] (exponential backoff, 700 ms doubling to a 30 s cap)
//!   shared by the request client and the transfer engine
//! - Per-attempt request timeout and a rolling idle-read watchdog
//! - Resume from `<final>.part` with `Range` requests, restart when the server
//!   refuses ranges
//! - Byte-capped sample transfers that end cleanly at exactly the cap
//! - Retry and progress events through [`TransferObserver`]
//!
//! # Example
//!
//! ```no_run
//! use coursefetch_core::auth::Session;
//! use coursefetch_core::download::{DownloadTask, RequestClient, RequestOptions, TransferEngine};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = TransferEngine::new(RequestClient::default(), RequestOptions::default());
//! let task = DownloadTask::new("https://example.com/lecture.mp4", "./lecture.mp4");
//! let status = engine.download(&Session::anonymous(), &task, 4).await?;
//! println!("{}", status.as_str());
//! # Ok(())
//! # }
//! ```

mod constants;
mod error;
mod observer;
mod progress;
mod request;
mod retry;
mod transfer;

pub use constants::{
    DEFAULT_READ_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RETRY_ATTEMPTS, PARTIAL_SUFFIX,
};
pub use error::DownloadError;
pub use observer::{LoggingObserver, NoopObserver, RetryEvent, TransferObserver};
pub use progress::{
    ProgressEvent, ProgressTracker, displayed_bytes, expected_total, parse_content_range_total,
};
pub use request::{RequestClient, RequestOptions};
pub use retry::{
    FailureType, RetryDecision, RetryPolicy, backoff_delay, classify_error, classify_http_status,
    is_retriable_error, is_retriable_status,
};
pub use transfer::{DownloadTask, RemoteResourceInfo, StreamEnd, TransferEngine, TransferStatus};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
