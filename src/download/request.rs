//! Retrying HTTP request client.
//!
//! [`RequestClient`] issues one logical request, bounding every attempt by a
//! timeout and transparently retrying retriable statuses and transport errors
//! under the shared [`RetryPolicy`]. Non-2xx responses are not errors at this
//! layer: once retries are exhausted (or the status is not retriable) the
//! response is handed back for the caller to interpret.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Response};
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
use super::error::DownloadError;
use super::observer::{NoopObserver, RetryEvent, TransferObserver};
use super::retry::{
    RetryDecision, RetryPolicy, classify_error, classify_http_status, is_retriable_status,
};
use crate::user_agent;

/// Per-request timing limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    /// Ceiling on request setup and header receipt, per attempt.
    pub timeout: Duration,
    /// Ceiling on the gap between body chunks. Enforced by whoever reads the
    /// body (see [`TransferEngine`](super::TransferEngine)); `None` disables it.
    pub read_timeout: Option<Duration>,
}

impl RequestOptions {
    /// Options with only a request timeout.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            read_timeout: None,
        }
    }

    /// Adds a body read timeout.
    #[must_use]
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = Some(read_timeout);
        self
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

/// HTTP client with bounded attempts and exponential backoff.
///
/// This client is designed to be created once and reused for the whole run,
/// taking advantage of connection pooling. It never holds credentials; callers
/// pass the current session headers on every call.
#[derive(Clone)]
pub struct RequestClient {
    client: Client,
    policy: RetryPolicy,
    observer: Arc<dyn TransferObserver>,
}

impl fmt::Debug for RequestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestClient")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Default for RequestClient {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl RequestClient {
    /// Creates a client using the given retry policy.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(policy: RetryPolicy) -> Self {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .gzip(true)
            .user_agent(user_agent::default_user_agent())
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self {
            client,
            policy,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Routes retry notifications to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn TransferObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Clone of this client that makes exactly one attempt per request, for
    /// callers that run their own attempt loop under the same policy.
    #[must_use]
    pub fn single_attempt(&self) -> Self {
        Self {
            client: self.client.clone(),
            policy: self.policy.attempts(1),
            observer: Arc::clone(&self.observer),
        }
    }

    /// The retry policy in effect.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The observer receiving retry events.
    #[must_use]
    pub fn observer(&self) -> &Arc<dyn TransferObserver> {
        &self.observer
    }

    /// Issues one logical request, retrying under the configured policy.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] before any I/O for malformed URLs,
    /// [`DownloadError::Timeout`] when the last attempt exceeded
    /// `options.timeout`, or [`DownloadError::Network`] for a non-retriable or
    /// exhausted transport failure. HTTP error statuses are returned as `Ok`.
    #[instrument(
        level = "debug",
        skip(self, headers, body, options),
        fields(url = %url, method = %method)
    )]
    pub async fn request(
        &self,
        url: &str,
        method: Method,
        headers: &HeaderMap,
        body: Option<&serde_json::Value>,
        options: RequestOptions,
    ) -> Result<Response, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let mut attempt = 1;
        loop {
            let outcome = self
                .send_once(url, method.clone(), headers, body, options.timeout)
                .await;

            let retriable = match &outcome {
                Ok(response) => {
                    let status = response.status().as_u16();
                    is_retriable_status(status)
                        .then(|| (classify_http_status(status), format!("HTTP {status}")))
                }
                Err(error) => Some((classify_error(error), error.to_string())),
            };
            let Some((failure_type, reason)) = retriable else {
                return outcome;
            };

            match self.policy.should_retry(failure_type, attempt) {
                RetryDecision::Retry { delay, attempt: next } => {
                    self.observer.on_retry(&RetryEvent {
                        url: url.to_string(),
                        failed_attempt: attempt,
                        max_attempts: self.policy.max_attempts(),
                        delay,
                        reason,
                    });
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(attempt, %reason, "giving up on request");
                    return outcome;
                }
            }
        }
    }

    /// Convenience wrapper for a body-less GET.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn get(
        &self,
        url: &str,
        headers: &HeaderMap,
        options: RequestOptions,
    ) -> Result<Response, DownloadError> {
        self.request(url, Method::GET, headers, None, options).await
    }

    /// Convenience wrapper for a HEAD.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn head(
        &self,
        url: &str,
        headers: &HeaderMap,
        options: RequestOptions,
    ) -> Result<Response, DownloadError> {
        self.request(url, Method::HEAD, headers, None, options).await
    }

    async fn send_once(
        &self,
        url: &str,
        method: Method,
        headers: &HeaderMap,
        body: Option<&serde_json::Value>,
        timeout: Duration,
    ) -> Result<Response, DownloadError> {
        let mut request = self.client.request(method, url).headers(headers.clone());
        if let Some(body) = body {
            request = request.json(body);
        }

        match tokio::time::timeout(timeout, request.send()).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(error)) if error.is_timeout() => Err(DownloadError::timeout(url)),
            Ok(Err(error)) => Err(DownloadError::network(url, error)),
            Err(_elapsed) => Err(DownloadError::timeout(url)),
        }
    }
}
