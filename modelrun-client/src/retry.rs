//! Bounded retry with exponential backoff
//!
//! Transient failures talking to file stores and webhooks are retried here,
//! beneath the runner, so the runner only ever sees the final outcome.

use reqwest::{Method, RequestBuilder, Response};
use std::time::Duration;
use tracing::warn;

use crate::error::{ClientError, Result};

/// Upper bound on a single backoff sleep
const MAX_BACKOFF: Duration = Duration::from_secs(120);

/// Which requests to retry, how often, and how long to wait in between
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Sleep before the first retry; doubles for each retry after that
    pub backoff_factor: Duration,
    /// Response statuses worth another attempt
    pub retry_statuses: Vec<u16>,
    /// Methods that may be retried at all
    pub methods: Vec<Method>,
}

impl RetryPolicy {
    /// Policy for uploading output files to a signed endpoint
    pub fn file_upload() -> Self {
        Self {
            max_attempts: 3,
            backoff_factor: Duration::from_millis(100),
            retry_statuses: vec![408, 429, 500, 502, 503, 504],
            methods: vec![Method::PUT],
        }
    }

    /// Policy for the final webhook of a prediction, which must not be lost
    pub fn terminal_webhook() -> Self {
        Self {
            max_attempts: 12,
            backoff_factor: Duration::from_millis(100),
            retry_statuses: vec![429, 500, 502, 503, 504],
            methods: vec![Method::POST],
        }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff_factor: Duration::ZERO,
            retry_statuses: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Whether requests with this method are retried
    pub fn allows(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }

    /// Whether a response with this status is retried
    pub fn should_retry_status(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }

    /// Sleep before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.backoff_factor
            .saturating_mul(1u32 << exponent)
            .min(MAX_BACKOFF)
    }

    /// Sends a request, rebuilding it for every attempt
    ///
    /// Succeeds with the first 2xx response. Statuses outside the retry list
    /// fail immediately with [`ClientError::ApiError`]; transport errors are
    /// retried like retryable statuses.
    pub async fn send<F>(&self, method: Method, mut build: F) -> Result<Response>
    where
        F: FnMut() -> RequestBuilder,
    {
        let retryable = self.allows(&method);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let last = !retryable || attempt >= self.max_attempts;

            match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    if last || !self.should_retry_status(status.as_u16()) {
                        let body = response.text().await.unwrap_or_default();
                        return Err(ClientError::api_error(status.as_u16(), body));
                    }

                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        status = status.as_u16(),
                        "{} request failed, retrying",
                        method
                    );
                }
                Err(e) => {
                    let err = ClientError::from(e);
                    if last || !err.is_transport() {
                        return Err(err);
                    }

                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "{} request failed, retrying",
                        method
                    );
                }
            }

            tokio::time::sleep(self.backoff(attempt)).await;
        }
    }
}
