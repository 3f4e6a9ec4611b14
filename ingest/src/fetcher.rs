//! Lazy download of out-of-band item content.

use crate::error::FetchError;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use timeline::config::FetchConfig;
use timeline::item::{FileRef, MediaKind};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Bounded retry schedule for content downloads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait after a transport-level failure
    pub transport_delay: Duration,
    /// Wait after a non-200 response
    pub status_delay: Duration,
    /// Upper bound on the response body kept in error messages
    pub max_error_body_bytes: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&FetchConfig::default())
    }
}

impl From<&FetchConfig> for RetryPolicy {
    fn from(config: &FetchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            transport_delay: Duration::from_secs(config.transport_retry_secs),
            status_delay: Duration::from_secs(config.status_retry_secs),
            max_error_body_bytes: config.max_error_body_bytes,
        }
    }
}

/// An open download, positioned at the start of the resource.
///
/// Dropping it closes the underlying connection.
pub struct ContentStream {
    response: Response,
}

impl ContentStream {
    pub fn mime_type(&self) -> Option<&str> {
        self.response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    /// Next chunk of the body, or `None` at the end.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, FetchError> {
        self.response
            .chunk()
            .await
            .map_err(|e| FetchError::Read(e.to_string()))
    }

    /// Read the remaining body into memory.
    pub async fn read_all(self) -> Result<Bytes, FetchError> {
        self.response
            .bytes()
            .await
            .map_err(|e| FetchError::Read(e.to_string()))
    }

    pub fn into_stream(self) -> impl Stream<Item = std::io::Result<Bytes>> {
        self.response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }
}

/// Result of a content fetch. Not-ready content is not an error.
pub enum FetchOutcome {
    Ready(ContentStream),
    NotReady { status: String },
}

impl FetchOutcome {
    pub fn into_stream(self) -> Option<ContentStream> {
        match self {
            FetchOutcome::Ready(stream) => Some(stream),
            FetchOutcome::NotReady { .. } => None,
        }
    }
}

/// Builds the download URL selecting the full-resolution variant for the media kind.
pub fn download_url(file_ref: &FileRef) -> String {
    match file_ref.kind {
        MediaKind::Still => format!("{}=d", file_ref.url),
        MediaKind::Motion => format!("{}=dv", file_ref.url),
        MediaKind::Document => file_ref.url.clone(),
    }
}

/// Downloads [`FileRef`] content with bounded retries.
///
/// Every wait (request, body read, backoff sleep) observes the cancellation
/// token, so a cancelled caller never sits out a full backoff.
#[derive(Clone)]
pub struct ContentFetcher {
    client: Client,
    policy: RetryPolicy,
}

impl ContentFetcher {
    pub fn new(client: Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch the content behind `file_ref`.
    ///
    /// Gives up after `max_attempts` and returns the last observed error.
    pub async fn fetch(
        &self,
        file_ref: &FileRef,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, FetchError> {
        if !file_ref.is_ready() {
            let status = file_ref.processing_status.clone().unwrap_or_default();
            info!(
                url = %file_ref.url,
                status = %status,
                "Skipping content because it is not ready"
            );
            return Ok(FetchOutcome::NotReady { status });
        }

        let url = download_url(file_ref);
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error: Option<FetchError> = None;
        let mut delay = Duration::ZERO;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                sent = self.client.get(&url).send() => sent,
            };

            let response = match sent {
                Ok(response) => response,
                Err(e) => {
                    warn!(
                        url = %url,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %e,
                        "Getting content failed, retrying"
                    );
                    last_error = Some(FetchError::Transport {
                        attempts: attempt,
                        message: e.to_string(),
                    });
                    delay = self.policy.transport_delay;
                    continue;
                }
            };

            if response.status() == StatusCode::OK {
                return Ok(FetchOutcome::Ready(ContentStream { response }));
            }

            let status = response.status();
            let body = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                body = read_snippet(response, self.policy.max_error_body_bytes) => body,
            };
            warn!(
                url = %url,
                status = status.as_u16(),
                attempt = attempt,
                max_attempts = max_attempts,
                "Bad response, waiting and retrying"
            );
            last_error = Some(FetchError::Status {
                attempts: attempt,
                status: status.as_u16(),
                body,
            });
            delay = self.policy.status_delay;
        }

        Err(last_error.unwrap_or(FetchError::Transport {
            attempts: 0,
            message: "no attempt was made".to_string(),
        }))
    }
}

/// Reads at most `limit` bytes of an error response for diagnostics.
pub(crate) async fn read_snippet(mut response: Response, limit: usize) -> String {
    let mut buf = Vec::new();
    while buf.len() < limit {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = (limit - buf.len()).min(chunk.len());
                buf.extend_from_slice(&chunk[..take]);
            }
            _ => break,
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
