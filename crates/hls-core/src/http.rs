//! C3 — connection-pooled HTTP client with built-in retry.
//!
//! Grounded on the teacher's `crates/mesio/src/hls/fetcher.rs` (streaming
//! fetch, metadata extraction) and `crates/mesio/src/hls/retry.rs` (policy
//! wiring), on top of the `DownloaderConfig`-style header merge from
//! `crates/mesio/src/config.rs`.

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::config::{Configuration, HeaderSet};
use crate::error::{FileSystemError, NetworkError};
use crate::retry::{retry_with_backoff, RetryAction, RetryPolicy};

const STREAM_CHUNK_HINT: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct ResponseMetadata {
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

/// A single outbound request: target URL plus per-call header overrides.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HeaderSet,
}

impl HttpRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HeaderSet::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderSet) -> Self {
        self.headers = headers;
        self
    }
}

pub struct HttpClient {
    client: reqwest::Client,
    default_headers: HeaderSet,
    retry_policy: RetryPolicy,
    request_timeout: Duration,
    resource_timeout: Duration,
}

impl HttpClient {
    pub fn new(config: &Configuration) -> Result<Self, NetworkError> {
        let pool_size = config.max_concurrent_downloads.max(6);
        // No client- or request-level `.timeout()`: `resource_timeout` is
        // enforced explicitly around the whole execute+body sequence in
        // `fetch`/`fetch_to_path` below, so it covers the transfer, not just
        // the initial response. `connect_timeout` bounds only connection
        // establishment, independently, via `request_timeout`.
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(pool_size)
            .connect_timeout(Duration::from_secs_f64(config.request_timeout))
            .build()
            .map_err(|e| NetworkError::Unknown {
                url: String::new(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            default_headers: config.default_headers.clone(),
            retry_policy: RetryPolicy::new(config.retry_attempts, config.retry_backoff_base),
            request_timeout: Duration::from_secs_f64(config.request_timeout),
            resource_timeout: Duration::from_secs_f64(config.resource_timeout),
        })
    }

    fn build_reqwest(&self, request: &HttpRequest) -> Result<reqwest::Request, NetworkError> {
        let url = reqwest::Url::parse(&request.url).map_err(|e| NetworkError::InvalidUrl {
            url: request.url.clone(),
            reason: e.to_string(),
        })?;

        let merged = self.default_headers.merged_with(&request.headers);
        let mut header_map = reqwest::header::HeaderMap::new();
        for (name, value) in merged.iter() {
            if let (Ok(name), Ok(value)) = (
                reqwest::header::HeaderName::from_bytes(name.as_bytes()),
                reqwest::header::HeaderValue::from_str(value),
            ) {
                header_map.insert(name, value);
            }
        }

        self.client
            .get(url)
            .headers(header_map)
            .build()
            .map_err(|e| NetworkError::Unknown {
                url: request.url.clone(),
                reason: e.to_string(),
            })
    }

    /// `fetch(request) -> (body_bytes, response_metadata)` (spec.md §4.3).
    ///
    /// `resource_timeout` wraps the whole execute-then-read-body sequence
    /// below, not just the initial response — a slow trickle after a fast
    /// header exchange must still be bounded.
    pub async fn fetch(
        &self,
        request: &HttpRequest,
        token: &CancellationToken,
    ) -> Result<(Bytes, ResponseMetadata), NetworkError> {
        retry_with_backoff(&self.retry_policy, token, |_attempt| async {
            let req = match self.build_reqwest(request) {
                Ok(r) => r,
                Err(e) => return RetryAction::Fail(e),
            };

            let attempt = tokio::time::timeout(self.resource_timeout, async {
                let response = match self.client.execute(req).await {
                    Ok(resp) => resp,
                    Err(e) => return classify_transport_error(&request.url, e),
                };

                let status = response.status();
                let metadata = ResponseMetadata {
                    status: status.as_u16(),
                    headers: response
                        .headers()
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
                        .collect(),
                };

                if status.as_u16() == 200 {
                    match response.bytes().await {
                        Ok(body) => RetryAction::Success((body, metadata)),
                        Err(e) => classify_transport_error(&request.url, e),
                    }
                } else if (500..=599).contains(&status.as_u16()) {
                    RetryAction::Retry(NetworkError::ServerError {
                        url: request.url.clone(),
                        status_code: status.as_u16(),
                    })
                } else {
                    RetryAction::Fail(NetworkError::ClientError {
                        url: request.url.clone(),
                        status_code: status.as_u16(),
                    })
                }
            })
            .await;

            match attempt {
                Ok(action) => action,
                Err(_) => RetryAction::Retry(NetworkError::Timeout {
                    url: request.url.clone(),
                }),
            }
        })
        .await
    }

    /// Streams the response body to `destination` in `STREAM_CHUNK_HINT`
    /// chunks without materializing it in memory (spec.md §4.3). Writes
    /// through a temp file and renames into place so C5's atomic-write
    /// invariant holds even when this is called directly.
    pub async fn fetch_to_path(
        &self,
        request: &HttpRequest,
        destination: &Path,
        token: &CancellationToken,
    ) -> Result<ResponseMetadata, NetworkError> {
        let tmp_path = destination.with_extension("part");

        let metadata = retry_with_backoff(&self.retry_policy, token, |_attempt| async {
            let req = match self.build_reqwest(request) {
                Ok(r) => r,
                Err(e) => return RetryAction::Fail(e),
            };

            // `resource_timeout` bounds the entire transfer below (execute
            // through the final flush), not just a single chunk at a time.
            let attempt = tokio::time::timeout(self.resource_timeout, async {
                let mut response = match self.client.execute(req).await {
                    Ok(resp) => resp,
                    Err(e) => return classify_transport_error(&request.url, e),
                };

                let status = response.status();
                if status.as_u16() != 200 {
                    return if (500..=599).contains(&status.as_u16()) {
                        RetryAction::Retry(NetworkError::ServerError {
                            url: request.url.clone(),
                            status_code: status.as_u16(),
                        })
                    } else {
                        RetryAction::Fail(NetworkError::ClientError {
                            url: request.url.clone(),
                            status_code: status.as_u16(),
                        })
                    };
                }

                let metadata = ResponseMetadata {
                    status: status.as_u16(),
                    headers: response
                        .headers()
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
                        .collect(),
                };

                let mut file = match tokio::fs::File::create(&tmp_path).await {
                    Ok(f) => f,
                    Err(e) => {
                        return RetryAction::Fail(NetworkError::Unknown {
                            url: request.url.clone(),
                            reason: e.to_string(),
                        })
                    }
                };

                loop {
                    match response.chunk().await {
                        Ok(Some(chunk)) => {
                            if let Err(e) = file.write_all(&chunk).await {
                                let _ = tokio::fs::remove_file(&tmp_path).await;
                                return RetryAction::Fail(NetworkError::Unknown {
                                    url: request.url.clone(),
                                    reason: e.to_string(),
                                });
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            let _ = tokio::fs::remove_file(&tmp_path).await;
                            return classify_transport_error(&request.url, e);
                        }
                    }
                }

                if let Err(e) = file.flush().await {
                    let _ = tokio::fs::remove_file(&tmp_path).await;
                    return RetryAction::Fail(NetworkError::Unknown {
                        url: request.url.clone(),
                        reason: e.to_string(),
                    });
                }

                RetryAction::Success(metadata)
            })
            .await;

            match attempt {
                Ok(action) => action,
                Err(_) => {
                    let _ = tokio::fs::remove_file(&tmp_path).await;
                    RetryAction::Retry(NetworkError::Timeout {
                        url: request.url.clone(),
                    })
                }
            }
        })
        .await?;

        tokio::fs::rename(&tmp_path, destination)
            .await
            .map_err(|_| NetworkError::Unknown {
                url: request.url.clone(),
                reason: "failed to finalize downloaded file".to_string(),
            })?;

        Ok(metadata)
    }
}

fn classify_transport_error<T>(url: &str, error: reqwest::Error) -> RetryAction<T> {
    if error.is_timeout() {
        RetryAction::Retry(NetworkError::Timeout { url: url.to_string() })
    } else if error.is_connect() || error.is_request() {
        RetryAction::Retry(NetworkError::ConnectionFailed {
            url: url.to_string(),
            source: error,
        })
    } else if error.is_decode() || error.is_body() {
        RetryAction::Fail(NetworkError::InvalidResponse {
            url: url.to_string(),
            reason: error.to_string(),
        })
    } else {
        RetryAction::Retry(NetworkError::Unknown {
            url: url.to_string(),
            reason: error.to_string(),
        })
    }
}

/// Reads a local playlist file for `source == local` task requests
/// (spec.md §4.7 step 2); not part of C3 proper but colocated since it
/// shares the "text-in" contract the orchestrator relies on.
pub async fn read_local_text(path: &Path) -> Result<String, FileSystemError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                FileSystemError::FileNotFound { path: path.to_path_buf() }
            } else {
                FileSystemError::FailedToRead {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })
}
