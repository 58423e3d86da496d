use std::path::Path;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use bytes::BytesMut;
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use tokio::io::AsyncWriteExt;

use crate::{DownloadSummary, FailureKind, FetchError};

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    /// Maximum idle time between two reads of the response body.
    pub read_timeout: Duration,
    /// Overall deadline for the whole download; unlimited when `None`.
    pub request_timeout: Option<Duration>,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    /// Body bytes are buffered up to this size before each file write.
    pub chunk_size: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(20),
            read_timeout: Duration::from_secs(300),
            request_timeout: None,
            redirect_limit: 10,
            max_bytes: 2 * 1024 * 1024 * 1024,
            chunk_size: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub bytes: u64,
    pub total: Option<u64>,
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, progress: DownloadProgress);
}

/// Discards progress.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _progress: DownloadProgress) {}
}

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Streams `url` into `dest`. A failed download leaves no file behind.
    async fn fetch_to_file(
        &self,
        url: &str,
        dest: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadSummary, FetchError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    settings: FetchSettings,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Self {
        Self { settings }
    }

    fn build_client(&self, redirect_counter: Arc<AtomicUsize>) -> Result<reqwest::Client, FetchError> {
        let redirect_limit = self.settings.redirect_limit;
        let policy = reqwest::redirect::Policy::custom(move |attempt| {
            let count = attempt.previous().len();
            redirect_counter.store(count, Ordering::Relaxed);
            if count >= redirect_limit {
                attempt.error("redirect limit exceeded")
            } else {
                attempt.follow()
            }
        });

        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .read_timeout(self.settings.read_timeout)
            .redirect(policy);
        if let Some(timeout) = self.settings.request_timeout {
            builder = builder.timeout(timeout);
        }
        builder
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))
    }

    async fn stream_body(
        &self,
        response: reqwest::Response,
        dest: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<u64, FetchError> {
        let total = response.content_length();
        let mut file = tokio::fs::File::create(dest).await.map_err(map_io_error)?;
        let chunk_size = self.settings.chunk_size.max(1);
        let mut buffer = BytesMut::with_capacity(chunk_size);
        let mut written: u64 = 0;

        sink.emit(DownloadProgress { bytes: 0, total });

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = written + buffer.len() as u64 + chunk.len() as u64;
            if next_len > self.settings.max_bytes {
                return Err(FetchError::new(
                    FailureKind::TooLarge {
                        max_bytes: self.settings.max_bytes,
                        actual: Some(next_len),
                    },
                    "response too large",
                ));
            }
            buffer.extend_from_slice(&chunk);
            if buffer.len() >= chunk_size {
                let full = buffer.split();
                file.write_all(&full).await.map_err(map_io_error)?;
                written += full.len() as u64;
                sink.emit(DownloadProgress {
                    bytes: written,
                    total,
                });
            }
        }

        if !buffer.is_empty() {
            file.write_all(&buffer).await.map_err(map_io_error)?;
            written += buffer.len() as u64;
        }
        file.flush().await.map_err(map_io_error)?;
        file.sync_all().await.map_err(map_io_error)?;
        sink.emit(DownloadProgress {
            bytes: written,
            total,
        });
        Ok(written)
    }
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch_to_file(
        &self,
        url: &str,
        dest: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadSummary, FetchError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;
        let redirect_counter = Arc::new(AtomicUsize::new(0));
        let client = self.build_client(redirect_counter.clone())?;

        let response = client
            .get(parsed)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        if let Some(content_len) = response.content_length() {
            if content_len > self.settings.max_bytes {
                return Err(FetchError::new(
                    FailureKind::TooLarge {
                        max_bytes: self.settings.max_bytes,
                        actual: Some(content_len),
                    },
                    "response too large",
                ));
            }
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let bytes = match self.stream_body(response, dest, sink).await {
            Ok(bytes) => bytes,
            Err(err) => {
                let _ = tokio::fs::remove_file(dest).await;
                return Err(err);
            }
        };

        Ok(DownloadSummary {
            path: dest.to_path_buf(),
            bytes,
            final_url,
            redirect_count: redirect_counter.load(Ordering::Relaxed),
            content_type,
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return FetchError::new(FailureKind::RedirectLimitExceeded, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}

fn map_io_error(err: std::io::Error) -> FetchError {
    FetchError::new(FailureKind::Io, err.to_string())
}
