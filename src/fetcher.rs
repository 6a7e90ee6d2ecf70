//! Single-asset fetching with bounded retries.

use crate::config::DownloadConfig;
use crate::error::FetchError;
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Fetches raw assets (page images, covers) over the run's HTTP session.
///
/// Cloning is cheap: the underlying client is reference counted, so one
/// fetcher can be handed to every download worker.
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    client: reqwest::Client,
    attempts: u32,
    retry_delay: Duration,
    min_bytes: u64,
}

impl ImageFetcher {
    pub fn new(client: reqwest::Client, config: &DownloadConfig) -> Self {
        Self {
            client,
            attempts: config.attempts.max(1),
            retry_delay: config.retry_delay(),
            min_bytes: config.min_bytes,
        }
    }

    /// Streams one response body into `sink` without retrying.
    ///
    /// Returns the number of bytes written. Non-2xx statuses are errors and
    /// write nothing.
    pub async fn fetch_once<W>(&self, url: &str, sink: &mut W) -> Result<u64, FetchError>
    where
        W: AsyncWrite + Unpin,
    {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        sink.flush().await?;

        Ok(written)
    }

    /// Downloads `url` to `dest`, retrying with a fixed delay.
    ///
    /// An attempt only counts as a success when more than `min_bytes` were
    /// received; smaller bodies are placeholder pixels or error pages. A
    /// failed attempt never leaves a partial file behind.
    pub async fn fetch_to_path(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let mut last = None;

        for attempt in 1..=self.attempts {
            match self.attempt_to_path(url, dest).await {
                Ok(bytes) => {
                    debug!(url, path = %dest.display(), bytes, "fetched");
                    return Ok(bytes);
                }
                Err(err) => {
                    let _ = tokio::fs::remove_file(dest).await;
                    if attempt < self.attempts {
                        warn!(
                            url,
                            attempt,
                            attempts = self.attempts,
                            error = %err,
                            "fetch failed, retrying in {:?}",
                            self.retry_delay
                        );
                        tokio::time::sleep(self.retry_delay).await;
                    }
                    last = Some(err);
                }
            }
        }

        let last = last.unwrap_or(FetchError::Status(0));
        Err(FetchError::RetriesExhausted {
            attempts: self.attempts,
            last: Box::new(last),
        })
    }

    async fn attempt_to_path(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let mut file = tokio::fs::File::create(dest).await?;
        let bytes = self.fetch_once(url, &mut file).await?;
        drop(file);

        if bytes <= self.min_bytes {
            return Err(FetchError::TooSmall {
                bytes,
                minimum: self.min_bytes,
            });
        }
        Ok(bytes)
    }
}
