use crate::ingest::error::IngestError;
use async_compression::tokio::bufread::{BrotliDecoder, GzipDecoder};
use futures_util::TryStreamExt;
use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncReadExt};
use tokio_util::io::StreamReader;

const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
const MAX_DELAY: Duration = Duration::from_secs(30);

/// Content encoding of a downloaded file, independent of HTTP transfer encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Brotli,
}

/// Outcome of a JSON request where a 404 means "nothing there" rather than failure.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    Data(T),
    NotFound { url: String, message: String },
}

/// HTTP client with exponential-backoff retries for transient failures.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    max_attempts: u32,
    base_delay: Duration,
}

impl Downloader {
    pub fn new(max_attempts: u32) -> Self {
        Self::with_client(Client::new(), max_attempts)
    }

    pub fn with_client(client: Client, max_attempts: u32) -> Self {
        Downloader {
            client,
            max_attempts: max_attempts.max(1),
            base_delay: DEFAULT_BASE_DELAY,
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay before retry number `attempt` (1-based), doubling each time.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(MAX_DELAY)
    }

    async fn with_retries<T, F, Fut>(&self, url: &str, mut request: F) -> Result<T, IngestError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, IngestError>>,
    {
        let mut attempt = 1;
        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        "Attempt {}/{} for {} failed ({}), retrying in {:?}",
                        attempt, self.max_attempts, url, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if attempt > 1 => {
                    return Err(IngestError::RetriesExhausted {
                        url: url.to_string(),
                        attempts: attempt,
                        source: Box::new(e),
                    })
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Downloads `url` and decodes its body.
    pub async fn download(&self, url: &str, compression: Compression) -> Result<Vec<u8>, IngestError> {
        info!("Downloading {}", url);
        let bytes = self
            .with_retries(url, || self.download_once(url, compression))
            .await?;
        info!(
            "Successfully downloaded and decompressed {} bytes from {}",
            bytes.len(),
            url
        );
        Ok(bytes)
    }

    async fn download_once(&self, url: &str, compression: Compression) -> Result<Vec<u8>, IngestError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IngestError::NetworkRequest(url.to_string(), e))?;
        let response = check_status(url, response)?;

        let stream = response
            .bytes_stream()
            .map_err(std::io::Error::other);
        decode(StreamReader::new(stream), compression)
            .await
            .map_err(|e| body_error(url, e))
    }

    /// GETs `url` with `query` and parses the JSON body. HTTP 404 yields
    /// [`Fetched::NotFound`] without retrying.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Fetched<T>, IngestError> {
        self.with_retries(url, || self.get_json_once(url, query)).await
    }

    async fn get_json_once<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Fetched<T>, IngestError> {
        debug!("GET {} {:?}", url, query);
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| IngestError::NetworkRequest(url.to_string(), e))?;

        if response.status() == StatusCode::NOT_FOUND {
            let message = response.text().await.unwrap_or_default();
            return Ok(Fetched::NotFound {
                url: url.to_string(),
                message,
            });
        }
        let response = check_status(url, response)?;
        let body = response
            .bytes()
            .await
            .map_err(|e| IngestError::NetworkRequest(url.to_string(), e))?;
        Ok(Fetched::Data(serde_json::from_slice(&body)?))
    }
}

fn check_status(url: &str, response: reqwest::Response) -> Result<reqwest::Response, IngestError> {
    response.error_for_status().map_err(|e| {
        warn!("HTTP error for {}: {:?}", url, e);
        match e.status() {
            Some(status) => IngestError::HttpStatus {
                url: url.to_string(),
                status,
                source: e,
            },
            None => IngestError::NetworkRequest(url.to_string(), e),
        }
    })
}

/// Sorts a body read failure: connection errors surface wrapped in a
/// `reqwest::Error` and may go away on retry, anything else came from the
/// decoder and will not.
fn body_error(url: &str, e: std::io::Error) -> IngestError {
    let from_connection = e
        .get_ref()
        .is_some_and(|inner| inner.is::<reqwest::Error>());
    if from_connection {
        IngestError::DownloadIo(e)
    } else {
        warn!("Body of {} could not be decompressed: {}", url, e);
        IngestError::Decompress(url.to_string(), e)
    }
}

/// Reads `reader` to the end, decompressing according to `compression`.
pub async fn decode<R>(reader: R, compression: Compression) -> std::io::Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut decoded = Vec::new();
    match compression {
        Compression::None => {
            let mut reader = reader;
            reader.read_to_end(&mut decoded).await?;
        }
        Compression::Gzip => {
            GzipDecoder::new(reader).read_to_end(&mut decoded).await?;
        }
        Compression::Brotli => {
            BrotliDecoder::new(reader).read_to_end(&mut decoded).await?;
        }
    }
    Ok(decoded)
}
