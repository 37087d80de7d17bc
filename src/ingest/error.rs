use crate::store::error::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("HTTP request failed for {url} with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("Giving up on {url} after {attempts} attempts")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        #[source]
        source: Box<IngestError>,
    },

    // Covers errors while reading the response body off the connection
    #[error("Data download failed")]
    DownloadIo(#[from] std::io::Error),

    #[error("Failed to decompress body of {0}")]
    Decompress(String, #[source] std::io::Error),

    #[error("Failed to parse JSON data")]
    JsonParse(#[from] serde_json::Error),

    #[error("Failed to read station list")]
    Csv(#[from] csv::Error),

    #[error("Station list is missing column '{0}'")]
    MissingColumn(&'static str),

    #[error("Invalid topology: {0}")]
    Topology(String),

    #[error("Failed to write {0}")]
    Store(&'static str, #[source] StoreError),

    // Covers errors joining tokio blocking tasks
    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl IngestError {
    /// Whether another attempt at the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            IngestError::NetworkRequest(..) | IngestError::DownloadIo(_) => true,
            IngestError::HttpStatus { status, .. } => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}
