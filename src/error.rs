use crate::config::ConfigError;
use crate::ingest::error::IngestError;
use crate::linking::error::LinkingError;
use crate::store::error::StoreError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StationLinkError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Linking(#[from] LinkingError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("Failed to create data directory '{0}'")]
    DataDirCreation(PathBuf, #[source] std::io::Error),

    #[error("Data path exists but is not a directory: '{0}'")]
    DataDirNotADirectory(PathBuf),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}
