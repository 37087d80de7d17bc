use crate::error::StationLinkError;
use log::info;
use std::io;
use std::path::{Path, PathBuf};

const DATA_DIR_NAME: &str = "station_link";

/// `<local data dir>/station_link`, if the platform has a local data directory.
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|p| p.join(DATA_DIR_NAME))
}

pub async fn ensure_dir_exists(path: &Path) -> Result<(), StationLinkError> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(StationLinkError::DataDirNotADirectory(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("Creating data directory: {}", path.display());
            tokio::fs::create_dir_all(path)
                .await
                .map_err(|e| StationLinkError::DataDirCreation(path.to_path_buf(), e))
        }
        Err(e) => Err(StationLinkError::DataDirCreation(path.to_path_buf(), e)),
    }
}
