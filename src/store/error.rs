use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to create store directory '{0}'")]
    DirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to read table file '{0}'")]
    TableRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to write table file '{0}'")]
    TableWrite(PathBuf, #[source] std::io::Error),

    #[error("Failed to decode table data from '{0}'")]
    TableDecode(PathBuf, #[source] Box<bincode::error::DecodeError>),

    #[error("Failed to encode table data for '{0}'")]
    TableEncode(String, #[source] Box<bincode::error::EncodeError>),

    #[error("Duplicate key '{key}' in table {table}")]
    DuplicateKey { table: &'static str, key: String },

    #[error("Link for postal code '{plz}' references unknown station id {station_id}")]
    UnknownStation { plz: String, station_id: i32 },

    #[error("Store lock poisoned for table {0}")]
    LockPoisoned(&'static str),
}
