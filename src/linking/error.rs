use crate::store::error::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkingError {
    #[error("No {0} available to link; run the upstream ingestion first")]
    InputEmpty(&'static str),

    #[error("Failed to read {0} from the store")]
    InputUnavailable(&'static str, #[source] StoreError),

    // The previous link table is still in place when this is returned.
    #[error("Failed to persist the rebuilt link table")]
    Persistence(#[source] StoreError),
}
