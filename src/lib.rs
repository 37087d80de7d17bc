//! Links postal code areas to their nearest weather station and drives hourly
//! weather ingestion for a configurable station scope.

pub mod config;
mod error;
pub mod ingest;
pub mod linking;
pub mod pipeline;
pub mod scope;
pub mod store;
pub mod types;
mod utils;

#[cfg(test)]
mod test_server;

pub use config::{Config, ConfigError};
pub use error::StationLinkError;
pub use pipeline::{seconds_until_next_run, CycleReport, Pipeline};
pub use utils::{default_data_dir, ensure_dir_exists};

pub use ingest::download::{Compression, Downloader};
pub use ingest::error::IngestError;
pub use linking::error::LinkingError;
pub use linking::manager::{LinkingTableManager, RebuildReport};
pub use linking::metric::DistanceMetric;
pub use linking::resolver::NearestStationResolver;
pub use scope::ScopeResolver;
pub use store::error::StoreError;
pub use store::file::FileStore;
pub use store::memory::MemoryStore;
pub use store::report::{RowFailure, UpsertReport, WriteMode};
pub use store::{GeometryStore, LinkStore, ObservationStore, Store};

pub use types::link::PostalStationLink;
pub use types::observation::{ObservationKind, RawWeatherRecord};
pub use types::postal_area::PostalArea;
pub use types::scope::{CountryMatch, Scope};
pub use types::station::{Location, Station, StationRecord};
