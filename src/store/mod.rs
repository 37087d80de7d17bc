//! Storage handles for postal areas, stations, the link table and raw weather.
//!
//! Components receive an explicitly constructed store (usually an `Arc<S>`)
//! instead of reaching for a process-wide connection. All trait methods are
//! synchronous; async callers run them on the blocking pool.

pub mod error;
pub mod file;
pub mod memory;
pub mod report;
pub(crate) mod tables;

use crate::types::link::PostalStationLink;
use crate::types::observation::{ObservationKind, RawWeatherRecord};
use crate::types::postal_area::PostalArea;
use crate::types::station::{Station, StationRecord};
use error::StoreError;
use report::{UpsertReport, WriteMode};

/// Postal area and station dimension tables.
pub trait GeometryStore: Send + Sync {
    /// All postal areas, ordered by postal code.
    fn postal_areas(&self) -> Result<Vec<PostalArea>, StoreError>;

    /// All stations, ordered by internal id.
    fn stations(&self) -> Result<Vec<Station>, StoreError>;

    /// Inserts or replaces postal areas by postal code (last write wins).
    fn upsert_postal_areas(
        &self,
        areas: Vec<PostalArea>,
        mode: WriteMode,
    ) -> Result<UpsertReport, StoreError>;

    /// Inserts or replaces stations by WMO identifier, assigning internal ids
    /// to new identifiers. Rows without an identifier or coordinates are skipped.
    fn upsert_stations(
        &self,
        records: Vec<StationRecord>,
        mode: WriteMode,
    ) -> Result<UpsertReport, StoreError>;
}

/// The derived postal code to station link table.
pub trait LinkStore: Send + Sync {
    /// All links, ordered by postal code.
    fn links(&self) -> Result<Vec<PostalStationLink>, StoreError>;

    /// Atomically replaces the whole table with `links`.
    ///
    /// Concurrent readers observe either the previous table or the new one. On
    /// error the previous table is left untouched.
    fn replace_links(&self, links: &[PostalStationLink]) -> Result<usize, StoreError>;
}

/// Raw hourly weather records.
pub trait ObservationStore: Send + Sync {
    fn append_observations(
        &self,
        kind: ObservationKind,
        records: Vec<RawWeatherRecord>,
    ) -> Result<usize, StoreError>;

    fn observations(&self, kind: ObservationKind) -> Result<Vec<RawWeatherRecord>, StoreError>;
}

/// Everything the pipeline needs from a backend.
pub trait Store: GeometryStore + LinkStore + ObservationStore {}

impl<T: GeometryStore + LinkStore + ObservationStore> Store for T {}
