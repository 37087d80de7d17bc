use crate::store::error::StoreError;
use crate::store::report::{UpsertReport, WriteMode};
use crate::store::tables::{LinkTable, PostalTable, StationTable};
use crate::store::{GeometryStore, LinkStore, ObservationStore};
use crate::types::link::PostalStationLink;
use crate::types::observation::{ObservationKind, RawWeatherRecord};
use crate::types::postal_area::PostalArea;
use crate::types::station::{Station, StationRecord};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Tables {
    postal: PostalTable,
    stations: StationTable,
    links: LinkTable,
    observations: HashMap<ObservationKind, Vec<RawWeatherRecord>>,
}

/// In-process store backed by a single `RwLock`.
///
/// Writes are staged on a copy and swapped in while the write lock is held, so
/// readers never see a half-applied write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::LockPoisoned("memory"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::LockPoisoned("memory"))
    }
}

impl GeometryStore for MemoryStore {
    fn postal_areas(&self) -> Result<Vec<PostalArea>, StoreError> {
        Ok(self.read()?.postal.areas())
    }

    fn stations(&self) -> Result<Vec<Station>, StoreError> {
        Ok(self.read()?.stations.stations())
    }

    fn upsert_postal_areas(
        &self,
        areas: Vec<PostalArea>,
        mode: WriteMode,
    ) -> Result<UpsertReport, StoreError> {
        Ok(self.write()?.postal.upsert(areas, mode))
    }

    fn upsert_stations(
        &self,
        records: Vec<StationRecord>,
        mode: WriteMode,
    ) -> Result<UpsertReport, StoreError> {
        Ok(self.write()?.stations.upsert(records, mode))
    }
}

impl LinkStore for MemoryStore {
    fn links(&self) -> Result<Vec<PostalStationLink>, StoreError> {
        Ok(self.read()?.links.links())
    }

    fn replace_links(&self, links: &[PostalStationLink]) -> Result<usize, StoreError> {
        let mut tables = self.write()?;
        let staged = LinkTable::rebuilt_from(links, &tables.stations.ids())?;
        let written = staged.rows.len();
        tables.links = staged;
        Ok(written)
    }
}

impl ObservationStore for MemoryStore {
    fn append_observations(
        &self,
        kind: ObservationKind,
        records: Vec<RawWeatherRecord>,
    ) -> Result<usize, StoreError> {
        let count = records.len();
        self.write()?.observations.entry(kind).or_default().extend(records);
        Ok(count)
    }

    fn observations(&self, kind: ObservationKind) -> Result<Vec<RawWeatherRecord>, StoreError> {
        Ok(self
            .read()?
            .observations
            .get(&kind)
            .cloned()
            .unwrap_or_default())
    }
}
