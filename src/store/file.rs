//! File-backed store laid out in layers (`raw/`, `dimensions/`, `fact/`).
//!
//! Each table is a bincode snapshot. A write encodes the complete new table
//! into a temporary file in the same directory and renames it over the old
//! one, so a reader opening the table sees either the previous snapshot or the
//! new one. Raw weather records are append-only: every batch is its own file.

use crate::store::error::StoreError;
use crate::store::report::{UpsertReport, WriteMode};
use crate::store::tables::{LinkTable, PostalTable, StationTable, LINK_TABLE, POSTAL_TABLE, STATION_TABLE};
use crate::store::{GeometryStore, LinkStore, ObservationStore};
use crate::types::link::PostalStationLink;
use crate::types::observation::{ObservationKind, RawWeatherRecord};
use crate::types::postal_area::PostalArea;
use crate::types::station::{Station, StationRecord};
use bincode::config::{Configuration, Fixint, LittleEndian};
use chrono::Utc;
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tempfile::NamedTempFile;

const BINCODE_CONFIG: Configuration<LittleEndian, Fixint> =
    bincode::config::standard().with_fixed_int_encoding();
const TABLE_EXTENSION: &str = "bin";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layer {
    Raw,
    Dimensions,
    Fact,
}

impl Layer {
    const ALL: [Layer; 3] = [Layer::Raw, Layer::Dimensions, Layer::Fact];

    fn dir_name(&self) -> &'static str {
        match self {
            Layer::Raw => "raw",
            Layer::Dimensions => "dimensions",
            Layer::Fact => "fact",
        }
    }
}

#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
    batch_seq: AtomicU64,
}

impl FileStore {
    /// Opens (and if needed creates) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        for layer in Layer::ALL {
            let dir = root.join(layer.dir_name());
            std::fs::create_dir_all(&dir).map_err(|e| StoreError::DirCreation(dir, e))?;
        }
        for kind in [ObservationKind::Observed, ObservationKind::Forecast] {
            let dir = root.join(Layer::Raw.dir_name()).join(kind.table_name());
            std::fs::create_dir_all(&dir).map_err(|e| StoreError::DirCreation(dir, e))?;
        }
        info!("Opened file store at {}", root.display());
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
            batch_seq: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn table_path(&self, layer: Layer, table: &str) -> PathBuf {
        self.root
            .join(layer.dir_name())
            .join(format!("{}.{}", table, TABLE_EXTENSION))
    }

    fn observation_dir(&self, kind: ObservationKind) -> PathBuf {
        self.root.join(Layer::Raw.dir_name()).join(kind.table_name())
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, StoreError> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::LockPoisoned("file"))
    }

    fn load<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StoreError> {
        if !path.exists() {
            return Ok(T::default());
        }
        let bytes =
            std::fs::read(path).map_err(|e| StoreError::TableRead(path.to_path_buf(), e))?;
        let (value, _) = bincode::serde::decode_from_slice::<T, _>(&bytes, BINCODE_CONFIG)
            .map_err(|e| StoreError::TableDecode(path.to_path_buf(), Box::new(e)))?;
        Ok(value)
    }

    fn persist<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
        let bytes = bincode::serde::encode_to_vec(value, BINCODE_CONFIG)
            .map_err(|e| StoreError::TableEncode(path.display().to_string(), Box::new(e)))?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let write_err = |e: std::io::Error| StoreError::TableWrite(path.to_path_buf(), e);

        let mut temp_file = NamedTempFile::new_in(dir).map_err(write_err)?;
        temp_file.write_all(&bytes).map_err(write_err)?;
        temp_file.as_file().sync_all().map_err(write_err)?;
        temp_file
            .persist(path)
            .map_err(|e| StoreError::TableWrite(path.to_path_buf(), e.error))?;
        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }
}

impl GeometryStore for FileStore {
    fn postal_areas(&self) -> Result<Vec<PostalArea>, StoreError> {
        let table: PostalTable = Self::load(&self.table_path(Layer::Dimensions, POSTAL_TABLE))?;
        Ok(table.areas())
    }

    fn stations(&self) -> Result<Vec<Station>, StoreError> {
        let table: StationTable = Self::load(&self.table_path(Layer::Dimensions, STATION_TABLE))?;
        Ok(table.stations())
    }

    fn upsert_postal_areas(
        &self,
        areas: Vec<PostalArea>,
        mode: WriteMode,
    ) -> Result<UpsertReport, StoreError> {
        let _guard = self.lock()?;
        let path = self.table_path(Layer::Dimensions, POSTAL_TABLE);
        let mut table: PostalTable = Self::load(&path)?;
        let report = table.upsert(areas, mode);
        if report.inserted > 0 {
            Self::persist(&path, &table)?;
        }
        Ok(report)
    }

    fn upsert_stations(
        &self,
        records: Vec<StationRecord>,
        mode: WriteMode,
    ) -> Result<UpsertReport, StoreError> {
        let _guard = self.lock()?;
        let path = self.table_path(Layer::Dimensions, STATION_TABLE);
        let mut table: StationTable = Self::load(&path)?;
        let report = table.upsert(records, mode);
        if report.inserted > 0 {
            Self::persist(&path, &table)?;
        }
        Ok(report)
    }
}

impl LinkStore for FileStore {
    fn links(&self) -> Result<Vec<PostalStationLink>, StoreError> {
        let table: LinkTable = Self::load(&self.table_path(Layer::Fact, LINK_TABLE))?;
        Ok(table.links())
    }

    fn replace_links(&self, links: &[PostalStationLink]) -> Result<usize, StoreError> {
        let _guard = self.lock()?;
        let stations: StationTable =
            Self::load(&self.table_path(Layer::Dimensions, STATION_TABLE))?;
        let staged = LinkTable::rebuilt_from(links, &stations.ids())?;
        Self::persist(&self.table_path(Layer::Fact, LINK_TABLE), &staged)?;
        Ok(staged.rows.len())
    }
}

impl ObservationStore for FileStore {
    fn append_observations(
        &self,
        kind: ObservationKind,
        records: Vec<RawWeatherRecord>,
    ) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let seq = self.batch_seq.fetch_add(1, Ordering::Relaxed);
        let file_name = format!(
            "{}-{:06}.{}",
            Utc::now().format("%Y%m%dT%H%M%S%.9f"),
            seq,
            TABLE_EXTENSION
        );
        Self::persist(&self.observation_dir(kind).join(file_name), &records)?;
        Ok(records.len())
    }

    fn observations(&self, kind: ObservationKind) -> Result<Vec<RawWeatherRecord>, StoreError> {
        let dir = self.observation_dir(kind);
        let entries = std::fs::read_dir(&dir).map_err(|e| StoreError::TableRead(dir.clone(), e))?;

        let mut batch_files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StoreError::TableRead(dir.clone(), e))?.path();
            if path.extension().is_some_and(|ext| ext == TABLE_EXTENSION) {
                batch_files.push(path);
            }
        }
        batch_files.sort();

        let mut records = Vec::new();
        for path in batch_files {
            let batch: Vec<RawWeatherRecord> = Self::load(&path)?;
            records.extend(batch);
        }
        Ok(records)
    }
}
