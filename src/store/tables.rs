//! Table contents and write rules shared by every store backend.
//!
//! Backends decide where the tables live and how a write becomes visible; the
//! validation, id assignment and last-write-wins rules live here so that all of
//! them behave the same.

use crate::store::error::StoreError;
use crate::store::report::{RowFailure, UpsertReport, WriteMode};
use crate::types::link::PostalStationLink;
use crate::types::postal_area::PostalArea;
use crate::types::station::{Location, Station, StationRecord};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

pub(crate) const POSTAL_TABLE: &str = "dim_postal_area";
pub(crate) const STATION_TABLE: &str = "dim_station";
pub(crate) const LINK_TABLE: &str = "link_postcode_station";

/// Postal areas keyed by postal code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct PostalTable {
    pub rows: BTreeMap<String, PostalArea>,
}

/// Stations keyed by WMO identifier, plus the last internal id handed out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct StationTable {
    pub last_id: i32,
    pub rows: BTreeMap<String, Station>,
}

/// The link table keyed by postal code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct LinkTable {
    pub rows: BTreeMap<String, i32>,
}

enum Checked<T> {
    Valid(T),
    Skipped,
    Rejected(RowFailure),
}

fn check_postal_area(mut area: PostalArea) -> Checked<PostalArea> {
    let plz = area.plz.trim();
    if plz.is_empty() {
        return Checked::Rejected(RowFailure::new("<empty>", "postal code is empty"));
    }
    area.plz = plz.to_string();
    Checked::Valid(area)
}

fn check_station(record: StationRecord) -> Checked<(String, Location, StationRecord)> {
    let wmo = match record.wmo_station_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => return Checked::Skipped,
    };
    let (Some(latitude), Some(longitude)) = (record.latitude, record.longitude) else {
        return Checked::Skipped;
    };
    let location = Location {
        latitude,
        longitude,
    };
    if !location.is_valid() {
        return Checked::Rejected(RowFailure::new(
            wmo,
            format!("coordinates out of range: ({}, {})", latitude, longitude),
        ));
    }
    Checked::Valid((wmo, location, record))
}

/// Splits rows into the ones to write and the report, honouring `mode`.
fn partition<T, U>(
    rows: Vec<T>,
    mode: WriteMode,
    check: impl Fn(T) -> Checked<U>,
) -> (Vec<U>, UpsertReport) {
    let mut valid = Vec::with_capacity(rows.len());
    let mut report = UpsertReport::default();
    for row in rows {
        match check(row) {
            Checked::Valid(row) => valid.push(row),
            Checked::Skipped => report.skipped += 1,
            Checked::Rejected(failure) => report.rejected.push(failure),
        }
    }
    if mode == WriteMode::AllOrNothing && !report.rejected.is_empty() {
        valid.clear();
    }
    (valid, report)
}

impl PostalTable {
    pub fn upsert(&mut self, areas: Vec<PostalArea>, mode: WriteMode) -> UpsertReport {
        let (valid, mut report) = partition(areas, mode, check_postal_area);
        for area in valid {
            self.rows.insert(area.plz.clone(), area);
            report.inserted += 1;
        }
        report
    }

    pub fn areas(&self) -> Vec<PostalArea> {
        self.rows.values().cloned().collect()
    }
}

impl StationTable {
    pub fn upsert(&mut self, records: Vec<StationRecord>, mode: WriteMode) -> UpsertReport {
        let (valid, mut report) = partition(records, mode, check_station);
        let loaded_at = Utc::now();
        for (wmo, location, record) in valid {
            let id = match self.rows.get(&wmo) {
                Some(existing) => existing.id,
                None => {
                    self.last_id += 1;
                    self.last_id
                }
            };
            let station = Station {
                id,
                wmo_station_id: wmo.clone(),
                name: record.name.unwrap_or_default().trim().to_string(),
                country: record.country.unwrap_or_default().trim().to_string(),
                location,
                properties: record.properties,
                record_source: record.record_source,
                loaded_at,
            };
            self.rows.insert(wmo, station);
            report.inserted += 1;
        }
        report
    }

    /// Stations ordered by internal id.
    pub fn stations(&self) -> Vec<Station> {
        let mut stations: Vec<Station> = self.rows.values().cloned().collect();
        stations.sort_by_key(|s| s.id);
        stations
    }

    pub fn ids(&self) -> HashSet<i32> {
        self.rows.values().map(|s| s.id).collect()
    }
}

impl LinkTable {
    /// Builds a complete replacement table, failing on the first bad row.
    pub fn rebuilt_from(
        links: &[PostalStationLink],
        known_stations: &HashSet<i32>,
    ) -> Result<LinkTable, StoreError> {
        let mut rows = BTreeMap::new();
        for link in links {
            if !known_stations.contains(&link.station_id) {
                return Err(StoreError::UnknownStation {
                    plz: link.plz.clone(),
                    station_id: link.station_id,
                });
            }
            if rows.insert(link.plz.clone(), link.station_id).is_some() {
                return Err(StoreError::DuplicateKey {
                    table: LINK_TABLE,
                    key: link.plz.clone(),
                });
            }
        }
        Ok(LinkTable { rows })
    }

    pub fn links(&self) -> Vec<PostalStationLink> {
        self.rows
            .iter()
            .map(|(plz, station_id)| PostalStationLink {
                plz: plz.clone(),
                station_id: *station_id,
            })
            .collect()
    }
}
