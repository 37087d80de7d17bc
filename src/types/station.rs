//! Defines the weather station records handled by the linking core, from the raw
//! rows produced by station ingestion to the stored dimension rows with their
//! internal identifier. Also includes the implementations necessary for spatial
//! indexing using the `rstar` crate.

use chrono::{DateTime, Utc};
use geo::Point;
use rstar::{PointDistance, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A station row as delivered by an ingestion collaborator, before validation.
///
/// Every field is optional where the upstream listing may leave it blank. Rows
/// without a WMO identifier or without both coordinates are skipped on upsert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StationRecord {
    /// The WMO station identifier (e.g. "10382").
    pub wmo_station_id: Option<String>,
    /// Station name as listed by the source.
    pub name: Option<String>,
    /// Latitude in decimal degrees.
    pub latitude: Option<f64>,
    /// Longitude in decimal degrees.
    pub longitude: Option<f64>,
    /// Country name as listed by the source (e.g. "Germany").
    pub country: Option<String>,
    /// Free-form properties carried along from the source row.
    pub properties: BTreeMap<String, String>,
    /// Name of the feed this row came from (e.g. "wmo_dwd").
    pub record_source: String,
}

/// Represents a stored weather station.
///
/// `id` is the internal identifier assigned by the store on first insert of a
/// WMO identifier; it stays stable across re-ingestion and is the value stored
/// in the postal code link table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    /// Internal serial identifier.
    pub id: i32,
    /// The WMO station identifier, unique across stations.
    pub wmo_station_id: String,
    pub name: String,
    pub country: String,
    /// Geographical location of the station.
    pub location: Location,
    pub properties: BTreeMap<String, String>,
    pub record_source: String,
    /// When this row was last written.
    pub loaded_at: DateTime<Utc>,
}

/// Represents the geographical location of a weather station in EPSG:4326.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in decimal degrees (positive for North, negative for South).
    pub latitude: f64,
    /// Longitude in decimal degrees (positive for East, negative for West).
    pub longitude: f64,
}

impl Location {
    /// Returns the location as a `geo` point (x = longitude, y = latitude).
    pub fn point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl Station {
    pub fn point(&self) -> Point<f64> {
        self.location.point()
    }
}

// --- R-Tree Implementations ---

/// Lets a `Station` live in an `rstar::RTree`.
///
/// Coordinates are ordered `[longitude, latitude]` so that the tree shares its
/// axes with the `geo` geometries the stations are compared against.
impl RTreeObject for Station {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.location.longitude, self.location.latitude])
    }
}

impl PointDistance for Station {
    /// Squared planar distance in degrees to a `[longitude, latitude]` query point.
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.location.longitude - point[0];
        let dy = self.location.latitude - point[1];
        dx * dx + dy * dy
    }
}
