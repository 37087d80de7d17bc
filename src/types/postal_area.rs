use chrono::{DateTime, Utc};
use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

/// A postal area (PLZ) and its boundary.
///
/// The boundary is always a normalized multi-polygon in EPSG:4326. A postal area
/// without geometry may be stored but is never linked to a station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostalArea {
    /// The postal code, unique across postal areas.
    pub plz: String,
    pub geometry: Option<MultiPolygon<f64>>,
    /// Name of the feed this row came from (e.g. "topojson").
    pub record_source: String,
    pub loaded_at: DateTime<Utc>,
}

impl PostalArea {
    pub fn new(plz: impl Into<String>, geometry: Option<MultiPolygon<f64>>, record_source: impl Into<String>) -> Self {
        Self {
            plz: plz.into(),
            geometry,
            record_source: record_source.into(),
            loaded_at: Utc::now(),
        }
    }
}
