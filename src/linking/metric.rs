//! Distance between a postal area boundary and a station point.

use geo::{Closest, ClosestPoint, Intersects, MultiPolygon, Point};
use haversine::{distance, Location as HaversineLocation, Units};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Metric used to rank stations against a postal area.
///
/// Both metrics measure from the closest point of the boundary, so a station
/// inside (or on the edge of) a postal area is at distance 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Euclidean distance in degrees of EPSG:4326, as PostGIS computes
    /// `ST_Distance` on geometry columns.
    #[default]
    Planar,
    /// Great-circle kilometres from the station to the planar closest point of
    /// the boundary.
    Haversine,
}

impl DistanceMetric {
    /// Distance from `point` to the boundary `area`.
    ///
    /// Returns `f64::INFINITY` when `area` has no closest point (empty geometry).
    pub fn area_distance(&self, area: &MultiPolygon<f64>, point: &Point<f64>) -> f64 {
        match closest_point(area, point) {
            Some(nearest) => self.point_distance(&nearest, point),
            None => f64::INFINITY,
        }
    }

    pub fn point_distance(&self, a: &Point<f64>, b: &Point<f64>) -> f64 {
        match self {
            DistanceMetric::Planar => (a.x() - b.x()).hypot(a.y() - b.y()),
            DistanceMetric::Haversine => distance(
                HaversineLocation {
                    latitude: a.y(),
                    longitude: a.x(),
                },
                HaversineLocation {
                    latitude: b.y(),
                    longitude: b.x(),
                },
                Units::Kilometers,
            ),
        }
    }
}

fn closest_point(area: &MultiPolygon<f64>, point: &Point<f64>) -> Option<Point<f64>> {
    if area.intersects(point) {
        return Some(*point);
    }
    match area.closest_point(point) {
        Closest::Intersection(p) | Closest::SinglePoint(p) => Some(p),
        Closest::Indeterminate => None,
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "planar" => Ok(DistanceMetric::Planar),
            "haversine" => Ok(DistanceMetric::Haversine),
            other => Err(format!("unknown distance metric '{}'", other)),
        }
    }
}
