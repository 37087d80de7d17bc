//! Coercion of heterogeneous boundary geometry into multi-polygons.
//!
//! Postal boundaries arrive as polygons, multi-polygons or geometry collections
//! mixing polygons with stray lines and points. Everything stored as a postal
//! area boundary is a `MultiPolygon` in EPSG:4326 (x = longitude, y = latitude).

use geo::{Geometry, MultiPolygon, Polygon};

/// Normalizes `geometry` into a multi-polygon.
///
/// * `Polygon` becomes a single-member multi-polygon.
/// * `MultiPolygon` is returned as-is.
/// * `Rect` and `Triangle` are converted to their polygon.
/// * `GeometryCollection` keeps only its `Polygon` and `MultiPolygon` members
///   (flattened); all other members are dropped.
///
/// Returns `None` when nothing polygonal remains, including for bare points and
/// lines.
pub fn to_multi_polygon(geometry: Geometry<f64>) -> Option<MultiPolygon<f64>> {
    let polygons: Vec<Polygon<f64>> = match geometry {
        Geometry::Polygon(polygon) => vec![polygon],
        Geometry::MultiPolygon(multi) => multi.0,
        Geometry::Rect(rect) => vec![rect.to_polygon()],
        Geometry::Triangle(triangle) => vec![triangle.to_polygon()],
        Geometry::GeometryCollection(collection) => collection
            .0
            .into_iter()
            .flat_map(|member| match member {
                Geometry::Polygon(polygon) => vec![polygon],
                Geometry::MultiPolygon(multi) => multi.0,
                _ => Vec::new(),
            })
            .collect(),
        _ => Vec::new(),
    };

    if polygons.is_empty() {
        None
    } else {
        Some(MultiPolygon::new(polygons))
    }
}
