//! Minimal TopoJSON decoder producing `geo` geometries.
//!
//! Supports quantized (`transform`) and plain arcs, negative arc references
//! (`!i` reverses arc `i`), all geometry types and null geometries.

use crate::ingest::error::IngestError;
use geo::{Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Transform {
    pub scale: [f64; 2],
    pub translate: [f64; 2],
}

impl Transform {
    fn apply(&self, x: f64, y: f64) -> Coord<f64> {
        Coord {
            x: x * self.scale[0] + self.translate[0],
            y: y * self.scale[1] + self.translate[1],
        }
    }
}

/// A geometry object as it appears in the topology. Arc and coordinate
/// payloads are kept untyped until the geometry type is known.
#[derive(Debug, Clone, Deserialize)]
pub struct TopoGeometry {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub arcs: Value,
    #[serde(default)]
    pub coordinates: Value,
    #[serde(default)]
    pub geometries: Vec<TopoGeometry>,
    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Topology {
    #[serde(rename = "type")]
    pub kind: String,
    pub transform: Option<Transform>,
    #[serde(default)]
    pub arcs: Vec<Vec<Vec<f64>>>,
    #[serde(default)]
    pub objects: BTreeMap<String, TopoGeometry>,
}

/// A decoded feature. `geometry` is `Err` with a reason when the feature's
/// geometry could not be decoded, and `Ok(None)` for a null geometry.
#[derive(Debug, Clone)]
pub struct Feature {
    pub properties: Map<String, Value>,
    pub geometry: Result<Option<Geometry<f64>>, String>,
}

impl Topology {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, IngestError> {
        let topology: Topology = serde_json::from_slice(bytes)?;
        if topology.kind != "Topology" {
            return Err(IngestError::Topology(format!(
                "expected type 'Topology', found '{}'",
                topology.kind
            )));
        }
        Ok(topology)
    }

    /// Decodes every feature of every object. A top-level geometry collection
    /// contributes one feature per member.
    pub fn features(&self) -> Vec<Feature> {
        let arcs = self.decode_arcs();
        let mut features = Vec::new();
        for object in self.objects.values() {
            let members: Vec<&TopoGeometry> = match object.kind.as_deref() {
                Some("GeometryCollection") => object.geometries.iter().collect(),
                _ => vec![object],
            };
            for member in members {
                features.push(Feature {
                    properties: member.properties.clone().unwrap_or_default(),
                    geometry: self.geometry(member, &arcs),
                });
            }
        }
        features
    }

    fn decode_arcs(&self) -> Vec<Vec<Coord<f64>>> {
        self.arcs
            .iter()
            .map(|arc| match &self.transform {
                Some(transform) => {
                    let (mut x, mut y) = (0.0, 0.0);
                    arc.iter()
                        .filter(|p| p.len() >= 2)
                        .map(|p| {
                            x += p[0];
                            y += p[1];
                            transform.apply(x, y)
                        })
                        .collect()
                }
                None => arc
                    .iter()
                    .filter(|p| p.len() >= 2)
                    .map(|p| Coord { x: p[0], y: p[1] })
                    .collect(),
            })
            .collect()
    }

    fn position(&self, position: &[f64]) -> Result<Coord<f64>, String> {
        match (position.first(), position.get(1)) {
            (Some(&x), Some(&y)) => Ok(match &self.transform {
                Some(transform) => transform.apply(x, y),
                None => Coord { x, y },
            }),
            _ => Err(format!("position {:?} has fewer than two values", position)),
        }
    }

    fn geometry(&self, geometry: &TopoGeometry, arcs: &[Vec<Coord<f64>>]) -> Result<Option<Geometry<f64>>, String> {
        let Some(kind) = geometry.kind.as_deref() else {
            return Ok(None);
        };
        let decoded = match kind {
            "Point" => {
                let position: Vec<f64> = payload(&geometry.coordinates)?;
                Geometry::Point(Point(self.position(&position)?))
            }
            "MultiPoint" => {
                let positions: Vec<Vec<f64>> = payload(&geometry.coordinates)?;
                let points = positions
                    .iter()
                    .map(|p| self.position(p).map(Point))
                    .collect::<Result<Vec<_>, _>>()?;
                Geometry::MultiPoint(MultiPoint(points))
            }
            "LineString" => {
                let refs: Vec<i64> = payload(&geometry.arcs)?;
                Geometry::LineString(stitch(arcs, &refs)?)
            }
            "MultiLineString" => {
                let lines: Vec<Vec<i64>> = payload(&geometry.arcs)?;
                let lines = lines
                    .iter()
                    .map(|refs| stitch(arcs, refs))
                    .collect::<Result<Vec<_>, _>>()?;
                Geometry::MultiLineString(MultiLineString(lines))
            }
            "Polygon" => {
                let rings: Vec<Vec<i64>> = payload(&geometry.arcs)?;
                Geometry::Polygon(polygon(arcs, &rings)?)
            }
            "MultiPolygon" => {
                let polygons: Vec<Vec<Vec<i64>>> = payload(&geometry.arcs)?;
                let polygons = polygons
                    .iter()
                    .map(|rings| polygon(arcs, rings))
                    .collect::<Result<Vec<_>, _>>()?;
                Geometry::MultiPolygon(MultiPolygon(polygons))
            }
            "GeometryCollection" => {
                let mut members = Vec::with_capacity(geometry.geometries.len());
                for member in &geometry.geometries {
                    if let Some(decoded) = self.geometry(member, arcs)? {
                        members.push(decoded);
                    }
                }
                Geometry::GeometryCollection(GeometryCollection(members))
            }
            other => return Err(format!("unsupported geometry type '{}'", other)),
        };
        Ok(Some(decoded))
    }
}

fn payload<T: DeserializeOwned>(value: &Value) -> Result<T, String> {
    T::deserialize(value).map_err(|e| format!("malformed geometry payload: {}", e))
}

/// Joins the referenced arcs into one line. Consecutive arcs share their end
/// points, so the first point of every arc after the first is dropped.
fn stitch(arcs: &[Vec<Coord<f64>>], refs: &[i64]) -> Result<LineString<f64>, String> {
    let mut coords: Vec<Coord<f64>> = Vec::new();
    for &reference in refs {
        let (index, reversed) = if reference < 0 {
            (!reference, true)
        } else {
            (reference, false)
        };
        let arc = usize::try_from(index)
            .ok()
            .and_then(|i| arcs.get(i))
            .ok_or_else(|| format!("arc reference {} is out of range", reference))?;

        let points: Box<dyn Iterator<Item = &Coord<f64>>> = if reversed {
            Box::new(arc.iter().rev())
        } else {
            Box::new(arc.iter())
        };
        let skip = usize::from(!coords.is_empty());
        coords.extend(points.skip(skip).copied());
    }
    Ok(LineString::new(coords))
}

fn polygon(arcs: &[Vec<Coord<f64>>], rings: &[Vec<i64>]) -> Result<Polygon<f64>, String> {
    let mut rings = rings.iter().map(|refs| stitch(arcs, refs));
    let exterior = rings
        .next()
        .transpose()?
        .ok_or_else(|| "polygon has no rings".to_string())?;
    let interiors = rings.collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}
