use crate::linking::metric::DistanceMetric;
use crate::types::link::PostalStationLink;
use crate::types::postal_area::PostalArea;
use crate::types::station::Station;
use bon::Builder;
use geo::{Centroid, CoordsIter, MultiPolygon, Point};
use log::debug;
use ordered_float::OrderedFloat;
use rstar::RTree;
use std::cmp::Ordering;
use std::collections::BTreeMap;

// Slack on the R-tree cut-off so rounding never prunes a tied station.
const PRUNE_EPSILON: f64 = 1e-9;

/// Finds the nearest station for every postal area.
///
/// The result is deterministic: stations at exactly the same distance from an
/// area are ordered by internal id and the lowest id wins.
///
/// With [`DistanceMetric::Planar`] the stations are bulk-loaded into an R-tree
/// and each area only evaluates stations until the tree's lower bound exceeds
/// the best distance found. [`DistanceMetric::Haversine`] distances do not follow
/// the tree's planar order, so every station is evaluated.
#[derive(Debug, Clone, Copy, Default, Builder)]
pub struct NearestStationResolver {
    #[builder(default)]
    metric: DistanceMetric,
}

// Helper struct ordering stations by (distance, id)
#[derive(Debug, Clone, Copy)]
struct StationCandidate<'a> {
    distance: OrderedFloat<f64>,
    station: &'a Station,
}

impl PartialEq for StationCandidate<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for StationCandidate<'_> {}
impl PartialOrd for StationCandidate<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for StationCandidate<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .cmp(&other.distance)
            .then_with(|| self.station.id.cmp(&other.station.id))
    }
}

impl NearestStationResolver {
    pub fn new(metric: DistanceMetric) -> Self {
        Self { metric }
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Maps each postal code with a geometry to the internal id of its nearest
    /// station.
    ///
    /// Areas without geometry get no entry. An empty station set yields an empty
    /// mapping. If a postal code occurs more than once, the last occurrence wins.
    pub fn resolve(&self, areas: &[PostalArea], stations: &[Station]) -> BTreeMap<String, i32> {
        let mut mapping = BTreeMap::new();
        if stations.is_empty() {
            return mapping;
        }

        let index = match self.metric {
            DistanceMetric::Planar => Some(RTree::bulk_load(stations.to_vec())),
            DistanceMetric::Haversine => None,
        };

        for area in areas {
            let Some(geometry) = &area.geometry else {
                debug!("Postal area {} has no geometry, not linking", area.plz);
                continue;
            };
            let nearest = match &index {
                Some(tree) => self.nearest_indexed(tree, geometry),
                None => self.nearest_exhaustive(stations, geometry),
            };
            if let Some(candidate) = nearest {
                mapping.insert(area.plz.clone(), candidate.station.id);
            }
        }
        mapping
    }

    /// Same as [`resolve`](Self::resolve), as link table rows ordered by postal code.
    pub fn resolve_links(&self, areas: &[PostalArea], stations: &[Station]) -> Vec<PostalStationLink> {
        self.resolve(areas, stations)
            .into_iter()
            .map(|(plz, station_id)| PostalStationLink { plz, station_id })
            .collect()
    }

    fn candidate<'a>(&self, geometry: &MultiPolygon<f64>, station: &'a Station) -> StationCandidate<'a> {
        StationCandidate {
            distance: OrderedFloat(self.metric.area_distance(geometry, &station.point())),
            station,
        }
    }

    fn nearest_exhaustive<'a>(
        &self,
        stations: &'a [Station],
        geometry: &MultiPolygon<f64>,
    ) -> Option<StationCandidate<'a>> {
        stations
            .iter()
            .map(|station| self.candidate(geometry, station))
            .min()
    }

    /// Walks the tree outward from the area's centroid. Every point of the area
    /// lies within `radius` of the centroid, so a station whose centroid
    /// distance exceeds `best + radius` cannot beat `best`.
    fn nearest_indexed<'a>(
        &self,
        tree: &'a RTree<Station>,
        geometry: &MultiPolygon<f64>,
    ) -> Option<StationCandidate<'a>> {
        let Some(anchor) = geometry.centroid() else {
            return tree.iter().map(|station| self.candidate(geometry, station)).min();
        };
        let radius = geometry
            .coords_iter()
            .map(|c| self.metric.point_distance(&anchor, &Point::from(c)))
            .fold(0.0_f64, f64::max);

        let mut best: Option<StationCandidate<'a>> = None;
        for (station, distance_2) in tree.nearest_neighbor_iter_with_distance_2(&[anchor.x(), anchor.y()]) {
            if let Some(current) = &best {
                if distance_2.sqrt() - radius > current.distance.into_inner() + PRUNE_EPSILON {
                    break;
                }
            }
            let candidate = self.candidate(geometry, station);
            best = Some(match best {
                Some(current) => current.min(candidate),
                None => candidate,
            });
        }
        best
    }
}
