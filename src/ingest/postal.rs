//! Postal code boundaries from a brotli-compressed TopoJSON feed.

use crate::ingest::download::{Compression, Downloader};
use crate::ingest::error::IngestError;
use crate::ingest::topojson::{Feature, Topology};
use crate::store::report::{RowFailure, UpsertReport, WriteMode};
use crate::store::GeometryStore;
use crate::types::geometry::to_multi_polygon;
use crate::types::postal_area::PostalArea;
use log::{debug, info, warn};
use serde_json::Value;
use std::sync::Arc;
use tokio::task;

pub const RECORD_SOURCE: &str = "topojson";
const POSTCODE_PROPERTY: &str = "postcode";

/// Postal areas decoded from the feed, plus the features whose geometry could
/// not be turned into a multi-polygon.
#[derive(Debug, Default)]
pub struct ParsedPostalAreas {
    pub areas: Vec<PostalArea>,
    pub invalid_geometry: Vec<RowFailure>,
    /// Features without a postal code, or outside the prefix filter.
    pub dropped: usize,
}

fn postcode(feature: &Feature) -> Option<String> {
    let code = match feature.properties.get(POSTCODE_PROPERTY)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Some(code).filter(|c| !c.is_empty())
}

/// Turns decoded features into postal areas, keeping only postal codes that
/// start with `prefix` when one is given.
pub fn postal_areas_from_features(features: Vec<Feature>, prefix: Option<&str>) -> ParsedPostalAreas {
    let mut parsed = ParsedPostalAreas::default();
    for feature in features {
        let Some(plz) = postcode(&feature) else {
            parsed.dropped += 1;
            continue;
        };
        if prefix.is_some_and(|p| !plz.starts_with(p)) {
            parsed.dropped += 1;
            continue;
        }

        let geometry = match feature.geometry {
            Ok(Some(geometry)) => to_multi_polygon(geometry)
                .ok_or_else(|| "geometry has no polygonal part".to_string()),
            Ok(None) => Err("geometry is null".to_string()),
            Err(reason) => Err(reason),
        };
        match geometry {
            Ok(geometry) => parsed.areas.push(PostalArea::new(plz, Some(geometry), RECORD_SOURCE)),
            Err(reason) => {
                debug!("Invalid geometry for postal code {}: {}", plz, reason);
                parsed
                    .invalid_geometry
                    .push(RowFailure::new(plz, format!("invalid geometry: {}", reason)));
            }
        }
    }
    parsed
}

/// Decodes the (already decompressed) TopoJSON document.
pub fn parse_postal_topology(bytes: &[u8], prefix: Option<&str>) -> Result<ParsedPostalAreas, IngestError> {
    let topology = Topology::from_slice(bytes)?;
    let parsed = postal_areas_from_features(topology.features(), prefix);
    info!(
        "Decoded {} postal areas ({} invalid geometries, {} features dropped)",
        parsed.areas.len(),
        parsed.invalid_geometry.len(),
        parsed.dropped
    );
    Ok(parsed)
}

/// Downloads the postal feed and upserts it into the postal area dimension.
pub struct PostalIngestor {
    downloader: Downloader,
    url: String,
    prefix: Option<String>,
}

impl PostalIngestor {
    pub fn new(downloader: Downloader, url: impl Into<String>, prefix: Option<String>) -> Self {
        Self {
            downloader,
            url: url.into(),
            prefix: prefix.filter(|p| !p.trim().is_empty()),
        }
    }

    pub async fn ingest<S>(&self, store: Arc<S>, mode: WriteMode) -> Result<UpsertReport, IngestError>
    where
        S: GeometryStore + ?Sized + 'static,
    {
        info!("Downloading postal TopoJSON from {}", self.url);
        let bytes = self.downloader.download(&self.url, Compression::Brotli).await?;
        let prefix = self.prefix.clone();

        let report = task::spawn_blocking(move || {
            let parsed = parse_postal_topology(&bytes, prefix.as_deref())?;
            if mode.blocks_on(&parsed.invalid_geometry) {
                warn!(
                    "{} postal areas with invalid geometry, writing no postal areas ({:?})",
                    parsed.invalid_geometry.len(),
                    mode
                );
                return Ok(UpsertReport::default().with_rejected(parsed.invalid_geometry));
            }
            store
                .upsert_postal_areas(parsed.areas, mode)
                .map(|report| report.with_rejected(parsed.invalid_geometry))
                .map_err(|e| IngestError::Store("postal areas", e))
        })
        .await??;

        for failure in &report.rejected {
            warn!("Postal area not written: {}", failure);
        }
        info!("Ingested postal polygons: {}", report);
        Ok(report)
    }
}
