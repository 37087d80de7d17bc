use crate::linking::error::LinkingError;
use crate::linking::resolver::NearestStationResolver;
use crate::store::{GeometryStore, LinkStore};
use log::{info, warn};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Summary of a successful rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildReport {
    pub postal_areas: usize,
    pub stations: usize,
    /// Postal areas left unlinked because they have no geometry.
    pub areas_without_geometry: usize,
    pub links_written: usize,
    pub elapsed: Duration,
}

impl fmt::Display for RebuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} links from {} postal areas ({} without geometry) and {} stations in {:?}",
            self.links_written,
            self.postal_areas,
            self.areas_without_geometry,
            self.stations,
            self.elapsed
        )
    }
}

/// Owns the postal code to station link table and regenerates it in full.
///
/// The table is never patched: every rebuild computes the complete mapping
/// from the current postal areas and stations and hands it to
/// [`LinkStore::replace_links`], which swaps it in atomically. Callers must not
/// run two rebuilds against the same store at once.
pub struct LinkingTableManager<S: ?Sized> {
    store: Arc<S>,
    resolver: NearestStationResolver,
}

impl<S> LinkingTableManager<S>
where
    S: GeometryStore + LinkStore + ?Sized,
{
    pub fn new(store: Arc<S>, resolver: NearestStationResolver) -> Self {
        Self { store, resolver }
    }

    /// Clears and recomputes the link table.
    ///
    /// # Errors
    ///
    /// * [`LinkingError::InputEmpty`] if there are no postal areas or no stations.
    /// * [`LinkingError::InputUnavailable`] if either table cannot be read.
    /// * [`LinkingError::Persistence`] if the new table cannot be written; the
    ///   previous table is kept.
    pub fn rebuild(&self) -> Result<RebuildReport, LinkingError> {
        let started = Instant::now();

        let areas = self
            .store
            .postal_areas()
            .map_err(|e| LinkingError::InputUnavailable("postal areas", e))?;
        if areas.is_empty() {
            return Err(LinkingError::InputEmpty("postal areas"));
        }
        let stations = self
            .store
            .stations()
            .map_err(|e| LinkingError::InputUnavailable("stations", e))?;
        if stations.is_empty() {
            return Err(LinkingError::InputEmpty("stations"));
        }

        info!(
            "Rebuilding link table from {} postal areas and {} stations ({:?} distance)",
            areas.len(),
            stations.len(),
            self.resolver.metric()
        );

        let areas_without_geometry = areas.iter().filter(|a| a.geometry.is_none()).count();
        if areas_without_geometry > 0 {
            warn!(
                "{} postal areas have no geometry and will not be linked",
                areas_without_geometry
            );
        }

        let links = self.resolver.resolve_links(&areas, &stations);
        let links_written = self
            .store
            .replace_links(&links)
            .map_err(LinkingError::Persistence)?;

        let report = RebuildReport {
            postal_areas: areas.len(),
            stations: stations.len(),
            areas_without_geometry,
            links_written,
            elapsed: started.elapsed(),
        };
        info!("Rebuilt link table: {}", report);
        Ok(report)
    }
}
