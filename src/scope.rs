//! Resolves a [`Scope`] into the WMO identifiers of the stations it covers.

use crate::store::error::StoreError;
use crate::store::{GeometryStore, LinkStore};
use crate::types::scope::{CountryMatch, Scope};
use bon::Builder;
use log::{debug, warn};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

/// Answers "which stations does this run cover?" from the link table and the
/// station dimension.
///
/// An empty result is not an error; the caller decides whether an empty scope
/// is worth acting on.
#[derive(Builder)]
pub struct ScopeResolver<S> {
    store: Arc<S>,
    #[builder(default)]
    country_match: CountryMatch,
}

impl<S> ScopeResolver<S>
where
    S: GeometryStore + LinkStore,
{
    pub fn new(store: Arc<S>, country_match: CountryMatch) -> Self {
        Self {
            store,
            country_match,
        }
    }

    /// Returns the distinct WMO station identifiers for `scope`.
    ///
    /// * [`Scope::ByPrefix`]: stations linked to a postal code starting with
    ///   the prefix (case-insensitive).
    /// * [`Scope::ByCountry`]: stations whose country matches according to the
    ///   configured [`CountryMatch`].
    /// * [`Scope::All`]: every station.
    pub fn resolve_scope(&self, scope: &Scope) -> Result<BTreeSet<String>, StoreError> {
        let station_ids: BTreeSet<String> = match scope {
            Scope::ByPrefix(prefix) => {
                // Links are read first: stations are never removed, so every
                // linked id is present in the station read that follows.
                let prefix = prefix.to_lowercase();
                let linked: HashSet<i32> = self
                    .store
                    .links()?
                    .into_iter()
                    .filter(|link| link.plz.to_lowercase().starts_with(&prefix))
                    .map(|link| link.station_id)
                    .collect();
                self.store
                    .stations()?
                    .into_iter()
                    .filter(|s| linked.contains(&s.id))
                    .map(|s| s.wmo_station_id)
                    .collect()
            }
            Scope::ByCountry(country) => self
                .store
                .stations()?
                .into_iter()
                .filter(|s| self.country_match.matches(&s.country, country))
                .map(|s| s.wmo_station_id)
                .collect(),
            Scope::All => self
                .store
                .stations()?
                .into_iter()
                .map(|s| s.wmo_station_id)
                .collect(),
        };

        if station_ids.is_empty() {
            warn!("No stations found for {}", scope);
        } else {
            debug!("Resolved {} stations for {}", station_ids.len(), scope);
        }
        Ok(station_ids)
    }
}
