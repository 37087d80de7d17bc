//! One-time setup and the hourly ingestion cycle.

use crate::config::Config;
use crate::error::StationLinkError;
use crate::ingest::download::Downloader;
use crate::ingest::postal::PostalIngestor;
use crate::ingest::stations::StationIngestor;
use crate::ingest::weather::{WeatherIngestor, WeatherReport};
use crate::linking::manager::{LinkingTableManager, RebuildReport};
use crate::linking::resolver::NearestStationResolver;
use crate::scope::ScopeResolver;
use crate::store::report::UpsertReport;
use crate::store::Store;
use crate::types::observation::ObservationKind;
use crate::types::scope::Scope;
use chrono::{DateTime, Utc};
use log::{info, warn};
use std::sync::Arc;
use tokio::task;

/// What an hourly cycle did.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub stations: UpsertReport,
    pub rebuild: RebuildReport,
    pub scope: Scope,
    pub scope_stations: usize,
    /// `None` when the scope was empty and no weather was fetched.
    pub forecast: Option<WeatherReport>,
    pub observed: Option<WeatherReport>,
}

pub struct Pipeline<S> {
    config: Config,
    postal: PostalIngestor,
    stations: StationIngestor,
    weather: WeatherIngestor,
    linker: Arc<LinkingTableManager<S>>,
    scope: Arc<ScopeResolver<S>>,
    store: Arc<S>,
}

impl<S> Pipeline<S>
where
    S: Store + 'static,
{
    pub fn new(config: Config, store: Arc<S>) -> Self {
        let downloader = Downloader::new(config.max_retries);
        Self::with_downloader(config, store, downloader)
    }

    pub fn with_downloader(config: Config, store: Arc<S>, downloader: Downloader) -> Self {
        let postal = PostalIngestor::new(
            downloader.clone(),
            config.postal_topo_url.clone(),
            config.postal_prefix().map(str::to_string),
        );
        let stations = StationIngestor::new(downloader.clone(), config.wmo_stations_url.clone());
        let weather = WeatherIngestor::new(
            downloader,
            config.brightsky_base.clone(),
            config.http_concurrency,
            config.forecast_days_by,
        );
        let linker = Arc::new(LinkingTableManager::new(
            store.clone(),
            NearestStationResolver::new(config.distance_metric),
        ));
        let scope = Arc::new(ScopeResolver::new(store.clone(), config.country_match));
        Pipeline {
            config,
            postal,
            stations,
            weather,
            linker,
            scope,
            store,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Loads the postal area boundaries. Run once, and again whenever the
    /// boundaries change.
    pub async fn run_one_time_setup(&self) -> Result<UpsertReport, StationLinkError> {
        info!("Running one-time setup operations...");
        let report = self
            .postal
            .ingest(self.store.clone(), self.config.write_mode)
            .await?;
        info!("One-time setup completed: {}", report);
        Ok(report)
    }

    /// Ingests stations, rebuilds the link table, resolves the configured scope
    /// and fetches forecasts then observations for it.
    ///
    /// Station ingestion or link rebuild failures fail the cycle. Failed weather
    /// batches are logged and reported but do not.
    pub async fn run_hourly_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport, StationLinkError> {
        info!("Running hourly data ingestion cycle...");

        let stations = self
            .stations
            .ingest(self.store.clone(), self.config.write_mode)
            .await?;

        let linker = self.linker.clone();
        let rebuild = task::spawn_blocking(move || linker.rebuild()).await??;

        let scope = self.config.scope();
        let resolver = self.scope.clone();
        let resolve_for = scope.clone();
        let station_ids: Vec<String> = task::spawn_blocking(move || resolver.resolve_scope(&resolve_for))
            .await??
            .into_iter()
            .collect();

        let (forecast, observed) = if station_ids.is_empty() {
            warn!("No stations found for {}; skipping weather ingestion", scope);
            (None, None)
        } else {
            let forecast = self
                .weather
                .ingest(self.store.clone(), ObservationKind::Forecast, &station_ids, now)
                .await;
            let observed = self
                .weather
                .ingest(self.store.clone(), ObservationKind::Observed, &station_ids, now)
                .await;
            (Some(forecast), Some(observed))
        };

        info!("Hourly data ingestion cycle completed");
        Ok(CycleReport {
            stations,
            rebuild,
            scope,
            scope_stations: station_ids.len(),
            forecast,
            observed,
        })
    }
}

/// Seconds to sleep after a cycle so the next one starts at minute 1 of the
/// next hour, never less than a minute.
pub fn seconds_until_next_run(now: DateTime<Utc>) -> u64 {
    use chrono::Timelike;
    let elapsed = u64::from(now.minute() * 60 + now.second());
    3660u64.saturating_sub(elapsed).max(60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linking::error::LinkingError;
    use crate::store::file::FileStore;
    use crate::store::memory::MemoryStore;
    use crate::store::{GeometryStore, LinkStore, ObservationStore};
    use crate::test_server::{serve, Reply};
    use async_compression::tokio::bufread::BrotliEncoder;
    use chrono::TimeZone;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    // 10115 and 10117 in Berlin, 20095 in Hamburg.
    const FEED: &str = r#"{
        "type": "Topology",
        "arcs": [
            [[13.28, 52.55], [13.31, 52.55], [13.31, 52.57], [13.28, 52.57], [13.28, 52.55]],
            [[13.40, 52.45], [13.42, 52.45], [13.42, 52.47], [13.40, 52.47], [13.40, 52.45]],
            [[9.99, 53.54], [10.01, 53.54], [10.01, 53.56], [9.99, 53.56], [9.99, 53.54]]
        ],
        "objects": {"plz": {"type": "GeometryCollection", "geometries": [
            {"type": "Polygon", "arcs": [[0]], "properties": {"postcode": "10115"}},
            {"type": "Polygon", "arcs": [[1]], "properties": {"postcode": "10117"}},
            {"type": "Polygon", "arcs": [[2]], "properties": {"postcode": "20095"}}
        ]}}
    }"#;

    const STATIONS: &str = "\
WMO-StationID;StationName;Latitude;Longitude;Height;Country
10382;Berlin-Tegel;52.5644;13.3088;36;Germany
10384;Berlin-Tempelhof;52.4675;13.4021;48;Germany
10147;Hamburg-Fuhlsbuettel;53.6332;9.9881;11;Germany
11035;Wien/Hohe Warte;48.2486;16.3564;198;Austria
";

    const WEATHER: &str = r#"{
        "weather": [
            {"timestamp": "2023-08-07T12:00:00+00:00", "source_id": 1, "temperature": 15.5},
            {"timestamp": "2023-08-07T12:00:00+00:00", "source_id": 2, "temperature": 16.1}
        ],
        "sources": [
            {"id": 1, "wmo_station_id": "10382"},
            {"id": 2, "wmo_station_id": "10384"}
        ]
    }"#;

    async fn brotli(text: &str) -> Vec<u8> {
        let mut compressed = Vec::new();
        BrotliEncoder::new(text.as_bytes())
            .read_to_end(&mut compressed)
            .await
            .unwrap();
        compressed
    }

    async fn upstream() -> String {
        let feed = brotli(FEED).await;
        serve(move |target| {
            if target.starts_with("/postleitzahlen") {
                Reply::ok(feed.clone())
            } else if target.starts_with("/stations") {
                Reply::ok(STATIONS)
            } else if target.starts_with("/weather") {
                Reply::ok(WEATHER)
            } else {
                Reply::not_found()
            }
        })
        .await
    }

    fn config(base_url: &str) -> Config {
        Config {
            brightsky_base: base_url.to_string(),
            postal_topo_url: format!("{}/postleitzahlen.topojson.br", base_url),
            wmo_stations_url: format!("{}/stations_list_CLIMAT_data.txt", base_url),
            max_retries: 1,
            // One weather batch, so the canned response is stored once per kind.
            http_concurrency: 1,
            ..Config::default()
        }
    }

    fn downloader() -> Downloader {
        Downloader::new(1).with_base_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_setup_then_hourly_cycle() {
        let base_url = upstream().await;
        let store = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::with_downloader(config(&base_url), store.clone(), downloader());

        let setup = pipeline.run_one_time_setup().await.unwrap();
        // Only the configured "10" prefix is loaded.
        assert_eq!(setup.inserted, 2);

        let now = Utc.with_ymd_and_hms(2023, 8, 7, 13, 5, 0).unwrap();
        let cycle = pipeline.run_hourly_cycle(now).await.unwrap();
        assert_eq!(cycle.stations.inserted, 4);
        assert_eq!(cycle.rebuild.links_written, 2);
        assert_eq!(cycle.scope, Scope::ByPrefix("10".to_string()));
        assert_eq!(cycle.scope_stations, 2);

        let links = store.links().unwrap();
        let stations = store.stations().unwrap();
        let wmo_of = |id: i32| {
            stations
                .iter()
                .find(|s| s.id == id)
                .map(|s| s.wmo_station_id.clone())
                .unwrap()
        };
        let linked: Vec<(String, String)> = links.iter().map(|l| (l.plz.clone(), wmo_of(l.station_id))).collect();
        assert_eq!(
            linked,
            vec![
                ("10115".to_string(), "10382".to_string()),
                ("10117".to_string(), "10384".to_string()),
            ]
        );

        assert_eq!(cycle.forecast.as_ref().unwrap().rows_written, 2);
        assert_eq!(cycle.observed.as_ref().unwrap().rows_written, 2);
        assert_eq!(store.observations(ObservationKind::Forecast).unwrap().len(), 2);
        assert_eq!(store.observations(ObservationKind::Observed).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_scope_skips_weather() {
        let base_url = upstream().await;
        let store = Arc::new(MemoryStore::new());
        let mut config = config(&base_url);
        config.default_is_scope_plz3 = Some(false);
        config.default_country = Some("Atlantis".to_string());
        let pipeline = Pipeline::with_downloader(config, store.clone(), downloader());

        pipeline.run_one_time_setup().await.unwrap();
        let cycle = pipeline.run_hourly_cycle(Utc::now()).await.unwrap();
        assert_eq!(cycle.scope_stations, 0);
        assert!(cycle.forecast.is_none());
        assert!(cycle.observed.is_none());
        assert!(store.observations(ObservationKind::Observed).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cycle_without_postal_areas_fails_rebuild() {
        let base_url = upstream().await;
        let store = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::with_downloader(config(&base_url), store.clone(), downloader());

        let result = pipeline.run_hourly_cycle(Utc::now()).await;
        assert!(matches!(
            result,
            Err(StationLinkError::Linking(LinkingError::InputEmpty("postal areas")))
        ));
        // Stations were still ingested.
        assert_eq!(store.stations().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_cycle_against_file_store() {
        let base_url = upstream().await;
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::open(dir.path()).unwrap());
        let pipeline = Pipeline::with_downloader(config(&base_url), store.clone(), downloader());

        pipeline.run_one_time_setup().await.unwrap();
        pipeline.run_hourly_cycle(Utc::now()).await.unwrap();

        let reopened = FileStore::open(dir.path()).unwrap();
        assert_eq!(reopened.links().unwrap().len(), 2);
        assert_eq!(reopened.postal_areas().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_setup_fails_when_feed_is_missing() {
        let base_url = serve(|_| Reply::not_found()).await;
        let pipeline = Pipeline::with_downloader(config(&base_url), Arc::new(MemoryStore::new()), downloader());
        assert!(matches!(
            pipeline.run_one_time_setup().await,
            Err(StationLinkError::Ingest(_))
        ));
    }

    #[test]
    fn test_seconds_until_next_run() {
        let at = |m, s| Utc.with_ymd_and_hms(2024, 1, 1, 14, m, s).unwrap();
        assert_eq!(seconds_until_next_run(at(0, 0)), 3660);
        assert_eq!(seconds_until_next_run(at(1, 0)), 3600);
        assert_eq!(seconds_until_next_run(at(30, 30)), 1830);
        assert_eq!(seconds_until_next_run(at(59, 30)), 90);
    }
}
