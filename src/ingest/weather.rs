//! Hourly observations and forecasts from the BrightSky `/weather` endpoint.

use crate::ingest::download::{Downloader, Fetched};
use crate::ingest::error::IngestError;
use crate::store::ObservationStore;
use crate::types::observation::{ObservationKind, RawWeatherRecord};
use chrono::{DateTime, Duration, DurationRound, Utc};
use futures_util::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::task;

const QUERY_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// The time range requested from the weather API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl FetchWindow {
    /// The previous full hour, `[HH:00:00, HH:59:00]`.
    pub fn observation(now: DateTime<Utc>) -> Self {
        let from = start_of_hour(now) - Duration::hours(1);
        FetchWindow {
            from,
            to: from + Duration::minutes(59),
        }
    }

    /// From the start of the current hour until `days` days later.
    pub fn forecast(now: DateTime<Utc>, days: u32) -> Self {
        let from = start_of_hour(now);
        FetchWindow {
            from,
            to: from + Duration::days(i64::from(days)),
        }
    }

    fn for_kind(kind: ObservationKind, now: DateTime<Utc>, forecast_days: u32) -> Self {
        match kind {
            ObservationKind::Observed => Self::observation(now),
            ObservationKind::Forecast => Self::forecast(now, forecast_days),
        }
    }
}

impl fmt::Display for FetchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {}",
            self.from.format(QUERY_TIME_FORMAT),
            self.to.format(QUERY_TIME_FORMAT)
        )
    }
}

fn start_of_hour(now: DateTime<Utc>) -> DateTime<Utc> {
    now.duration_trunc(Duration::hours(1)).unwrap_or(now)
}

/// Splits station ids into batches of `max(1, n / concurrency)` ids.
pub fn batches(station_ids: &[String], concurrency: usize) -> Vec<Vec<String>> {
    let size = (station_ids.len() / concurrency.max(1)).max(1);
    station_ids.chunks(size).map(<[String]>::to_vec).collect()
}

/// Body of a `/weather` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WeatherResponse {
    #[serde(default)]
    pub weather: Vec<Value>,
    #[serde(default)]
    pub sources: Vec<Value>,
}

fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let text = value?.as_str()?;
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Pairs each weather entry with the source it references through
/// `source_id`. Entries with an unparsable timestamp, or whose source is
/// unknown or has no WMO id, are skipped.
pub fn parse_response(
    response: &WeatherResponse,
    record_source: &str,
    loaded_at: DateTime<Utc>,
) -> Vec<RawWeatherRecord> {
    let sources: HashMap<i64, &Value> = response
        .sources
        .iter()
        .filter_map(|source| Some((source.get("id")?.as_i64()?, source)))
        .collect();

    let mut records = Vec::with_capacity(response.weather.len());
    for entry in &response.weather {
        let Some(timestamp_utc) = parse_timestamp(entry.get("timestamp")) else {
            debug!("Skipping weather entry with bad timestamp: {:?}", entry.get("timestamp"));
            continue;
        };
        let source = entry
            .get("source_id")
            .and_then(Value::as_i64)
            .and_then(|id| sources.get(&id));
        let Some(source) = source else {
            debug!("Skipping weather entry with unknown source: {:?}", entry.get("source_id"));
            continue;
        };
        let Some(wmo_station_id) = source.get("wmo_station_id").and_then(Value::as_str) else {
            continue;
        };
        records.push(RawWeatherRecord {
            wmo_station_id: wmo_station_id.to_string(),
            timestamp_utc,
            raw: entry.to_string(),
            source_mapping: source.to_string(),
            record_source: record_source.to_string(),
            loaded_at,
        });
    }
    records
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeatherReport {
    pub batches: usize,
    pub rows_written: usize,
    /// Batches the API answered with 404, by their station ids.
    pub no_data: Vec<Vec<String>>,
    pub failed_batches: usize,
}

impl fmt::Display for WeatherReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows from {} batches ({} without data, {} failed)",
            self.rows_written,
            self.batches,
            self.no_data.len(),
            self.failed_batches
        )
    }
}

enum BatchOutcome {
    Written(usize),
    NoData(Vec<String>),
    Failed,
}

/// Fetches hourly weather for a set of stations and appends it to the raw
/// weather tables.
#[derive(Debug, Clone)]
pub struct WeatherIngestor {
    downloader: Downloader,
    base_url: String,
    concurrency: usize,
    forecast_days: u32,
}

impl WeatherIngestor {
    pub fn new(downloader: Downloader, base_url: impl Into<String>, concurrency: usize, forecast_days: u32) -> Self {
        Self {
            downloader,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            concurrency: concurrency.max(1),
            forecast_days,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/weather", self.base_url)
    }

    async fn fetch_batch(&self, station_ids: &[String], window: FetchWindow) -> Result<Fetched<WeatherResponse>, IngestError> {
        let mut query: Vec<(&str, String)> = station_ids
            .iter()
            .map(|id| ("wmo_station_id", id.clone()))
            .collect();
        query.push(("date", window.from.format(QUERY_TIME_FORMAT).to_string()));
        query.push(("last_date", window.to.format(QUERY_TIME_FORMAT).to_string()));
        self.downloader.get_json(&self.endpoint(), &query).await
    }

    async fn ingest_batch<S>(
        &self,
        store: Arc<S>,
        kind: ObservationKind,
        station_ids: Vec<String>,
        window: FetchWindow,
    ) -> BatchOutcome
    where
        S: ObservationStore + ?Sized + 'static,
    {
        let response = match self.fetch_batch(&station_ids, window).await {
            Ok(Fetched::Data(response)) => response,
            Ok(Fetched::NotFound { url, message }) => {
                warn!(
                    "No {} data available for stations {:?} at {} ({}: {})",
                    kind, station_ids, window, url, message
                );
                return BatchOutcome::NoData(station_ids);
            }
            Err(e) => {
                error!("Error fetching {} data for stations {:?}: {}", kind, station_ids, e);
                return BatchOutcome::Failed;
            }
        };

        let records = parse_response(&response, kind.record_source(), Utc::now());
        let written = task::spawn_blocking(move || store.append_observations(kind, records)).await;
        match written {
            Ok(Ok(count)) => {
                info!("Inserted {} {} rows for stations {:?}", count, kind, station_ids);
                BatchOutcome::Written(count)
            }
            Ok(Err(e)) => {
                error!("Failed to store {} data for stations {:?}: {}", kind, station_ids, e);
                BatchOutcome::Failed
            }
            Err(e) => {
                error!("Storing {} data for stations {:?} did not complete: {}", kind, station_ids, e);
                BatchOutcome::Failed
            }
        }
    }

    /// Fetches `kind` records for `station_ids` relative to `now`, with at most
    /// `concurrency` requests in flight. Failed batches are logged and
    /// contribute no rows.
    pub async fn ingest<S>(
        &self,
        store: Arc<S>,
        kind: ObservationKind,
        station_ids: &[String],
        now: DateTime<Utc>,
    ) -> WeatherReport
    where
        S: ObservationStore + ?Sized + 'static,
    {
        let window = FetchWindow::for_kind(kind, now, self.forecast_days);
        let batches = batches(station_ids, self.concurrency);
        info!(
            "Ingesting {} data for {} stations from {} in {} batches",
            kind,
            station_ids.len(),
            window,
            batches.len()
        );

        let mut report = WeatherReport {
            batches: batches.len(),
            ..Default::default()
        };
        let outcomes: Vec<BatchOutcome> = stream::iter(batches)
            .map(|batch| self.ingest_batch(store.clone(), kind, batch, window))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        for outcome in outcomes {
            match outcome {
                BatchOutcome::Written(count) => report.rows_written += count,
                BatchOutcome::NoData(ids) => report.no_data.push(ids),
                BatchOutcome::Failed => report.failed_batches += 1,
            }
        }
        info!("Ingested {} data: {}", kind, report);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::test_server::{serve, Reply};
    use chrono::TimeZone;
    use tokio::net::TcpListener;

    const RESPONSE: &str = r#"{
        "weather": [
            {
                "timestamp": "2023-08-07T12:30:00+00:00",
                "source_id": 6007,
                "temperature": 15.5,
                "precipitation": 0.0,
                "wind_speed": 5.2,
                "condition": "partly-cloudy",
                "icon": "partly-cloudy-day"
            },
            {"timestamp": "2023-08-07T13:30:00Z", "source_id": 6007, "temperature": 16.0},
            {"timestamp": "yesterday", "source_id": 6007},
            {"timestamp": "2023-08-07T12:30:00+00:00", "source_id": 42}
        ],
        "sources": [
            {"id": 6007, "wmo_station_id": "10315", "station_name": "Test Station"}
        ]
    }"#;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_observation_window_is_previous_hour() {
        let now = Utc.with_ymd_and_hms(2023, 8, 7, 14, 27, 13).unwrap();
        let window = FetchWindow::observation(now);
        assert_eq!(window.to_string(), "2023-08-07T13:00:00 to 2023-08-07T13:59:00");

        let midnight = Utc.with_ymd_and_hms(2023, 8, 8, 0, 0, 5).unwrap();
        assert_eq!(
            FetchWindow::observation(midnight).to_string(),
            "2023-08-07T23:00:00 to 2023-08-07T23:59:00"
        );
    }

    #[test]
    fn test_forecast_window_starts_this_hour() {
        let now = Utc.with_ymd_and_hms(2023, 8, 7, 14, 27, 13).unwrap();
        assert_eq!(
            FetchWindow::forecast(now, 1).to_string(),
            "2023-08-07T14:00:00 to 2023-08-08T14:00:00"
        );
    }

    #[test]
    fn test_batch_sizes() {
        let stations: Vec<String> = (0..13).map(|i| i.to_string()).collect();
        let split = batches(&stations, 6);
        assert_eq!(split.len(), 7);
        assert!(split[..6].iter().all(|b| b.len() == 2));
        assert_eq!(split[6], ids(&["12"]));

        assert_eq!(batches(&ids(&["a", "b"]), 6).len(), 2);
        assert!(batches(&[], 6).is_empty());
    }

    #[test]
    fn test_parse_response_maps_sources() {
        let response: WeatherResponse = serde_json::from_str(RESPONSE).unwrap();
        let loaded_at = Utc::now();
        let records = parse_response(&response, "test", loaded_at);
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.wmo_station_id, "10315");
        assert_eq!(first.timestamp_utc, Utc.with_ymd_and_hms(2023, 8, 7, 12, 30, 0).unwrap());
        assert_eq!(first.record_source, "test");
        assert_eq!(first.loaded_at, loaded_at);

        let raw: Value = serde_json::from_str(&first.raw).unwrap();
        assert_eq!(raw["temperature"], 15.5);
        let source: Value = serde_json::from_str(&first.source_mapping).unwrap();
        assert_eq!(source["station_name"], "Test Station");

        assert_eq!(records[1].timestamp_utc, Utc.with_ymd_and_hms(2023, 8, 7, 13, 30, 0).unwrap());
    }

    #[test]
    fn test_empty_response() {
        let response: WeatherResponse = serde_json::from_str("{}").unwrap();
        assert!(parse_response(&response, "test", Utc::now()).is_empty());
    }

    #[tokio::test]
    async fn test_ingest_writes_rows_and_reports_missing_data() {
        let base_url = serve(|target| {
            if target.contains("wmo_station_id=10315") {
                Reply::ok(RESPONSE)
            } else {
                Reply::not_found()
            }
        })
        .await;
        let store = Arc::new(MemoryStore::new());
        let ingestor = WeatherIngestor::new(Downloader::new(1), base_url, 2, 1);

        let report = ingestor
            .ingest(store.clone(), ObservationKind::Observed, &ids(&["10315", "10382"]), Utc::now())
            .await;

        assert_eq!(report.batches, 2);
        assert_eq!(report.rows_written, 2);
        assert_eq!(report.no_data, vec![ids(&["10382"])]);
        assert_eq!(report.failed_batches, 0);

        let stored = store.observations(ObservationKind::Observed).unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|r| r.record_source == "brightsky_weather"));
        assert!(store.observations(ObservationKind::Forecast).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_api_fails_batches_without_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let store = Arc::new(MemoryStore::new());
        let ingestor = WeatherIngestor::new(Downloader::new(1), format!("http://{}", addr), 6, 1);
        let report = ingestor
            .ingest(store.clone(), ObservationKind::Forecast, &ids(&["10315"]), Utc::now())
            .await;
        assert_eq!(report.failed_batches, 1);
        assert_eq!(report.rows_written, 0);
        assert!(store.observations(ObservationKind::Forecast).unwrap().is_empty());
    }
}
