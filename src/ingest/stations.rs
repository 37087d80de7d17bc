//! WMO station list published by DWD (`stations_list_CLIMAT_data.txt`).
//!
//! The file is `;`-separated with a header line:
//! `WMO-StationID;StationName;Latitude;Longitude;Height;Country`.

use crate::ingest::download::{Compression, Downloader};
use crate::ingest::error::IngestError;
use crate::store::report::{RowFailure, UpsertReport, WriteMode};
use crate::store::GeometryStore;
use crate::types::station::StationRecord;
use csv::{ByteRecord, ReaderBuilder, Trim};
use log::{info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task;

pub const RECORD_SOURCE: &str = "wmo_dwd";

const COL_WMO_ID: &str = "WMO-StationID";
const COL_NAME: &str = "StationName";
const COL_LATITUDE: &str = "Latitude";
const COL_LONGITUDE: &str = "Longitude";
const COL_HEIGHT: &str = "Height";
const COL_COUNTRY: &str = "Country";

/// Station rows read from the list, plus the lines that could not be parsed.
#[derive(Debug, Default)]
pub struct ParsedStations {
    pub records: Vec<StationRecord>,
    pub malformed: Vec<RowFailure>,
}

struct Columns {
    wmo_id: usize,
    name: usize,
    latitude: usize,
    longitude: usize,
    height: usize,
    country: usize,
    headers: Vec<String>,
}

impl Columns {
    fn from_headers(headers: &ByteRecord) -> Result<Self, IngestError> {
        let headers: Vec<String> = headers
            .iter()
            .map(|h| String::from_utf8_lossy(h).trim().to_string())
            .collect();
        let find = |name: &'static str| {
            headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name))
                .ok_or(IngestError::MissingColumn(name))
        };
        Ok(Columns {
            wmo_id: find(COL_WMO_ID)?,
            name: find(COL_NAME)?,
            latitude: find(COL_LATITUDE)?,
            longitude: find(COL_LONGITUDE)?,
            height: find(COL_HEIGHT)?,
            country: find(COL_COUNTRY)?,
            headers,
        })
    }
}

fn optional_f64(value: &str) -> Result<Option<f64>, String> {
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse::<f64>()
        .map(Some)
        .map_err(|e| format!("'{}' is not a number: {}", value, e))
}

fn parse_row(columns: &Columns, row: &ByteRecord) -> Result<StationRecord, String> {
    let fields: Vec<String> = row
        .iter()
        .map(|f| String::from_utf8_lossy(f).trim().to_string())
        .collect();
    if fields.len() < columns.headers.len() {
        return Err(format!(
            "expected {} fields, found {}",
            columns.headers.len(),
            fields.len()
        ));
    }

    let latitude = optional_f64(&fields[columns.latitude])?;
    let longitude = optional_f64(&fields[columns.longitude])?;
    let height = optional_f64(&fields[columns.height])?;

    let mut properties: BTreeMap<String, String> = columns
        .headers
        .iter()
        .cloned()
        .zip(fields.iter().cloned())
        .collect();
    if let Some(height) = height {
        properties.insert("height".to_string(), height.to_string());
    }

    let non_empty = |i: usize| Some(fields[i].clone()).filter(|v| !v.is_empty());
    Ok(StationRecord {
        wmo_station_id: non_empty(columns.wmo_id),
        name: non_empty(columns.name),
        latitude,
        longitude,
        country: non_empty(columns.country),
        properties,
        record_source: RECORD_SOURCE.to_string(),
    })
}

/// Parses the station list. Blank lines are ignored; lines with missing
/// fields or unparsable numbers are logged and reported as malformed. Rows
/// without coordinates are kept and left for the store to skip.
pub fn parse_station_list(bytes: &[u8]) -> Result<ParsedStations, IngestError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(bytes);
    let columns = Columns::from_headers(reader.byte_headers()?)?;

    let mut parsed = ParsedStations::default();
    let mut row = ByteRecord::new();
    while reader.read_byte_record(&mut row)? {
        let line = row.position().map(|p| p.line()).unwrap_or_default();
        if row.iter().all(|f| f.iter().all(u8::is_ascii_whitespace)) {
            continue;
        }
        match parse_row(&columns, &row) {
            Ok(record) => parsed.records.push(record),
            Err(reason) => {
                warn!("Failed to parse station line {}: {}", line, reason);
                parsed.malformed.push(RowFailure::new(format!("line {}", line), reason));
            }
        }
    }
    info!(
        "Parsed {} WMO stations ({} malformed lines)",
        parsed.records.len(),
        parsed.malformed.len()
    );
    Ok(parsed)
}

/// Downloads the station list and upserts it into the station dimension.
pub struct StationIngestor {
    downloader: Downloader,
    url: String,
}

impl StationIngestor {
    pub fn new(downloader: Downloader, url: impl Into<String>) -> Self {
        Self {
            downloader,
            url: url.into(),
        }
    }

    pub async fn ingest<S>(&self, store: Arc<S>, mode: WriteMode) -> Result<UpsertReport, IngestError>
    where
        S: GeometryStore + ?Sized + 'static,
    {
        info!("Ingesting WMO stations from {}", self.url);
        let bytes = self.downloader.download(&self.url, Compression::None).await?;

        let report = task::spawn_blocking(move || {
            let parsed = parse_station_list(&bytes)?;
            if mode.blocks_on(&parsed.malformed) {
                warn!(
                    "{} malformed station lines, writing no stations ({:?})",
                    parsed.malformed.len(),
                    mode
                );
                return Ok(UpsertReport::default().with_rejected(parsed.malformed));
            }
            store
                .upsert_stations(parsed.records, mode)
                .map(|report| report.with_rejected(parsed.malformed))
                .map_err(|e| IngestError::Store("stations", e))
        })
        .await??;

        for failure in &report.rejected {
            warn!("Station row not written: {}", failure);
        }
        info!("Upserted stations: {}", report);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::test_server::{serve, Reply};

    const STATION_LIST: &str = "\
WMO-StationID;StationName;Latitude;Longitude;Height;Country
10382;Berlin-Tegel;52.5644;13.3088;36;Germany

10384;Berlin-Tempelhof;52.4675;13.4021;48;Germany
10385;Berlin-Schoenefeld;;13.5300;47;Germany
10389;Berlin-Alexanderplatz;north;13.41;37;Germany
10400;Duesseldorf;51.2960
11035;Wien/Hohe Warte;48.2486;16.3564;;Austria
";

    #[test]
    fn test_parse_station_list() {
        let parsed = parse_station_list(STATION_LIST.as_bytes()).unwrap();
        let ids: Vec<_> = parsed
            .records
            .iter()
            .map(|r| r.wmo_station_id.as_deref().unwrap())
            .collect();
        assert_eq!(ids, vec!["10382", "10384", "10385", "11035"]);

        let tegel = &parsed.records[0];
        assert_eq!(tegel.name.as_deref(), Some("Berlin-Tegel"));
        assert_eq!(tegel.latitude, Some(52.5644));
        assert_eq!(tegel.longitude, Some(13.3088));
        assert_eq!(tegel.country.as_deref(), Some("Germany"));
        assert_eq!(tegel.properties.get("height").map(String::as_str), Some("36"));
        assert_eq!(tegel.record_source, RECORD_SOURCE);

        // Missing latitude is kept for the store to skip.
        assert_eq!(parsed.records[2].latitude, None);
        // Missing height is allowed.
        assert!(!parsed.records[3].properties.contains_key("height"));

        assert_eq!(parsed.malformed.len(), 2);
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let result = parse_station_list(b"WMO-StationID;StationName;Latitude\n1;A;2\n");
        assert!(matches!(result, Err(IngestError::MissingColumn("Longitude"))));
    }

    #[test]
    fn test_non_utf8_names_are_kept() {
        let mut bytes = b"WMO-StationID;StationName;Latitude;Longitude;Height;Country\n10147;Hamburg-Fuhlsb".to_vec();
        bytes.push(0xFC); // latin-1 u-umlaut
        bytes.extend_from_slice(b"ttel;53.6332;9.9881;11;Germany\n");
        let parsed = parse_station_list(&bytes).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert!(parsed.records[0].name.as_deref().unwrap().starts_with("Hamburg-Fuhlsb"));
    }

    #[test]
    fn test_parsed_rows_reach_the_store() {
        let store = MemoryStore::new();
        let parsed = parse_station_list(STATION_LIST.as_bytes()).unwrap();
        let report = store
            .upsert_stations(parsed.records, WriteMode::InsertValid)
            .unwrap()
            .with_rejected(parsed.malformed);
        assert_eq!(report.inserted, 3);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.rejected.len(), 2);
    }

    #[tokio::test]
    async fn test_ingest_downloads_and_upserts() {
        let base_url = serve(|_| Reply::ok(STATION_LIST)).await;
        let store = Arc::new(MemoryStore::new());
        let ingestor = StationIngestor::new(Downloader::new(1), format!("{}/stations_list_CLIMAT_data.txt", base_url));

        let report = ingestor.ingest(store.clone(), WriteMode::InsertValid).await.unwrap();
        assert_eq!(report.inserted, 3);
        assert_eq!(report.rejected.len(), 2);

        // Re-ingesting keeps the internal ids.
        let before = store.stations().unwrap();
        ingestor.ingest(store.clone(), WriteMode::InsertValid).await.unwrap();
        let after = store.stations().unwrap();
        let ids = |stations: &[crate::types::station::Station]| {
            stations.iter().map(|s| (s.wmo_station_id.clone(), s.id)).collect::<Vec<_>>()
        };
        assert_eq!(ids(&before), ids(&after));
    }

    #[tokio::test]
    async fn test_ingest_fails_on_http_error() {
        let base_url = serve(|_| Reply::not_found()).await;
        let ingestor = StationIngestor::new(Downloader::new(1), base_url);
        let result = ingestor
            .ingest(Arc::new(MemoryStore::new()), WriteMode::InsertValid)
            .await;
        assert!(matches!(result, Err(IngestError::HttpStatus { .. })));
    }

    #[tokio::test]
    async fn test_all_or_nothing_writes_nothing_on_malformed_line() {
        let list = "\
WMO-StationID;StationName;Latitude;Longitude;Height;Country
10382;Berlin-Tegel;52.5644;13.3088;36;Germany
10389;Bad;north;13.41;37;Germany
";
        let base_url = serve(move |_| Reply::ok(list)).await;
        let store = Arc::new(MemoryStore::new());
        let ingestor = StationIngestor::new(Downloader::new(1), format!("{}/stations_list_CLIMAT_data.txt", base_url));

        let report = ingestor.ingest(store.clone(), WriteMode::AllOrNothing).await.unwrap();
        assert_eq!(report.inserted, 0);
        assert_eq!(report.rejected.len(), 1);
        assert!(store.stations().unwrap().is_empty());

        let report = ingestor.ingest(store.clone(), WriteMode::InsertValid).await.unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.rejected.len(), 1);
    }
}
