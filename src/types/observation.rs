use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a raw weather record is a past observation or a forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObservationKind {
    Observed,
    Forecast,
}

impl ObservationKind {
    /// Name of the raw table holding this kind of record.
    pub fn table_name(&self) -> &'static str {
        match self {
            ObservationKind::Observed => "weather_hourly_observed_raw",
            ObservationKind::Forecast => "weather_hourly_forecast_raw",
        }
    }

    pub fn record_source(&self) -> &'static str {
        match self {
            ObservationKind::Observed => "brightsky_weather",
            ObservationKind::Forecast => "brightsky_forecast",
        }
    }
}

impl fmt::Display for ObservationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservationKind::Observed => write!(f, "observed"),
            ObservationKind::Forecast => write!(f, "forecast"),
        }
    }
}

/// One hourly weather entry as returned by the weather API.
///
/// `raw` and `source_mapping` hold the untouched JSON text of the weather entry
/// and of the source it references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawWeatherRecord {
    pub wmo_station_id: String,
    pub timestamp_utc: DateTime<Utc>,
    pub raw: String,
    pub source_mapping: String,
    pub record_source: String,
    pub loaded_at: DateTime<Utc>,
}
