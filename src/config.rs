//! Runtime configuration, read from the environment (with `.env` support) or
//! from a TOML file using the same key names.

use crate::linking::metric::DistanceMetric;
use crate::store::report::WriteMode;
use crate::types::scope::{CountryMatch, Scope};
use crate::utils::default_data_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_BRIGHTSKY_BASE: &str = "https://api.brightsky.dev";
pub const DEFAULT_POSTAL_TOPO_URL: &str =
    "https://github.com/yetzt/postleitzahlen/releases/download/2024.12/postleitzahlen.topojson.br";
pub const DEFAULT_WMO_STATIONS_URL: &str =
    "https://opendata.dwd.de/climate_environment/CDC/help/stations_list_CLIMAT_data.txt";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Failed to read config file '{0}'")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse config file")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to determine data directory, set DATA_DIR")]
    DataDirResolution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Config {
    /// Root of the file store. Defaults to the platform's local data directory.
    pub data_dir: Option<PathBuf>,
    pub brightsky_base: String,
    pub default_country: Option<String>,
    pub default_plz3_prefix: Option<String>,
    /// `None` enables the prefix scope whenever a prefix is configured.
    pub default_is_scope_plz3: Option<bool>,
    pub country_match: CountryMatch,
    pub http_concurrency: usize,
    /// Attempts per HTTP request, including the first one.
    pub max_retries: u32,
    pub postal_topo_url: String,
    pub wmo_stations_url: String,
    pub forecast_days_by: u32,
    pub write_mode: WriteMode,
    pub distance_metric: DistanceMetric,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: None,
            brightsky_base: DEFAULT_BRIGHTSKY_BASE.to_string(),
            default_country: Some("Germany".to_string()),
            default_plz3_prefix: Some("10".to_string()),
            default_is_scope_plz3: None,
            country_match: CountryMatch::default(),
            http_concurrency: 6,
            max_retries: 5,
            postal_topo_url: DEFAULT_POSTAL_TOPO_URL.to_string(),
            wmo_stations_url: DEFAULT_WMO_STATIONS_URL.to_string(),
            forecast_days_by: 1,
            write_mode: WriteMode::default(),
            distance_metric: DistanceMetric::default(),
            log_level: "info".to_string(),
        }
    }
}

fn parse<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    value.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from a key lookup. Unset or blank keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Config::default();

        if let Some(v) = get("DATA_DIR") {
            config.data_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("BRIGHTSKY_BASE") {
            config.brightsky_base = v.trim().to_string();
        }
        if let Some(v) = get("DEFAULT_COUNTRY") {
            config.default_country = Some(v.trim().to_string());
        }
        if let Some(v) = get("DEFAULT_PLZ3_PREFIX") {
            config.default_plz3_prefix = Some(v.trim().to_string());
        }
        if let Some(v) = get("DEFAULT_IS_SCOPE_PLZ3") {
            config.default_is_scope_plz3 = Some(parse_bool("DEFAULT_IS_SCOPE_PLZ3", &v)?);
        }
        if let Some(v) = get("COUNTRY_MATCH") {
            config.country_match = parse("COUNTRY_MATCH", &v)?;
        }
        if let Some(v) = get("HTTP_CONCURRENCY") {
            config.http_concurrency = parse("HTTP_CONCURRENCY", &v)?;
        }
        if let Some(v) = get("MAX_RETRIES") {
            config.max_retries = parse("MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("POSTAL_TOPO_URL") {
            config.postal_topo_url = v.trim().to_string();
        }
        if let Some(v) = get("WMO_STATIONS_URL") {
            config.wmo_stations_url = v.trim().to_string();
        }
        if let Some(v) = get("FORECAST_DAYS_BY") {
            config.forecast_days_by = parse("FORECAST_DAYS_BY", &v)?;
        }
        if let Some(v) = get("WRITE_MODE") {
            config.write_mode = parse("WRITE_MODE", &v)?;
        }
        if let Some(v) = get("DISTANCE_METRIC") {
            config.distance_metric = parse("DISTANCE_METRIC", &v)?;
        }
        if let Some(v) = get("LOG_LEVEL") {
            config.log_level = v.trim().to_lowercase();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.http_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "HTTP_CONCURRENCY",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAX_RETRIES",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// The configured data directory, or the platform default.
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_data_dir().ok_or(ConfigError::DataDirResolution),
        }
    }

    /// The prefix filter applied to the postal feed, if any.
    pub fn postal_prefix(&self) -> Option<&str> {
        self.default_plz3_prefix
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    /// The station scope of an hourly run. A prefix scope takes precedence
    /// over a country scope, which takes precedence over all stations.
    pub fn scope(&self) -> Scope {
        if let Some(prefix) = self.postal_prefix() {
            if self.default_is_scope_plz3 != Some(false) {
                return Scope::ByPrefix(prefix.to_string());
            }
        }
        match self.default_country.as_deref().map(str::trim) {
            Some(country) if !country.is_empty() => Scope::ByCountry(country.to_string()),
            _ => Scope::All,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.brightsky_base, "https://api.brightsky.dev");
        assert_eq!(config.http_concurrency, 6);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.forecast_days_by, 1);
        assert_eq!(config.scope(), Scope::ByPrefix("10".to_string()));
    }

    #[test]
    fn test_env_overrides() {
        let config = from_pairs(&[
            ("DATA_DIR", "/tmp/station-link"),
            ("HTTP_CONCURRENCY", "3"),
            ("WRITE_MODE", "all_or_nothing"),
            ("DISTANCE_METRIC", "haversine"),
            ("COUNTRY_MATCH", "exact"),
            ("LOG_LEVEL", "DEBUG"),
            ("FORECAST_DAYS_BY", " 2 "),
        ])
        .unwrap();
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/tmp/station-link"));
        assert_eq!(config.http_concurrency, 3);
        assert_eq!(config.write_mode, WriteMode::AllOrNothing);
        assert_eq!(config.distance_metric, DistanceMetric::Haversine);
        assert_eq!(config.country_match, CountryMatch::Exact);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.forecast_days_by, 2);
    }

    #[test]
    fn test_invalid_values_are_errors() {
        assert!(matches!(
            from_pairs(&[("HTTP_CONCURRENCY", "many")]),
            Err(ConfigError::InvalidValue { key: "HTTP_CONCURRENCY", .. })
        ));
        assert!(matches!(
            from_pairs(&[("HTTP_CONCURRENCY", "0")]),
            Err(ConfigError::InvalidValue { key: "HTTP_CONCURRENCY", .. })
        ));
        assert!(matches!(
            from_pairs(&[("DISTANCE_METRIC", "manhattan")]),
            Err(ConfigError::InvalidValue { key: "DISTANCE_METRIC", .. })
        ));
        assert!(matches!(
            from_pairs(&[("DEFAULT_IS_SCOPE_PLZ3", "maybe")]),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_scope_precedence() {
        let country = from_pairs(&[("DEFAULT_IS_SCOPE_PLZ3", "false")]).unwrap();
        assert_eq!(country.scope(), Scope::ByCountry("Germany".to_string()));

        let mut all = Config::default();
        all.default_plz3_prefix = None;
        all.default_country = Some("  ".to_string());
        assert_eq!(all.scope(), Scope::All);

        let mut explicit = Config::default();
        explicit.default_is_scope_plz3 = Some(true);
        explicit.default_plz3_prefix = Some("80".to_string());
        assert_eq!(explicit.scope(), Scope::ByPrefix("80".to_string()));
    }

    #[test]
    fn test_toml() {
        let config = Config::from_toml_str(
            r#"
            DATA_DIR = "/var/lib/station-link"
            DEFAULT_PLZ3_PREFIX = "20"
            WRITE_MODE = "all_or_nothing"
            DISTANCE_METRIC = "haversine"
            HTTP_CONCURRENCY = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.scope(), Scope::ByPrefix("20".to_string()));
        assert_eq!(config.write_mode, WriteMode::AllOrNothing);
        assert_eq!(config.http_concurrency, 2);
        assert_eq!(config.max_retries, 5);

        assert!(matches!(
            Config::from_toml_str("HTTP_CONCURRENCY = \"six\""),
            Err(ConfigError::Toml(_))
        ));
    }
}
