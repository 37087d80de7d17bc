//! Scope filters selecting the stations an ingestion run works on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which stations an ingestion run covers.
///
/// The variants are mutually exclusive by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    /// Stations linked to any postal code starting with the prefix.
    ByPrefix(String),
    /// Stations whose country matches the given name.
    ByCountry(String),
    /// Every known station.
    All,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::ByPrefix(prefix) => write!(f, "postal code prefix '{}'", prefix),
            Scope::ByCountry(country) => write!(f, "country '{}'", country),
            Scope::All => write!(f, "all stations"),
        }
    }
}

/// How a [`Scope::ByCountry`] filter compares against `Station::country`.
///
/// Both modes ignore case. `Contains` is the lenient default, so "Germany" also
/// matches "West Germany".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountryMatch {
    #[default]
    Contains,
    Exact,
}

impl CountryMatch {
    pub fn matches(&self, country: &str, filter: &str) -> bool {
        let country = country.to_lowercase();
        let filter = filter.to_lowercase();
        match self {
            CountryMatch::Contains => country.contains(&filter),
            CountryMatch::Exact => country.trim() == filter.trim(),
        }
    }
}

impl FromStr for CountryMatch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "contains" => Ok(CountryMatch::Contains),
            "exact" => Ok(CountryMatch::Exact),
            other => Err(format!("unknown country match mode '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_is_case_insensitive_substring() {
        let mode = CountryMatch::Contains;
        assert!(mode.matches("Germany", "germany"));
        assert!(mode.matches("West Germany", "Germany"));
        assert!(!mode.matches("Austria", "Germany"));
    }

    #[test]
    fn test_exact_rejects_substrings() {
        let mode = CountryMatch::Exact;
        assert!(mode.matches("GERMANY", "Germany"));
        assert!(!mode.matches("West Germany", "Germany"));
    }

    #[test]
    fn test_parse_country_match() {
        assert_eq!("Exact".parse::<CountryMatch>(), Ok(CountryMatch::Exact));
        assert_eq!(" contains ".parse::<CountryMatch>(), Ok(CountryMatch::Contains));
        assert!("fuzzy".parse::<CountryMatch>().is_err());
    }
}
