//! Outcome reporting for bulk writes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a bulk upsert treats rows that fail validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Write the valid rows and report the invalid ones.
    #[default]
    InsertValid,
    /// Write nothing if any row is invalid.
    AllOrNothing,
}

impl WriteMode {
    /// Whether `failures` found before the store was reached must stop the
    /// whole write.
    pub fn blocks_on(&self, failures: &[RowFailure]) -> bool {
        *self == WriteMode::AllOrNothing && !failures.is_empty()
    }
}

impl FromStr for WriteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "insert_valid" => Ok(WriteMode::InsertValid),
            "all_or_nothing" => Ok(WriteMode::AllOrNothing),
            other => Err(format!("unknown write mode '{}'", other)),
        }
    }
}

/// A single row that was not written, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFailure {
    /// Key of the offending row (postal code, WMO id, or a line number).
    pub key: String,
    pub reason: String,
}

impl RowFailure {
    pub fn new(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RowFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.reason)
    }
}

/// Result of a bulk upsert.
///
/// `skipped` counts rows excluded on purpose (e.g. stations lacking
/// coordinates); `rejected` lists rows that failed validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertReport {
    pub inserted: usize,
    pub skipped: usize,
    pub rejected: Vec<RowFailure>,
}

impl UpsertReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }

    /// Folds failures found before the store was reached into this report.
    pub fn with_rejected(mut self, failures: Vec<RowFailure>) -> Self {
        self.rejected.extend(failures);
        self
    }
}

impl fmt::Display for UpsertReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} inserted, {} skipped, {} rejected",
            self.inserted,
            self.skipped,
            self.rejected.len()
        )
    }
}
