//! Versioned persistence record for experiments
//!
//! The base fields are an explicit struct; anything a body wants to keep
//! goes under the `extension` key, so the base part can never be forgotten.

use crate::error::{Error, Result};
use crate::experiment::params::ParameterMap;
use crate::experiment::status::Status;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Keys that must be present in every persisted record
const REQUIRED_KEYS: [&str; 11] = [
    "version",
    "id",
    "status",
    "start",
    "prereq",
    "end",
    "progression",
    "timeout",
    "time_ratio",
    "input",
    "output",
];

const fn default_time_ratio() -> f32 {
    1.0
}

/// Saved state of one experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentState {
    /// Format version
    pub version: u32,
    /// Experiment ID
    pub id: u64,
    /// Status at save time
    pub status: Status,
    /// Start of the last run
    pub start: Option<DateTime<Utc>>,
    /// Prerequisites fulfilment of the last run
    #[serde(rename = "prereq")]
    pub prerequisites: Option<DateTime<Utc>>,
    /// End of the last run
    pub end: Option<DateTime<Utc>>,
    /// Reported progression
    pub progression: f32,
    /// Timeout in milliseconds, 0 for unlimited
    #[serde(rename = "timeout")]
    pub timeout_ms: u64,
    /// Relative expected cost
    #[serde(default = "default_time_ratio")]
    pub time_ratio: f32,
    /// Failure message, if any
    #[serde(default)]
    pub error: Option<String>,
    /// Input parameters
    pub input: ParameterMap,
    /// Output parameters
    pub output: ParameterMap,
    /// Body-specific keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<serde_json::Value>,
}

impl ExperimentState {
    /// Current format version
    pub const VERSION: u32 = 1;

    /// Encode as a JSON object.
    ///
    /// # Errors
    ///
    /// [`Error::Persistence`] if a float is NaN or infinite, since JSON has
    /// no encoding for it; [`Error::Json`] if serialization fails otherwise.
    pub fn to_record(&self) -> Result<serde_json::Value> {
        self.check_finite()?;
        Ok(serde_json::to_value(self)?)
    }

    fn check_finite(&self) -> Result<()> {
        let non_finite =
            |field: &str| Err(Error::Persistence(format!("'{field}' is not a finite number")));
        if !self.progression.is_finite() {
            return non_finite("progression");
        }
        if !self.time_ratio.is_finite() {
            return non_finite("time_ratio");
        }
        for (section, map) in [("input", &self.input), ("output", &self.output)] {
            if let Some((key, _)) = map.iter().find(|(_, value)| !value.is_finite()) {
                return non_finite(&format!("{section}.{key}"));
            }
        }
        Ok(())
    }

    /// Decode a JSON object produced by [`to_record`](Self::to_record).
    ///
    /// # Errors
    ///
    /// [`Error::Persistence`] if the record is not an object, lacks a key or
    /// has a value of the wrong shape; [`Error::UnsupportedVersion`] if it
    /// was written by a newer format.
    pub fn from_record(record: &serde_json::Value) -> Result<Self> {
        let map = record
            .as_object()
            .ok_or_else(|| Error::Persistence("expected an object".to_string()))?;
        if let Some(missing) = REQUIRED_KEYS.iter().find(|k| !map.contains_key(**k)) {
            return Err(Error::Persistence(format!("missing key '{missing}'")));
        }

        let version = map
            .get("version")
            .and_then(serde_json::Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| Error::Persistence("'version' is not a version number".to_string()))?;
        if version > Self::VERSION {
            return Err(Error::UnsupportedVersion {
                found: version,
                supported: Self::VERSION,
            });
        }

        Self::deserialize(record).map_err(|e| Error::Persistence(e.to_string()))
    }
}
