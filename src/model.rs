//! Core data types for the metObs ingestion service.
//!
//! This module defines the shared domain model imported by all other modules:
//! station descriptors, the fixed set of semantic parameter labels, the
//! transient observation point and the hourly observation row, plus the
//! error type every fallible operation returns.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Parameter labels
// ---------------------------------------------------------------------------

/// A semantic measurement label. Each label owns exactly one nullable
/// column in the observation table and one slot in `ObservationRow`.
///
/// Adding a label means adding a variant here and an entry in `ALL`;
/// column lists, SQL and row accessors are all derived from that table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParameterLabel {
    Rain,
    RainMinutes,
    AverageTemperature,
    MaximumTemperature,
    MinimumTemperature,
    WindSpeed,
    MaximumWindSpeed,
    WindDir,
    SunMinutes,
    Cloud,
    Humidity,
    Pressure,
}

/// Number of label slots carried by every `ObservationRow`.
pub const LABEL_COUNT: usize = 12;

impl ParameterLabel {
    /// Every label, in column order.
    pub const ALL: [ParameterLabel; LABEL_COUNT] = [
        ParameterLabel::Rain,
        ParameterLabel::RainMinutes,
        ParameterLabel::AverageTemperature,
        ParameterLabel::MaximumTemperature,
        ParameterLabel::MinimumTemperature,
        ParameterLabel::WindSpeed,
        ParameterLabel::MaximumWindSpeed,
        ParameterLabel::WindDir,
        ParameterLabel::SunMinutes,
        ParameterLabel::Cloud,
        ParameterLabel::Humidity,
        ParameterLabel::Pressure,
    ];

    /// Label name as used in configuration and as the database column name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterLabel::Rain => "rain",
            ParameterLabel::RainMinutes => "rain_minutes",
            ParameterLabel::AverageTemperature => "average_temperature",
            ParameterLabel::MaximumTemperature => "maximum_temperature",
            ParameterLabel::MinimumTemperature => "minimum_temperature",
            ParameterLabel::WindSpeed => "wind_speed",
            ParameterLabel::MaximumWindSpeed => "maximum_wind_speed",
            ParameterLabel::WindDir => "wind_dir",
            ParameterLabel::SunMinutes => "sun_minutes",
            ParameterLabel::Cloud => "cloud",
            ParameterLabel::Humidity => "humidity",
            ParameterLabel::Pressure => "pressure",
        }
    }

    /// Position of this label's slot in `ObservationRow::values`.
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for ParameterLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParameterLabel {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParameterLabel::ALL
            .iter()
            .copied()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| IngestError::Config(format!("unknown parameter label '{}'", s)))
    }
}

// ---------------------------------------------------------------------------
// Station types
// ---------------------------------------------------------------------------

/// One station from the remote catalog, already filtered to the region.
#[derive(Debug, Clone, PartialEq)]
pub struct StationDescriptor {
    pub station_id: String,
    pub name: String,
    pub longitude: f64,
    pub latitude: f64,
}

/// Inclusive WGS84 bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }
}

// ---------------------------------------------------------------------------
// Observation types
// ---------------------------------------------------------------------------

/// A single observation as produced by the fetcher.
///
/// `observed_at` is already floored to the start of its UTC hour. A missing
/// or non-numeric value on the wire arrives here as `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationPoint {
    pub station_id: String,
    pub observed_at: DateTime<Utc>,
    pub parameter_id: String,
    pub value: Option<f64>,
}

/// One hourly record for a station, with one optional slot per label.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRow {
    pub station_id: String,
    pub observation_time: DateTime<Utc>,
    pub values: [Option<f64>; LABEL_COUNT],
}

impl ObservationRow {
    /// An empty row: every label unset.
    pub fn empty(station_id: &str, observation_time: DateTime<Utc>) -> Self {
        Self {
            station_id: station_id.to_string(),
            observation_time,
            values: [None; LABEL_COUNT],
        }
    }

    pub fn get(&self, label: ParameterLabel) -> Option<f64> {
        self.values[label.index()]
    }

    pub fn set(&mut self, label: ParameterLabel, value: f64) {
        self.values[label.index()] = Some(value);
    }

    /// True when no label has been filled in.
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise while listing, fetching, reconciling or storing
/// observation data.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The request never produced a response (connect, timeout, body read).
    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    /// Non-2xx HTTP response from the metObs API.
    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// The body parsed, but expected fields or links were missing or invalid.
    #[error("Malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    /// A date range that is not hour-aligned.
    #[error("Invalid date range: {0}")]
    InvalidRange(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A batch write failed. Batches before `offset` are committed.
    #[error("Store unavailable while writing batch at offset {offset}")]
    StoreUnavailable {
        offset: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Database error: {0}")]
    Database(#[from] postgres::Error),
}

impl IngestError {
    pub fn malformed(url: &str, reason: impl Into<String>) -> Self {
        IngestError::MalformedResponse {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_label_indices_match_column_order() {
        for (i, label) in ParameterLabel::ALL.iter().enumerate() {
            assert_eq!(label.index(), i, "label '{}' is out of order", label);
        }
    }

    #[test]
    fn test_label_names_round_trip_through_from_str() {
        for label in ParameterLabel::ALL {
            let parsed: ParameterLabel = label.as_str().parse().expect("known label should parse");
            assert_eq!(parsed, label);
        }
    }

    #[test]
    fn test_unknown_label_is_config_error() {
        let err = "snow_depth".parse::<ParameterLabel>().unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn test_bbox_bounds_are_inclusive() {
        let bbox = BoundingBox { min_lon: 7.0, min_lat: 54.0, max_lon: 16.5, max_lat: 58.0 };
        assert!(bbox.contains(7.0, 54.0));
        assert!(bbox.contains(16.5, 58.0));
        assert!(!bbox.contains(6.99, 55.0));
        assert!(!bbox.contains(10.0, 58.01));
    }

    #[test]
    fn test_row_set_and_get_use_label_slots() {
        let hour = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut row = ObservationRow::empty("06074", hour);
        assert!(row.is_empty());

        row.set(ParameterLabel::Humidity, 91.0);
        assert_eq!(row.get(ParameterLabel::Humidity), Some(91.0));
        assert_eq!(row.get(ParameterLabel::Rain), None);
        assert!(!row.is_empty());
    }
}
