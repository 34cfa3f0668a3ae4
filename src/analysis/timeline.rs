//! Hourly timeline reconciliation.
//!
//! Observations arrive as sparse, per-parameter streams. The reconciler
//! lays down one empty row per whole hour of the ingestion period and then
//! folds each parameter's stream into the row for the point's hour, under
//! that parameter's label. Fields are only ever set or overwritten by a
//! value, never cleared, so merging the same stream twice changes nothing.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use crate::model::{IngestError, ObservationPoint, ObservationRow, ParameterLabel};

/// Dense hourly skeleton for one station, keyed by hour.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    station_id: String,
    rows: BTreeMap<DateTime<Utc>, ObservationRow>,
}

/// What one merge pass did with its stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Points whose value was written into a row.
    pub applied: usize,
    /// Points that carried no value; their field was left as it was.
    pub without_value: usize,
    /// Points for another station or an hour outside the skeleton.
    pub out_of_range: usize,
}

impl MergeStats {
    pub fn total(&self) -> usize {
        self.applied + self.without_value + self.out_of_range
    }
}

/// Fails unless both ends sit exactly on the hour.
pub fn check_hour_aligned(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<(), IngestError> {
    for (name, t) in [("from", from), ("to", to)] {
        if t.timestamp().rem_euclid(3600) != 0 || t.timestamp_subsec_nanos() != 0 {
            return Err(IngestError::InvalidRange(format!("{} ({}) is not hour-aligned", name, t)));
        }
    }
    Ok(())
}

/// One empty row per hour in `[from, to]`. `to < from` gives an empty timeline.
pub fn build_skeleton(station_id: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Timeline, IngestError> {
    check_hour_aligned(from, to)?;

    let mut rows = BTreeMap::new();
    let mut hour = from;
    while hour <= to {
        rows.insert(hour, ObservationRow::empty(station_id, hour));
        hour += Duration::hours(1);
    }

    Ok(Timeline {
        station_id: station_id.to_string(),
        rows,
    })
}

impl Timeline {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, hour: DateTime<Utc>) -> Option<&ObservationRow> {
        self.rows.get(&hour)
    }

    /// Rows in ascending hour order.
    pub fn rows(&self) -> impl Iterator<Item = &ObservationRow> {
        self.rows.values()
    }

    /// Hands the rows over to persistence, ascending by hour.
    pub fn into_rows(self) -> Vec<ObservationRow> {
        self.rows.into_values().collect()
    }

    /// Number of rows where `label` is set.
    pub fn filled(&self, label: ParameterLabel) -> usize {
        self.rows.values().filter(|row| row.get(label).is_some()).count()
    }

    /// Folds a stream of points into `label`'s field. Later points for the
    /// same hour overwrite earlier ones.
    ///
    /// The first error in the stream aborts the merge; values merged before
    /// it stay in place.
    pub fn merge<I>(&mut self, label: ParameterLabel, points: I) -> Result<MergeStats, IngestError>
    where
        I: IntoIterator<Item = Result<ObservationPoint, IngestError>>,
    {
        let mut stats = MergeStats::default();

        for point in points {
            let point = point?;
            if point.station_id != self.station_id {
                stats.out_of_range += 1;
                continue;
            }
            let Some(row) = self.rows.get_mut(&point.observed_at) else {
                stats.out_of_range += 1;
                continue;
            };
            match point.value {
                Some(value) => {
                    row.set(label, value);
                    stats.applied += 1;
                }
                None => stats.without_value += 1,
            }
        }

        Ok(stats)
    }
}
