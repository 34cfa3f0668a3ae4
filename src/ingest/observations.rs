//! Paginated observation fetcher.
//!
//! `ObservationPages` is a pull-based iterator: each advance that empties
//! the current page triggers at most one request for the next page, so
//! there is never more than one request outstanding and pages are consumed
//! strictly in provider order. A page is parsed in full before any of its
//! points is yielded; a malformed page yields an error and no points.
//!
//! The iterator is finite and not restartable. After an error it is
//! exhausted; a retry must build a new one from the first page.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::{HashSet, VecDeque};

use crate::config::ApiConfig;
use crate::ingest::metobs::{self, HttpFetch, ObservationProperties};
use crate::model::{IngestError, ObservationPoint};

/// Lazily fetched observations for one parameter.
pub struct ObservationPages<'a, F: HttpFetch + ?Sized> {
    api: &'a F,
    parameter_id: String,
    allowed_station_ids: HashSet<String>,
    next_url: Option<String>,
    buffer: VecDeque<ObservationPoint>,
    pages_fetched: usize,
    points_skipped: usize,
}

/// Starts fetching `parameter_id` over `[from, to]` for the allowed stations.
///
/// No request is made until the first call to `next`.
pub fn fetch_observations<'a, F: HttpFetch + ?Sized>(
    api: &'a F,
    config: &ApiConfig,
    parameter_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    allowed_station_ids: &HashSet<String>,
) -> Result<ObservationPages<'a, F>, IngestError> {
    let single_station = if allowed_station_ids.len() == 1 {
        allowed_station_ids.iter().next().map(String::as_str)
    } else {
        None
    };
    let first_url = metobs::build_observation_url(config, parameter_id, from, to, single_station)?;
    Ok(ObservationPages::new(api, first_url, parameter_id, allowed_station_ids.clone()))
}

impl<'a, F: HttpFetch + ?Sized> ObservationPages<'a, F> {
    pub fn new(
        api: &'a F,
        first_url: String,
        parameter_id: &str,
        allowed_station_ids: HashSet<String>,
    ) -> Self {
        Self {
            api,
            parameter_id: parameter_id.to_string(),
            allowed_station_ids,
            next_url: Some(first_url),
            buffer: VecDeque::new(),
            pages_fetched: 0,
            points_skipped: 0,
        }
    }

    /// Pages requested so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Points dropped because their station was not allowed.
    pub fn points_skipped(&self) -> usize {
        self.points_skipped
    }

    fn fetch_page(&mut self, url: &str) -> Result<Option<String>, IngestError> {
        self.pages_fetched += 1;
        let page = metobs::fetch_collection::<F, ObservationProperties>(self.api, url)?;
        let next = metobs::next_link(&page.links, url)?;

        let mut points = Vec::with_capacity(page.features.len());
        for feature in page.features {
            let props = feature.properties;
            if !self.allowed_station_ids.contains(&props.station_id) {
                self.points_skipped += 1;
                continue;
            }
            let observed_at = parse_observed(&props.observed).ok_or_else(|| {
                IngestError::malformed(
                    &metobs::redact_api_key(url),
                    format!("unparseable observed timestamp '{}'", props.observed),
                )
            })?;
            points.push(ObservationPoint {
                station_id: props.station_id,
                observed_at: floor_to_hour(observed_at),
                parameter_id: self.parameter_id.clone(),
                value: metobs::parse_value(props.value.as_ref()),
            });
        }

        self.buffer.extend(points);
        Ok(next)
    }
}

impl<F: HttpFetch + ?Sized> Iterator for ObservationPages<'_, F> {
    type Item = Result<ObservationPoint, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(point) = self.buffer.pop_front() {
                return Some(Ok(point));
            }
            let url = self.next_url.take()?;
            match self.fetch_page(&url) {
                Ok(next) => self.next_url = next,
                Err(e) => {
                    self.buffer.clear();
                    return Some(Err(e));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Time normalisation
// ---------------------------------------------------------------------------

/// Parses an RFC 3339 timestamp; a timestamp without offset is taken as UTC.
pub fn parse_observed(observed: &str) -> Option<DateTime<Utc>> {
    let observed = observed.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(observed) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(observed, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Drops minutes, seconds and sub-seconds.
pub fn floor_to_hour(dt: DateTime<Utc>) -> DateTime<Utc> {
    let secs = dt.timestamp();
    let floored = secs - secs.rem_euclid(3600);
    DateTime::from_timestamp(floored, 0).unwrap_or(dt)
}
