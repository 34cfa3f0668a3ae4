//! One station, one run.
//!
//! Resolve the station's parameter ids, lay down the hourly skeleton for
//! the configured period, fetch and merge one parameter at a time, then
//! hand the rows to the store in batches. Everything is sequential: the
//! next parameter is not fetched until the previous stream is fully merged.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::analysis::timeline::{self, MergeStats};
use crate::config::AppConfig;
use crate::db::{self, BatchProgress, ObservationStore};
use crate::ingest::{HttpFetch, fetch_observations};
use crate::logging::{self, DataSource};
use crate::model::{IngestError, ParameterLabel};
use crate::parameters::{ParameterResolver, ResolvedParameters};

/// Per-label outcome of the fetch + merge step.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelSummary {
    pub label: ParameterLabel,
    pub parameter_id: String,
    pub pages_fetched: usize,
    /// Points for other stations, dropped by the fetcher.
    pub points_filtered: usize,
    pub merge: MergeStats,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestSummary {
    pub station_id: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub labels: Vec<LabelSummary>,
    pub rows_written: usize,
    pub batches: usize,
}

impl IngestSummary {
    /// Labels whose stream put at least one value into the timeline.
    pub fn labels_with_data(&self) -> usize {
        self.labels.iter().filter(|l| l.merge.applied > 0).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// No desired label resolved to an id the station reports.
    NothingToIngest,
    Completed(IngestSummary),
}

/// Discovers parameters for `station_id`, then ingests whatever resolved.
pub fn run_station<F, S, P>(
    api: &F,
    store: &mut S,
    config: &AppConfig,
    station_id: &str,
    on_progress: P,
) -> Result<IngestOutcome, IngestError>
where
    F: HttpFetch + ?Sized,
    S: ObservationStore + ?Sized,
    P: FnMut(&BatchProgress),
{
    let resolved = ParameterResolver::new(api, config)
        .resolve_parameter_ids(station_id)
        .inspect_err(|e| logging::log_failure(DataSource::MetObs, station_id, "parameter discovery", e))?;

    ingest_resolved(api, store, config, station_id, &resolved, on_progress)
}

/// Ingests an already resolved parameter set for `station_id`.
pub fn ingest_resolved<F, S, P>(
    api: &F,
    store: &mut S,
    config: &AppConfig,
    station_id: &str,
    resolved: &ResolvedParameters,
    mut on_progress: P,
) -> Result<IngestOutcome, IngestError>
where
    F: HttpFetch + ?Sized,
    S: ObservationStore + ?Sized,
    P: FnMut(&BatchProgress),
{
    if resolved.is_empty() {
        logging::warn(DataSource::System, Some(station_id), "no usable parameters; nothing to ingest");
        return Ok(IngestOutcome::NothingToIngest);
    }

    let (from, to) = config.period.range()?;
    let mut timeline = timeline::build_skeleton(station_id, from, to)?;
    logging::info(
        DataSource::System,
        Some(station_id),
        &format!("{} hourly rows from {} to {}", timeline.len(), from, to),
    );

    let allowed: HashSet<String> = HashSet::from([station_id.to_string()]);
    let mut labels = Vec::with_capacity(resolved.len());

    for (label, entry) in resolved.iter() {
        let mut pages = fetch_observations(api, &config.api, &entry.parameter_id, from, to, &allowed)?;
        let merge = timeline
            .merge(label, &mut pages)
            .inspect_err(|e| logging::log_failure(DataSource::MetObs, station_id, &entry.parameter_id, e))?;

        logging::debug(
            DataSource::MetObs,
            Some(station_id),
            &format!(
                "{} ({}): {} pages, {} applied, {} without value, {} out of range",
                label,
                entry.parameter_id,
                pages.pages_fetched(),
                merge.applied,
                merge.without_value,
                merge.out_of_range
            ),
        );

        labels.push(LabelSummary {
            label,
            parameter_id: entry.parameter_id.clone(),
            pages_fetched: pages.pages_fetched(),
            points_filtered: pages.points_skipped(),
            merge,
        });
    }

    let rows = timeline.into_rows();
    let mut batches = 0;
    let rows_written = db::upsert_all(store, &rows, config.database.batch_size, |progress| {
        batches = progress.batch;
        on_progress(progress);
    })
    .inspect_err(|e| logging::log_failure(DataSource::Database, station_id, "upsert", e))?;

    let summary = IngestSummary {
        station_id: station_id.to_string(),
        from,
        to,
        labels,
        rows_written,
        batches,
    };
    logging::log_ingest_summary(station_id, summary.labels.len(), summary.labels_with_data(), rows_written);

    Ok(IngestOutcome::Completed(summary))
}
