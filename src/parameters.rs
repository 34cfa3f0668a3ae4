//! Parameter resolution for a single station.
//!
//! The provider does not publish per-station parameter inventories, so we
//! look at a bounded sample of the station's recent observations and take
//! the distinct parameter ids that appear there as "what this station
//! reports". Each desired label is then mapped to an id from that set:
//! the preferred id when present, otherwise a single resolution swap
//! (`past10min` ↔ `past1h`), otherwise the label is left out.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::AppConfig;
use crate::ingest::metobs::{self, DiscoveryProperties, HttpFetch};
use crate::model::{IngestError, ParameterLabel};

const TEN_MINUTE_MARKER: &str = "past10min";
const HOURLY_MARKER: &str = "past1h";

/// The parameter id chosen for one label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedParameter {
    pub parameter_id: String,
    pub preferred_id: String,
}

impl ResolvedParameter {
    pub fn is_fallback(&self) -> bool {
        self.parameter_id != self.preferred_id
    }
}

/// Label → usable parameter id for one station. Built once per run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedParameters {
    entries: BTreeMap<ParameterLabel, ResolvedParameter>,
}

impl ResolvedParameters {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, label: ParameterLabel) -> Option<&ResolvedParameter> {
        self.entries.get(&label)
    }

    /// Entries in column order.
    pub fn iter(&self) -> impl Iterator<Item = (ParameterLabel, &ResolvedParameter)> {
        self.entries.iter().map(|(label, resolved)| (*label, resolved))
    }
}

/// The alternate-resolution id for `preferred`, if it carries a resolution marker.
///
/// Only the `past10min` ↔ `past1h` pair is swapped; any other id has no fallback.
pub fn fallback_id(preferred: &str) -> Option<String> {
    if preferred.contains(TEN_MINUTE_MARKER) {
        Some(preferred.replace(TEN_MINUTE_MARKER, HOURLY_MARKER))
    } else if preferred.contains(HOURLY_MARKER) {
        Some(preferred.replace(HOURLY_MARKER, TEN_MINUTE_MARKER))
    } else {
        None
    }
}

/// Resolves each desired label against the ids a station actually reports.
///
/// Never maps a label to an id outside `observed`.
pub fn resolve_against(
    desired: &[(ParameterLabel, String)],
    observed: &BTreeSet<String>,
) -> ResolvedParameters {
    let mut entries = BTreeMap::new();

    for (label, preferred) in desired {
        let chosen = if observed.contains(preferred) {
            Some(preferred.clone())
        } else {
            fallback_id(preferred).filter(|alt| observed.contains(alt))
        };

        if let Some(parameter_id) = chosen {
            entries.insert(
                *label,
                ResolvedParameter {
                    parameter_id,
                    preferred_id: preferred.clone(),
                },
            );
        }
    }

    ResolvedParameters { entries }
}

pub struct ParameterResolver<'a, F: HttpFetch + ?Sized> {
    api: &'a F,
    config: &'a AppConfig,
}

impl<'a, F: HttpFetch + ?Sized> ParameterResolver<'a, F> {
    pub fn new(api: &'a F, config: &'a AppConfig) -> Self {
        Self { api, config }
    }

    /// Distinct parameter ids seen in a sample of the station's observations.
    pub fn discover_observed_parameters(&self, station_id: &str) -> Result<BTreeSet<String>, IngestError> {
        let url = metobs::build_discovery_url(&self.config.api, station_id)?;
        let page = metobs::fetch_collection::<F, DiscoveryProperties>(self.api, &url)?;

        Ok(page
            .features
            .into_iter()
            .filter_map(|f| f.properties.parameter_id())
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect())
    }

    /// Label → usable id for the station. Empty means nothing to ingest.
    pub fn resolve_parameter_ids(&self, station_id: &str) -> Result<ResolvedParameters, IngestError> {
        let observed = self.discover_observed_parameters(station_id)?;
        Ok(resolve_against(&self.config.parameters, &observed))
    }
}
