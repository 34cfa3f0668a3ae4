//! Station catalog for the metObs ingestion service.
//!
//! Fetches the provider's full station feed in one request and narrows it
//! to the candidate stations an operator can choose from: inside the
//! configured bounding box, one entry per station id (first occurrence
//! wins), and no offshore platforms.
//!
//! There is no partial-catalog fallback. An unreachable or malformed feed
//! fails the listing.

use std::collections::HashSet;

use crate::config::AppConfig;
use crate::ingest::metobs::{self, Feature, HttpFetch, StationProperties};
use crate::model::{BoundingBox, IngestError, StationDescriptor};

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

pub struct StationCatalog<'a, F: HttpFetch + ?Sized> {
    api: &'a F,
    config: &'a AppConfig,
}

impl<'a, F: HttpFetch + ?Sized> StationCatalog<'a, F> {
    pub fn new(api: &'a F, config: &'a AppConfig) -> Self {
        Self { api, config }
    }

    /// Lists candidate stations inside `bbox`, in feed order.
    pub fn list_stations(&self, bbox: &BoundingBox) -> Result<Vec<StationDescriptor>, IngestError> {
        let url = metobs::build_station_url(&self.config.api)?;
        let page = metobs::fetch_collection::<F, StationProperties>(self.api, &url)?;
        filter_stations(page.features, bbox, &self.config.region.offshore_markers, &url)
    }
}

/// Applies the bbox, dedup and offshore rules to a parsed station feed.
///
/// A feature without a `[lon, lat]` geometry makes the whole feed malformed.
pub fn filter_stations(
    features: Vec<Feature<StationProperties>>,
    bbox: &BoundingBox,
    offshore_markers: &[String],
    url: &str,
) -> Result<Vec<StationDescriptor>, IngestError> {
    let markers: Vec<String> = offshore_markers.iter().map(|m| m.to_lowercase()).collect();
    let mut seen = HashSet::new();
    let mut stations = Vec::new();

    for feature in features {
        let (lon, lat) = match feature.geometry.as_ref().map(|g| g.coordinates.as_slice()) {
            Some([lon, lat, ..]) => (*lon, *lat),
            _ => {
                return Err(IngestError::malformed(
                    &metobs::redact_api_key(url),
                    format!("station '{}' has no [lon, lat] coordinates", feature.properties.station_id),
                ));
            }
        };

        if !bbox.contains(lon, lat) {
            continue;
        }

        let props = feature.properties;
        if !seen.insert(props.station_id.clone()) {
            continue;
        }

        if is_offshore(&props.name, &markers) {
            continue;
        }

        stations.push(StationDescriptor {
            station_id: props.station_id,
            name: props.name,
            longitude: lon,
            latitude: lat,
        });
    }

    Ok(stations)
}

/// True when the name contains any (already lowercased) marker.
fn is_offshore(name: &str, lowercase_markers: &[String]) -> bool {
    let name = name.to_lowercase();
    lowercase_markers.iter().any(|marker| !marker.is_empty() && name.contains(marker.as_str()))
}

/// Looks up a station by id. Returns `None` if not listed.
pub fn find_station<'s>(stations: &'s [StationDescriptor], station_id: &str) -> Option<&'s StationDescriptor> {
    stations.iter().find(|s| s.station_id == station_id)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Integration Tests - Live Catalog
// ---------------------------------------------------------------------------
//
// Marked #[ignore] so normal test runs do not depend on the provider.
// To run manually (needs METOBS_API_KEY):
//   cargo test -- --ignored live_catalog

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::ingest::MetObsClient;

    #[test]
    #[ignore] // Don't run in CI - depends on external API
    fn live_catalog_returns_unique_stations_inside_bbox() {
        let mut config = AppConfig::default();
        config.api.api_key = std::env::var(crate::config::API_KEY_ENV).expect("METOBS_API_KEY must be set");

        let client = MetObsClient::new(&config.api).unwrap();
        let stations = StationCatalog::new(&client, &config)
            .list_stations(&config.bbox())
            .expect("live station feed should load");

        assert!(!stations.is_empty(), "catalog should not be empty");
        let mut seen = HashSet::new();
        for s in &stations {
            assert!(seen.insert(s.station_id.clone()), "duplicate station id {}", s.station_id);
            assert!(config.bbox().contains(s.longitude, s.latitude));
        }
    }
}
