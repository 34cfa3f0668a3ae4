/// Offline end-to-end test of one ingestion run.
///
/// Station catalog, parameter discovery and two observation pages are
/// served from canned bodies; rows land in the in-memory store, which
/// applies the same merge-non-null rule as the Postgres upsert.
///
/// Run with: cargo test --test pipeline_integration

use std::cell::RefCell;
use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};

use metobs_ingest::config::AppConfig;
use metobs_ingest::db::MemoryStore;
use metobs_ingest::ingest::HttpFetch;
use metobs_ingest::ingest::metobs::{build_discovery_url, build_observation_url, build_station_url};
use metobs_ingest::model::{IngestError, ParameterLabel};
use metobs_ingest::pipeline::{self, IngestOutcome};
use metobs_ingest::stations::{StationCatalog, find_station};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CannedApi {
    pages: HashMap<String, String>,
    requests: RefCell<Vec<String>>,
}

impl CannedApi {
    fn with(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }
}

impl HttpFetch for CannedApi {
    fn get_text(&self, url: &str) -> Result<String, IngestError> {
        self.requests.borrow_mut().push(url.to_string());
        self.pages.get(url).cloned().ok_or_else(|| IngestError::HttpStatus {
            url: url.to_string(),
            status: 404,
        })
    }
}

const PAGE_TWO: &str = "https://dmigw.govcloud.dk/v2/metObs/collections/observation/items?offset=1&test-page=2";

fn scenario_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.api.api_key = "test-key".to_string();
    config.parameters = vec![(ParameterLabel::AverageTemperature, "temp_mean_past10min".to_string())];
    config
}

fn jan1(h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap()
}

fn scenario_api(config: &AppConfig) -> CannedApi {
    let (from, to) = config.period.range().unwrap();

    let stations = r#"{"type": "FeatureCollection", "features": [
        {"geometry": {"coordinates": [9.3381, 56.0955]}, "properties": {"stationId": "06074", "name": "Århus Syd"}},
        {"geometry": {"coordinates": [11.5, 55.5]}, "properties": {"stationId": "06074", "name": "Duplicate"}},
        {"geometry": {"coordinates": [10.9, 56.9]}, "properties": {"stationId": "06079", "name": "Anholt Hav"}},
        {"geometry": {"coordinates": [-20.0, 64.1]}, "properties": {"stationId": "04030", "name": "Reykjavik"}}
    ], "links": []}"#;

    let discovery = r#"{"features": [
        {"properties": {"stationId": "06074", "parameterId": "temp_mean_past10min"}},
        {"properties": {"stationId": "06074", "parameterId": "wind_dir"}}
    ], "links": []}"#;

    let page_one = format!(
        r#"{{"features": [
            {{"properties": {{"stationId": "06074", "observed": "2024-01-01T00:00:00Z", "parameterId": "temp_mean_past10min", "value": 3.2}}}}
        ], "links": [{{"rel": "next", "href": "{}"}}]}}"#,
        PAGE_TWO
    );
    let page_two = r#"{"features": [
        {"properties": {"stationId": "06074", "observed": "2024-01-01T01:00:00Z", "parameterId": "temp_mean_past10min", "value": 3.4}}
    ], "links": []}"#;

    CannedApi::default()
        .with(&build_station_url(&config.api).unwrap(), stations)
        .with(&build_discovery_url(&config.api, "06074").unwrap(), discovery)
        .with(
            &build_observation_url(&config.api, "temp_mean_past10min", from, to, Some("06074")).unwrap(),
            &page_one,
        )
        .with(PAGE_TWO, page_two)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_catalog_keeps_only_regional_land_stations() {
    let config = scenario_config();
    let api = scenario_api(&config);

    let stations = StationCatalog::new(&api, &config).list_stations(&config.bbox()).unwrap();

    assert_eq!(stations.len(), 1);
    let station = find_station(&stations, "06074").expect("06074 should be listed");
    assert_eq!(station.name, "Århus Syd");
    assert!(find_station(&stations, "06079").is_none(), "offshore station filtered");
}

#[test]
fn test_full_year_run_for_one_station() {
    let config = scenario_config();
    let api = scenario_api(&config);
    let mut store = MemoryStore::new();
    let mut progress = Vec::new();

    let outcome = pipeline::run_station(&api, &mut store, &config, "06074", |p| {
        progress.push((p.written, p.total));
    })
    .unwrap();

    let IngestOutcome::Completed(summary) = outcome else {
        panic!("expected the run to complete");
    };

    // 2024 is a leap year: 366 * 24 hourly rows.
    assert_eq!(summary.rows_written, 8784);
    assert_eq!(summary.batches, 2);
    assert_eq!(progress, vec![(5000, 8784), (8784, 8784)]);

    assert_eq!(summary.labels.len(), 1);
    assert_eq!(summary.labels[0].parameter_id, "temp_mean_past10min");
    assert_eq!(summary.labels[0].pages_fetched, 2);
    assert_eq!(summary.labels[0].merge.applied, 2);

    assert_eq!(store.len(), 8784);
    assert!(store.records().all(|row| row.station_id == "06074"));

    let filled: Vec<(DateTime<Utc>, f64)> = store
        .records()
        .filter_map(|row| row.get(ParameterLabel::AverageTemperature).map(|v| (row.observation_time, v)))
        .collect();
    assert_eq!(filled, vec![(jan1(0), 3.2), (jan1(1), 3.4)]);

    let requests = api.requests.borrow();
    assert_eq!(requests.len(), 3, "discovery plus two observation pages");
    assert_eq!(requests[2], PAGE_TWO);
}

#[test]
fn test_rerunning_the_same_period_is_idempotent() {
    let config = scenario_config();
    let mut store = MemoryStore::new();

    pipeline::run_station(&scenario_api(&config), &mut store, &config, "06074", |_| {}).unwrap();
    let first: Vec<_> = store.records().cloned().collect();

    pipeline::run_station(&scenario_api(&config), &mut store, &config, "06074", |_| {}).unwrap();
    let second: Vec<_> = store.records().cloned().collect();

    assert_eq!(first, second);
}
