//! metObs (OGC API Features) Data API Client
//!
//! Retrieves station metadata and observation time series from the DMI
//! metObs service. Both resources are GeoJSON feature collections:
//!   {base}/collections/station/items
//!   {base}/collections/observation/items
//!
//! Large result sets are paged; each page carries a `links` array and the
//! entry with `rel == "next"` points at the following page.

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::config::ApiConfig;
use crate::model::IngestError;

// ============================================================================
// Transport
// ============================================================================

/// Anything that can GET a URL and hand back the body text.
///
/// `MetObsClient` is the production implementation; tests substitute canned
/// pages so catalog, discovery and pagination logic run offline.
pub trait HttpFetch {
    fn get_text(&self, url: &str) -> Result<String, IngestError>;
}

/// Blocking metObs client with a bounded per-request timeout.
pub struct MetObsClient {
    http: reqwest::blocking::Client,
}

impl MetObsClient {
    pub fn new(api: &ApiConfig) -> Result<Self, IngestError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(api.timeout_secs))
            .build()
            .map_err(|e| IngestError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }
}

impl HttpFetch for MetObsClient {
    fn get_text(&self, url: &str) -> Result<String, IngestError> {
        let response = self
            .http
            .get(url)
            .header("Accept", "application/geo+json, application/json")
            .send()
            .map_err(|e| IngestError::Transport {
                url: redact_api_key(url),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(IngestError::HttpStatus {
                url: redact_api_key(url),
                status: response.status().as_u16(),
            });
        }

        response.text().map_err(|e| IngestError::Transport {
            url: redact_api_key(url),
            message: e.to_string(),
        })
    }
}

/// Replaces the `api-key` query value so URLs can be logged.
pub fn redact_api_key(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            let pairs: Vec<(String, String)> = parsed
                .query_pairs()
                .map(|(k, v)| {
                    let v = if k == "api-key" { "***".to_string() } else { v.into_owned() };
                    (k.into_owned(), v)
                })
                .collect();
            if pairs.is_empty() {
                return parsed.to_string();
            }
            parsed.query_pairs_mut().clear().extend_pairs(pairs);
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}

// ============================================================================
// URL construction
// ============================================================================

fn collection_url(base_url: &str, collection: &str, params: &[(&str, String)]) -> Result<String, IngestError> {
    let endpoint = format!("{}/collections/{}/items", base_url.trim_end_matches('/'), collection);
    Url::parse_with_params(&endpoint, params)
        .map(|url| url.to_string())
        .map_err(|e| IngestError::Config(format!("invalid base URL '{}': {}", base_url, e)))
}

/// Station feed URL: the whole catalog in one generously sized page.
pub fn build_station_url(api: &ApiConfig) -> Result<String, IngestError> {
    collection_url(
        &api.base_url,
        "station",
        &[
            ("api-key", api.api_key.clone()),
            ("limit", api.station_limit.to_string()),
        ],
    )
}

/// Sample of recent observations for one station, any parameter.
pub fn build_discovery_url(api: &ApiConfig, station_id: &str) -> Result<String, IngestError> {
    collection_url(
        &api.base_url,
        "observation",
        &[
            ("api-key", api.api_key.clone()),
            ("stationId", station_id.to_string()),
            ("limit", api.discovery_limit.to_string()),
        ],
    )
}

/// First page of observations for one parameter over `[from, to]`.
///
/// `station_id` narrows the query server-side when only one station is wanted.
pub fn build_observation_url(
    api: &ApiConfig,
    parameter_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    station_id: Option<&str>,
) -> Result<String, IngestError> {
    let mut params = vec![
        ("api-key", api.api_key.clone()),
        ("datetime", format_interval(from, to)),
        ("parameterId", parameter_id.to_string()),
        ("limit", api.observation_limit.to_string()),
    ];
    if let Some(station_id) = station_id {
        params.push(("stationId", station_id.to_string()));
    }
    collection_url(&api.base_url, "observation", &params)
}

/// ISO 8601 interval with both ends `Z`-suffixed, e.g. `2024-01-01T00:00:00Z/2024-12-31T23:00:00Z`.
pub fn format_interval(from: DateTime<Utc>, to: DateTime<Utc>) -> String {
    format!(
        "{}/{}",
        from.format("%Y-%m-%dT%H:%M:%SZ"),
        to.format("%Y-%m-%dT%H:%M:%SZ")
    )
}

// ============================================================================
// metObs Response Structures
// ============================================================================

/// A GeoJSON feature collection page.
#[derive(Debug, Deserialize)]
pub struct FeatureCollection<P> {
    pub features: Vec<Feature<P>>,
    #[serde(default)]
    pub links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
pub struct Feature<P> {
    pub geometry: Option<Geometry>,
    pub properties: P,
}

#[derive(Debug, Deserialize)]
pub struct Geometry {
    pub coordinates: Vec<f64>,
}

#[derive(Debug, Deserialize)]
pub struct Link {
    pub rel: Option<String>,
    pub href: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationProperties {
    pub station_id: String,
    #[serde(default)]
    pub name: String,
}

/// Observation properties as used by the bulk fetcher.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationProperties {
    pub station_id: String,
    pub observed: String,
    // Kept raw: a string or null value means "no value", not a parse failure.
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

/// Observation properties as used by parameter discovery.
///
/// Older API versions name the parameter `observedProperty`; some payloads
/// carry both names.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryProperties {
    #[serde(default)]
    parameter_id: Option<String>,
    #[serde(default)]
    observed_property: Option<String>,
}

impl DiscoveryProperties {
    /// `parameterId` when present, else `observedProperty`.
    pub fn parameter_id(self) -> Option<String> {
        self.parameter_id.or(self.observed_property)
    }
}

// ============================================================================
// Response parsing
// ============================================================================

/// Parses one page. Any missing required field fails the whole page.
pub fn parse_collection<P: DeserializeOwned>(
    body: &str,
    url: &str,
) -> Result<FeatureCollection<P>, IngestError> {
    serde_json::from_str(body).map_err(|e| IngestError::malformed(&redact_api_key(url), e.to_string()))
}

/// URL of the next page, or `None` when this is the last one.
///
/// A `next` link without an `href` is malformed.
pub fn next_link(links: &[Link], url: &str) -> Result<Option<String>, IngestError> {
    let next = links
        .iter()
        .find(|link| link.rel.as_deref().is_some_and(|rel| rel.eq_ignore_ascii_case("next")));

    match next {
        None => Ok(None),
        Some(link) => match link.href.as_deref() {
            Some(href) if !href.trim().is_empty() => Ok(Some(href.to_string())),
            _ => Err(IngestError::malformed(&redact_api_key(url), "'next' link has no href")),
        },
    }
}

/// Reads a numeric observation value; anything that is not a JSON number is `None`.
pub fn parse_value(value: Option<&serde_json::Value>) -> Option<f64> {
    value.and_then(serde_json::Value::as_f64).filter(|v| v.is_finite())
}

/// Fetches and parses one page through any transport.
pub fn fetch_collection<F, P>(api: &F, url: &str) -> Result<FeatureCollection<P>, IngestError>
where
    F: HttpFetch + ?Sized,
    P: DeserializeOwned,
{
    let body = api.get_text(url)?;
    parse_collection(&body, url)
}

// ============================================================================
// Tests
// ============================================================================
