//! Remote data source clients.
//!
//! - `metobs`: transport, URL construction and wire types for the metObs API.
//! - `observations`: the paginated observation fetcher.

pub mod metobs;
pub mod observations;

pub use metobs::{HttpFetch, MetObsClient};
pub use observations::{ObservationPages, fetch_observations};
