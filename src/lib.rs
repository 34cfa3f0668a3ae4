//! Hourly weather observation ingestion from the DMI metObs API.
//!
//! A run picks one station from the regional catalog, resolves which of the
//! desired parameters that station actually reports, fetches each parameter
//! for the configured period, reconciles everything into one row per hour,
//! and upserts the rows into Postgres.

pub mod analysis;
pub mod config;
pub mod db;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod parameters;
pub mod pipeline;
pub mod stations;
pub mod verify;
