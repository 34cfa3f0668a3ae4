//! Data organization utilities for the metObs ingestion service.
//!
//! This module turns the flat, per-parameter observation streams produced
//! by `ingest` into the per-station hourly structure the store expects.
//! Statistical analysis of the stored series happens downstream, against
//! the database.
//!
//! Submodules:
//! - `timeline`: builds the dense hourly skeleton and merges streams into it.

pub mod timeline;
