//! Structured logging for the metObs ingestion service
//!
//! Provides context-rich logging with station identifiers, data-source
//! tags and severity levels on top of the `log` facade. `env_logger` is
//! the backend; it writes to the console or appends to a log file for
//! unattended batch runs.

use chrono::Utc;
use serde::Deserialize;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;

use crate::model::IngestError;

const LOG_TARGET: &str = "metobs_ingest";

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warning => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

// ---------------------------------------------------------------------------
// Data Source Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    MetObs,
    Database,
    System,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::MetObs => write!(f, "METOBS"),
            DataSource::Database => write!(f, "DB"),
            DataSource::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - station unknown to the provider or has no data
    Expected,
    /// Unexpected failure - indicates service degradation or configuration issue
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Classify an ingestion failure by error kind.
pub fn classify_failure(err: &IngestError) -> FailureType {
    match err {
        IngestError::HttpStatus { status: 404, .. } => FailureType::Expected,
        IngestError::HttpStatus { status, .. } if *status >= 500 => FailureType::Unexpected,
        IngestError::HttpStatus { .. } => FailureType::Unknown,
        IngestError::Transport { message, .. } if message.contains("timed out") => {
            FailureType::Unexpected
        }
        IngestError::Transport { .. } => FailureType::Unknown,
        IngestError::MalformedResponse { .. } => FailureType::Unexpected,
        IngestError::InvalidRange(_) | IngestError::Config(_) => FailureType::Unexpected,
        IngestError::StoreUnavailable { .. } | IngestError::Database(_) => FailureType::Unexpected,
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Initialize the global logger from `build_logger`.
///
/// Calling this more than once keeps the first logger.
pub fn init_logger(min_level: LogLevel, log_file: Option<&str>, console_timestamps: bool) {
    let logger = build_logger(min_level, log_file, console_timestamps);
    let max_level = logger.filter();
    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(max_level);
    }
}

/// Builds the env_logger backend without installing it.
///
/// `RUST_LOG` still overrides `min_level` when set. With `log_file`, every
/// entry is appended to that file instead of the console; if the file
/// cannot be opened the console is used.
pub fn build_logger(min_level: LogLevel, log_file: Option<&str>, console_timestamps: bool) -> env_logger::Logger {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(min_level.filter());
    builder.parse_default_env();

    let to_file = match log_file {
        Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
                true
            }
            Err(e) => {
                eprintln!("Failed to open log file {}: {}", path, e);
                false
            }
        },
        None => false,
    };

    if to_file || console_timestamps {
        builder.format(|buf, record| {
            writeln!(
                buf,
                "{} {} {}",
                Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
                level_tag(record.level()),
                record.args()
            )
        });
    } else {
        builder.format(|buf, record| match record.level() {
            log::Level::Error => writeln!(buf, "   ✗ {}", record.args()),
            log::Level::Warn => writeln!(buf, "   ⚠ {}", record.args()),
            _ => writeln!(buf, "   {}", record.args()),
        });
    }

    builder.build()
}

fn level_tag(level: log::Level) -> LogLevel {
    match level {
        log::Level::Error => LogLevel::Error,
        log::Level::Warn => LogLevel::Warning,
        log::Level::Info => LogLevel::Info,
        log::Level::Debug | log::Level::Trace => LogLevel::Debug,
    }
}

/// Formats the `SOURCE [station]: message` body shared by every entry.
pub fn format_entry(source: &DataSource, station_id: Option<&str>, message: &str) -> String {
    let station_part = station_id.map(|s| format!(" [{}]", s)).unwrap_or_default();
    format!("{}{}: {}", source, station_part, message)
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Log a general informational message
pub fn info(source: DataSource, station_id: Option<&str>, message: &str) {
    log::info!(target: LOG_TARGET, "{}", format_entry(&source, station_id, message));
}

/// Log a warning message
pub fn warn(source: DataSource, station_id: Option<&str>, message: &str) {
    log::warn!(target: LOG_TARGET, "{}", format_entry(&source, station_id, message));
}

/// Log an error message
pub fn error(source: DataSource, station_id: Option<&str>, message: &str) {
    log::error!(target: LOG_TARGET, "{}", format_entry(&source, station_id, message));
}

/// Log a debug message
pub fn debug(source: DataSource, station_id: Option<&str>, message: &str) {
    log::debug!(target: LOG_TARGET, "{}", format_entry(&source, station_id, message));
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log an ingestion failure with automatic classification
pub fn log_failure(source: DataSource, station_id: &str, operation: &str, err: &IngestError) {
    let failure_type = classify_failure(err);
    let message = format!("{} failed [{}]: {}", operation, failure_type, err);

    match failure_type {
        FailureType::Expected => debug(source, Some(station_id), &message),
        FailureType::Unexpected => error(source, Some(station_id), &message),
        FailureType::Unknown => warn(source, Some(station_id), &message),
    }
}

// ---------------------------------------------------------------------------
// Run Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of one station run: how many resolved labels yielded data.
pub fn log_ingest_summary(station_id: &str, labels_total: usize, labels_with_data: usize, rows_written: usize) {
    let message = format!(
        "Ingest complete: {}/{} parameters returned data, {} rows written",
        labels_with_data, labels_total, rows_written
    );

    if labels_with_data == labels_total {
        info(DataSource::System, Some(station_id), &message);
    } else if labels_with_data == 0 {
        error(DataSource::System, Some(station_id), &message);
    } else {
        warn(DataSource::System, Some(station_id), &message);
    }
}
