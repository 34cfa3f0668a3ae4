//! Observation persistence.
//!
//! Rows are written in fixed-size batches, one transaction per batch, with
//! an insert-or-update keyed by (station_id, observation_time). On
//! conflict each column takes the incoming value only when it is non-null
//! (`COALESCE(EXCLUDED.col, table.col)`), so a later run can fill gaps but
//! never erase what an earlier run stored. Re-applying a batch is
//! harmless, which is what makes resuming from a failed offset safe.

use chrono::{DateTime, Utc};
use postgres::types::ToSql;
use postgres::{Client, NoTls};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::time::Duration;

use crate::config::{DatabaseConfig, is_valid_table_name};
use crate::logging::{self, DataSource};
use crate::model::{IngestError, LABEL_COUNT, ObservationRow, ParameterLabel};

// ---------------------------------------------------------------------------
// Store abstraction
// ---------------------------------------------------------------------------

/// A sink that applies one batch atomically with merge-non-null semantics.
pub trait ObservationStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Writes one batch in a single transaction; returns rows affected.
    fn upsert_batch(&mut self, rows: &[ObservationRow]) -> Result<u64, Self::Error>;
}

/// Progress after a committed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    /// 1-based batch number within this pass.
    pub batch: usize,
    pub batches: usize,
    /// Rows committed so far, counting from the start of `rows`.
    pub written: usize,
    pub total: usize,
}

/// Writes every row, `batch_size` rows per transaction.
pub fn upsert_all<S, P>(store: &mut S, rows: &[ObservationRow], batch_size: usize, on_progress: P) -> Result<usize, IngestError>
where
    S: ObservationStore + ?Sized,
    P: FnMut(&BatchProgress),
{
    upsert_from(store, rows, 0, batch_size, on_progress)
}

/// Writes `rows[start_offset..]` in batches.
///
/// On failure the error carries the offset of the failed batch; batches
/// before it are committed and stay committed. Pass that offset back in
/// to resume.
pub fn upsert_from<S, P>(
    store: &mut S,
    rows: &[ObservationRow],
    start_offset: usize,
    batch_size: usize,
    mut on_progress: P,
) -> Result<usize, IngestError>
where
    S: ObservationStore + ?Sized,
    P: FnMut(&BatchProgress),
{
    if batch_size == 0 {
        return Err(IngestError::Config("batch size must be > 0".to_string()));
    }
    if start_offset > rows.len() {
        return Err(IngestError::Config(format!(
            "resume offset {} is past the end of {} rows",
            start_offset,
            rows.len()
        )));
    }

    let remaining = &rows[start_offset..];
    let batches = remaining.len().div_ceil(batch_size);
    let mut offset = start_offset;

    for (i, batch) in remaining.chunks(batch_size).enumerate() {
        store
            .upsert_batch(batch)
            .map_err(|e| IngestError::StoreUnavailable { offset, source: Box::new(e) })?;
        offset += batch.len();

        logging::debug(
            DataSource::Database,
            batch.first().map(|r| r.station_id.as_str()),
            &format!("committed batch {}/{} ({} rows)", i + 1, batches, batch.len()),
        );
        on_progress(&BatchProgress {
            batch: i + 1,
            batches,
            written: offset,
            total: rows.len(),
        });
    }

    Ok(offset - start_offset)
}

// ---------------------------------------------------------------------------
// SQL
// ---------------------------------------------------------------------------

fn label_columns() -> impl Iterator<Item = &'static str> {
    ParameterLabel::ALL.iter().map(|label| label.as_str())
}

/// The merge-non-null upsert for `table`, with `2 + LABEL_COUNT` parameters.
pub fn build_upsert_sql(table: &str) -> String {
    let columns: Vec<&str> = ["station_id", "observation_time"].into_iter().chain(label_columns()).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();
    let updates: Vec<String> = label_columns()
        .map(|col| format!("{col} = COALESCE(EXCLUDED.{col}, {table}.{col})", col = col, table = table))
        .collect();

    format!(
        "INSERT INTO {table} ({columns}) VALUES ({placeholders}) \
         ON CONFLICT (station_id, observation_time) DO UPDATE SET {updates}",
        table = table,
        columns = columns.join(", "),
        placeholders = placeholders.join(", "),
        updates = updates.join(", "),
    )
}

/// Idempotent DDL for the observation table and its index.
pub fn build_schema_sql(table: &str) -> String {
    let value_columns: Vec<String> = label_columns()
        .map(|col| format!("    {} DOUBLE PRECISION", col))
        .collect();
    let index_name = format!("idx_{}_station_time", table.replace('.', "_"));

    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n    \
             id BIGSERIAL PRIMARY KEY,\n    \
             station_id TEXT NOT NULL,\n    \
             observation_time TIMESTAMPTZ NOT NULL,\n\
         {values},\n    \
             UNIQUE (station_id, observation_time)\n\
         );\n\
         CREATE INDEX IF NOT EXISTS {index} ON {table} (station_id, observation_time);",
        table = table,
        values = value_columns.join(",\n"),
        index = index_name,
    )
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

/// Connects with bounded connect and statement timeouts.
pub fn connect(database_url: &str, config: &DatabaseConfig) -> Result<Client, IngestError> {
    let mut pg_config: postgres::Config = database_url.parse()?;
    pg_config.connect_timeout(Duration::from_secs(config.connect_timeout_secs));

    let mut client = pg_config.connect(NoTls)?;
    client.batch_execute(&format!(
        "SET statement_timeout = {}",
        config.statement_timeout_secs.saturating_mul(1000)
    ))?;
    Ok(client)
}

/// Fails with a configuration error if `table` does not exist.
pub fn verify_table(client: &mut Client, table: &str) -> Result<(), IngestError> {
    let row = client.query_one("SELECT to_regclass($1::text) IS NOT NULL", &[&table])?;
    let exists: bool = row.get(0);
    if !exists {
        return Err(IngestError::Config(format!(
            "table '{}' does not exist; apply sql/001_weather_observations.sql or run with --init-schema",
            table
        )));
    }
    Ok(())
}

/// Creates the table and index if missing.
pub fn ensure_schema(client: &mut Client, table: &str) -> Result<(), IngestError> {
    if !is_valid_table_name(table) {
        return Err(IngestError::Config(format!("invalid table name '{}'", table)));
    }
    client.batch_execute(&build_schema_sql(table))?;
    logging::info(DataSource::Database, None, &format!("schema for '{}' is in place", table));
    Ok(())
}

pub struct PgStore {
    client: Client,
    upsert_sql: String,
}

impl PgStore {
    pub fn new(client: Client, table: &str) -> Result<Self, IngestError> {
        if !is_valid_table_name(table) {
            return Err(IngestError::Config(format!("invalid table name '{}'", table)));
        }
        Ok(Self {
            client,
            upsert_sql: build_upsert_sql(table),
        })
    }

    pub fn client_mut(&mut self) -> &mut Client {
        &mut self.client
    }
}

impl ObservationStore for PgStore {
    type Error = postgres::Error;

    fn upsert_batch(&mut self, rows: &[ObservationRow]) -> Result<u64, Self::Error> {
        let mut transaction = self.client.transaction()?;
        let stmt = transaction.prepare(&self.upsert_sql)?;

        let mut affected = 0;
        for row in rows {
            let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(2 + LABEL_COUNT);
            params.push(&row.station_id);
            params.push(&row.observation_time);
            for value in &row.values {
                params.push(value);
            }
            affected += transaction.execute(&stmt, &params)?;
        }

        transaction.commit()?;
        Ok(affected)
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Applies the same merge-non-null rule as the SQL upsert, in memory.
///
/// Backs `--dry-run` and offline tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<(String, DateTime<Utc>), ObservationRow>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, station_id: &str, observation_time: DateTime<Utc>) -> Option<&ObservationRow> {
        self.records.get(&(station_id.to_string(), observation_time))
    }

    pub fn records(&self) -> impl Iterator<Item = &ObservationRow> {
        self.records.values()
    }
}

impl ObservationStore for MemoryStore {
    type Error = Infallible;

    fn upsert_batch(&mut self, rows: &[ObservationRow]) -> Result<u64, Self::Error> {
        for row in rows {
            let key = (row.station_id.clone(), row.observation_time);
            match self.records.get_mut(&key) {
                Some(stored) => {
                    for (slot, incoming) in stored.values.iter_mut().zip(row.values.iter()) {
                        if incoming.is_some() {
                            *slot = *incoming;
                        }
                    }
                }
                None => {
                    self.records.insert(key, row.clone());
                }
            }
        }
        Ok(rows.len() as u64)
    }
}
