/// Integration tests for the Postgres observation store.
///
/// Prerequisites:
/// - PostgreSQL reachable through DATABASE_URL (set in .env)
/// - Permission to create and drop tables
///
/// Run with: cargo test --test postgres_integration -- --ignored --test-threads=1
///
/// Each test works in its own scratch table and drops it afterwards.

use chrono::{DateTime, TimeZone, Utc};
use postgres::Client;

use metobs_ingest::config::{self, DatabaseConfig};
use metobs_ingest::db::{self, PgStore};
use metobs_ingest::model::{IngestError, ObservationRow, ParameterLabel};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn connect() -> Client {
    dotenv::dotenv().ok();
    let url = config::database_url().unwrap_or_else(|e| panic!("{}", e));
    db::connect(&url, &DatabaseConfig::default()).unwrap_or_else(|e| {
        eprintln!("\n{}\n", "=".repeat(80));
        eprintln!("POSTGRES TEST SETUP ERROR: {}", e);
        eprintln!("{}\n", "=".repeat(80));
        panic!("could not connect to DATABASE_URL");
    })
}

fn scratch_table(client: &mut Client, table: &str) {
    client.batch_execute(&format!("DROP TABLE IF EXISTS {}", table)).unwrap();
    db::ensure_schema(client, table).unwrap();
}

fn drop_table(client: &mut Client, table: &str) {
    client.batch_execute(&format!("DROP TABLE IF EXISTS {}", table)).unwrap();
}

fn hour(h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap()
}

fn stored(client: &mut Client, table: &str, at: DateTime<Utc>) -> (Option<f64>, Option<f64>) {
    let row = client
        .query_one(
            &format!(
                "SELECT rain, humidity FROM {} WHERE station_id = $1 AND observation_time = $2",
                table
            ),
            &[&"06074", &at],
        )
        .unwrap();
    (row.get(0), row.get(1))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
#[ignore]
fn test_schema_provisioning_is_idempotent() {
    let table = "metobs_test_schema";
    let mut client = connect();
    scratch_table(&mut client, table);

    db::ensure_schema(&mut client, table).unwrap();
    db::verify_table(&mut client, table).unwrap();

    drop_table(&mut client, table);
    assert!(matches!(db::verify_table(&mut client, table), Err(IngestError::Config(_))));
}

#[test]
#[ignore]
fn test_upsert_never_replaces_values_with_null() {
    let table = "metobs_test_merge";
    let mut client = connect();
    scratch_table(&mut client, table);
    let mut store = PgStore::new(client, table).unwrap();

    let mut first = ObservationRow::empty("06074", hour(0));
    first.set(ParameterLabel::Rain, 0.4);
    db::upsert_all(&mut store, &[first], 100, |_| {}).unwrap();

    let mut second = ObservationRow::empty("06074", hour(0));
    second.set(ParameterLabel::Humidity, 93.0);
    db::upsert_all(&mut store, &[second], 100, |_| {}).unwrap();

    let client = store.client_mut();
    assert_eq!(stored(client, table, hour(0)), (Some(0.4), Some(93.0)));

    let count: i64 = client
        .query_one(&format!("SELECT COUNT(*) FROM {}", table), &[])
        .unwrap()
        .get(0);
    assert_eq!(count, 1);

    drop_table(client, table);
}

#[test]
#[ignore]
fn test_batched_write_stores_every_row() {
    let table = "metobs_test_batches";
    let mut client = connect();
    scratch_table(&mut client, table);
    let mut store = PgStore::new(client, table).unwrap();

    let rows: Vec<ObservationRow> = (0..24).map(|h| ObservationRow::empty("06074", hour(h))).collect();
    let mut batches = 0;
    let written = db::upsert_all(&mut store, &rows, 7, |p| batches = p.batch).unwrap();

    assert_eq!(written, 24);
    assert_eq!(batches, 4);

    let client = store.client_mut();
    let count: i64 = client
        .query_one(&format!("SELECT COUNT(*) FROM {} WHERE station_id = '06074'", table), &[])
        .unwrap()
        .get(0);
    assert_eq!(count, 24);
    assert_eq!(stored(client, table, hour(23)), (None, None));

    drop_table(client, table);
}
