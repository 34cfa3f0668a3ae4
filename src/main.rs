//! Console driver: pick a station, show what it reports, ingest one period.
//!
//! Usage: metobs_ingest [--init-schema] [--dry-run] [STATION_ID]
//!
//! Without a station id the regional catalog is listed and the station is
//! read from stdin; an empty answer exits without doing anything. A prompted
//! id must be one of the listed land stations. An id given on the command
//! line skips the catalog and is used as-is.

use std::io::{self, BufRead, Write};

use metobs_ingest::config::{self, AppConfig};
use metobs_ingest::db::{self, BatchProgress, MemoryStore, ObservationStore, PgStore};
use metobs_ingest::ingest::MetObsClient;
use metobs_ingest::logging::{self, DataSource};
use metobs_ingest::model::{IngestError, StationDescriptor};
use metobs_ingest::parameters::{ParameterResolver, ResolvedParameters, resolve_against};
use metobs_ingest::pipeline::{self, IngestOutcome};
use metobs_ingest::stations::{StationCatalog, find_station};
use metobs_ingest::verify;

struct Args {
    init_schema: bool,
    dry_run: bool,
    station_id: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        init_schema: false,
        dry_run: false,
        station_id: None,
    };
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--init-schema" => args.init_schema = true,
            "--dry-run" => args.dry_run = true,
            flag if flag.starts_with("--") => return Err(format!("unknown option '{}'", flag)),
            id if args.station_id.is_none() => args.station_id = Some(id.to_string()),
            extra => return Err(format!("unexpected argument '{}'", extra)),
        }
    }
    Ok(args)
}

fn print_stations(stations: &[StationDescriptor]) {
    println!("\n📍 {} land stations in region:", stations.len());
    for s in stations {
        println!("   {:<8} {:<32} ({:.4}, {:.4})", s.station_id, s.name, s.longitude, s.latitude);
    }
}

fn prompt_station() -> io::Result<Option<String>> {
    print!("\nEnter station ID (empty to quit): ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let id = line.trim();
    Ok(if id.is_empty() { None } else { Some(id.to_string()) })
}

/// Lists the regional catalog and asks for a station from it.
fn select_station(client: &MetObsClient, config: &AppConfig) -> Result<Option<String>, Box<dyn std::error::Error>> {
    println!("\n🌐 Fetching station catalog...");
    let stations = StationCatalog::new(client, config)
        .list_stations(&config.bbox())
        .inspect_err(|e| logging::log_failure(DataSource::MetObs, "catalog", "station listing", e))?;
    print_stations(&stations);

    let Some(station_id) = prompt_station()? else {
        return Ok(None);
    };
    let Some(station) = find_station(&stations, &station_id) else {
        return Err(format!("station '{}' is not in the regional catalog", station_id).into());
    };
    println!("\n✓ Selected {} ({})", station.station_id, station.name);
    Ok(Some(station_id))
}

fn print_progress(progress: &BatchProgress) {
    println!("   Inserted {}/{} rows", progress.written, progress.total);
}

fn ingest_into<S: ObservationStore + ?Sized>(
    client: &MetObsClient,
    store: &mut S,
    config: &AppConfig,
    station_id: &str,
    resolved: &ResolvedParameters,
) -> Result<IngestOutcome, IngestError> {
    pipeline::ingest_resolved(client, store, config, station_id, resolved, print_progress)
}

fn open_store(config: &AppConfig, init_schema: bool) -> Result<PgStore, IngestError> {
    let url = config::database_url()?;
    println!("🔌 Connecting to database...");
    let mut client = db::connect(&url, &config.database)?;
    if init_schema {
        db::ensure_schema(&mut client, &config.database.table)?;
    }
    db::verify_table(&mut client, &config.database.table)?;
    println!("   ✓ Connected, table '{}' present", config.database.table);
    PgStore::new(client, &config.database.table)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🌦  metObs Hourly Observation Ingestion");
    println!("======================================");

    let args = parse_args().map_err(|e| {
        eprintln!("Usage: metobs_ingest [--init-schema] [--dry-run] [STATION_ID]");
        eprintln!("       STATION_ID skips the catalog listing and is not checked against it");
        e
    })?;

    let config = config::load_from_env()?;
    logging::init_logger(config.logging.level, config.logging.file.as_deref(), config.logging.timestamps);
    config.require_api_key()?;

    let (from, to) = config.period.range()?;
    println!("   Period: {} to {}", from, to);

    let client = MetObsClient::new(&config.api)?;

    let station_id = match args.station_id {
        Some(id) => {
            println!("\n✓ Using station {} from the command line", id);
            id
        }
        None => match select_station(&client, &config)? {
            Some(id) => id,
            None => {
                println!("No station selected. Bye.");
                return Ok(());
            }
        },
    };

    let observed = ParameterResolver::new(&client, &config).discover_observed_parameters(&station_id)?;
    let report = verify::verify_station_parameters(&station_id, &config.parameters, &observed);
    verify::print_report(&report);

    let resolved = resolve_against(&config.parameters, &observed);
    if resolved.is_empty() {
        println!("\nℹ️  Station reports none of the desired parameters; nothing to ingest.");
        return Ok(());
    }

    println!("\n📦 Fetching {} parameters...", resolved.len());
    let outcome = if args.dry_run {
        let mut store = MemoryStore::new();
        let outcome = ingest_into(&client, &mut store, &config, &station_id, &resolved)?;
        println!("   (dry run: {} rows held in memory, nothing written)", store.len());
        outcome
    } else {
        let mut store = open_store(&config, args.init_schema)?;
        ingest_into(&client, &mut store, &config, &station_id, &resolved).inspect_err(|e| {
            if let IngestError::StoreUnavailable { offset, .. } = e {
                eprintln!("   ✗ Batch at row {} failed; earlier batches are committed. Re-running is safe.", offset);
            }
        })?
    };

    match outcome {
        IngestOutcome::NothingToIngest => println!("\nℹ️  Nothing to ingest."),
        IngestOutcome::Completed(summary) => {
            println!("\n✅ Ingestion complete for {}", summary.station_id);
            for label in &summary.labels {
                println!(
                    "   {:<20} {:<24} {:>6} values, {} pages",
                    label.label.as_str(),
                    label.parameter_id,
                    label.merge.applied,
                    label.pages_fetched
                );
            }
            println!("   {} rows in {} batches", summary.rows_written, summary.batches);
        }
    }

    Ok(())
}
