//! Axio CSV import command

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use khata_core::axio::read_axio_csv;
use khata_core::currency::CurrencyConverter;
use khata_core::ingest::IngestionPipeline;
use khata_core::oracle::OracleClient;

use super::open_db;

/// Import an Axio CSV export for the user behind `api_key`
pub async fn cmd_import(
    db_path: &Path,
    file: &Path,
    api_key: &str,
    no_encrypt: bool,
) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;

    let reader = File::open(file).with_context(|| format!("Cannot open {}", file.display()))?;
    let rows = read_axio_csv(reader)?;
    info!("Read {} rows from {}", rows.len(), file.display());

    // The import path never calls the oracle; the mock stands in when no
    // backend is configured
    let oracle = OracleClient::from_env().unwrap_or_else(OracleClient::mock);
    let pipeline = IngestionPipeline::new(db, oracle, CurrencyConverter::from_env());

    let report = pipeline.import_rows(api_key, &rows).await?;

    println!(
        "Imported {} of {} rows ({} skipped, {} errors)",
        report.inserted, report.total, report.skipped, report.errors
    );
    for detail in &report.error_details {
        println!("  {}", detail);
    }
    Ok(())
}
