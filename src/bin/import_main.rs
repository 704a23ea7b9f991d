use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use serde_json::Value;
use std::env;
use std::path::{Path, PathBuf};

use customization_cases::case_store;
use customization_cases::db_connect;
use customization_cases::env_loader;
use customization_cases::errors::CaseError;
use customization_cases::excel_reader;
use customization_cases::models::{NewCase, RawRecord};

/// Validates every row up front so a bad sheet aborts before anything is written.
fn parse_rows(rows: Vec<Value>) -> Result<Vec<RawRecord>> {
    let mut records = Vec::with_capacity(rows.len());
    for (index, row) in rows.into_iter().enumerate() {
        let payload: NewCase = serde_json::from_value(row)
            .with_context(|| format!("Row {} is not a JSON object", index + 1))?;
        match payload.into_record() {
            Ok(record) => records.push(record),
            Err(CaseError::MissingCaseId) => {
                warn!("Skipping row {}: no case id", index + 1);
            }
            Err(e) => return Err(e).with_context(|| format!("Row {} is invalid", index + 1)),
        }
    }
    Ok(records)
}

/// Reads raw rows from a JSON array file or from a sheet of a workbook.
fn read_rows(input: &Path, sheet: &str) -> Result<Vec<Value>> {
    let is_json = input
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if !is_json {
        return excel_reader::read_sheet_rows(input, sheet);
    }
    info!("Reading records from {:?}", input);
    let contents = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {:?}", input))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("{:?} must contain a JSON array of records", input))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_loader::load_env();
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let replace = args.iter().any(|a| a == "--replace");
    let sheet = args
        .iter()
        .find_map(|a| a.strip_prefix("--sheet="))
        .unwrap_or(excel_reader::DEFAULT_SHEET);
    let Some(input) = args.iter().find(|a| !a.starts_with("--")).map(PathBuf::from) else {
        bail!("usage: cases-import <cases.xlsx | records.json> [--sheet=<name>] [--replace]");
    };

    let rows = read_rows(&input, sheet)?;
    let records = parse_rows(rows)?;
    info!("{} rows passed validation", records.len());

    let pool = db_connect::connect().await?;
    let schema_client = pool.get().await?;
    case_store::ensure_schema(&schema_client).await?;
    drop(schema_client);

    let progress = ProgressBar::new(records.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} {msg}")?.progress_chars("=> "),
    );
    let imported = case_store::import_records(&pool, &records, replace, |record| {
        progress.set_message(record.case_id.clone());
        progress.inc(1);
    })
    .await?;
    progress.finish_with_message("done");

    println!("\n✅ Imported {} records from {:?}", imported, input);
    Ok(())
}
