// src/ingest.rs - CSV reader for uploaded customer lists
use anyhow::{bail, Context, Result};
use log::info;
use std::path::Path;

use crate::models::core::RawRecord;

/// The upload schema. All six columns are required; a file missing any of
/// them is rejected before matching begins.
pub const REQUIRED_COLUMNS: [&str; 6] = [
    "companyName",
    "companyAddress",
    "companyAddress2",
    "companyCity",
    "companyState",
    "companyZipCode",
];

/// Read an uploaded customer list. Column order is free; blank
/// companyAddress2 values become None.
pub fn load_uploaded_records(path: &Path) -> Result<Vec<RawRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open upload file {}", path.display()))?;

    let headers = reader
        .headers()
        .context("Failed to read upload header row")?;
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .filter(|required| !headers.iter().any(|h| h == **required))
        .copied()
        .collect();
    if !missing.is_empty() {
        bail!("Missing required columns: {}", missing.join(", "));
    }

    let mut records = Vec::new();
    for (i, row) in reader.deserialize::<RawRecord>().enumerate() {
        let mut record = row.with_context(|| format!("Failed to parse upload row {}", i + 1))?;
        // Treat a blank address line 2 as absent.
        if record
            .company_address2
            .as_deref()
            .map(str::trim)
            .map_or(false, str::is_empty)
        {
            record.company_address2 = None;
        }
        records.push(record);
    }

    info!(
        "Loaded {} uploaded records from {}",
        records.len(),
        path.display()
    );
    Ok(records)
}
