use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use super::aliases::ColumnAliases;
use super::runners::{ImportReport, RunnerRegistry};
use super::types::RunnerRow;

/// Read runner rows from CSV, mapping headers through `aliases`.
///
/// Only the header shape can fail the whole read; per-row problems are left
/// for `RunnerRegistry::load` to report.
pub fn read_csv_rows<R: Read>(reader: R, aliases: &ColumnAliases) -> Result<Vec<RunnerRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = reader.headers().context("Failed to read CSV header")?.clone();
    let columns = aliases.resolve(headers.iter())?;

    let mut rows = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read CSV row {}", index + 2))?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        let field = |idx: usize| record.get(idx).unwrap_or("").to_string();
        rows.push(RunnerRow {
            // header is line 1
            line: index + 2,
            bib: field(columns.bib),
            name: field(columns.name),
            team: field(columns.team),
            rfid: columns.rfid.map(field),
        });
    }
    Ok(rows)
}

/// Import a CSV file into `registry`, logging every skipped row
pub fn import_csv(
    path: &Path,
    aliases: &ColumnAliases,
    registry: &mut RunnerRegistry,
) -> Result<ImportReport> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open runner CSV at {}", path.display()))?;
    let rows = read_csv_rows(file, aliases)
        .with_context(|| format!("Failed to import {}", path.display()))?;

    let report = registry.load(rows);
    for warning in &report.warnings {
        warn!("skipped runner row: {}", warning);
    }
    info!(
        path = %path.display(),
        loaded = report.loaded,
        skipped = report.warnings.len(),
        "runner import finished"
    );
    Ok(report)
}
