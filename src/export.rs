use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::table::Column;
use crate::types::DeviceRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    /// `.json` selects JSON; anything else is CSV.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ExportFormat::Json,
            _ => ExportFormat::Csv,
        }
    }
}

/// Header row followed by one `IP Address, MAC Address, Operating System` row per record.
pub fn write_csv<W: Write>(writer: W, records: &[DeviceRecord]) -> Result<()> {
    let mut w = csv::Writer::from_writer(writer);
    w.write_record(Column::ALL.iter().map(|c| c.header()))?;
    for record in records {
        w.write_record(Column::ALL.iter().map(|c| c.cell(record)))?;
    }
    w.flush()?;
    Ok(())
}

pub fn to_csv_string(records: &[DeviceRecord]) -> Result<String> {
    let mut buf = Vec::new();
    write_csv(&mut buf, records)?;
    String::from_utf8(buf).context("CSV output is not UTF-8")
}

pub fn write_json<W: Write>(writer: W, records: &[DeviceRecord]) -> Result<()> {
    serde_json::to_writer_pretty(writer, records)?;
    Ok(())
}

/// Write `records` to `path`, choosing the format from its extension.
pub fn export_to_path(path: &Path, records: &[DeviceRecord]) -> Result<ExportFormat> {
    let format = ExportFormat::from_path(path);
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    match format {
        ExportFormat::Csv => write_csv(file, records)?,
        ExportFormat::Json => write_json(file, records)?,
    }
    Ok(format)
}
