//! Presentation-side copy of a session's results, rebuilt from [`ScanEvent`]s.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::net::IpAddr;
use std::str::FromStr;

use crate::error::ScanError;
use crate::session::ScanEvent;
use crate::types::{DeviceRecord, ScanSummary, UNKNOWN};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Ip,
    Mac,
    Os,
}

impl Column {
    pub const ALL: [Column; 3] = [Column::Ip, Column::Mac, Column::Os];

    pub fn header(self) -> &'static str {
        match self {
            Column::Ip => "IP Address",
            Column::Mac => "MAC Address",
            Column::Os => "Operating System",
        }
    }

    pub fn cell(self, record: &DeviceRecord) -> &str {
        match self {
            Column::Ip => &record.device.address,
            Column::Mac => &record.device.hardware_address,
            Column::Os => &record.fingerprint,
        }
    }
}

impl FromStr for Column {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ip" | "address" => Ok(Column::Ip),
            "mac" | "hardware_address" => Ok(Column::Mac),
            "os" | "fingerprint" => Ok(Column::Os),
            other => Err(format!("unknown column: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultTable {
    range: Option<String>,
    /// Canonical discovery order; updates are applied by index.
    records: Vec<DeviceRecord>,
    running: bool,
    status: String,
    summary: Option<ScanSummary>,
    error: Option<ScanError>,
}

impl Default for ResultTable {
    fn default() -> Self {
        Self {
            range: None,
            records: Vec::new(),
            running: false,
            status: String::from("Ready"),
            summary: None,
            error: None,
        }
    }
}

impl ResultTable {
    /// Clear everything for a new scan of `range`.
    pub fn begin(&mut self, range: impl Into<String>) {
        *self = Self {
            range: Some(range.into()),
            running: true,
            status: String::from("Scanning…"),
            ..Self::default()
        };
    }

    pub fn apply(&mut self, event: &ScanEvent) {
        match event {
            ScanEvent::Discovered { records } => {
                self.records = records.clone();
                self.status = format!("Resolving OS for {} devices…", records.len());
            }
            ScanEvent::FingerprintUpdated { index, fingerprint } => {
                if let Some(record) = self.records.get_mut(*index) {
                    record.fingerprint = fingerprint.clone();
                }
            }
            ScanEvent::Completed { summary } => {
                for record in self.records.iter_mut().filter(|r| r.is_pending()) {
                    record.fingerprint = UNKNOWN.to_string();
                }
                self.status = completion_text(summary);
                self.summary = Some(summary.clone());
                self.running = false;
            }
            ScanEvent::Failed { error } => {
                self.status = format!("Scan failed: {error}");
                self.error = Some(error.clone());
                self.running = false;
            }
        }
    }

    pub fn range(&self) -> Option<&str> {
        self.range.as_deref()
    }

    pub fn records(&self) -> &[DeviceRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn status_text(&self) -> &str {
        &self.status
    }

    pub fn summary(&self) -> Option<&ScanSummary> {
        self.summary.as_ref()
    }

    pub fn error(&self) -> Option<&ScanError> {
        self.error.as_ref()
    }

    pub fn resolved_count(&self) -> usize {
        self.records.iter().filter(|r| !r.is_pending()).count()
    }

    /// Records ordered by `column`, each paired with its canonical index.
    ///
    /// Addresses compare numerically when both parse; ties keep discovery order.
    pub fn sorted(&self, column: Column, descending: bool) -> Vec<(usize, &DeviceRecord)> {
        let mut rows: Vec<(usize, &DeviceRecord)> = self.records.iter().enumerate().collect();
        rows.sort_by(|(_, a), (_, b)| {
            let ord = compare_cells(column, a, b);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        });
        rows
    }
}

fn compare_cells(column: Column, a: &DeviceRecord, b: &DeviceRecord) -> Ordering {
    let (x, y) = (column.cell(a), column.cell(b));
    if column == Column::Ip {
        if let (Ok(x), Ok(y)) = (x.parse::<IpAddr>(), y.parse::<IpAddr>()) {
            return x.cmp(&y);
        }
    }
    x.cmp(y)
}

fn completion_text(summary: &ScanSummary) -> String {
    if summary.cancelled {
        format!(
            "{} devices found • Cancelled after {:.1}s ({} fingerprinted)",
            summary.device_count, summary.elapsed_secs, summary.resolved_count
        )
    } else if summary.device_count == 0 {
        String::from("No devices found.")
    } else {
        format!(
            "{} devices found • Completed in {:.1}s",
            summary.device_count, summary.elapsed_secs
        )
    }
}
