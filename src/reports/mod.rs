//! Readers for the JSON documents written by pytest-json-report and coverage.py.
//!
//! The parsers only translate reports into storage inputs; they never touch
//! the database.

pub mod coverage;
pub mod pytest;

pub use coverage::FileCoverage;
pub use pytest::PytestReport;

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::error::ReportResult;

/// Read and decode a JSON report from disk.
pub fn load_report(path: &Path) -> ReportResult<Value> {
    let raw = std::fs::read_to_string(path)?;
    let value = serde_json::from_str(&raw)?;
    debug!(path = %path.display(), bytes = raw.len(), "Report loaded");
    Ok(value)
}
