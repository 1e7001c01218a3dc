use std::collections::BTreeSet;

use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ReportError, ReportResult};
use crate::storage::{BranchInput, CoverageEntry, LineIssueInput};

/// Coverage findings for one measured file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileCoverage {
    pub file_path: String,
    pub percent_covered: f64,
    pub entries: Vec<CoverageEntry>,
}

impl FileCoverage {
    /// Entries that still need a test. Excluded lines are not counted.
    pub fn actionable(&self) -> usize {
        self.entries.iter().filter(|entry| !entry.is_excluded()).count()
    }

    /// Nothing missing; saving it clears whatever an earlier run recorded.
    pub fn is_clean(&self) -> bool {
        self.actionable() == 0
    }
}

/// Translate a coverage.py JSON report into per-file storage entries.
///
/// Missing lines become line issues. Excluded lines are kept as excluded
/// line issues for reference but never count as work. A missing branch is nested under its source line when that line
/// is itself missing, and stored standalone otherwise.
pub fn parse_report(report: &Value) -> ReportResult<Vec<FileCoverage>> {
    let files = report
        .get("files")
        .and_then(Value::as_object)
        .ok_or_else(|| ReportError::InvalidFormat {
            message: "'files' object not found in coverage report".to_string(),
        })?;

    let mut result = Vec::with_capacity(files.len());
    for (file_path, data) in files {
        if !data.is_object() {
            debug!(path = %file_path, "Skipping malformed coverage entry");
            continue;
        }
        result.push(parse_file(file_path, data));
    }

    let with_issues = result.iter().filter(|f| !f.is_clean()).count();
    info!(files = result.len(), with_issues, "Coverage report parsed");
    Ok(result)
}

fn line_numbers(data: &Value, key: &str) -> BTreeSet<i64> {
    data.get(key)
        .and_then(Value::as_array)
        .map(|lines| lines.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default()
}

fn parse_file(file_path: &str, data: &Value) -> FileCoverage {
    let missing = line_numbers(data, "missing_lines");
    let excluded = line_numbers(data, "excluded_lines");

    let mut lines: Vec<LineIssueInput> = missing
        .iter()
        .map(|&line_number| LineIssueInput {
            line_number,
            is_excluded: false,
            branches: Vec::new(),
        })
        .collect();
    let mut standalone = Vec::new();

    for branch in missing_branches(data) {
        match lines
            .iter_mut()
            .find(|line| line.line_number == branch.source_line)
        {
            Some(line) => line.branches.push(branch),
            None => standalone.push(branch),
        }
    }

    let mut entries: Vec<CoverageEntry> = lines
        .into_iter()
        .map(CoverageEntry::CoverageIssue)
        .collect();
    entries.extend(excluded.iter().map(|&line_number| {
        CoverageEntry::CoverageIssue(LineIssueInput {
            line_number,
            is_excluded: true,
            branches: Vec::new(),
        })
    }));
    entries.extend(standalone.into_iter().map(CoverageEntry::CoverageBranch));

    let percent_covered = data
        .get("summary")
        .and_then(|summary| summary.get("percent_covered"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0);

    FileCoverage {
        file_path: file_path.to_string(),
        percent_covered,
        entries,
    }
}

/// `missing_branches` is a list of `[from, to]`; a negative `to` exits the scope.
fn missing_branches(data: &Value) -> Vec<BranchInput> {
    let Some(pairs) = data.get("missing_branches").and_then(Value::as_array) else {
        return Vec::new();
    };

    pairs
        .iter()
        .filter_map(|pair| {
            let pair = pair.as_array()?;
            let from = pair.first()?.as_i64()?;
            let to = pair.get(1)?.as_i64()?;
            Some(if to < 0 {
                BranchInput {
                    source_line: from,
                    end_line: 0,
                    condition: format!("line {} didn't exit", from),
                    branch_type: "exit".to_string(),
                }
            } else {
                BranchInput {
                    source_line: from,
                    end_line: to,
                    condition: format!("line {} didn't jump to line {}", from, to),
                    branch_type: "jump".to_string(),
                }
            })
        })
        .collect()
}
