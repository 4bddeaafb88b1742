//! Optional coverage extraction.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::report::JestReport;

/// Uncovered statement lines, keyed by file path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CoverageReport {
    /// Sorted start lines of the statements that never ran.
    pub uncovered_lines: BTreeMap<String, Vec<u32>>,
}

/// Turns a run's coverage data into a [`CoverageReport`].
///
/// The session does not feed coverage back to the model yet; the hook only
/// decides what ends up in [`super::RunOutcome::coverage`].
pub trait CoverageHook: Send + Sync {
    /// Whether the runner should ask the test framework for coverage.
    fn wants_coverage(&self) -> bool {
        false
    }

    /// Extracts coverage from a finished run.
    fn collect(&self, report: &JestReport) -> Option<CoverageReport>;
}

/// Collects nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCoverage;

impl CoverageHook for NoCoverage {
    #[inline]
    fn collect(&self, _report: &JestReport) -> Option<CoverageReport> {
        None
    }
}

/// Collects the start line of every statement with a hit count of zero.
#[derive(Clone, Copy, Debug, Default)]
pub struct UncoveredLines;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileCoverage {
    #[serde(default)]
    s: BTreeMap<String, u64>,
    #[serde(default)]
    statement_map: BTreeMap<String, Span>,
}

#[derive(Deserialize)]
struct Span {
    start: Position,
}

#[derive(Deserialize)]
struct Position {
    line: u32,
}

impl CoverageHook for UncoveredLines {
    #[inline]
    fn wants_coverage(&self) -> bool {
        true
    }

    fn collect(&self, report: &JestReport) -> Option<CoverageReport> {
        let coverage_map = report.coverage_map.as_ref()?;
        let files: BTreeMap<String, FileCoverage> =
            match serde_json::from_value(coverage_map.clone()) {
                Ok(files) => files,
                Err(err) => {
                    warn!("ignoring malformed coverage data: {err}");
                    return None;
                }
            };

        let mut uncovered_lines = BTreeMap::new();
        for (path, file) in files {
            let mut lines: Vec<u32> = file
                .s
                .iter()
                .filter(|(_, count)| **count == 0)
                .filter_map(|(id, _)| file.statement_map.get(id))
                .map(|span| span.start.line)
                .collect();
            if lines.is_empty() {
                continue;
            }
            lines.sort_unstable();
            lines.dedup();
            uncovered_lines.insert(path, lines);
        }
        Some(CoverageReport { uncovered_lines })
    }
}
