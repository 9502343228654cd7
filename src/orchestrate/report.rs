//! Run summaries: the flat text listing and the JSON report.

use std::fmt::Write as _;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::Serialize;

use super::consolidate::{Ambiguity, Consolidated};
use super::run::{Run, RunOrigin};
use crate::mutation::{Choice, Conflict};

pub const SUMMARY_FILE: &str = "equivalence_results.txt";
pub const REPORT_FILE: &str = "equivalence_results.json";

/// `<wrapper>: PASS|FAIL` per run, in submission order. Unresolved runs
/// are left out.
pub fn render_summary(runs: &[Run]) -> String {
    let mut out = String::new();
    for run in runs {
        if let Some(verdict) = run.verdict() {
            let _ = writeln!(out, "{}: {}", run.wrapper, verdict);
        }
    }
    out
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub module: String,
    pub parameters: Vec<(String, i64)>,
    pub sites: usize,
    pub select_count: usize,
    pub runs: Vec<RunRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consolidation: Option<ConsolidationRecord>,
    pub mux_conflicts: Vec<Conflict>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub name: String,
    pub wrapper: String,
    pub origin: RunOrigin,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub time_ms: u64,
}

impl From<&Run> for RunRecord {
    fn from(run: &Run) -> Self {
        Self {
            name: run.name.clone(),
            wrapper: run.wrapper.clone(),
            origin: run.origin.clone(),
            status: run.state().to_string(),
            exit_code: run.exit_code(),
            time_ms: u64::try_from(run.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationRecord {
    pub module: String,
    pub applied: Vec<Choice>,
    pub ambiguous: Vec<Ambiguity>,
    pub conflicts: Vec<Conflict>,
}

impl From<&Consolidated> for ConsolidationRecord {
    fn from(consolidated: &Consolidated) -> Self {
        Self {
            module: consolidated.module.clone(),
            applied: consolidated.applied.clone(),
            ambiguous: consolidated.ambiguous.clone(),
            conflicts: consolidated.conflicts.clone(),
        }
    }
}

impl Report {
    /// Write the report as JSON to a file
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self).map_err(std::io::Error::other)
    }
}
