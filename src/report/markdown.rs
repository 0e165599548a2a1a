//! Markdown analysis report.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::agents::Decision;
use crate::diagnose::{LoopOutcome, StepOutcome};

const NOT_EXECUTED: &str = "Not Executed";

/// Everything a report is rendered from
#[derive(Debug, Clone, Copy)]
pub struct ReportInput<'a> {
    pub log_summary: &'a str,
    pub decision: &'a Decision,
    pub code_analysis: Option<&'a str>,
    pub db_outcome: Option<&'a LoopOutcome>,
}

pub fn report_file_name(at: &DateTime<Local>) -> String {
    format!("analysis_report_{}.md", at.format("%Y%m%d_%H%M%S"))
}

pub fn render(input: &ReportInput<'_>, at: &DateTime<Local>) -> String {
    let mut out = String::new();
    out.push_str("# Incident Analysis Report\n\n");
    out.push_str(&format!("_Generated {}_\n\n", at.format("%Y-%m-%d %H:%M:%S")));

    out.push_str("## Log Summary\n\n");
    out.push_str(input.log_summary.trim());
    out.push_str("\n\n");

    out.push_str("## Decision\n\n```json\n");
    out.push_str(&serde_json::to_string_pretty(input.decision).unwrap_or_default());
    out.push_str("\n```\n\n");

    out.push_str("## Code Analysis\n\n");
    out.push_str(input.code_analysis.map(str::trim).unwrap_or(NOT_EXECUTED));
    out.push_str("\n\n");

    out.push_str("## DB Analysis\n\n");
    match input.db_outcome {
        None => out.push_str(&format!("{}\n", NOT_EXECUTED)),
        Some(outcome) => {
            out.push_str(outcome.diagnosis.trim());
            out.push_str("\n\n");
            out.push_str(&format!(
                "Completion: `{}` after {} step(s)",
                outcome.reason, outcome.steps
            ));
            if let Some(note) = &outcome.note {
                out.push_str(&format!(" ({})", note));
            }
            out.push_str("\n\n");
            render_history(&mut out, outcome);
        }
    }

    out
}

fn render_history(out: &mut String, outcome: &LoopOutcome) {
    if outcome.history.is_empty() {
        return;
    }
    out.push_str("### Queries\n\n");
    out.push_str("| Step | Attempt | Statement | Result |\n");
    out.push_str("|------|---------|-----------|--------|\n");
    for record in &outcome.history {
        let result = match &record.outcome {
            StepOutcome::Rows(rows) if rows.truncated => format!("{} rows (truncated)", rows.len()),
            StepOutcome::Rows(rows) => format!("{} rows", rows.len()),
            StepOutcome::Error(message) => format!("error: {}", message),
        };
        out.push_str(&format!(
            "| {} | {} | `{}` | {} |\n",
            record.step,
            record.attempt.as_str(),
            table_cell(&record.statement),
            table_cell(&result)
        ));
    }
}

fn table_cell(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").replace('|', "\\|")
}

/// Writes reports into one directory
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Render and write; returns the report path
    pub fn write(&self, input: &ReportInput<'_>) -> crate::error::Result<PathBuf> {
        let now = Local::now();
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(report_file_name(&now));
        fs::write(&path, render(input, &now))?;
        log::info!("Report written to {}", path.display());
        Ok(path)
    }
}
