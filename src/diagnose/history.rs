//! Incident context and the append-only step history.

use serde::{Deserialize, Serialize};

use crate::datasource::RowSet;

/// Rows shown per step when history is rendered into a prompt
const PREVIEW_ROWS: usize = 20;

/// Immutable input to one diagnostic run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentContext {
    pub log_summary: String,
    pub code_analysis: Option<String>,
}

impl IncidentContext {
    pub fn new(log_summary: impl Into<String>) -> Self {
        Self {
            log_summary: log_summary.into(),
            code_analysis: None,
        }
    }

    pub fn with_code_analysis(mut self, code_analysis: Option<String>) -> Self {
        self.code_analysis = code_analysis.filter(|c| !c.trim().is_empty());
        self
    }
}

/// Whether a record is the step's first attempt or its single correction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attempt {
    Primary,
    Correction,
}

impl Attempt {
    pub fn as_str(&self) -> &'static str {
        match self {
            Attempt::Primary => "primary",
            Attempt::Correction => "correction",
        }
    }
}

/// Exactly one of rows or an error description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Rows(RowSet),
    Error(String),
}

/// One executed attempt. The statement is the sanitized text the executor received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: u32,
    pub attempt: Attempt,
    pub statement: String,
    pub outcome: StepOutcome,
}

impl StepRecord {
    pub fn success(step: u32, attempt: Attempt, statement: impl Into<String>, rows: RowSet) -> Self {
        Self {
            step,
            attempt,
            statement: statement.into(),
            outcome: StepOutcome::Rows(rows),
        }
    }

    pub fn failure(step: u32, attempt: Attempt, statement: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            step,
            attempt,
            statement: statement.into(),
            outcome: StepOutcome::Error(error.into()),
        }
    }

    pub fn rows(&self) -> Option<&RowSet> {
        match &self.outcome {
            StepOutcome::Rows(rows) => Some(rows),
            StepOutcome::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            StepOutcome::Rows(_) => None,
            StepOutcome::Error(message) => Some(message),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error().is_some()
    }

    /// Prompt-ready text block for this record
    pub fn render(&self) -> String {
        let mut out = format!(
            "### Step {} ({})\nQuery: {}\n",
            self.step,
            self.attempt.as_str(),
            self.statement
        );
        match &self.outcome {
            StepOutcome::Rows(rows) => {
                let preview: Vec<_> = rows.rows.iter().take(PREVIEW_ROWS).collect();
                let json = serde_json::to_string(&preview).unwrap_or_else(|_| "[]".to_string());
                let more = if rows.truncated || rows.len() > PREVIEW_ROWS {
                    ", truncated"
                } else {
                    ""
                };
                out.push_str(&format!("Result ({} rows{}): {}\n", rows.len(), more, json));
            }
            StepOutcome::Error(message) => {
                out.push_str(&format!("Error: {}\n", message));
            }
        }
        out
    }
}

/// Ordered, append-only sequence of step records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    records: Vec<StepRecord>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: StepRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StepRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Full history as prompt text
    pub fn render(&self) -> String {
        if self.records.is_empty() {
            return "(no queries executed yet)".to_string();
        }
        self.records
            .iter()
            .map(StepRecord::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a StepRecord;
    type IntoIter = std::slice::Iter<'a, StepRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::Row;
    use serde_json::Value;

    fn rows(n: usize) -> RowSet {
        let data = (0..n)
            .map(|i| {
                let mut row = Row::new();
                row.insert("id".to_string(), Value::from(i as i64));
                row
            })
            .collect();
        RowSet::new(vec!["id".to_string()], data)
    }

    #[test]
    fn test_context_drops_blank_code_analysis() {
        let ctx = IncidentContext::new("timeouts").with_code_analysis(Some("  ".to_string()));
        assert!(ctx.code_analysis.is_none());
        let ctx = IncidentContext::new("timeouts").with_code_analysis(Some("retry loop".to_string()));
        assert_eq!(ctx.code_analysis.as_deref(), Some("retry loop"));
    }

    #[test]
    fn test_record_accessors() {
        let ok = StepRecord::success(1, Attempt::Primary, "SELECT 1", rows(1));
        assert!(!ok.is_error());
        assert_eq!(ok.rows().map(RowSet::len), Some(1));

        let bad = StepRecord::failure(1, Attempt::Correction, "SELEC 1", "syntax error");
        assert_eq!(bad.error(), Some("syntax error"));
        assert!(bad.rows().is_none());
    }

    #[test]
    fn test_render_success_and_error() {
        let ok = StepRecord::success(2, Attempt::Primary, "SELECT id FROM t", rows(2));
        let text = ok.render();
        assert!(text.contains("### Step 2 (primary)"));
        assert!(text.contains("Query: SELECT id FROM t"));
        assert!(text.contains("Result (2 rows): [{\"id\":0},{\"id\":1}]"));

        let bad = StepRecord::failure(2, Attempt::Correction, "SELECT x", "no such column: x");
        assert!(bad.render().contains("Error: no such column: x"));
    }

    #[test]
    fn test_render_preview_is_capped() {
        let record = StepRecord::success(1, Attempt::Primary, "SELECT id FROM big", rows(50));
        let text = record.render();
        assert!(text.contains("Result (50 rows, truncated)"));
        assert!(!text.contains("\"id\":20"));
    }

    #[test]
    fn test_history_is_ordered() {
        let mut history = History::new();
        assert_eq!(history.render(), "(no queries executed yet)");

        history.push(StepRecord::failure(1, Attempt::Primary, "a", "boom"));
        history.push(StepRecord::success(1, Attempt::Correction, "b", rows(0)));
        history.push(StepRecord::success(2, Attempt::Primary, "c", rows(0)));

        let statements: Vec<&str> = history.iter().map(|r| r.statement.as_str()).collect();
        assert_eq!(statements, vec!["a", "b", "c"]);
        let steps: Vec<u32> = history.iter().map(|r| r.step).collect();
        assert_eq!(steps, vec![1, 1, 2]);
        assert!(history.render().find("Step 1").unwrap() < history.render().find("Step 2").unwrap());
    }
}
