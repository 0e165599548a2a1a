//! Per-step CSV exports of successful row sets.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::datasource::RowSet;
use crate::diagnose::{Attempt, StepEvent, StepEventSink, StepRecord};
use crate::error::{Result, TriageError};

/// Writes `step_<n>.csv` (or `step_<n>_correction.csv`) for every step that returned rows.
#[derive(Debug)]
pub struct CsvExporter {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl CsvExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            written: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Files written so far, in step order
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    pub fn file_name(record: &StepRecord) -> String {
        match record.attempt {
            Attempt::Primary => format!("step_{}.csv", record.step),
            Attempt::Correction => format!("step_{}_correction.csv", record.step),
        }
    }

    fn export(&mut self, record: &StepRecord, rows: &RowSet) -> Result<()> {
        let path = self.dir.join(Self::file_name(record));
        fs::write(&path, to_csv(rows)?)?;
        log::debug!("Exported {} row(s) to {}", rows.len(), path.display());
        self.written.push(path);
        Ok(())
    }
}

impl StepEventSink for CsvExporter {
    fn on_event(&mut self, event: &StepEvent) -> Result<()> {
        match event {
            StepEvent::StatementExecuted { record } => match record.rows() {
                Some(rows) => self.export(record, rows),
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }
}

/// Header row from the column list, then one line per row.
pub fn to_csv(rows: &RowSet) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record(&rows.columns)
        .map_err(|e| TriageError::Report(format!("CSV write failed: {}", e)))?;

    for row in &rows.rows {
        let fields: Vec<String> = rows
            .columns
            .iter()
            .map(|column| row.get(column).map(cell).unwrap_or_default())
            .collect();
        writer
            .write_record(&fields)
            .map_err(|e| TriageError::Report(format!("CSV write failed: {}", e)))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| TriageError::Report(format!("CSV flush failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| TriageError::Report(format!("CSV is not UTF-8: {}", e)))
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
