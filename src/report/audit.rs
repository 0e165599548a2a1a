//! Append-only audit log of every prompt, response, statement and error.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::diagnose::{StepEvent, StepEventSink};
use crate::error::Result;

#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    file: File,
}

impl AuditLog {
    /// Open for append, creating parent directories
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// One timestamped entry; multi-line text stays under its timestamp
    pub fn append(&mut self, text: &str) -> Result<()> {
        writeln!(self.file, "[{}] {}", Local::now().format("%Y-%m-%d %H:%M:%S"), text)?;
        Ok(())
    }
}

impl StepEventSink for AuditLog {
    fn on_event(&mut self, event: &StepEvent) -> Result<()> {
        self.append(&event.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnose::{Attempt, Purpose, StepRecord};
    use tempfile::tempdir;

    #[test]
    fn test_appends_events() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("db_agent.log");

        let mut audit = AuditLog::open(&path).unwrap();
        audit
            .on_event(&StepEvent::ModelExchange {
                step: 1,
                purpose: Purpose::Proposal,
                prompt: "what next?".to_string(),
                response: Ok("SELECT 1".to_string()),
            })
            .unwrap();
        audit
            .on_event(&StepEvent::StatementExecuted {
                record: StepRecord::failure(1, Attempt::Primary, "SELECT 1", "database is locked"),
            })
            .unwrap();
        drop(audit);

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with('['));
        assert!(text.contains("step 1: proposal prompt:\nwhat next?"));
        assert!(text.contains("error: database is locked"));
    }

    #[test]
    fn test_reopen_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.log");

        AuditLog::open(&path).unwrap().append("first").unwrap();
        AuditLog::open(&path).unwrap().append("second").unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().next().unwrap().ends_with("first"));
    }
}
