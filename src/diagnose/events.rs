//! Per-step events emitted by the diagnostic loop.
//!
//! Collaborators that persist artifacts (audit log, CSV exports) implement
//! [`StepEventSink`] and see every prompt, response, executed statement and
//! the termination, without re-deriving loop state.

use std::fmt;

use super::history::StepRecord;
use super::outcome::CompletionReason;
use crate::error::Result;

/// What a model call was for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Proposal,
    Correction,
    Diagnosis,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Proposal => "proposal",
            Purpose::Correction => "correction",
            Purpose::Diagnosis => "diagnosis",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepEvent {
    RunStarted {
        budget: u32,
        top_k: usize,
    },
    ContextRetrieved {
        step: u32,
        snippets: Vec<String>,
    },
    RetrievalDegraded {
        step: u32,
        reason: String,
    },
    ModelExchange {
        step: u32,
        purpose: Purpose,
        prompt: String,
        response: std::result::Result<String, String>,
    },
    StatementExecuted {
        record: StepRecord,
    },
    CorrectionSkipped {
        step: u32,
        statement: String,
        reason: String,
    },
    RunTerminated {
        reason: CompletionReason,
        steps: u32,
        records: usize,
    },
}

impl fmt::Display for StepEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepEvent::RunStarted { budget, top_k } => {
                write!(f, "run started (budget={}, top_k={})", budget, top_k)
            }
            StepEvent::ContextRetrieved { step, snippets } => {
                write!(f, "step {}: retrieved {} context snippet(s)", step, snippets.len())
            }
            StepEvent::RetrievalDegraded { step, reason } => {
                write!(f, "step {}: retrieval degraded: {}", step, reason)
            }
            StepEvent::ModelExchange {
                step,
                purpose,
                prompt,
                response,
            } => {
                writeln!(f, "step {}: {} prompt:\n{}", step, purpose.as_str(), prompt)?;
                match response {
                    Ok(text) => write!(f, "step {}: {} response:\n{}", step, purpose.as_str(), text),
                    Err(err) => write!(f, "step {}: {} model error: {}", step, purpose.as_str(), err),
                }
            }
            StepEvent::StatementExecuted { record } => match record.rows() {
                Some(rows) => write!(
                    f,
                    "step {} ({}): executed: {}\nresult: {} row(s)",
                    record.step,
                    record.attempt.as_str(),
                    record.statement,
                    rows.len()
                ),
                None => write!(
                    f,
                    "step {} ({}): error executing: {}\nerror: {}",
                    record.step,
                    record.attempt.as_str(),
                    record.statement,
                    record.error().unwrap_or_default()
                ),
            },
            StepEvent::CorrectionSkipped {
                step,
                statement,
                reason,
            } => write!(f, "step {}: correction skipped ({}): {}", step, reason, statement),
            StepEvent::RunTerminated {
                reason,
                steps,
                records,
            } => write!(
                f,
                "run terminated: {} after {} step(s), {} record(s)",
                reason, steps, records
            ),
        }
    }
}

/// Receives loop events. Errors are logged by the loop and otherwise ignored.
pub trait StepEventSink {
    fn on_event(&mut self, event: &StepEvent) -> Result<()>;
}

/// Keeps every event in memory
impl StepEventSink for Vec<StepEvent> {
    fn on_event(&mut self, event: &StepEvent) -> Result<()> {
        self.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnose::history::Attempt;

    #[test]
    fn test_display_statement_error() {
        let event = StepEvent::StatementExecuted {
            record: StepRecord::failure(3, Attempt::Primary, "SELECT x", "no such column: x"),
        };
        let text = event.to_string();
        assert!(text.contains("step 3 (primary): error executing: SELECT x"));
        assert!(text.contains("error: no such column: x"));
    }

    #[test]
    fn test_display_model_error() {
        let event = StepEvent::ModelExchange {
            step: 2,
            purpose: Purpose::Proposal,
            prompt: "what next?".to_string(),
            response: Err("API error 503".to_string()),
        };
        assert!(event.to_string().ends_with("step 2: proposal model error: API error 503"));
    }

    #[test]
    fn test_vec_sink_collects() {
        let mut sink: Vec<StepEvent> = Vec::new();
        sink.on_event(&StepEvent::RunStarted { budget: 10, top_k: 3 }).unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].to_string(), "run started (budget=10, top_k=3)");
    }
}
