//! Terminal values of a diagnostic run.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::history::History;

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionReason {
    /// The model answered DONE
    ModelDeclaredDone,
    /// The step budget ran out
    BudgetExhausted,
    /// The model could not be reached or gave nothing usable
    ModelUnavailable,
    /// The data source could not be opened, or was lost mid-run
    ConnectionFailed,
    /// No connection string; no queries were attempted
    NoDataSource,
}

impl CompletionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionReason::ModelDeclaredDone => "model-declared-done",
            CompletionReason::BudgetExhausted => "budget-exhausted",
            CompletionReason::ModelUnavailable => "model-unavailable",
            CompletionReason::ConnectionFailed => "connection-failed",
            CompletionReason::NoDataSource => "no-data-source",
        }
    }

    /// Completions where the investigation was cut short by a fault
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            CompletionReason::ModelUnavailable | CompletionReason::ConnectionFailed
        )
    }
}

impl fmt::Display for CompletionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Produced exactly once per run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopOutcome {
    /// Final natural-language diagnosis
    pub diagnosis: String,
    pub history: History,
    pub reason: CompletionReason,
    /// Primary steps performed
    pub steps: u32,
    /// Fault detail for degraded completions
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_strings() {
        assert_eq!(CompletionReason::ModelDeclaredDone.to_string(), "model-declared-done");
        assert_eq!(CompletionReason::BudgetExhausted.as_str(), "budget-exhausted");
        assert_eq!(
            serde_json::to_string(&CompletionReason::ConnectionFailed).unwrap(),
            "\"connection-failed\""
        );
    }

    #[test]
    fn test_degraded_reasons() {
        assert!(CompletionReason::ModelUnavailable.is_degraded());
        assert!(CompletionReason::ConnectionFailed.is_degraded());
        assert!(!CompletionReason::BudgetExhausted.is_degraded());
        assert!(!CompletionReason::ModelDeclaredDone.is_degraded());
        assert!(!CompletionReason::NoDataSource.is_degraded());
    }
}
