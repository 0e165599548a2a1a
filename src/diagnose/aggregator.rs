//! Result aggregator - one model call turning the step history into a diagnosis.

use std::sync::Arc;

use super::generator::Exchange;
use super::history::{History, IncidentContext};
use super::outcome::CompletionReason;
use crate::llm::LlmClient;

/// Returned in place of a diagnosis when the model cannot be reached
pub const DEGRADED_DIAGNOSIS: &str = "Diagnosis unavailable: the language model could not be reached.";

pub struct ResultAggregator<L: LlmClient> {
    llm: Arc<L>,
}

impl<L: LlmClient> ResultAggregator<L> {
    pub fn new(llm: Arc<L>) -> Self {
        Self { llm }
    }

    pub fn prompt(&self, context: &IncidentContext, history: &History, reason: CompletionReason) -> String {
        format!(
            "## Log Summary\n\n{summary}\n\n\
             ## Code Analysis\n\n{code}\n\n\
             ## Diagnostic Query Results\n\n{history}\n\n\
             The investigation stopped with status `{reason}`.\n\n\
             Explain the likely root cause, recommend query, index or configuration changes, \
             and provide optimized SQL where it helps. Write for a human DBA.",
            summary = context.log_summary.trim(),
            code = context.code_analysis.as_deref().unwrap_or("Not available").trim(),
            history = history.render(),
            reason = reason,
        )
    }

    /// Never fails; a model error yields [`DEGRADED_DIAGNOSIS`]
    pub async fn aggregate(
        &self,
        context: &IncidentContext,
        history: &History,
        reason: CompletionReason,
    ) -> Exchange<String> {
        let prompt = self.prompt(context, history, reason);
        match self.llm.chat(&prompt).await {
            Ok(text) => Exchange {
                prompt,
                value: text.trim().to_string(),
                response: Ok(text),
            },
            Err(e) => {
                log::warn!("Diagnosis aggregation failed: {}", e);
                Exchange {
                    prompt,
                    response: Err(e.to_string()),
                    value: DEGRADED_DIAGNOSIS.to_string(),
                }
            }
        }
    }
}
