//! Decision agent - picks which specialist analyses run for an incident.

use serde::{Deserialize, Serialize};

use crate::diagnose::sanitize::strip_fences;
use crate::error::Result;
use crate::llm::LlmClient;

/// Reason recorded when the model reply is not a usable decision
pub const FALLBACK_REASON: &str = "Failed to parse decision";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    #[serde(default)]
    pub run_code_agent: bool,
    #[serde(default)]
    pub run_db_agent: bool,
    #[serde(default)]
    pub reason: String,
}

impl Decision {
    /// Neither agent runs
    pub fn fallback() -> Self {
        Self {
            run_code_agent: false,
            run_db_agent: false,
            reason: FALLBACK_REASON.to_string(),
        }
    }

    /// Parse a model reply, tolerating code fences and surrounding prose.
    pub fn parse(text: &str) -> Self {
        let cleaned = strip_fences(text);
        let cleaned = cleaned.trim();

        if let Ok(decision) = serde_json::from_str::<Decision>(cleaned) {
            return decision;
        }

        // First `{` to last `}` when the object is wrapped in prose
        let embedded = match (cleaned.find('{'), cleaned.rfind('}')) {
            (Some(start), Some(end)) if start < end => serde_json::from_str::<Decision>(&cleaned[start..=end]).ok(),
            _ => None,
        };

        embedded.unwrap_or_else(|| {
            log::warn!("Could not parse decision from model reply: {}", cleaned);
            Self::fallback()
        })
    }
}

pub fn decision_prompt(log_summary: &str) -> String {
    format!(
        "You are an orchestration decision-maker.\n\
         Here is the log analysis summary:\n{}\n\n\
         Decide which agents should be executed:\n\
         - code_agent (for code-related issues)\n\
         - db_agent (for database-related issues)\n\n\
         Return ONLY a valid JSON object (no extra text, no markdown, no explanation), in this exact format:\n\
         {{\"run_code_agent\": true/false, \"run_db_agent\": true/false, \"reason\": \"short reason\"}}",
        log_summary.trim()
    )
}

pub async fn decide<L: LlmClient + ?Sized>(llm: &L, log_summary: &str) -> Result<Decision> {
    let reply = llm.chat(&decision_prompt(log_summary)).await?;
    let decision = Decision::parse(&reply);
    log::info!(
        "Decision: code={} db={} ({})",
        decision.run_code_agent,
        decision.run_db_agent,
        decision.reason
    );
    Ok(decision)
}
