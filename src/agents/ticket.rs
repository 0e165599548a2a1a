//! Ticket agent - drafts an issue from the analysis results.

use serde::{Deserialize, Serialize};

use super::decision::Decision;
use crate::error::Result;
use crate::llm::LlmClient;

/// Analysis results a ticket is drafted from
#[derive(Debug, Clone, Copy)]
pub struct TicketInput<'a> {
    pub log_summary: &'a str,
    pub decision: &'a Decision,
    pub code_analysis: Option<&'a str>,
    pub db_analysis: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketDraft {
    /// Single-line summary, 90 to 100 words
    pub summary: String,
    pub description: String,
}

impl TicketDraft {
    pub fn to_markdown(&self) -> String {
        format!("# {}\n\n{}\n", self.summary, self.description.trim())
    }
}

pub fn description_prompt(input: &TicketInput<'_>) -> String {
    let decision = serde_json::to_string(input.decision).unwrap_or_default();
    format!(
        "You are a ticket creation assistant for operational incidents.\n\n\
         Format:\n\
         **Summary:** [Short summary]\n\
         **Steps to Reproduce:**\n1. ...\n\
         **Observed Behavior:**\n...\n\
         **Expected Behavior:**\n...\n\
         **Root Cause Analysis:**\n...\n\
         **Suggested Fix:**\n...\n\n\
         Input:\n\
         Log Summary: {}\n\
         Decision: {}\n\
         Code Analysis: {}\n\
         DB Result: {}",
        input.log_summary.trim(),
        decision,
        input.code_analysis.unwrap_or("Not executed"),
        input.db_analysis.unwrap_or("Not executed"),
    )
}

pub fn summary_prompt(log_summary: &str) -> String {
    format!(
        "Rewrite the following text as a concise summary of 90 to 100 words, \
         preserving all key information and meaning:\n\n{}",
        single_line(log_summary)
    )
}

/// Collapse all whitespace runs (including newlines) to single spaces
fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Two model calls: the description, then the rewritten summary.
pub async fn draft_ticket<L: LlmClient + ?Sized>(llm: &L, input: &TicketInput<'_>) -> Result<TicketDraft> {
    let description = llm.chat(&description_prompt(input)).await?;
    let summary = llm.chat(&summary_prompt(input.log_summary)).await?;

    Ok(TicketDraft {
        summary: single_line(&summary),
        description: description.trim().to_string(),
    })
}
