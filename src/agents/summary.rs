//! Log agent - summarizes a raw log excerpt into an incident summary.

use crate::error::{Result, TriageError};
use crate::llm::LlmClient;

pub fn summary_prompt(log_text: &str) -> String {
    format!(
        "Analyze the following system log and summarize any error. \
         Name the failing component, the error messages, and when they started.\n\n{}",
        log_text.trim()
    )
}

/// One model call; an empty log is rejected before the model is contacted.
pub async fn summarize<L: LlmClient + ?Sized>(llm: &L, log_text: &str) -> Result<String> {
    if log_text.trim().is_empty() {
        return Err(TriageError::Config("log file is empty".to_string()));
    }

    log::info!("Summarizing {} bytes of log", log_text.len());
    let summary = llm.chat(&summary_prompt(log_text)).await?;
    Ok(summary.trim().to_string())
}
