//! Query generator - asks the model what to check next, or how to fix a failed query.

use std::sync::Arc;

use super::history::{History, IncidentContext};
use super::sanitize::strip_fences;
use crate::llm::LlmClient;

/// Text the model answers with when it has seen enough
pub const DONE_SENTINEL: &str = "DONE";

/// Default dialect named in prompts
pub const DEFAULT_DIALECT: &str = "SQLite";

/// What the model asked the loop to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Proposal {
    /// A candidate statement, raw model text (not yet sanitized)
    Statement(String),
    /// The model declared the investigation complete
    Complete,
    /// The model call failed or returned nothing
    Unavailable(String),
}

/// One model call: the prompt, the raw reply (or error text), and what it meant.
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange<T> {
    pub prompt: String,
    pub response: Result<String, String>,
    pub value: T,
}

/// True when the reply is the completion sentinel and nothing else
pub fn is_done(text: &str) -> bool {
    let cleaned = strip_fences(text);
    let trimmed = cleaned.trim().trim_end_matches('.').trim();
    trimmed.eq_ignore_ascii_case(DONE_SENTINEL)
}

/// Map raw model text to a proposal
pub fn interpret(text: &str) -> Proposal {
    if is_done(text) {
        Proposal::Complete
    } else if strip_fences(text).trim().is_empty() {
        Proposal::Unavailable("model returned an empty response".to_string())
    } else {
        Proposal::Statement(text.to_string())
    }
}

pub struct QueryGenerator<L: LlmClient> {
    llm: Arc<L>,
    dialect: String,
}

impl<L: LlmClient> QueryGenerator<L> {
    pub fn new(llm: Arc<L>) -> Self {
        Self {
            llm,
            dialect: DEFAULT_DIALECT.to_string(),
        }
    }

    pub fn with_dialect(mut self, dialect: impl Into<String>) -> Self {
        self.dialect = dialect.into();
        self
    }

    /// Prompt for the next diagnostic statement
    pub fn next_prompt(&self, context: &IncidentContext, snippets: &[String], history: &History) -> String {
        let mut prompt = format!(
            "You are diagnosing a production incident by querying its {} database.\n\n",
            self.dialect
        );

        prompt.push_str("## Incident Summary\n\n");
        prompt.push_str(context.log_summary.trim());
        prompt.push_str("\n\n");

        prompt.push_str("## Code Analysis\n\n");
        prompt.push_str(context.code_analysis.as_deref().unwrap_or("Not available").trim());
        prompt.push_str("\n\n");

        prompt.push_str("## Relevant Findings\n\n");
        if snippets.is_empty() {
            prompt.push_str("None yet.\n");
        } else {
            for snippet in snippets {
                prompt.push_str(&format!("- {}\n", snippet.trim().replace('\n', "\n  ")));
            }
        }
        prompt.push('\n');

        prompt.push_str("## Queries Run So Far\n\n");
        prompt.push_str(&history.render());
        prompt.push_str("\n\n");

        prompt.push_str("## Instructions\n\n");
        prompt.push_str(&format!(
            "Propose the single next read-only {} query that best narrows down the root cause.\n",
            self.dialect
        ));
        prompt.push_str("Do not repeat a query that already ran. Reply with the query only, no explanation.\n");
        prompt.push_str(&format!(
            "If the evidence gathered is sufficient, reply with exactly {}.",
            DONE_SENTINEL
        ));

        prompt
    }

    /// Prompt asking for a fixed version of a failed statement
    pub fn correction_prompt(&self, failed_statement: &str, error_message: &str) -> String {
        format!(
            "The following {dialect} query failed.\n\n\
             ## Failed Query\n\n```sql\n{failed}\n```\n\n\
             ## Error\n\n{error}\n\n\
             Rewrite the query so that it runs successfully against the same database. \
             Do not repeat the same query. Reply with the corrected query only, \
             or {done} if it cannot be fixed.",
            dialect = self.dialect,
            failed = failed_statement,
            error = error_message.trim(),
            done = DONE_SENTINEL,
        )
    }

    /// Ask for the next statement given everything seen so far
    pub async fn propose_next(
        &self,
        context: &IncidentContext,
        snippets: &[String],
        history: &History,
    ) -> Exchange<Proposal> {
        let prompt = self.next_prompt(context, snippets, history);
        self.ask(prompt).await
    }

    /// Ask for a corrected version of a failed statement
    pub async fn propose_correction(&self, failed_statement: &str, error_message: &str) -> Exchange<Proposal> {
        let prompt = self.correction_prompt(failed_statement, error_message);
        self.ask(prompt).await
    }

    async fn ask(&self, prompt: String) -> Exchange<Proposal> {
        match self.llm.chat(&prompt).await {
            Ok(text) => {
                let value = interpret(&text);
                Exchange {
                    prompt,
                    response: Ok(text),
                    value,
                }
            }
            Err(e) => {
                log::warn!("Query generation failed: {}", e);
                Exchange {
                    prompt,
                    response: Err(e.to_string()),
                    value: Proposal::Unavailable(e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnose::history::{Attempt, StepRecord};
    use crate::llm::{MockLlmClient, MockReply};

    fn generator(mock: MockLlmClient) -> (QueryGenerator<MockLlmClient>, Arc<MockLlmClient>) {
        let llm = Arc::new(mock);
        (QueryGenerator::new(llm.clone()), llm)
    }

    #[test]
    fn test_is_done_variants() {
        assert!(is_done("DONE"));
        assert!(is_done("  done.\n"));
        assert!(is_done("```\nDONE\n```"));
        assert!(!is_done("DONE SELECT 1"));
        assert!(!is_done("SELECT done FROM tasks"));
    }

    #[test]
    fn test_interpret() {
        assert_eq!(interpret("DONE"), Proposal::Complete);
        assert!(matches!(interpret("   "), Proposal::Unavailable(_)));
        assert!(matches!(interpret("```sql\n```"), Proposal::Unavailable(_)));
        assert_eq!(
            interpret("```sql\nSELECT 1\n```"),
            Proposal::Statement("```sql\nSELECT 1\n```".to_string())
        );
    }

    #[test]
    fn test_next_prompt_embeds_everything() {
        let (generator, _) = generator(MockLlmClient::new());
        let context = IncidentContext::new("Checkout requests time out after 30s")
            .with_code_analysis(Some("OrderRepository holds a transaction open".to_string()));
        let mut history = History::new();
        history.push(StepRecord::failure(1, Attempt::Primary, "SELECT * FROM lockz", "no such table: lockz"));

        let prompt = generator.next_prompt(&context, &["pool exhausted at 10:02".to_string()], &history);

        assert!(prompt.contains("SQLite database"));
        assert!(prompt.contains("Checkout requests time out after 30s"));
        assert!(prompt.contains("OrderRepository holds a transaction open"));
        assert!(prompt.contains("- pool exhausted at 10:02"));
        assert!(prompt.contains("Query: SELECT * FROM lockz"));
        assert!(prompt.contains("Error: no such table: lockz"));
        assert!(prompt.contains("reply with exactly DONE"));
    }

    #[test]
    fn test_next_prompt_without_extras() {
        let (generator, _) = generator(MockLlmClient::new());
        let prompt = generator.next_prompt(&IncidentContext::new("x"), &[], &History::new());
        assert!(prompt.contains("Not available"));
        assert!(prompt.contains("None yet."));
        assert!(prompt.contains("(no queries executed yet)"));
    }

    #[test]
    fn test_correction_prompt_quotes_failure() {
        let (generator, _) = generator(MockLlmClient::new());
        let generator = generator.with_dialect("T-SQL");
        let prompt = generator.correction_prompt("SELECT TOP 5 * FROM sys.dm_exec_requestz", "Invalid object name");
        assert!(prompt.contains("T-SQL query failed"));
        assert!(prompt.contains("```sql\nSELECT TOP 5 * FROM sys.dm_exec_requestz\n```"));
        assert!(prompt.contains("Invalid object name"));
        assert!(prompt.contains("Do not repeat the same query"));
    }

    #[tokio::test]
    async fn test_propose_next_statement() {
        let (generator, llm) = generator(MockLlmClient::with_texts(["SELECT count(*) FROM orders"]));
        let exchange = generator
            .propose_next(&IncidentContext::new("slow"), &[], &History::new())
            .await;
        assert_eq!(exchange.value, Proposal::Statement("SELECT count(*) FROM orders".to_string()));
        assert_eq!(exchange.response.as_deref(), Ok("SELECT count(*) FROM orders"));
        assert_eq!(llm.prompts()[0], exchange.prompt);
    }

    #[tokio::test]
    async fn test_propose_correction_model_failure() {
        let (generator, _) = generator(MockLlmClient::with_replies([MockReply::Fail("overloaded".to_string())]));
        let exchange = generator.propose_correction("SELECT 1", "boom").await;
        assert!(matches!(exchange.value, Proposal::Unavailable(_)));
        assert!(exchange.response.is_err());
    }
}
