//! Diagnostic loop controller - the bounded propose/execute/correct state machine.
//!
//! Each step runs strictly in order:
//! 1. Retrieve context for the history so far (failure degrades to none)
//! 2. Ask the generator for the next statement, or completion
//! 3. Sanitize, check the statement policy, execute
//! 4. On failure: record the error, ask for one correction, execute it once
//! 5. Record, count the step, stop when the budget is spent
//!
//! `run` never returns an error. Every collaborator fault becomes a
//! [`CompletionReason`] on the [`LoopOutcome`].

use std::sync::Arc;

use super::aggregator::ResultAggregator;
use super::events::{Purpose, StepEvent, StepEventSink};
use super::generator::{Exchange, Proposal, QueryGenerator};
use super::history::{Attempt, History, IncidentContext, StepRecord};
use super::outcome::{CompletionReason, LoopOutcome};
use super::policy::StatementPolicy;
use super::sanitize::sanitize;
use crate::datasource::{Connection, DataSource, RowSet, StatementError};
use crate::llm::LlmClient;
use crate::retrieval::ContextRetriever;

/// Primary steps allowed per run
pub const DEFAULT_BUDGET: u32 = 10;

/// Snippets retrieved per step
pub const DEFAULT_TOP_K: usize = 3;

/// Input to one diagnostic run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRequest {
    pub context: IncidentContext,
    /// Absent means no queries are run at all
    pub connection_string: Option<String>,
    pub budget: u32,
    pub top_k: usize,
}

impl DiagnosticRequest {
    pub fn new(context: IncidentContext) -> Self {
        Self {
            context,
            connection_string: None,
            budget: DEFAULT_BUDGET,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_connection(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_string = Some(connection_string.into());
        self
    }

    pub fn with_budget(mut self, budget: u32) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

/// How a step ended, from the loop's point of view
#[derive(Debug, Clone, PartialEq, Eq)]
enum StepStatus {
    Continue,
    ConnectionLost(String),
    ModelUnavailable(String),
}

pub struct DiagnosticLoop<'a, L, D, R>
where
    L: LlmClient,
    D: DataSource + ?Sized,
    R: ContextRetriever,
{
    generator: QueryGenerator<L>,
    aggregator: ResultAggregator<L>,
    data_source: Arc<D>,
    /// Caller-owned; grows with every recorded step
    retriever: &'a mut R,
    policy: StatementPolicy,
    sinks: Vec<&'a mut dyn StepEventSink>,
}

impl<'a, L, D, R> DiagnosticLoop<'a, L, D, R>
where
    L: LlmClient,
    D: DataSource + ?Sized,
    R: ContextRetriever,
{
    pub fn new(llm: Arc<L>, data_source: Arc<D>, retriever: &'a mut R) -> Self {
        Self {
            generator: QueryGenerator::new(llm.clone()),
            aggregator: ResultAggregator::new(llm),
            data_source,
            retriever,
            policy: StatementPolicy::default(),
            sinks: Vec::new(),
        }
    }

    pub fn with_policy(mut self, policy: StatementPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_dialect(mut self, dialect: impl Into<String>) -> Self {
        self.generator = self.generator.with_dialect(dialect);
        self
    }

    /// Add a receiver for per-step events
    pub fn with_sink(mut self, sink: &'a mut dyn StepEventSink) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Run one diagnosis to completion.
    pub async fn run(&mut self, request: DiagnosticRequest) -> LoopOutcome {
        let DiagnosticRequest {
            context,
            connection_string,
            budget,
            top_k,
        } = request;
        let mut history = History::new();

        self.emit(&StepEvent::RunStarted { budget, top_k });

        let Some(connection_string) = connection_string.filter(|c| !c.trim().is_empty()) else {
            log::info!("No data source configured, skipping diagnostic queries");
            return self
                .finish(&context, history, CompletionReason::NoDataSource, 0, None)
                .await;
        };

        let mut connection = match self.data_source.connect(&connection_string) {
            Ok(connection) => connection,
            Err(e) => {
                log::warn!("{}", e);
                return self
                    .finish(&context, history, CompletionReason::ConnectionFailed, 0, Some(e.to_string()))
                    .await;
            }
        };

        let mut steps: u32 = 0;
        let (reason, note) = loop {
            if steps >= budget {
                break (CompletionReason::BudgetExhausted, None);
            }
            let step = steps + 1;

            let snippets = self.retrieve(step, &context, &history, top_k).await;

            let exchange = self.generator.propose_next(&context, &snippets, &history).await;
            self.emit_exchange(step, Purpose::Proposal, &exchange);

            let raw = match exchange.value {
                Proposal::Complete => break (CompletionReason::ModelDeclaredDone, None),
                Proposal::Unavailable(reason) => break (CompletionReason::ModelUnavailable, Some(reason)),
                Proposal::Statement(raw) => raw,
            };

            let status = self.run_step(step, &raw, &mut *connection, &mut history).await;
            steps = step;

            match status {
                StepStatus::Continue => {}
                StepStatus::ConnectionLost(message) => break (CompletionReason::ConnectionFailed, Some(message)),
                StepStatus::ModelUnavailable(reason) => break (CompletionReason::ModelUnavailable, Some(reason)),
            }
        };

        // Release the connection before the aggregation call
        drop(connection);

        self.finish(&context, history, reason, steps, note).await
    }

    /// Execute one proposed statement, with at most one correction.
    async fn run_step(
        &mut self,
        step: u32,
        raw: &str,
        connection: &mut dyn Connection,
        history: &mut History,
    ) -> StepStatus {
        let statement = sanitize(raw);

        let error = match self.execute(&statement, connection) {
            Ok(rows) => {
                self.record(history, StepRecord::success(step, Attempt::Primary, &statement, rows))
                    .await;
                return StepStatus::Continue;
            }
            Err(error) => error,
        };

        self.record(
            history,
            StepRecord::failure(step, Attempt::Primary, &statement, &error.message),
        )
        .await;

        if error.connection_lost {
            log::warn!("Data source lost at step {}: {}", step, error.message);
            return StepStatus::ConnectionLost(error.message);
        }

        let exchange = self.generator.propose_correction(&statement, &error.message).await;
        self.emit_exchange(step, Purpose::Correction, &exchange);

        let corrected = match exchange.value {
            Proposal::Statement(raw) => sanitize(&raw),
            Proposal::Complete => {
                self.emit(&StepEvent::CorrectionSkipped {
                    step,
                    statement,
                    reason: "no correction offered".to_string(),
                });
                return StepStatus::Continue;
            }
            Proposal::Unavailable(reason) => return StepStatus::ModelUnavailable(reason),
        };

        if corrected == statement {
            tracing::debug!(step, statement = %statement, "Correction identical to failed statement");
            self.emit(&StepEvent::CorrectionSkipped {
                step,
                statement,
                reason: "identical to failed statement".to_string(),
            });
            return StepStatus::Continue;
        }

        match self.execute(&corrected, connection) {
            Ok(rows) => {
                self.record(history, StepRecord::success(step, Attempt::Correction, &corrected, rows))
                    .await;
                StepStatus::Continue
            }
            Err(error) => {
                self.record(
                    history,
                    StepRecord::failure(step, Attempt::Correction, &corrected, &error.message),
                )
                .await;
                if error.connection_lost {
                    StepStatus::ConnectionLost(error.message)
                } else {
                    StepStatus::Continue
                }
            }
        }
    }

    /// Policy check, then the driver. Rejected statements never reach the connection.
    fn execute(&self, statement: &str, connection: &mut dyn Connection) -> Result<RowSet, StatementError> {
        self.policy
            .check(statement)
            .map_err(|reason| StatementError::new(statement, reason))?;
        connection.execute(statement)
    }

    async fn record(&mut self, history: &mut History, record: StepRecord) {
        tracing::debug!(
            step = record.step,
            attempt = record.attempt.as_str(),
            failed = record.is_error(),
            "Recorded statement"
        );

        if let Err(e) = self.retriever.remember(&record.render()).await {
            log::warn!("Failed to index step {}: {}", record.step, e);
        }

        self.emit(&StepEvent::StatementExecuted { record: record.clone() });
        history.push(record);
    }

    async fn retrieve(&mut self, step: u32, context: &IncidentContext, history: &History, top_k: usize) -> Vec<String> {
        let query = if history.is_empty() {
            context.log_summary.clone()
        } else {
            history.render()
        };

        match self.retriever.retrieve(&query, top_k).await {
            Ok(snippets) => {
                self.emit(&StepEvent::ContextRetrieved {
                    step,
                    snippets: snippets.clone(),
                });
                snippets
            }
            Err(e) => {
                log::warn!("Retrieval degraded at step {}: {}", step, e);
                self.emit(&StepEvent::RetrievalDegraded {
                    step,
                    reason: e.to_string(),
                });
                Vec::new()
            }
        }
    }

    async fn finish(
        &mut self,
        context: &IncidentContext,
        history: History,
        reason: CompletionReason,
        steps: u32,
        note: Option<String>,
    ) -> LoopOutcome {
        log::info!(
            "Diagnostic loop finished: {} after {} step(s), {} record(s)",
            reason,
            steps,
            history.len()
        );

        let exchange = self.aggregator.aggregate(context, &history, reason).await;
        self.emit_exchange(steps, Purpose::Diagnosis, &exchange);
        self.emit(&StepEvent::RunTerminated {
            reason,
            steps,
            records: history.len(),
        });

        LoopOutcome {
            diagnosis: exchange.value,
            history,
            reason,
            steps,
            note,
        }
    }

    fn emit_exchange<T>(&mut self, step: u32, purpose: Purpose, exchange: &Exchange<T>) {
        self.emit(&StepEvent::ModelExchange {
            step,
            purpose,
            prompt: exchange.prompt.clone(),
            response: exchange.response.clone(),
        });
    }

    fn emit(&mut self, event: &StepEvent) {
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.on_event(event) {
                log::warn!("Event sink failed: {}", e);
            }
        }
    }
}
