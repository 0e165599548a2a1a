//! Orchestrator - runs the agents in order and writes the report.
//!
//! Log summary → decision → (code analysis) → (diagnostic loop) → report →
//! (ticket). Only the log summary is required; every later stage degrades to
//! "not executed" on failure.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;

use crate::agents::{
    Decision, JiraClient, JiraSettings, SourceCollector, TicketDraft, TicketInput, analyze_code, decide,
    draft_ticket, summarize,
};
use crate::datasource::DataSource;
use crate::diagnose::{
    DEFAULT_BUDGET, DEFAULT_TOP_K, DiagnosticLoop, DiagnosticRequest, IncidentContext, LoopOutcome,
    StatementPolicy,
};
use crate::error::Result;
use crate::llm::LlmClient;
use crate::report::{AuditLog, CsvExporter, ReportInput, ReportWriter};
use crate::retrieval::ContextRetriever;

/// Knobs for one analysis
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub connection_string: Option<String>,
    pub budget: u32,
    pub top_k: usize,
    pub policy: StatementPolicy,
    pub dialect: String,
    /// Project to scan when the code agent runs
    pub project_path: Option<PathBuf>,
    pub collector: SourceCollector,
    pub output_dir: PathBuf,
    /// Audit log of the diagnostic loop; None disables it
    pub audit_log: Option<PathBuf>,
    pub export_csv: bool,
    pub create_ticket: bool,
    /// Post the drafted ticket when a server is configured
    pub jira: Option<JiraSettings>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            connection_string: None,
            budget: DEFAULT_BUDGET,
            top_k: DEFAULT_TOP_K,
            policy: StatementPolicy::default(),
            dialect: "SQLite".to_string(),
            project_path: None,
            collector: SourceCollector::default(),
            output_dir: PathBuf::from("output"),
            audit_log: None,
            export_csv: false,
            create_ticket: false,
            jira: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub log_summary: String,
    pub decision: Decision,
    pub code_analysis: Option<String>,
    pub db_outcome: Option<LoopOutcome>,
    pub report_path: PathBuf,
    pub exports: Vec<PathBuf>,
    pub ticket: Option<TicketDraft>,
    pub ticket_key: Option<String>,
}

pub struct Orchestrator<L, D>
where
    L: LlmClient,
    D: DataSource + ?Sized,
{
    llm: Arc<L>,
    data_source: Arc<D>,
    options: AnalysisOptions,
}

impl<L, D> Orchestrator<L, D>
where
    L: LlmClient,
    D: DataSource + ?Sized,
{
    pub fn new(llm: Arc<L>, data_source: Arc<D>, options: AnalysisOptions) -> Self {
        Self {
            llm,
            data_source,
            options,
        }
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    /// Analyze one log excerpt. Fails only when the log cannot be summarized
    /// or the report cannot be written.
    pub async fn analyze<R: ContextRetriever>(&self, log_text: &str, retriever: &mut R) -> Result<AnalysisResult> {
        let log_summary = summarize(self.llm.as_ref(), log_text).await?;

        let decision = match decide(self.llm.as_ref(), &log_summary).await {
            Ok(decision) => decision,
            Err(e) => {
                log::warn!("Decision agent failed: {}", e);
                Decision::fallback()
            }
        };

        let code_analysis = if decision.run_code_agent {
            self.run_code_agent(&log_summary).await
        } else {
            None
        };

        let mut exports = Vec::new();
        let db_outcome = if decision.run_db_agent {
            Some(
                self.run_db_agent(&log_summary, code_analysis.as_deref(), retriever, &mut exports)
                    .await,
            )
        } else {
            None
        };

        let report_path = ReportWriter::new(&self.options.output_dir).write(&ReportInput {
            log_summary: &log_summary,
            decision: &decision,
            code_analysis: code_analysis.as_deref(),
            db_outcome: db_outcome.as_ref(),
        })?;

        let (ticket, ticket_key) = if self.options.create_ticket {
            let input = TicketInput {
                log_summary: &log_summary,
                decision: &decision,
                code_analysis: code_analysis.as_deref(),
                db_analysis: db_outcome.as_ref().map(|o| o.diagnosis.as_str()),
            };
            self.file_ticket(&input).await
        } else {
            (None, None)
        };

        Ok(AnalysisResult {
            log_summary,
            decision,
            code_analysis,
            db_outcome,
            report_path,
            exports,
            ticket,
            ticket_key,
        })
    }

    async fn run_code_agent(&self, log_summary: &str) -> Option<String> {
        let Some(project_path) = &self.options.project_path else {
            log::warn!("Code agent requested but no project path configured");
            return None;
        };

        let source = match self.options.collector.collect(project_path) {
            Ok(source) => source,
            Err(e) => {
                log::warn!("Failed to collect sources: {}", e);
                return None;
            }
        };

        match analyze_code(self.llm.as_ref(), log_summary, &source).await {
            Ok(analysis) => Some(analysis),
            Err(e) => {
                log::warn!("Code agent failed: {}", e);
                None
            }
        }
    }

    async fn run_db_agent<R: ContextRetriever>(
        &self,
        log_summary: &str,
        code_analysis: Option<&str>,
        retriever: &mut R,
        exports: &mut Vec<PathBuf>,
    ) -> LoopOutcome {
        let context = IncidentContext::new(log_summary).with_code_analysis(code_analysis.map(str::to_string));

        let mut request = DiagnosticRequest::new(context)
            .with_budget(self.options.budget)
            .with_top_k(self.options.top_k);
        if let Some(connection_string) = &self.options.connection_string {
            request = request.with_connection(connection_string.clone());
        }

        // A sink that cannot be opened is dropped; the loop still runs
        let mut audit = self
            .options
            .audit_log
            .as_ref()
            .and_then(|path| match AuditLog::open(path.clone()) {
                Ok(audit) => Some(audit),
                Err(e) => {
                    log::warn!("Running without audit log {}: {}", path.display(), e);
                    None
                }
            });
        let mut exporter = if self.options.export_csv {
            let dir = self
                .options
                .output_dir
                .join(format!("queries_{}", Local::now().format("%Y%m%d_%H%M%S")));
            match CsvExporter::new(dir.clone()) {
                Ok(exporter) => Some(exporter),
                Err(e) => {
                    log::warn!("Running without CSV export to {}: {}", dir.display(), e);
                    None
                }
            }
        } else {
            None
        };

        let outcome = {
            let mut diagnostic = DiagnosticLoop::new(self.llm.clone(), self.data_source.clone(), retriever)
                .with_policy(self.options.policy)
                .with_dialect(self.options.dialect.clone());
            if let Some(audit) = audit.as_mut() {
                diagnostic = diagnostic.with_sink(audit);
            }
            if let Some(exporter) = exporter.as_mut() {
                diagnostic = diagnostic.with_sink(exporter);
            }
            diagnostic.run(request).await
        };

        if let Some(exporter) = &exporter {
            exports.extend(exporter.written().iter().cloned());
        }

        log::info!(
            "DB agent finished: {} ({} record(s))",
            outcome.reason,
            outcome.history.len()
        );
        outcome
    }

    async fn file_ticket(&self, input: &TicketInput<'_>) -> (Option<TicketDraft>, Option<String>) {
        let draft = match draft_ticket(self.llm.as_ref(), input).await {
            Ok(draft) => draft,
            Err(e) => {
                log::warn!("Ticket drafting failed: {}", e);
                return (None, None);
            }
        };

        let settings = match &self.options.jira {
            Some(settings) if settings.server.is_some() => settings,
            _ => return (Some(draft), None),
        };

        let key = match JiraClient::new(settings) {
            Ok(client) => match client.create_issue(&draft).await {
                Ok(key) => Some(key),
                Err(e) => {
                    log::warn!("Failed to create Jira issue: {}", e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Jira not available: {}", e);
                None
            }
        };

        (Some(draft), key)
    }
}
