use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod cli;
mod config;

use cli::Cli;
use config::Config;
use rootcause::datasource::SqliteDataSource;
use rootcause::llm::{AnthropicClient, RetryingClient};
use rootcause::orchestrator::{AnalysisResult, Orchestrator};
use rootcause::retrieval::RetrievalIndex;

fn setup_logging(default_level: &str) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rootcause")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("rootcause.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Layer command-line flags over the loaded config
fn apply_overrides(cli: &Cli, mut config: Config) -> Result<Config> {
    if let Some(db) = &cli.db {
        config.database.connection = Some(db.clone());
    }
    if cli.no_db {
        config.database.connection = None;
    }
    if let Some(budget) = cli.budget {
        config.diagnosis.budget = budget;
    }
    if let Some(top_k) = cli.top_k {
        config.diagnosis.top_k = top_k;
    }
    if let Some(code_path) = &cli.code_path {
        config.code.project_path = Some(code_path.clone());
    }
    if let Some(output) = &cli.output {
        config.output.dir = output.clone();
    }
    config.validate().context("Invalid options")?;
    Ok(config)
}

fn load_index(path: Option<&Path>) -> RetrievalIndex {
    let Some(path) = path.filter(|p| p.exists()) else {
        return RetrievalIndex::new();
    };
    match RetrievalIndex::load(path) {
        Ok(index) => {
            info!("Loaded {} indexed finding(s) from {}", index.len(), path.display());
            index
        }
        Err(e) => {
            log::warn!("Ignoring unreadable retrieval index {}: {}", path.display(), e);
            RetrievalIndex::new()
        }
    }
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting analysis of {}", cli.log_file.display());

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    let log_text = fs::read_to_string(&cli.log_file)
        .context(format!("Failed to read log file {}", cli.log_file.display()))?;
    println!("{} {}", "Reading log file:".cyan(), cli.log_file.display());

    let anthropic = AnthropicClient::new(config.llm.anthropic()).context("Failed to create LLM client")?;
    let llm = Arc::new(RetryingClient::new(anthropic, config.llm.retry_policy()));
    let data_source = Arc::new(SqliteDataSource::new(
        config.database.read_only,
        config.diagnosis.max_rows,
    ));

    let mut options = config.analysis_options();
    options.create_ticket = cli.ticket;

    let index_file = config.output.index_file();
    let mut index = load_index(index_file.as_deref());

    println!("{}", "Analyzing logs...".cyan());
    let orchestrator = Orchestrator::new(llm.clone(), data_source, options);
    let result = orchestrator.analyze(&log_text, &mut index).await;

    let usage = llm.inner().total_usage();
    info!(
        "Token usage: {} in, {} out, {} total",
        usage.input_tokens,
        usage.output_tokens,
        usage.total()
    );
    let result = result.context("Analysis failed")?;

    if let Some(path) = &index_file {
        index
            .save(path)
            .context(format!("Failed to save retrieval index to {}", path.display()))?;
    }

    print_result(&result, cli.is_verbose());
    Ok(())
}

fn print_result(result: &AnalysisResult, verbose: bool) {
    println!("\n{}\n{}", "Log Summary:".green().bold(), result.log_summary);

    println!(
        "\n{} code={} db={} ({})",
        "Decision:".green().bold(),
        result.decision.run_code_agent,
        result.decision.run_db_agent,
        result.decision.reason
    );

    if let Some(analysis) = &result.code_analysis {
        println!("\n{}\n{}", "Code Analysis:".green().bold(), analysis);
    }

    if let Some(outcome) = &result.db_outcome {
        let reason = if outcome.reason.is_degraded() {
            outcome.reason.to_string().yellow()
        } else {
            outcome.reason.to_string().normal()
        };
        println!(
            "\n{} {} after {} step(s), {} quer{}",
            "DB Analysis:".green().bold(),
            reason,
            outcome.steps,
            outcome.history.len(),
            if outcome.history.len() == 1 { "y" } else { "ies" }
        );
        if let Some(note) = &outcome.note {
            println!("  {}", note.yellow());
        }
        if verbose {
            for record in &outcome.history {
                let marker = if record.is_error() { "✗".red() } else { "✓".green() };
                println!("  {} [{}:{}] {}", marker, record.step, record.attempt.as_str(), record.statement);
            }
        }
        println!("{}", outcome.diagnosis);
    }

    for path in &result.exports {
        println!("{} {}", "Exported:".cyan(), path.display());
    }

    if let Some(ticket) = &result.ticket {
        println!("\n{}\n{}", "Ticket Draft:".green().bold(), ticket.to_markdown());
    }
    if let Some(key) = &result.ticket_key {
        println!("{} {}", "Issue created:".green(), key);
    }

    println!("\n{} {}", "Report generated:".green(), result.report_path.display());
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    let config = apply_overrides(&cli, config)?;

    let level = if cli.is_verbose() {
        "debug"
    } else {
        config.log_level.as_deref().unwrap_or("info")
    };
    setup_logging(level).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
