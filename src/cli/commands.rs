//! CLI definition using clap.
//!
//! `rootcause <LOG_FILE>` analyzes one log excerpt. Flags override the
//! matching config values for this run only.

use clap::Parser;
use std::path::PathBuf;

/// rootcause - LLM-driven incident triage
#[derive(Parser, Debug)]
#[command(name = "rootcause")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log file to analyze
    pub log_file: PathBuf,

    /// Optional config file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Database connection string (e.g. sqlite://incident.db)
    #[arg(long, value_name = "CONN")]
    pub db: Option<String>,

    /// Skip the database even if one is configured
    #[arg(long, conflicts_with = "db")]
    pub no_db: bool,

    /// Maximum diagnostic query steps
    #[arg(short, long)]
    pub budget: Option<u32>,

    /// Context snippets retrieved per step
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Project source directory for the code agent
    #[arg(long, value_name = "DIR")]
    pub code_path: Option<PathBuf>,

    /// Output directory for reports and exports
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Draft a ticket (and file it in Jira when configured)
    #[arg(long)]
    pub ticket: bool,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}
