//! rootcause - LLM-driven incident triage
//!
//! Summarizes a log excerpt, decides which analyses to run, and probes the
//! incident database with a bounded, self-correcting diagnostic query loop
//! where the model picks each next statement.

pub mod agents;
pub mod datasource;
pub mod diagnose;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod report;
pub mod retrieval;

pub use error::{Result, TriageError};
