//! Iterative diagnostic query loop.
//!
//! A [`DiagnosticLoop`] turns an incident summary into a bounded sequence of
//! statements against a live data source, letting the model pick each next
//! statement and fix a failed one at most once per step.

pub mod aggregator;
pub mod controller;
pub mod events;
pub mod generator;
pub mod history;
pub mod outcome;
pub mod policy;
pub mod sanitize;

pub use aggregator::{DEGRADED_DIAGNOSIS, ResultAggregator};
pub use controller::{DEFAULT_BUDGET, DEFAULT_TOP_K, DiagnosticLoop, DiagnosticRequest};
pub use events::{Purpose, StepEvent, StepEventSink};
pub use generator::{DONE_SENTINEL, Exchange, Proposal, QueryGenerator};
pub use history::{Attempt, History, IncidentContext, StepOutcome, StepRecord};
pub use outcome::{CompletionReason, LoopOutcome};
pub use policy::StatementPolicy;
pub use sanitize::sanitize;
