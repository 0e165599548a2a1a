//! Single-pass agents around the diagnostic loop.
//!
//! Each agent is one or two model calls with no state of its own.

pub mod code;
pub mod decision;
pub mod jira;
pub mod summary;
pub mod ticket;

pub use code::{SourceCollector, analyze_code};
pub use decision::{Decision, decide};
pub use jira::{JiraClient, JiraSettings};
pub use summary::summarize;
pub use ticket::{TicketDraft, TicketInput, draft_ticket};
