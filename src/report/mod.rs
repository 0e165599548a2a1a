//! Run artifacts: the Markdown report, the audit log and per-step CSV files.

pub mod audit;
pub mod export;
pub mod markdown;

pub use audit::AuditLog;
pub use export::{CsvExporter, to_csv};
pub use markdown::{ReportInput, ReportWriter};
