//! Data-source driver abstraction.
//!
//! A [`DataSource`] opens exclusively-owned [`Connection`]s. A connection runs
//! one statement at a time and hands back rows or a [`StatementError`] value;
//! it is closed when dropped.

mod sqlite;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use sqlite::{DEFAULT_MAX_ROWS, SqliteDataSource};

/// One result row, column order preserved.
pub type Row = serde_json::Map<String, Value>;

/// Ordered rows returned by a statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    /// Column names in select order (present even when there are no rows)
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// True when the driver stopped reading at its row cap
    #[serde(default)]
    pub truncated: bool,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            truncated: false,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A statement that could not be run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StatementError {
    pub message: String,
    pub statement: String,
    /// The data source can no longer be reached for any statement
    pub connection_lost: bool,
}

impl StatementError {
    pub fn new(statement: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            statement: statement.into(),
            connection_lost: false,
        }
    }

    pub fn lost(statement: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            connection_lost: true,
            ..Self::new(statement, message)
        }
    }
}

/// Connection could not be established.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Failed to connect to data source: {0}")]
pub struct ConnectError(pub String);

/// Opens connections from a connection string.
pub trait DataSource: Send + Sync {
    fn connect(&self, connection_string: &str) -> Result<Box<dyn Connection>, ConnectError>;
}

/// A live, exclusively-owned connection.
pub trait Connection: Send {
    fn execute(&mut self, statement: &str) -> Result<RowSet, StatementError>;
}
