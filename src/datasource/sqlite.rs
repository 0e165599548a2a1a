//! SQLite data source backed by rusqlite.

use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::{ErrorCode, OpenFlags};
use serde_json::Value;

use super::{ConnectError, Connection, DataSource, Row, RowSet, StatementError};

/// Default cap on rows read back per statement
pub const DEFAULT_MAX_ROWS: usize = 500;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens SQLite databases from `sqlite://path`, `sqlite:path`, `file:` URIs or plain paths.
#[derive(Debug, Clone)]
pub struct SqliteDataSource {
    read_only: bool,
    max_rows: usize,
}

impl Default for SqliteDataSource {
    fn default() -> Self {
        Self {
            read_only: true,
            max_rows: DEFAULT_MAX_ROWS,
        }
    }
}

impl SqliteDataSource {
    pub fn new(read_only: bool, max_rows: usize) -> Self {
        Self { read_only, max_rows }
    }

    fn open_flags(&self) -> OpenFlags {
        let access = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };
        access | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX
    }
}

/// Strip the scheme prefix from a connection string.
fn database_path(connection_string: &str) -> &str {
    let trimmed = connection_string.trim();
    trimmed
        .strip_prefix("sqlite://")
        .or_else(|| trimmed.strip_prefix("sqlite:"))
        .unwrap_or(trimmed)
}

impl DataSource for SqliteDataSource {
    fn connect(&self, connection_string: &str) -> Result<Box<dyn Connection>, ConnectError> {
        let path = database_path(connection_string);
        if path.is_empty() {
            return Err(ConnectError("empty connection string".to_string()));
        }

        let conn = rusqlite::Connection::open_with_flags(path, self.open_flags())
            .map_err(|e| ConnectError(format!("{}: {}", path, e)))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| ConnectError(e.to_string()))?;

        // Opening is lazy; touch the schema so a bad file fails here.
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
            .map_err(|e| ConnectError(format!("{}: {}", path, e)))?;

        log::info!("Connected to SQLite database {}", path);
        Ok(Box::new(SqliteConnection {
            conn,
            max_rows: self.max_rows,
        }))
    }
}

/// Live SQLite connection, closed on drop.
pub struct SqliteConnection {
    conn: rusqlite::Connection,
    max_rows: usize,
}

impl SqliteConnection {
    fn run(&self, statement: &str) -> rusqlite::Result<RowSet> {
        let mut stmt = self.conn.prepare(statement)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        let mut truncated = false;
        while let Some(row) = rows.next()? {
            if out.len() >= self.max_rows {
                truncated = true;
                break;
            }
            let mut record = Row::new();
            for (index, name) in columns.iter().enumerate() {
                record.insert(name.clone(), json_value(row.get_ref(index)?));
            }
            out.push(record);
        }

        Ok(RowSet {
            columns,
            rows: out,
            truncated,
        })
    }
}

impl Connection for SqliteConnection {
    fn execute(&mut self, statement: &str) -> Result<RowSet, StatementError> {
        self.run(statement).map_err(|e| classify(statement, e))
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        log::debug!("Closing SQLite connection");
    }
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(hex::encode(bytes)),
    }
}

/// Map a driver error into a recorded statement error.
fn classify(statement: &str, err: rusqlite::Error) -> StatementError {
    let lost = match &err {
        rusqlite::Error::SqliteFailure(failure, _) => matches!(
            failure.code,
            ErrorCode::CannotOpen | ErrorCode::NotADatabase | ErrorCode::SystemIoFailure | ErrorCode::DatabaseCorrupt
        ),
        _ => false,
    };

    if lost {
        StatementError::lost(statement, err.to_string())
    } else {
        StatementError::new(statement, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, String) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.db");
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, status TEXT, total REAL, payload BLOB);
             INSERT INTO orders VALUES (1, 'pending', 9.5, x'CAFE');
             INSERT INTO orders VALUES (2, 'failed', NULL, NULL);
             INSERT INTO orders VALUES (3, 'failed', 12.25, NULL);",
        )
        .unwrap();
        (dir, path.display().to_string())
    }

    #[test]
    fn test_database_path_prefixes() {
        assert_eq!(database_path("sqlite:///tmp/a.db"), "/tmp/a.db");
        assert_eq!(database_path("sqlite:app.db"), "app.db");
        assert_eq!(database_path(" app.db "), "app.db");
        assert_eq!(database_path("file:app.db?mode=ro"), "file:app.db?mode=ro");
    }

    #[test]
    fn test_select_returns_ordered_columns_and_values() {
        let (_dir, path) = fixture();
        let mut conn = SqliteDataSource::default().connect(&path).unwrap();

        let rows = conn
            .execute("SELECT status, id, total, payload FROM orders ORDER BY id")
            .unwrap();

        assert_eq!(rows.columns, vec!["status", "id", "total", "payload"]);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows.rows[0]["status"], "pending");
        assert_eq!(rows.rows[0]["id"], 1);
        assert_eq!(rows.rows[0]["total"], 9.5);
        assert_eq!(rows.rows[0]["payload"], "cafe");
        assert!(rows.rows[1]["total"].is_null());
        let keys: Vec<&String> = rows.rows[0].keys().collect();
        assert_eq!(keys, vec!["status", "id", "total", "payload"]);
    }

    #[test]
    fn test_empty_result_keeps_columns() {
        let (_dir, path) = fixture();
        let mut conn = SqliteDataSource::default().connect(&path).unwrap();
        let rows = conn.execute("SELECT id FROM orders WHERE id > 100").unwrap();
        assert_eq!(rows.columns, vec!["id"]);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_row_cap_truncates() {
        let (_dir, path) = fixture();
        let mut conn = SqliteDataSource::new(true, 2).connect(&path).unwrap();
        let rows = conn.execute("SELECT id FROM orders").unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.truncated);
    }

    #[test]
    fn test_bad_statement_is_recoverable() {
        let (_dir, path) = fixture();
        let mut conn = SqliteDataSource::default().connect(&path).unwrap();
        let err = conn.execute("SELECT * FROM no_such_table").unwrap_err();
        assert!(err.message.contains("no_such_table"));
        assert_eq!(err.statement, "SELECT * FROM no_such_table");
        assert!(!err.connection_lost);
    }

    #[test]
    fn test_read_only_connection_refuses_writes() {
        let (_dir, path) = fixture();
        let mut conn = SqliteDataSource::default().connect(&path).unwrap();
        assert!(conn.execute("DELETE FROM orders").is_err());

        let mut writable = SqliteDataSource::new(false, DEFAULT_MAX_ROWS).connect(&path).unwrap();
        let rows = writable.execute("DELETE FROM orders WHERE id = 3").unwrap();
        assert!(rows.columns.is_empty());
    }

    #[test]
    fn test_classify_marks_unreachable_database_as_lost() {
        let failure = |code| rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None);

        for code in [
            rusqlite::ffi::SQLITE_CANTOPEN,
            rusqlite::ffi::SQLITE_NOTADB,
            rusqlite::ffi::SQLITE_IOERR,
            rusqlite::ffi::SQLITE_CORRUPT,
        ] {
            assert!(classify("SELECT 1", failure(code)).connection_lost, "code {}", code);
        }

        assert!(!classify("SELECT 1", failure(rusqlite::ffi::SQLITE_ERROR)).connection_lost);
        assert!(!classify("SELECT 1", rusqlite::Error::InvalidQuery).connection_lost);
    }

    #[test]
    fn test_database_overwritten_after_connect_is_lost() {
        let (_dir, path) = fixture();
        let mut conn = SqliteDataSource::default().connect(&path).unwrap();
        assert_eq!(conn.execute("SELECT id FROM orders").unwrap().len(), 3);

        std::fs::write(&path, vec![b'x'; 8192]).unwrap();

        let err = conn.execute("SELECT id FROM orders").unwrap_err();
        assert!(err.connection_lost, "{}", err.message);
        assert_eq!(err.statement, "SELECT id FROM orders");
    }

    #[test]
    fn test_connect_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.db");
        let err = SqliteDataSource::default()
            .connect(&missing.display().to_string())
            .err()
            .unwrap();
        assert!(err.to_string().contains("Failed to connect"));
    }

    #[test]
    fn test_connect_not_a_database_fails() {
        let dir = TempDir::new().unwrap();
        let bogus = dir.path().join("notes.txt");
        std::fs::write(&bogus, "this is definitely not a sqlite database file, just text padding it out").unwrap();
        assert!(SqliteDataSource::default().connect(&bogus.display().to_string()).is_err());
    }

    #[test]
    fn test_connect_empty_string_fails() {
        assert!(SqliteDataSource::default().connect("  ").is_err());
    }
}
