//! Statement policy applied before a sanitized statement reaches the data source.

use serde::{Deserialize, Serialize};

/// Keywords a read-only statement may open with.
const READ_ONLY_LEADERS: &[&str] = &["select", "with", "explain", "show", "describe", "desc", "pragma"];

/// Tokens that mark a statement as mutating, wherever they appear.
const MUTATING_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "create", "alter", "drop", "truncate", "attach", "detach", "vacuum",
    "reindex", "begin", "commit", "rollback", "grant", "revoke", "merge", "exec", "execute",
];

/// Pragmas that only read, even when given an argument. Any other pragma
/// is allowed bare (a read) but not in `name(value)` or `name = value` form.
const INTROSPECTION_PRAGMAS: &[&str] = &[
    "table_info",
    "table_xinfo",
    "index_list",
    "index_info",
    "index_xinfo",
    "foreign_key_list",
    "foreign_key_check",
    "integrity_check",
    "quick_check",
];

/// Which statements the diagnostic loop may send to a live data source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatementPolicy {
    /// Only statements that read
    #[default]
    ReadOnly,
    /// Anything the model proposes
    Unrestricted,
}

impl StatementPolicy {
    pub fn from_read_only(read_only: bool) -> Self {
        if read_only {
            StatementPolicy::ReadOnly
        } else {
            StatementPolicy::Unrestricted
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, StatementPolicy::ReadOnly)
    }

    /// Check a sanitized statement. The error is the message recorded in history.
    pub fn check(&self, statement: &str) -> Result<(), String> {
        if !self.is_read_only() {
            return Ok(());
        }

        let normalized = unquoted(statement.trim());
        if normalized.is_empty() {
            return Err("Statement is empty; expected a single read-only query".to_string());
        }

        let mut tokens = normalized
            .split(|ch: char| !ch.is_ascii_alphanumeric() && ch != '_')
            .filter(|t| !t.is_empty());

        let leader = tokens.next().unwrap_or_default();
        if !READ_ONLY_LEADERS.contains(&leader) {
            return Err(format!(
                "Statement rejected by read-only policy: `{}` is not an allowed leading keyword",
                leader
            ));
        }

        if let Some(keyword) = tokens.find(|t| MUTATING_KEYWORDS.contains(t)) {
            return Err(format!(
                "Statement rejected by read-only policy: mutating keyword `{}`",
                keyword
            ));
        }

        if leader == "pragma" {
            let body = normalized
                .find("pragma")
                .map(|at| &normalized[at + "pragma".len()..])
                .unwrap_or_default();
            check_pragma(body)?;
        }

        Ok(())
    }
}

/// Lowercase the statement and blank out everything inside quotes, so
/// literals and quoted identifiers never read as keywords.
fn unquoted(statement: &str) -> String {
    let mut quote: Option<char> = None;
    statement
        .chars()
        .map(|ch| match (quote, ch) {
            (None, '\'' | '"' | '`') => {
                quote = Some(ch);
                ch
            }
            (Some(q), c) if c == q => {
                quote = None;
                c
            }
            (Some(_), _) => ' ',
            (None, c) => c.to_ascii_lowercase(),
        })
        .collect()
}

fn check_pragma(body: &str) -> Result<(), String> {
    if body.contains('=') {
        return Err("Statement rejected by read-only policy: PRAGMA assignment".to_string());
    }
    if let Some(open) = body.find('(') {
        // `schema.name(arg)` sets a value for most pragmas
        let name = body[..open].trim().rsplit('.').next().unwrap_or_default().trim();
        if !INTROSPECTION_PRAGMAS.contains(&name) {
            return Err(format!(
                "Statement rejected by read-only policy: PRAGMA `{}` with an argument",
                name
            ));
        }
    }
    Ok(())
}
