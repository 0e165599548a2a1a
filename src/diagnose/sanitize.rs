//! Query sanitizer - turns raw model output into one executable statement.

use std::sync::LazyLock;

use regex::Regex;

/// Opening fence with an optional language tag, or a bare fence.
static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z0-9_+-]*[ \t]*\r?\n|```").expect("valid fence regex"));

/// Statement-leading keyword at the start of a line.
static LINE_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(select|with|describe|explain|show|pragma)\b").expect("valid keyword regex")
});

/// Statement-leading keyword anywhere.
static ANY_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(select|with|describe|explain|show|pragma)\b").expect("valid keyword regex")
});

/// Remove code-fence markup, leaving the fenced content in place.
pub fn strip_fences(raw: &str) -> String {
    FENCE.replace_all(raw, "").into_owned()
}

/// Normalize model output into a single statement.
///
/// Keywords that open a line win over keywords embedded in prose. Everything
/// after the first unquoted `;` is dropped. Falls back to the trimmed,
/// fence-free text when no keyword is present.
pub fn sanitize(raw: &str) -> String {
    let cleaned = strip_fences(raw);

    let start = LINE_KEYWORD
        .captures(&cleaned)
        .and_then(|c| c.get(1))
        .or_else(|| ANY_KEYWORD.find(&cleaned))
        .map(|m| m.start());

    let Some(start) = start else {
        return cleaned.trim().to_string();
    };

    let candidate = &cleaned[start..];
    first_statement(candidate).trim().to_string()
}

/// Slice up to (excluding) the first `;` outside of quotes.
fn first_statement(text: &str) -> &str {
    let mut quote: Option<char> = None;
    for (i, ch) in text.char_indices() {
        match (quote, ch) {
            (None, '\'' | '"' | '`') => quote = Some(ch),
            (Some(q), c) if c == q => quote = None,
            (None, ';') => return &text[..i],
            _ => {}
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_statement_unchanged() {
        assert_eq!(sanitize("SELECT * FROM orders"), "SELECT * FROM orders");
    }

    #[test]
    fn test_strips_sql_fence() {
        let raw = "```sql\nSELECT count(*) FROM sessions\n```";
        assert_eq!(sanitize(raw), "SELECT count(*) FROM sessions");
    }

    #[test]
    fn test_strips_bare_fence_inline() {
        assert_eq!(sanitize("```select 1```"), "select 1");
    }

    #[test]
    fn test_skips_leading_prose() {
        let raw = "Sure! Next I would look at blocked sessions:\n\nSELECT id, state FROM sessions WHERE state = 'blocked'";
        assert_eq!(
            sanitize(raw),
            "SELECT id, state FROM sessions WHERE state = 'blocked'"
        );
    }

    #[test]
    fn test_line_keyword_beats_prose_keyword() {
        let raw = "Let me check with this query:\nSELECT 1";
        assert_eq!(sanitize(raw), "SELECT 1");
    }

    #[test]
    fn test_falls_back_to_prose_keyword() {
        let raw = "Run this: select name from sqlite_master";
        assert_eq!(sanitize(raw), "select name from sqlite_master");
    }

    #[test]
    fn test_keeps_only_first_statement() {
        let raw = "SELECT 1; DROP TABLE orders;";
        assert_eq!(sanitize(raw), "SELECT 1");
    }

    #[test]
    fn test_semicolon_inside_quotes_is_kept() {
        let raw = "SELECT * FROM logs WHERE message = 'a;b'; SELECT 2";
        assert_eq!(sanitize(raw), "SELECT * FROM logs WHERE message = 'a;b'");
    }

    #[test]
    fn test_cte_statement() {
        let raw = "```\nWITH slow AS (SELECT * FROM q WHERE ms > 100) SELECT count(*) FROM slow;\n```";
        assert_eq!(
            sanitize(raw),
            "WITH slow AS (SELECT * FROM q WHERE ms > 100) SELECT count(*) FROM slow"
        );
    }

    #[test]
    fn test_no_keyword_returns_trimmed_text() {
        assert_eq!(sanitize("  I am not sure what to run.  "), "I am not sure what to run.");
        assert_eq!(sanitize("```\n   \n```"), "");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "```sql\nSELECT * FROM a;\n```",
            "Here you go:\nEXPLAIN QUERY PLAN SELECT * FROM orders WHERE id = 4",
            "check with select 1; select 2",
            "nothing useful",
            "PRAGMA index_list('orders')",
            "SELECT 'x;y' AS v; SELECT 3",
        ];
        for raw in inputs {
            let once = sanitize(raw);
            assert_eq!(sanitize(&once), once, "not idempotent for {raw:?}");
        }
    }
}
