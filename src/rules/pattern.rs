//! Glob patterns for schema, table and column rules.
//!
//! Patterns are compiled once when the rule set is built and matched
//! case-insensitively. Compilation has no side effects, so everything here
//! is testable without a database.

use crate::error::{Result, SampleError};
use glob::{MatchOptions, Pattern};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

fn compile(rule: &str, text: &str) -> Result<Pattern> {
    if text.is_empty() {
        return Err(SampleError::rule(rule, "empty pattern"));
    }
    Pattern::new(text).map_err(|e| SampleError::rule(rule, format!("invalid pattern '{}': {}", text, e)))
}

/// Pattern over schema names
#[derive(Debug, Clone)]
pub struct SchemaPattern {
    pub text: String,
    pattern: Pattern,
}

impl SchemaPattern {
    pub fn new(text: &str) -> Result<Self> {
        let text = text.trim();
        Ok(Self {
            text: text.to_string(),
            pattern: compile(text, text)?,
        })
    }

    pub fn matches(&self, schema: &str) -> bool {
        self.pattern.matches_with(schema, MATCH_OPTIONS)
    }
}

/// Pattern over tables: `users`, `public.users`, `public.*`, `*_log`
///
/// A pattern matches when it matches the qualified `schema.table` name or
/// the bare table name.
#[derive(Debug, Clone)]
pub struct TablePattern {
    pub text: String,
    pattern: Pattern,
}

impl TablePattern {
    pub fn new(text: &str) -> Result<Self> {
        let text = text.trim();
        Ok(Self {
            text: text.to_string(),
            pattern: compile(text, text)?,
        })
    }

    pub fn matches(&self, schema: &str, table: &str) -> bool {
        let qualified = format!("{}.{}", schema, table);
        self.pattern.matches_with(&qualified, MATCH_OPTIONS)
            || self.pattern.matches_with(table, MATCH_OPTIONS)
    }

    /// True for the catch-all `*` pattern
    pub fn is_wildcard(&self) -> bool {
        self.text == "*"
    }
}

/// Pattern over columns: `password`, `*.password`, `public.users.ssn`
///
/// The table part is everything before the last `.`; a bare column
/// pattern applies to every table.
#[derive(Debug, Clone)]
pub struct ColumnPattern {
    pub text: String,
    /// Table pattern (None = match all tables)
    table_pattern: Option<TablePattern>,
    column_pattern: Pattern,
}

impl ColumnPattern {
    pub fn new(text: &str) -> Result<Self> {
        let text = text.trim();

        let (table_pattern, column_part) = match text.rfind('.') {
            Some(dot) => {
                let table_part = &text[..dot];
                let table_pattern = if table_part == "*" {
                    None
                } else {
                    Some(TablePattern {
                        text: table_part.to_string(),
                        pattern: compile(text, table_part)?,
                    })
                };
                (table_pattern, &text[dot + 1..])
            }
            None => (None, text),
        };

        Ok(Self {
            text: text.to_string(),
            table_pattern,
            column_pattern: compile(text, column_part)?,
        })
    }

    pub fn matches_table(&self, schema: &str, table: &str) -> bool {
        self.table_pattern
            .as_ref()
            .is_none_or(|p| p.matches(schema, table))
    }

    pub fn matches(&self, schema: &str, table: &str, column: &str) -> bool {
        self.matches_table(schema, table)
            && self.column_pattern.matches_with(column, MATCH_OPTIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_pattern_matches_bare_and_qualified() {
        let bare = TablePattern::new("users").unwrap();
        assert!(bare.matches("public", "users"));
        assert!(bare.matches("sales", "users"));
        assert!(!bare.matches("public", "users_archive"));

        let qualified = TablePattern::new("sales.*").unwrap();
        assert!(qualified.matches("sales", "orders"));
        assert!(!qualified.matches("public", "orders"));
    }

    #[test]
    fn test_table_pattern_is_case_insensitive() {
        let p = TablePattern::new("Public.USERS").unwrap();
        assert!(p.matches("public", "users"));
    }

    #[test]
    fn test_wildcard_matches_everything() {
        let p = TablePattern::new("*").unwrap();
        assert!(p.is_wildcard());
        assert!(p.matches("logs", "events"));
    }

    #[test]
    fn test_column_pattern_splits_on_last_dot() {
        let p = ColumnPattern::new("public.users.ssn").unwrap();
        assert!(p.matches("public", "users", "ssn"));
        assert!(!p.matches("public", "orders", "ssn"));

        let any_table = ColumnPattern::new("*.password").unwrap();
        assert!(any_table.matches("auth", "accounts", "password"));
        assert!(!any_table.matches("auth", "accounts", "password_hint"));

        let bare = ColumnPattern::new("*_token").unwrap();
        assert!(bare.matches("public", "sessions", "refresh_token"));
    }

    #[test]
    fn test_invalid_pattern_is_rule_error() {
        let err = TablePattern::new("users[").unwrap_err();
        assert!(matches!(err, SampleError::RuleValidation { .. }));
        assert!(err.to_string().contains("users["));
        assert!(SchemaPattern::new("").is_err());
    }
}
