//! Limit rule parsing.
//!
//! Syntax: `pattern=value` where value is a row count (`500`), a
//! percentage (`10%`), `*` for the whole table, or a filter predicate
//! (`created_at > now() - interval '30 days'`). A value on its own is a
//! global rule, equivalent to `*=value`. Several rules may be given in one
//! argument separated by commas.

use super::pattern::TablePattern;
use crate::error::{Result, SampleError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static ROWS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("valid regex"));
static PERCENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)?)\s*%$").expect("valid regex"));
static NEGATIVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-\d+(?:\.\d+)?%?$").expect("valid regex"));
static DECIMAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+\.\d*|\.\d+)$").expect("valid regex"));
static WHERE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^where(\s+|$)").expect("valid regex"));

/// Row-selection action of a limit rule
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LimitAction {
    /// At most N rows
    Rows(u64),
    /// ceil(P% of the row estimate)
    Percent(f64),
    /// Every row
    Full,
    /// Rows matching a boolean SQL expression
    Predicate(String),
}

impl LimitAction {
    pub fn parse(rule: &str, value: &str) -> Result<Self> {
        let value = value.trim();

        if value.is_empty() {
            return Err(SampleError::rule(rule, "missing limit value"));
        }
        if value == "*" {
            return Ok(LimitAction::Full);
        }
        if NEGATIVE_RE.is_match(value) {
            return Err(SampleError::rule(rule, "limit must not be negative"));
        }
        if ROWS_RE.is_match(value) {
            let rows = value
                .parse::<u64>()
                .map_err(|e| SampleError::rule(rule, format!("invalid row count: {}", e)))?;
            return Ok(LimitAction::Rows(rows));
        }
        if DECIMAL_RE.is_match(value) {
            return Err(SampleError::rule(rule, "row count must be a whole number"));
        }
        if let Some(caps) = PERCENT_RE.captures(value) {
            let pct: f64 = caps[1]
                .parse()
                .map_err(|e| SampleError::rule(rule, format!("invalid percentage: {}", e)))?;
            if pct > 100.0 {
                return Err(SampleError::rule(rule, "percentage must be between 0 and 100"));
            }
            return Ok(LimitAction::Percent(pct));
        }

        let predicate = WHERE_RE.replace(value, "").trim().to_string();
        if predicate.is_empty() {
            return Err(SampleError::rule(rule, "empty WHERE condition"));
        }
        Ok(LimitAction::Predicate(predicate))
    }

    /// Concrete row cap given a row estimate (`None` = no cap)
    pub fn cap(&self, row_estimate: u64) -> Option<u64> {
        match self {
            LimitAction::Rows(n) => Some(*n),
            LimitAction::Percent(p) => {
                Some((p * row_estimate as f64 / 100.0).ceil().max(0.0) as u64)
            }
            LimitAction::Full | LimitAction::Predicate(_) => None,
        }
    }

    /// Short human form for plan output
    pub fn describe(&self) -> String {
        match self {
            LimitAction::Rows(n) => format!("{} rows", n),
            LimitAction::Percent(p) => format!("{}%", p),
            LimitAction::Full => "all rows".to_string(),
            LimitAction::Predicate(p) => format!("WHERE {}", p),
        }
    }
}

/// A compiled limit rule
#[derive(Debug, Clone)]
pub struct LimitRule {
    /// Rule as written by the user
    pub text: String,
    pub pattern: TablePattern,
    pub action: LimitAction,
}

impl LimitRule {
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let (pattern, value) = match text.split_once('=') {
            Some((pattern, value))
                if !pattern.is_empty() && !pattern.contains(char::is_whitespace) =>
            {
                (pattern, value)
            }
            Some((pattern, _)) if pattern.trim().is_empty() => {
                return Err(SampleError::rule(text, "empty table pattern"));
            }
            _ => ("*", text),
        };

        Ok(Self {
            text: text.to_string(),
            pattern: TablePattern::new(pattern)?,
            action: LimitAction::parse(text, value)?,
        })
    }

    /// Parse a comma-separated list of rules. Commas inside parentheses or
    /// quotes belong to a predicate and do not split.
    pub fn parse_list(text: &str) -> Result<Vec<Self>> {
        split_top_level(text)
            .into_iter()
            .filter(|s| !s.trim().is_empty())
            .map(Self::parse)
            .collect()
    }
}

fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_quote = false;
    let mut start = 0;

    for (i, ch) in text.char_indices() {
        match ch {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => depth -= 1,
            ',' if !in_quote && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_actions() {
        assert_eq!(LimitAction::parse("r", "50").unwrap(), LimitAction::Rows(50));
        assert_eq!(LimitAction::parse("r", "12.5%").unwrap(), LimitAction::Percent(12.5));
        assert_eq!(LimitAction::parse("r", "*").unwrap(), LimitAction::Full);
        assert_eq!(
            LimitAction::parse("r", "WHERE active").unwrap(),
            LimitAction::Predicate("active".to_string())
        );
        assert_eq!(
            LimitAction::parse("r", "status = 'open'").unwrap(),
            LimitAction::Predicate("status = 'open'".to_string())
        );
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        assert!(LimitAction::parse("r", "-5").is_err());
        assert!(LimitAction::parse("r", "150%").is_err());
        assert!(LimitAction::parse("r", "").is_err());
        assert!(LimitAction::parse("r", "where  ").is_err());
    }

    #[test]
    fn test_decimal_row_count_is_not_a_predicate() {
        let err = LimitRule::parse("users=1.5").unwrap_err();
        assert!(matches!(err, SampleError::RuleValidation { .. }));
        assert!(err.to_string().contains("whole number"));
        assert!(LimitAction::parse("r", ".5").is_err());
        assert!(LimitAction::parse("r", "3.").is_err());
        assert_eq!(LimitAction::parse("r", "1.5%").unwrap(), LimitAction::Percent(1.5));
    }

    #[test]
    fn test_percent_cap_rounds_up() {
        assert_eq!(LimitAction::Percent(10.0).cap(95), Some(10));
        assert_eq!(LimitAction::Percent(10.0).cap(0), Some(0));
        assert_eq!(LimitAction::Percent(0.0).cap(1000), Some(0));
        assert_eq!(LimitAction::Full.cap(1000), None);
    }

    #[test]
    fn test_rule_with_and_without_pattern() {
        let rule = LimitRule::parse("users=50").unwrap();
        assert_eq!(rule.pattern.text, "users");
        assert_eq!(rule.action, LimitAction::Rows(50));

        let global = LimitRule::parse("250").unwrap();
        assert!(global.pattern.is_wildcard());
        assert_eq!(global.action, LimitAction::Rows(250));

        let global_predicate = LimitRule::parse("status = 'open'").unwrap();
        assert!(global_predicate.pattern.is_wildcard());
        assert_eq!(
            global_predicate.action,
            LimitAction::Predicate("status = 'open'".to_string())
        );
    }

    #[test]
    fn test_predicate_keeps_equals_signs() {
        let rule = LimitRule::parse("orders=status = 'paid'").unwrap();
        assert_eq!(rule.pattern.text, "orders");
        assert_eq!(
            rule.action,
            LimitAction::Predicate("status = 'paid'".to_string())
        );
    }

    #[test]
    fn test_parse_list_respects_parentheses() {
        let rules = LimitRule::parse_list("users=50, orders=id IN (1, 2, 3), *=10").unwrap();
        assert_eq!(rules.len(), 3);
        assert_eq!(
            rules[1].action,
            LimitAction::Predicate("id IN (1, 2, 3)".to_string())
        );
        assert_eq!(rules[2].action, LimitAction::Rows(10));
    }

    #[test]
    fn test_empty_pattern_is_rejected() {
        assert!(LimitRule::parse("=50").is_err());
    }
}
