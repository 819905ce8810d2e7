//! Audit record written after every run, successful or not.
//!
//! The record names the host and database only. User names, passwords and
//! connection URIs never appear in it.

use crate::rules::RuleMatch;
use crate::sample::{ClosureStats, SampleOutput, Strategy, TableSample};
use crate::sequence::SequenceTarget;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub tool: String,
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub host: Option<String>,
    pub database: Option<String>,
    pub strategy: Option<Strategy>,
    pub dry_run: bool,
    pub tables: Vec<TableSample>,
    pub total_rows: u64,
    pub rules: Vec<RuleMatch>,
    /// Rules that matched no table
    pub zero_match_rules: Vec<String>,
    pub excluded_columns: Vec<String>,
    pub sequences: Vec<SequenceTarget>,
    pub closure: ClosureStats,
    pub warnings: Vec<String>,
    pub outcome: Outcome,
    pub error: Option<String>,
}

impl AuditRecord {
    pub fn start(host: Option<String>, database: Option<String>, dry_run: bool) -> Self {
        Self {
            tool: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Utc::now(),
            finished_at: None,
            host,
            database,
            strategy: None,
            dry_run,
            tables: Vec::new(),
            total_rows: 0,
            rules: Vec::new(),
            zero_match_rules: Vec::new(),
            excluded_columns: Vec::new(),
            sequences: Vec::new(),
            closure: ClosureStats::default(),
            warnings: Vec::new(),
            outcome: Outcome::Failed,
            error: None,
        }
    }

    pub fn record_rules(&mut self, rules: &[RuleMatch], excluded_columns: Vec<String>) {
        self.rules = rules.to_vec();
        self.zero_match_rules = rules
            .iter()
            .filter(|m| m.matches == 0)
            .map(|m| m.rule.clone())
            .collect();
        self.excluded_columns = excluded_columns;
    }

    pub fn record_sample(&mut self, output: &SampleOutput, sequences: &[SequenceTarget]) {
        self.strategy = Some(output.strategy);
        self.tables = output.tables.clone();
        self.total_rows = output.total_rows();
        self.closure = output.closure;
        self.sequences = sequences.to_vec();
        self.warnings.extend(output.warnings.iter().cloned());
    }

    pub fn succeed(&mut self) {
        self.finished_at = Some(Utc::now());
        self.outcome = Outcome::Success;
        self.error = None;
    }

    /// Error text comes from `SampleError`'s display, which carries no
    /// credentials
    pub fn fail(&mut self, error: &crate::error::SampleError) {
        self.finished_at = Some(Utc::now());
        self.outcome = match error {
            crate::error::SampleError::Cancelled => Outcome::Cancelled,
            _ => Outcome::Failed,
        };
        self.error = Some(error.to_string());
    }

    pub fn write(&self, path: &Path) -> crate::error::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SampleError;
    use crate::rules::RuleKind;
    use tempfile::TempDir;

    #[test]
    fn test_zero_match_rules_collected() {
        let mut record = AuditRecord::start(Some("db".to_string()), Some("shop".to_string()), false);
        record.record_rules(
            &[
                RuleMatch {
                    rule: "users=50".to_string(),
                    kind: RuleKind::Limit,
                    matches: 1,
                },
                RuleMatch {
                    rule: "ghost=5".to_string(),
                    kind: RuleKind::Limit,
                    matches: 0,
                },
            ],
            vec!["public.users.password".to_string()],
        );
        assert_eq!(record.zero_match_rules, vec!["ghost=5".to_string()]);
    }

    #[test]
    fn test_written_record_is_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.json");

        let mut record = AuditRecord::start(Some("db".to_string()), Some("shop".to_string()), false);
        record.fail(&SampleError::Cancelled);
        record.write(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["outcome"], "cancelled");
        assert_eq!(value["database"], "shop");
        assert!(value["finished_at"].is_string());
    }
}
