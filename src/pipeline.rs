//! End-to-end run: catalog, plan, sample, close, verify, reconcile, emit.
//!
//! The phases are exposed separately so that they can be driven against any
//! `SourceDb`; `run` and `plan` wire them to a live PostgreSQL connection.
//! Every database read happens inside one REPEATABLE READ transaction, and
//! the target version is checked before any row is read. The script is
//! written to a temporary file and only moved into place once it is
//! complete, so a failed run never leaves a partial script behind.

use crate::audit::AuditRecord;
use crate::cancel::CancelToken;
use crate::catalog::postgres::{read_catalog, SchemaFilter};
use crate::catalog::Catalog;
use crate::config::RunConfig;
use crate::emit::{check_target, emit_script, EmitInput, EmitOptions, EmitSummary};
use crate::error::Result;
use crate::graph::{DependencyGraph, EmissionOrder};
use crate::progress::{Phase, ProgressEvent, ProgressSink};
use crate::rules::{Exclusion, RuleEngine, RuleSet, RuleSource, SamplingPlan, TableDecision};
use crate::sample::{
    self, verify_closure, SampleContext, SampleOutput, SamplingOptions, StagingMode, Strategy,
    StrategyPolicy,
};
use crate::sequence::{reconcile, SequenceTarget};
use crate::source::{PgSource, ScratchStore, SourceDb};
use crate::writer::{Output, ScriptWriter};
use postgres::{IsolationLevel, NoTls};
use serde::Serialize;
use std::fmt;
use std::io::Write;
use tracing::{info, warn};

/// Catalog with its resolved plan, graph and emission order
pub struct Prepared {
    pub catalog: Catalog,
    pub plan: SamplingPlan,
    pub graph: DependencyGraph,
    pub order: EmissionOrder,
    pub warnings: Vec<String>,
}

impl Prepared {
    pub fn context<'c>(
        &'c self,
        cancel: &'c CancelToken,
        progress: &'c dyn ProgressSink,
    ) -> SampleContext<'c> {
        SampleContext::new(
            &self.catalog,
            &self.plan,
            &self.graph,
            &self.order,
            cancel,
            progress,
        )
    }
}

/// Resolve rules against the catalog and compute the emission order
pub fn prepare(catalog: Catalog, rules: &RuleSet) -> Result<Prepared> {
    let plan = RuleEngine::new(rules.clone()).resolve(&catalog)?;
    let graph = DependencyGraph::build(&catalog, &plan)?;
    let order = EmissionOrder::compute(&catalog, &plan, &graph)?;

    let mut warnings = plan.warnings.clone();
    warnings.extend(order.warnings.iter().cloned());
    for warning in &warnings {
        warn!("{}", warning);
    }

    info!(
        "Planned {} of {} table(s), {} cyclic group(s), {} deferred foreign key(s)",
        order.data.len(),
        catalog.len(),
        order.cycles.len(),
        order.deferred.len()
    );

    Ok(Prepared {
        catalog,
        plan,
        graph,
        order,
        warnings,
    })
}

/// Closed row sets and the sequence values that go with them
pub struct SampledData {
    pub output: SampleOutput,
    pub sequences: Vec<SequenceTarget>,
}

/// Sample, close, optionally verify, and reconcile sequences
pub fn sample_phase<S: SourceDb + ScratchStore>(
    source: &mut S,
    prepared: &Prepared,
    options: &SamplingOptions,
    verify: bool,
    cancel: &CancelToken,
    progress: &dyn ProgressSink,
) -> Result<SampledData> {
    let ctx = prepared.context(cancel, progress);
    let output = sample::sample(source, &ctx, options)?;

    if verify {
        progress.event(ProgressEvent::Phase(Phase::Verification));
        verify_closure(&prepared.catalog, &prepared.graph, &output.row_sets)?;
    }

    progress.event(ProgressEvent::Phase(Phase::Sequences));
    let sequences = reconcile(
        source,
        &prepared.catalog,
        &prepared.plan,
        &prepared.order,
        &output.row_sets,
        cancel,
    )?;

    Ok(SampledData { output, sequences })
}

/// Write the script for a sampled run
pub fn emit_phase<W: Write>(
    writer: &mut ScriptWriter<W>,
    prepared: &Prepared,
    sampled: &SampledData,
    options: &EmitOptions,
) -> Result<EmitSummary> {
    let input = EmitInput {
        catalog: &prepared.catalog,
        plan: &prepared.plan,
        order: &prepared.order,
        rows: &sampled.output.row_sets,
        sequences: &sampled.sequences,
    };
    let summary = emit_script(writer, &input, options)?;
    writer.flush()?;
    Ok(summary)
}

/// One line of the dry-run report
#[derive(Debug, Clone, Serialize)]
pub struct PlanEntry {
    pub table: String,
    pub row_estimate: u64,
    /// Resolved limit, or why the table is left out
    pub limit: String,
    pub estimated_rows: u64,
    pub rule: String,
    pub excluded_columns: Vec<String>,
    pub sampled: bool,
}

/// Dry-run output: what a run would do, without reading any row
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub strategy: Strategy,
    pub tables: Vec<PlanEntry>,
    pub estimated_rows: u64,
    pub deferred_foreign_keys: usize,
    pub warnings: Vec<String>,
}

impl PlanReport {
    pub fn build(prepared: &Prepared, staging: StagingMode) -> Self {
        let catalog = &prepared.catalog;
        let mut tables = Vec::with_capacity(catalog.len());

        for table in catalog.iter() {
            let entry = match prepared.plan.decision(table.id) {
                TableDecision::Sampled(plan) => PlanEntry {
                    table: table.display_name(),
                    row_estimate: table.row_estimate,
                    limit: plan.action.describe(),
                    estimated_rows: plan.estimated_rows(table.row_estimate),
                    rule: match &plan.source {
                        RuleSource::Override(rule) => format!("table override {}", rule),
                        RuleSource::Rule(rule) => rule.clone(),
                        RuleSource::Default => "default".to_string(),
                    },
                    excluded_columns: plan
                        .excluded_columns
                        .iter()
                        .map(|&c| table.columns[c].name.clone())
                        .collect(),
                    sampled: true,
                },
                TableDecision::Partition { parent } => PlanEntry {
                    table: table.display_name(),
                    row_estimate: table.row_estimate,
                    limit: format!("via {}", catalog.table(*parent).display_name()),
                    estimated_rows: 0,
                    rule: "partition".to_string(),
                    excluded_columns: Vec::new(),
                    sampled: false,
                },
                TableDecision::Excluded(exclusion) => PlanEntry {
                    table: table.display_name(),
                    row_estimate: table.row_estimate,
                    limit: "excluded".to_string(),
                    estimated_rows: 0,
                    rule: match exclusion {
                        Exclusion::NotIncluded => "schema not included".to_string(),
                        Exclusion::Schema(rule) => format!("exclude-schema {}", rule),
                        Exclusion::Table(rule) => format!("exclude-table {}", rule),
                        Exclusion::Override(rule) => format!("table override {}", rule),
                        Exclusion::ParentExcluded => "parent excluded".to_string(),
                    },
                    excluded_columns: Vec::new(),
                    sampled: false,
                },
            };
            tables.push(entry);
        }
        tables.sort_by(|a, b| a.table.cmp(&b.table));

        Self {
            strategy: StrategyPolicy::new(staging).choose(catalog),
            estimated_rows: tables.iter().map(|t| t.estimated_rows).sum(),
            tables,
            deferred_foreign_keys: prepared.order.deferred.len(),
            warnings: prepared.warnings.clone(),
        }
    }
}

impl fmt::Display for PlanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .tables
            .iter()
            .map(|t| t.table.len())
            .max()
            .unwrap_or(5)
            .max(5);

        writeln!(
            f,
            "{:<width$}  {:>12}  {:<24}  {:>12}  {}",
            "Table",
            "Estimate",
            "Limit",
            "Rows",
            "Rule",
            width = width
        )?;
        writeln!(f, "{}", "-".repeat(width + 70))?;
        for entry in &self.tables {
            writeln!(
                f,
                "{:<width$}  {:>12}  {:<24}  {:>12}  {}",
                entry.table,
                entry.row_estimate,
                entry.limit,
                entry.estimated_rows,
                entry.rule,
                width = width
            )?;
            if !entry.excluded_columns.is_empty() {
                writeln!(
                    f,
                    "{:<width$}  excluded columns: {}",
                    "",
                    entry.excluded_columns.join(", "),
                    width = width
                )?;
            }
        }
        writeln!(f)?;
        writeln!(f, "Strategy: {}", self.strategy)?;
        writeln!(f, "Estimated rows before closure: {}", self.estimated_rows)?;
        writeln!(f, "Deferred foreign keys: {}", self.deferred_foreign_keys)?;
        for warning in &self.warnings {
            writeln!(f, "Warning: {}", warning)?;
        }
        Ok(())
    }
}

/// What a completed run did
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub strategy: Strategy,
    pub tables: usize,
    pub rows: u64,
    pub statements: usize,
    pub sequences: usize,
    pub warnings: Vec<String>,
}

fn connect(config: &RunConfig) -> Result<postgres::Client> {
    let client = config.connection.to_pg_config()?.connect(NoTls)?;
    Ok(client)
}

fn schema_filter(config: &RunConfig) -> SchemaFilter {
    SchemaFilter {
        include: config.schemas.clone(),
        skip: vec![config.scratch_schema.clone()],
    }
}

/// Dry run: read the catalog and report the plan
pub fn plan(config: &RunConfig, progress: &dyn ProgressSink) -> Result<PlanReport> {
    let rules = config.rule_set()?;
    let mut client = connect(config)?;
    let mut tx = client
        .build_transaction()
        .isolation_level(IsolationLevel::RepeatableRead)
        .read_only(true)
        .start()?;

    progress.event(ProgressEvent::Phase(Phase::Catalog));
    let catalog = read_catalog(&mut tx, &schema_filter(config))?;
    progress.event(ProgressEvent::Phase(Phase::Planning));
    let prepared = prepare(catalog, &rules)?;
    tx.rollback()?;

    progress.event(ProgressEvent::Finished);
    Ok(PlanReport::build(&prepared, config.staging))
}

/// Full run against a live database. The audit record is written whether
/// the run succeeds or not.
pub fn run(
    config: &RunConfig,
    cancel: &CancelToken,
    progress: &dyn ProgressSink,
) -> Result<RunSummary> {
    let (host, database) = config.connection.describe();
    let mut audit = AuditRecord::start(host, database, false);

    let result = execute(config, cancel, progress, &mut audit);
    match &result {
        Ok(_) => audit.succeed(),
        Err(e) => audit.fail(e),
    }
    if let Some(path) = &config.audit_file {
        if let Err(e) = audit.write(path) {
            warn!("Could not write audit record to {}: {}", path.display(), e);
        }
    }
    progress.event(ProgressEvent::Finished);
    result
}

fn execute(
    config: &RunConfig,
    cancel: &CancelToken,
    progress: &dyn ProgressSink,
    audit: &mut AuditRecord,
) -> Result<RunSummary> {
    let rules = config.rule_set()?;
    let mut client = connect(config)?;
    cancel.check()?;

    // Staging writes scratch tables, so only a run that can never stage is
    // read-only
    let tx = client
        .build_transaction()
        .isolation_level(IsolationLevel::RepeatableRead)
        .read_only(config.staging == StagingMode::Off)
        .start()?;
    let mut source = PgSource::new(tx).with_seed(config.seed);

    progress.event(ProgressEvent::Phase(Phase::Catalog));
    let catalog = read_catalog(source.client(), &schema_filter(config))?;
    cancel.check()?;

    progress.event(ProgressEvent::Phase(Phase::Planning));
    let prepared = prepare(catalog, &rules)?;
    audit.record_rules(
        &prepared.plan.rule_matches,
        prepared.plan.excluded_column_names(&prepared.catalog),
    );
    audit.warnings.extend(prepared.warnings.iter().cloned());

    let mut options = config.emit_options();
    check_target(&prepared.catalog, &prepared.plan, &prepared.order, &options)?;

    let sampled = sample_phase(
        &mut source,
        &prepared,
        &config.sampling_options(),
        config.verify,
        cancel,
        progress,
    )?;
    audit.record_sample(&sampled.output, &sampled.sequences);
    cancel.check()?;

    progress.event(ProgressEvent::Phase(Phase::Writing));
    if let Some(database) = &audit.database {
        options.header.push(format!("Source database: {}", database));
    }
    options
        .header
        .push(format!("Strategy: {}", sampled.output.strategy));

    let output = Output::open(config.output.as_deref(), config.compress)?;
    let mut writer = ScriptWriter::new(output);
    let summary = emit_phase(&mut writer, &prepared, &sampled, &options)?;
    writer.into_inner()?.finish()?;
    audit.warnings.extend(summary.warnings.iter().cloned());

    source.commit()?;

    let mut warnings = prepared.warnings.clone();
    warnings.extend(sampled.output.warnings.iter().cloned());
    warnings.extend(summary.warnings);

    Ok(RunSummary {
        strategy: sampled.output.strategy,
        tables: sampled.output.tables.len(),
        rows: summary.rows,
        statements: summary.statements,
        sequences: sampled.sequences.len(),
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, QualifiedName, Table, TableId};
    use crate::progress::NoProgress;
    use crate::rules::RuleSet;
    use crate::source::MemorySource;
    use crate::value::Value;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.add_table(
            Table::new("public", "users")
                .column(Column::new("id", "integer").not_null())
                .column(Column::new("password", "text"))
                .primary_key("users_pkey", &["id"])
                .estimate(1000),
        );
        catalog.add_table(
            Table::new("public", "orders")
                .column(Column::new("id", "integer").not_null())
                .column(Column::new("user_id", "integer").not_null())
                .primary_key("orders_pkey", &["id"])
                .foreign_key(
                    "orders_user_fk",
                    &["user_id"],
                    QualifiedName::new("public", "users"),
                    &["id"],
                )
                .estimate(5000),
        );
        catalog.finish().unwrap()
    }

    #[test]
    fn test_plan_report_lists_every_table() {
        let rules = RuleSet::new()
            .limit("users=50")
            .unwrap()
            .limit("ghost=1")
            .unwrap()
            .exclude_column("*.password")
            .unwrap();
        let prepared = prepare(catalog(), &rules).unwrap();
        let report = PlanReport::build(&prepared, StagingMode::Auto);

        assert_eq!(report.strategy, Strategy::Direct);
        let users = report.tables.iter().find(|t| t.table == "public.users").unwrap();
        assert_eq!(users.estimated_rows, 50);
        assert_eq!(users.excluded_columns, vec!["password".to_string()]);
        let orders = report.tables.iter().find(|t| t.table == "public.orders").unwrap();
        assert_eq!(orders.rule, "default");
        assert_eq!(orders.estimated_rows, 100);
        assert!(report.warnings.iter().any(|w| w.contains("ghost=1")));

        let text = report.to_string();
        assert!(text.contains("public.orders"));
        assert!(text.contains("excluded columns: password"));
    }

    #[test]
    fn test_phases_against_memory_source() {
        let prepared = prepare(catalog(), &RuleSet::new().limit("orders=2").unwrap()).unwrap();
        let users = prepared.catalog.table(TableId(0)).qualified();
        let orders = prepared.catalog.table(TableId(1)).qualified();
        let mut source = MemorySource::new()
            .with_rows(
                users,
                (1..=3).map(|i| vec![Value::Int(i), Value::from("secret")]).collect(),
            )
            .with_rows(
                orders,
                vec![
                    vec![Value::Int(1), Value::Int(3)],
                    vec![Value::Int(2), Value::Int(3)],
                    vec![Value::Int(3), Value::Int(1)],
                ],
            );

        let sampled = sample_phase(
            &mut source,
            &prepared,
            &SamplingOptions::default(),
            true,
            &CancelToken::new(),
            &NoProgress,
        )
        .unwrap();

        let mut writer = ScriptWriter::new(Vec::new());
        let summary = emit_phase(&mut writer, &prepared, &sampled, &EmitOptions::default()).unwrap();
        let script = String::from_utf8(writer.into_inner().unwrap()).unwrap();

        assert!(script.starts_with("-- Sample generated by"));
        assert!(script.trim_end().ends_with("COMMIT;"));
        assert!(script.contains("INSERT INTO \"public\".\"orders\""));
        assert!(summary.rows >= 2);
    }
}
