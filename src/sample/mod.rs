//! Sampling executor.
//!
//! Two strategies sit behind the `Sampler` trait:
//! - `DirectSampler` selects candidates with live queries and closes over
//!   foreign keys by fetching missing parents in key batches
//! - `StagedSampler` copies candidates into a scratch schema and closes
//!   over foreign keys with anti-joins inside the database
//!
//! Both produce the same row sets. `sample` picks a strategy through the
//! `StrategyPolicy`, falls back to direct mode when the scratch schema
//! cannot be set up, and reports per-table counts.

pub mod closure;
pub mod direct;
pub mod policy;
pub mod rowset;
pub mod session;
pub mod staged;
pub mod verify;

pub use closure::{ClosureStats, MAX_CLOSURE_ITERATIONS};
pub use direct::DirectSampler;
pub use policy::{StagingMode, Strategy, StrategyPolicy};
pub use rowset::{RowSet, RowSets};
pub use session::StagingSession;
pub use staged::StagedSampler;
pub use verify::verify_closure;

use crate::cancel::CancelToken;
use crate::catalog::{Catalog, Table, TableId};
use crate::error::{Result, SampleError};
use crate::graph::{DependencyGraph, EmissionOrder};
use crate::progress::{Phase, ProgressEvent, ProgressSink};
use crate::rules::{SamplingPlan, TablePlan};
use crate::source::{ScratchStore, SourceDb};
use ahash::AHashMap;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Default scratch schema name
pub const DEFAULT_SCRATCH_SCHEMA: &str = "_dbsample";

/// Everything a sampler needs to know about the run
pub struct SampleContext<'c> {
    pub catalog: &'c Catalog,
    pub plan: &'c SamplingPlan,
    pub graph: &'c DependencyGraph,
    pub order: &'c EmissionOrder,
    pub cancel: &'c CancelToken,
    pub progress: &'c dyn ProgressSink,
}

impl<'c> SampleContext<'c> {
    pub fn new(
        catalog: &'c Catalog,
        plan: &'c SamplingPlan,
        graph: &'c DependencyGraph,
        order: &'c EmissionOrder,
        cancel: &'c CancelToken,
        progress: &'c dyn ProgressSink,
    ) -> Self {
        Self {
            catalog,
            plan,
            graph,
            order,
            cancel,
            progress,
        }
    }
}

/// Rows selected per table before closure, and closure totals
#[derive(Debug, Clone, Default)]
pub struct SelectionStats {
    selected: AHashMap<TableId, u64>,
    pub closure: ClosureStats,
}

impl SelectionStats {
    pub fn record_selected(&mut self, table: TableId, rows: u64) {
        self.selected.insert(table, rows);
    }

    pub fn selected(&self, table: TableId) -> u64 {
        self.selected.get(&table).copied().unwrap_or(0)
    }
}

/// One sampling strategy
pub trait Sampler {
    fn strategy(&self) -> Strategy;

    /// Candidate rows of one table: predicate, cap and ordering applied
    fn select(&mut self, table: &Table, plan: &TablePlan) -> Result<RowSet>;

    /// Grow the row sets until every followed foreign key of every kept
    /// row resolves to a kept row
    fn close_foreign_keys(&mut self, ctx: &SampleContext, rows: RowSets) -> Result<RowSets>;

    fn stats(&self) -> &SelectionStats;
}

/// Options controlling strategy choice and the scratch schema
#[derive(Debug, Clone)]
pub struct SamplingOptions {
    pub staging: StagingMode,
    pub scratch_schema: String,
    /// Drop a pre-existing scratch schema of the same name
    pub force: bool,
    /// Leave the scratch schema in place after a successful run
    pub keep: bool,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            staging: StagingMode::Auto,
            scratch_schema: DEFAULT_SCRATCH_SCHEMA.to_string(),
            force: false,
            keep: false,
        }
    }
}

/// Per-table sampling statistics
#[derive(Debug, Clone, Serialize)]
pub struct TableSample {
    #[serde(skip)]
    pub id: TableId,
    pub table: String,
    /// Rows chosen by the table's own rule
    pub selected: u64,
    /// Rows added to satisfy foreign keys
    pub closure_added: u64,
    pub total: u64,
}

/// Result of a sampling run
#[derive(Debug)]
pub struct SampleOutput {
    pub row_sets: RowSets,
    pub strategy: Strategy,
    /// In load order
    pub tables: Vec<TableSample>,
    pub closure: ClosureStats,
    pub warnings: Vec<String>,
}

impl SampleOutput {
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.total).sum()
    }
}

/// Select and close the sample with the strategy the policy chooses.
///
/// When staging is chosen but the scratch schema cannot be set up, the run
/// continues in direct mode with a warning. Forced staging only falls back
/// for a missing privilege; any other setup failure is returned.
pub fn sample<S: SourceDb + ScratchStore>(
    source: &mut S,
    ctx: &SampleContext,
    options: &SamplingOptions,
) -> Result<SampleOutput> {
    let policy = StrategyPolicy::new(options.staging);
    let mut warnings = Vec::new();

    if policy.choose(ctx.catalog) == Strategy::Staged {
        match StagingSession::open(
            source,
            &options.scratch_schema,
            options.force,
            options.keep,
        ) {
            Ok(session) => {
                let mut sampler = StagedSampler::new(session);
                let output = run(&mut sampler, ctx, warnings)?;
                sampler.finish()?;
                return Ok(output);
            }
            Err(SampleError::Cancelled) => return Err(SampleError::Cancelled),
            Err(e)
                if policy.may_fall_back() || matches!(e, SampleError::Permission { .. }) =>
            {
                let message = format!("Staged sampling unavailable ({}); using direct mode", e);
                warn!("{}", message);
                warnings.push(message);
            }
            Err(e) => return Err(e),
        }
    }

    let mut sampler = DirectSampler::new(source);
    run(&mut sampler, ctx, warnings)
}

fn run<P: Sampler + ?Sized>(
    sampler: &mut P,
    ctx: &SampleContext,
    warnings: Vec<String>,
) -> Result<SampleOutput> {
    info!("Sampling {} table(s) in {} mode", ctx.order.data.len(), sampler.strategy());
    ctx.progress.event(ProgressEvent::Phase(Phase::Sampling));

    let total = ctx.order.data.len();
    let mut rows = RowSets::new(ctx.catalog.len());
    for (completed, &id) in ctx.order.data.iter().enumerate() {
        ctx.cancel.check()?;
        let Some(plan) = ctx.plan.table_plan(id) else {
            continue;
        };
        let table = ctx.catalog.table(id);
        ctx.progress.event(ProgressEvent::Table {
            name: table.display_name(),
            completed,
            total,
        });
        let selected = sampler.select(table, plan)?;
        debug!("{}: {}", table.display_name(), plan.action.describe());
        rows.set(id, selected);
    }

    ctx.progress.event(ProgressEvent::Phase(Phase::Closure));
    let rows = sampler.close_foreign_keys(ctx, rows)?;
    let stats = sampler.stats();

    let tables: Vec<TableSample> = ctx
        .order
        .data
        .iter()
        .map(|&id| {
            let total = rows.get(id).len() as u64;
            let selected = stats.selected(id);
            TableSample {
                id,
                table: ctx.catalog.table(id).display_name(),
                selected,
                closure_added: total.saturating_sub(selected),
                total,
            }
        })
        .collect();

    info!(
        "Sampled {} row(s); closure added {} in {} pass(es)",
        rows.total_rows(),
        stats.closure.rows_added,
        stats.closure.iterations
    );

    Ok(SampleOutput {
        strategy: sampler.strategy(),
        closure: stats.closure,
        row_sets: rows,
        tables,
        warnings,
    })
}
