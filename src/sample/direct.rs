//! Direct sampling: live queries, closure through batched key lookups.

use super::closure::{close_to_fixpoint, ClosureBackend};
use super::{RowSet, RowSets, SampleContext, Sampler, SelectionStats, Strategy};
use crate::catalog::{Table, TableId};
use crate::error::{Result, SampleError};
use crate::graph::FkEdge;
use crate::rules::TablePlan;
use crate::source::{SourceDb, KEY_BATCH_SIZE};
use crate::value::{has_null, project, RowKey};
use ahash::AHashSet;
use tracing::debug;

pub struct DirectSampler<'s, S: SourceDb> {
    source: &'s mut S,
    stats: SelectionStats,
}

impl<'s, S: SourceDb> DirectSampler<'s, S> {
    pub fn new(source: &'s mut S) -> Self {
        Self {
            source,
            stats: SelectionStats::default(),
        }
    }
}

impl<S: SourceDb> Sampler for DirectSampler<'_, S> {
    fn strategy(&self) -> Strategy {
        Strategy::Direct
    }

    fn select(&mut self, table: &Table, plan: &TablePlan) -> Result<RowSet> {
        let rows = RowSet::from_rows(self.source.select_candidates(table, plan)?);
        self.stats.record_selected(table.id, rows.len() as u64);
        Ok(rows)
    }

    fn close_foreign_keys(&mut self, ctx: &SampleContext, rows: RowSets) -> Result<RowSets> {
        let mut backend = DirectClosure {
            source: &mut *self.source,
            ctx,
            rows,
            cursors: vec![0; ctx.graph.edges.len()],
        };
        self.stats.closure = close_to_fixpoint(&mut backend, ctx)?;
        Ok(backend.rows)
    }

    fn stats(&self) -> &SelectionStats {
        &self.stats
    }
}

/// Closure over in-memory row sets.
///
/// `cursors[e]` is the number of child rows already checked for edge `e`.
/// Child rows only ever get appended, so each row is checked once per edge
/// and a reference to a row that does not exist in the source is not
/// retried.
struct DirectClosure<'a, 'c, S: SourceDb> {
    source: &'a mut S,
    ctx: &'a SampleContext<'c>,
    rows: RowSets,
    cursors: Vec<usize>,
}

impl<'c, S: SourceDb> DirectClosure<'_, 'c, S> {
    fn missing_keys(&mut self, edge_index: usize, edge: &FkEdge) -> Vec<RowKey> {
        self.rows
            .get_mut(edge.parent_data)
            .ensure_index(&edge.referenced_columns);

        let parent = self.rows.get(edge.parent_data);
        let child_rows = self.rows.get(edge.child_data).rows();
        let start = self.cursors[edge_index];
        self.cursors[edge_index] = child_rows.len();

        let mut seen: AHashSet<RowKey> = AHashSet::new();
        let mut missing = Vec::new();
        for row in &child_rows[start..] {
            let key = project(&row.values, &edge.columns);
            if has_null(&key)
                || parent.contains_projection(&edge.referenced_columns, &key)
                || !seen.insert(key.clone())
            {
                continue;
            }
            missing.push(key);
        }
        missing
    }

    fn parent_plan(&self, parent: TableId) -> Result<&'c TablePlan> {
        let ctx: &SampleContext<'c> = self.ctx;
        ctx.plan.table_plan(parent).ok_or_else(|| {
            SampleError::structural(
                ctx.catalog.table(parent).display_name(),
                "referenced table is not sampled",
            )
        })
    }
}

impl<S: SourceDb> ClosureBackend for DirectClosure<'_, '_, S> {
    fn admit_missing_parents(&mut self, edge_index: usize, edge: &FkEdge) -> Result<u64> {
        let missing = self.missing_keys(edge_index, edge);
        if missing.is_empty() {
            return Ok(0);
        }

        let parent_table = self.ctx.catalog.table(edge.parent_data);
        let parent_plan = self.parent_plan(edge.parent_data)?;
        debug!(
            "Fetching {} missing row(s) of {}",
            missing.len(),
            parent_table.display_name()
        );

        let mut added = 0;
        for batch in missing.chunks(KEY_BATCH_SIZE) {
            self.ctx.cancel.check()?;
            let fetched =
                self.source
                    .fetch_by_keys(parent_table, parent_plan, &edge.referenced_columns, batch)?;
            added += self.rows.get_mut(edge.parent_data).extend(fetched);
        }
        Ok(added as u64)
    }
}
