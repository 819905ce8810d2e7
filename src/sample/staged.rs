//! Staged sampling: candidate rows are copied into scratch tables and the
//! closure runs as anti-joins inside the source database, so no key list
//! ever travels to the client. Final row sets are read back once.

use super::closure::{close_to_fixpoint, ClosureBackend};
use super::session::StagingSession;
use super::{RowSet, RowSets, SampleContext, Sampler, SelectionStats, Strategy};
use crate::catalog::Table;
use crate::error::{Result, SampleError};
use crate::graph::FkEdge;
use crate::rules::TablePlan;
use crate::source::ScratchStore;
use tracing::debug;

pub struct StagedSampler<'s, S: ScratchStore> {
    session: StagingSession<'s, S>,
    stats: SelectionStats,
}

impl<'s, S: ScratchStore> StagedSampler<'s, S> {
    pub fn new(session: StagingSession<'s, S>) -> Self {
        Self {
            session,
            stats: SelectionStats::default(),
        }
    }

    /// Tear the scratch schema down (unless kept)
    pub fn finish(self) -> Result<()> {
        self.session.finish()
    }

    /// Index identity columns plus every foreign-key and referenced column
    /// set that the closure joins on
    fn index_scratch_tables(&mut self, ctx: &SampleContext) -> Result<()> {
        for &id in &ctx.order.data {
            let table = ctx.catalog.table(id);
            let mut column_sets: Vec<&[usize]> = vec![table.primary_key_columns()];
            for edge in ctx.graph.parents_of(id).filter(|e| e.followable) {
                column_sets.push(&edge.columns);
            }
            for edge in ctx.graph.children_of(id).filter(|e| e.followable) {
                column_sets.push(&edge.referenced_columns);
            }

            let mut done: Vec<&[usize]> = Vec::new();
            for columns in column_sets {
                if done.contains(&columns) {
                    continue;
                }
                ctx.cancel.check()?;
                let schema = self.session.schema().to_string();
                self.session.store().index_keys(&schema, table, columns)?;
                done.push(columns);
            }
        }
        Ok(())
    }
}

impl<S: ScratchStore> Sampler for StagedSampler<'_, S> {
    fn strategy(&self) -> Strategy {
        Strategy::Staged
    }

    /// Stages candidates; the returned row set stays empty until closure
    /// reads the scratch tables back.
    fn select(&mut self, table: &Table, plan: &TablePlan) -> Result<RowSet> {
        let schema = self.session.schema().to_string();
        let staged = self.session.store().stage_candidates(&schema, table, plan)?;
        debug!("Staged {} row(s) of {}", staged, table.display_name());
        self.stats.record_selected(table.id, staged);
        Ok(RowSet::new())
    }

    fn close_foreign_keys(&mut self, ctx: &SampleContext, mut rows: RowSets) -> Result<RowSets> {
        self.index_scratch_tables(ctx)?;

        let schema = self.session.schema().to_string();
        let mut backend = StagedClosure {
            store: self.session.store(),
            schema: &schema,
            ctx,
        };
        self.stats.closure = close_to_fixpoint(&mut backend, ctx)?;

        for &id in &ctx.order.data {
            ctx.cancel.check()?;
            let Some(plan) = ctx.plan.table_plan(id) else {
                continue;
            };
            let staged = self
                .session
                .store()
                .read_staged(&schema, ctx.catalog.table(id), plan)?;
            rows.set(id, RowSet::from_rows(staged));
        }
        Ok(rows)
    }

    fn stats(&self) -> &SelectionStats {
        &self.stats
    }
}

struct StagedClosure<'a, 'c, S: ScratchStore> {
    store: &'a mut S,
    schema: &'a str,
    ctx: &'a SampleContext<'c>,
}

impl<S: ScratchStore> ClosureBackend for StagedClosure<'_, '_, S> {
    fn admit_missing_parents(&mut self, _edge_index: usize, edge: &FkEdge) -> Result<u64> {
        let catalog = self.ctx.catalog;
        let parent_plan = self.ctx.plan.table_plan(edge.parent_data).ok_or_else(|| {
            SampleError::structural(
                catalog.table(edge.parent_data).display_name(),
                "referenced table is not sampled",
            )
        })?;
        self.store.admit_missing_parents(
            self.schema,
            edge,
            catalog.table(edge.child_data),
            catalog.table(edge.parent_data),
            parent_plan,
        )
    }
}
