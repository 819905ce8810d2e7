//! Foreign-key closure to a fixpoint.
//!
//! Each pass visits every followed foreign key, children before parents,
//! and admits the parent rows that kept child rows reference but that are
//! not in the sample yet. The keys inside one cyclic component (a
//! self-reference, or tables that reference each other) are swept together
//! and repeated within the pass until a sweep adds no row, so a long chain
//! of rows through a cycle costs sweeps, not passes. The loop ends after the
//! first pass that adds nothing.
//!
//! Sweeps of a cyclic group always end: row sets only grow, and every row
//! they admit comes from the finite source.

use super::SampleContext;
use crate::catalog::TableId;
use crate::error::{Result, SampleError};
use crate::graph::FkEdge;
use crate::progress::ProgressEvent;
use ahash::AHashMap;
use serde::Serialize;
use std::cmp::Reverse;
use tracing::debug;

/// Passes allowed before the closure is declared runaway. With cyclic
/// groups closed inside a pass, real data settles in a handful of passes.
pub const MAX_CLOSURE_ITERATIONS: usize = 1000;

/// Strategy-specific half of the closure: pull missing parents for one edge
pub trait ClosureBackend {
    /// Admit every parent row referenced through `edge` by a kept child row
    /// and not kept yet. Returns the number of rows added.
    fn admit_missing_parents(&mut self, edge_index: usize, edge: &FkEdge) -> Result<u64>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClosureStats {
    /// Passes run, including the final empty one
    pub iterations: usize,
    /// Sweeps over cyclic groups, across all passes
    pub cycle_sweeps: usize,
    pub rows_added: u64,
}

/// Edges visited as a unit within a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeGroup {
    /// Edge indices, in visiting order
    pub edges: Vec<usize>,
    /// Internal edges of a cyclic component; swept until quiet
    pub cyclic: bool,
}

/// Followable edges in visiting order: deepest children first
pub fn visiting_order(ctx: &SampleContext) -> Vec<usize> {
    let position: AHashMap<_, usize> = ctx
        .order
        .data
        .iter()
        .enumerate()
        .map(|(i, &id)| (id, i))
        .collect();

    let mut edges: Vec<usize> = ctx
        .graph
        .edges
        .iter()
        .enumerate()
        .filter(|(_, e)| e.followable)
        .map(|(i, _)| i)
        .collect();
    edges.sort_by_key(|&i| {
        let edge = &ctx.graph.edges[i];
        (Reverse(position.get(&edge.child_data).copied().unwrap_or(0)), i)
    });
    edges
}

/// Followable edges grouped for one pass. The internal edges of each
/// cyclic component form one group, placed where its first edge falls in
/// visiting order; every other edge is a group of its own.
pub fn closure_groups(ctx: &SampleContext) -> Vec<EdgeGroup> {
    let mut cycle_of: AHashMap<TableId, usize> = AHashMap::new();
    for (c, members) in ctx.order.cycles.iter().enumerate() {
        for &id in members {
            cycle_of.insert(id, c);
        }
    }

    let mut groups: Vec<EdgeGroup> = Vec::new();
    let mut group_of_cycle: AHashMap<usize, usize> = AHashMap::new();
    for index in visiting_order(ctx) {
        let edge = &ctx.graph.edges[index];
        let cycle = match (cycle_of.get(&edge.child_data), cycle_of.get(&edge.parent_data)) {
            (Some(child), Some(parent)) if child == parent => Some(*child),
            _ => None,
        };
        match cycle {
            Some(c) => match group_of_cycle.get(&c) {
                Some(&g) => groups[g].edges.push(index),
                None => {
                    group_of_cycle.insert(c, groups.len());
                    groups.push(EdgeGroup {
                        edges: vec![index],
                        cyclic: true,
                    });
                }
            },
            None => groups.push(EdgeGroup {
                edges: vec![index],
                cyclic: false,
            }),
        }
    }
    groups
}

pub fn close_to_fixpoint<B: ClosureBackend + ?Sized>(
    backend: &mut B,
    ctx: &SampleContext,
) -> Result<ClosureStats> {
    let groups = closure_groups(ctx);
    let mut stats = ClosureStats::default();
    if groups.is_empty() {
        return Ok(stats);
    }

    loop {
        let mut added = 0u64;
        let mut growing: Option<usize> = None;

        for group in &groups {
            loop {
                let mut swept = 0u64;
                for &index in &group.edges {
                    ctx.cancel.check()?;
                    let n = backend.admit_missing_parents(index, &ctx.graph.edges[index])?;
                    if n > 0 {
                        swept += n;
                        growing.get_or_insert(index);
                    }
                }
                added += swept;
                if !group.cyclic {
                    break;
                }
                stats.cycle_sweeps += 1;
                if swept == 0 {
                    break;
                }
            }
        }

        stats.iterations += 1;
        stats.rows_added += added;
        debug!("Closure pass {} added {} rows", stats.iterations, added);
        ctx.progress.event(ProgressEvent::ClosureIteration {
            iteration: stats.iterations,
            rows_added: added,
        });

        if added == 0 {
            return Ok(stats);
        }
        if stats.iterations >= MAX_CLOSURE_ITERATIONS {
            let edge = growing.map(|i| &ctx.graph.edges[i]);
            let table = edge
                .map(|e| ctx.catalog.table(e.child).display_name())
                .unwrap_or_default();
            let constraint = edge
                .map(|e| ctx.catalog.table(e.child).constraints[e.constraint].name.clone())
                .unwrap_or_default();
            return Err(SampleError::structural(
                table,
                format!(
                    "foreign key closure did not converge after {} passes (still growing through '{}')",
                    MAX_CLOSURE_ITERATIONS, constraint
                ),
            ));
        }
    }
}
