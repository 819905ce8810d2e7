//! Foreign-key dependency graph over the tables kept by a `SamplingPlan`.
//!
//! Nodes are tables addressed by `TableId`; edges are foreign keys pointing
//! from the referencing (child) table to the referenced (parent) table. The
//! graph is a multigraph: two foreign keys between the same pair of tables
//! are two edges, and a self-referencing foreign key is a self-loop.
//!
//! Partitions hold no rows of their own in a sample (their rows live in
//! the row set of the partitioned root), so edges are drawn between *data
//! tables* as reported by `SamplingPlan::data_table`.

pub mod order;
pub mod scc;

pub use order::EmissionOrder;

use crate::catalog::{Catalog, TableId};
use crate::error::{Result, SampleError};
use crate::rules::SamplingPlan;

/// One foreign key between two data tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FkEdge {
    /// Referencing table (as declared)
    pub child: TableId,
    /// Position of the constraint in `child.constraints`
    pub constraint: usize,
    /// Referenced table (as declared; may be a partition)
    pub parent: TableId,
    /// Data table holding the child's rows
    pub child_data: TableId,
    /// Data table holding the parent's rows
    pub parent_data: TableId,
    /// Referencing column positions in the child
    pub columns: Vec<usize>,
    /// Referenced column positions in the parent
    pub referenced_columns: Vec<usize>,
    /// False when a referencing column is excluded; such edges order data
    /// but are never closed over
    pub followable: bool,
}

impl FkEdge {
    pub fn is_self_loop(&self) -> bool {
        self.child_data == self.parent_data
    }
}

/// Directed multigraph of foreign keys between kept tables
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Number of node slots (one per catalog table)
    node_count: usize,
    pub edges: Vec<FkEdge>,
    /// Edge indices by child data table
    outgoing: Vec<Vec<usize>>,
    /// Edge indices by parent data table
    incoming: Vec<Vec<usize>>,
    pub warnings: Vec<String>,
}

impl DependencyGraph {
    /// Build the graph from the kept tables of `plan`.
    ///
    /// Fails with a structural error when a followed foreign key references
    /// a column set that no primary key, unique constraint or unique
    /// non-partial index covers.
    pub fn build(catalog: &Catalog, plan: &SamplingPlan) -> Result<Self> {
        let node_count = catalog.len();
        let mut graph = Self {
            node_count,
            edges: Vec::new(),
            outgoing: vec![Vec::new(); node_count],
            incoming: vec![Vec::new(); node_count],
            warnings: Vec::new(),
        };

        for table in catalog.iter() {
            let Some(child_data) = plan.data_table(table.id) else {
                continue;
            };
            let data_plan = plan.table_plan(child_data);

            for (pos, constraint, fk) in table.foreign_keys() {
                if plan
                    .table_plan(table.id)
                    .is_some_and(|p| p.dropped_foreign_keys.contains(&pos))
                {
                    continue;
                }
                let Some(parent) = fk.referenced else {
                    continue;
                };
                let Some(parent_data) = plan.data_table(parent) else {
                    continue;
                };

                let parent_table = catalog.table(parent);
                if !parent_table.has_unique_cover(&fk.referenced_columns) {
                    return Err(SampleError::structural(
                        table.display_name(),
                        format!(
                            "foreign key '{}' references columns of {} that no primary key or unique constraint covers",
                            constraint.name,
                            parent_table.display_name()
                        ),
                    ));
                }

                // Partition rows share the column layout of their root
                let followable = !constraint
                    .columns
                    .iter()
                    .any(|&c| data_plan.is_some_and(|p| p.is_excluded(c)));
                if !followable {
                    graph.warnings.push(format!(
                        "{}: foreign key '{}' has excluded columns and is not followed",
                        table.display_name(),
                        constraint.name
                    ));
                }

                let index = graph.edges.len();
                graph.outgoing[child_data.index()].push(index);
                graph.incoming[parent_data.index()].push(index);
                graph.edges.push(FkEdge {
                    child: table.id,
                    constraint: pos,
                    parent,
                    child_data,
                    parent_data,
                    columns: constraint.columns.clone(),
                    referenced_columns: fk.referenced_columns.clone(),
                    followable,
                });
            }
        }

        Ok(graph)
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Edges leaving a data table (its foreign keys)
    pub fn parents_of(&self, table: TableId) -> impl Iterator<Item = &FkEdge> {
        self.outgoing[table.index()].iter().map(|&i| &self.edges[i])
    }

    /// Edges entering a data table (foreign keys that reference it)
    pub fn children_of(&self, table: TableId) -> impl Iterator<Item = &FkEdge> {
        self.incoming[table.index()].iter().map(|&i| &self.edges[i])
    }

    /// Edges that closure follows
    pub fn followable_edges(&self) -> impl Iterator<Item = &FkEdge> {
        self.edges.iter().filter(|e| e.followable)
    }

    /// Child-to-parent adjacency over data tables, deduplicated
    pub fn adjacency(&self) -> Vec<Vec<usize>> {
        let mut adjacency = vec![Vec::new(); self.node_count];
        for edge in &self.edges {
            let list: &mut Vec<usize> = &mut adjacency[edge.child_data.index()];
            if !list.contains(&edge.parent_data.index()) {
                list.push(edge.parent_data.index());
            }
        }
        adjacency
    }

    pub fn has_self_loop(&self, table: TableId) -> bool {
        self.parents_of(table).any(|e| e.is_self_loop())
    }
}
