//! Post-sample referential audit.

use super::RowSets;
use crate::catalog::Catalog;
use crate::error::{Result, SampleError};
use crate::graph::DependencyGraph;
use crate::value::{has_null, project, RowKey};
use ahash::AHashSet;
use tracing::info;

/// Check that every non-NULL foreign-key tuple of every followed edge has
/// its referenced row in the final row sets.
pub fn verify_closure(catalog: &Catalog, graph: &DependencyGraph, rows: &RowSets) -> Result<()> {
    let mut checked = 0usize;
    for edge in graph.followable_edges() {
        let present: AHashSet<RowKey> = rows
            .get(edge.parent_data)
            .rows()
            .iter()
            .map(|r| project(&r.values, &edge.referenced_columns))
            .collect();

        let mut dangling = 0usize;
        let mut first: Option<RowKey> = None;
        for row in rows.get(edge.child_data).rows() {
            let key = project(&row.values, &edge.columns);
            if has_null(&key) || present.contains(&key) {
                continue;
            }
            dangling += 1;
            first.get_or_insert(key);
        }

        if let Some(key) = first {
            let child = catalog.table(edge.child);
            return Err(SampleError::ReferentialIntegrity {
                table: child.display_name(),
                constraint: child.constraints[edge.constraint].name.clone(),
                referenced: catalog.table(edge.parent).display_name(),
                message: format!(
                    "{} row(s) without a parent, first key ({})",
                    dangling,
                    key.iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            });
        }
        checked += 1;
    }
    info!("Verified {} foreign key(s)", checked);
    Ok(())
}
