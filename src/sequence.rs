//! Sequence reconciliation.
//!
//! Every sequence feeding a kept column is set past the largest value that
//! column holds in the sample, so inserts into the sampled database do not
//! collide. When the column is excluded (its values are NULL in the
//! output) the live source maximum is used instead.

use crate::cancel::CancelToken;
use crate::catalog::{Catalog, QualifiedName};
use crate::error::Result;
use crate::graph::EmissionOrder;
use crate::rules::SamplingPlan;
use crate::sample::RowSets;
use crate::source::SourceDb;
use serde::Serialize;
use tracing::{debug, warn};

/// Value a sequence is set to after the data load
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceTarget {
    /// Index into `catalog.sequences`
    #[serde(skip)]
    pub sequence: usize,
    pub name: String,
    /// Largest value seen over every bound column, if any
    pub observed: Option<i64>,
    /// Next value the sequence hands out
    pub next_value: i64,
}

impl SequenceTarget {
    /// `setval(..., false)` so that `next_value` is the next `nextval()`
    pub fn setval_sql(&self, name: &QualifiedName) -> String {
        format!(
            "SELECT pg_catalog.setval({}, {}, false);",
            crate::catalog::quote_literal(&name.quoted()),
            self.next_value
        )
    }
}

/// Compute one target per emitted sequence that feeds at least one kept
/// column. Free-standing sequences are left alone.
pub fn reconcile<S: SourceDb + ?Sized>(
    source: &mut S,
    catalog: &Catalog,
    plan: &SamplingPlan,
    order: &EmissionOrder,
    rows: &RowSets,
    cancel: &CancelToken,
) -> Result<Vec<SequenceTarget>> {
    let mut targets = Vec::new();

    for &index in &order.sequences {
        let sequence = &catalog.sequences[index];
        let mut bound: Vec<&(QualifiedName, String)> = sequence.bindings.iter().collect();
        if let Some(owner) = &sequence.owned_by {
            if !bound.contains(&owner) {
                bound.push(owner);
            }
        }

        let mut attached = false;
        let mut observed: Option<i64> = None;
        for (table_name, column_name) in bound {
            let Some(id) = catalog.table_id(table_name) else {
                continue;
            };
            let Some(data) = plan.data_table(id) else {
                continue;
            };
            let table = catalog.table(id);
            let Some(column) = table.column_index(column_name) else {
                continue;
            };
            attached = true;

            let max = if plan.is_column_excluded(data, column) {
                cancel.check()?;
                debug!(
                    "{}.{} is excluded; reading live maximum",
                    table.display_name(),
                    column_name
                );
                source.max_value(table, column)?
            } else {
                rows.get(data)
                    .rows()
                    .iter()
                    .filter_map(|r| r.values.get(column).and_then(|v| v.as_i64()))
                    .max()
            };
            observed = observed.max(max);
        }

        if !attached {
            continue;
        }

        let mut next_value = observed.unwrap_or(0).max(0).saturating_add(1);
        if next_value < sequence.min_value {
            next_value = sequence.min_value;
        }
        if next_value > sequence.max_value {
            warn!(
                "{}: sampled values exceed the sequence maximum {}",
                sequence.name, sequence.max_value
            );
            next_value = sequence.max_value;
        }

        targets.push(SequenceTarget {
            sequence: index,
            name: sequence.name.to_string(),
            observed,
            next_value,
        });
    }

    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, Sequence, Table, TableId};
    use crate::graph::DependencyGraph;
    use crate::rules::{RuleEngine, RuleSet};
    use crate::sample::RowSet;
    use crate::source::MemorySource;
    use crate::value::{SampledRow, Value};
    use smallvec::smallvec;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        for name in ["t1", "t2"] {
            catalog.add_table(
                Table::new("public", name)
                    .column(Column::new("id", "integer").not_null().default_expr("nextval('seq1'::regclass)"))
                    .column(Column::new("secret", "integer"))
                    .primary_key(&format!("{}_pkey", name), &["id"]),
            );
        }
        catalog.sequences.push(
            Sequence::new(QualifiedName::new("public", "seq1"))
                .bind(QualifiedName::new("public", "t1"), "id")
                .bind(QualifiedName::new("public", "t2"), "id"),
        );
        catalog.sequences.push(
            Sequence::new(QualifiedName::new("public", "seq2"))
                .bind(QualifiedName::new("public", "t1"), "secret"),
        );
        catalog.sequences.push(Sequence::new(QualifiedName::new("public", "loose")));
        catalog.finish().unwrap()
    }

    fn rows_of(ids: &[i64]) -> RowSet {
        RowSet::from_rows(
            ids.iter()
                .map(|&i| SampledRow {
                    key: smallvec![Value::Int(i)],
                    values: vec![Value::Int(i), Value::Null],
                })
                .collect(),
        )
    }

    #[test]
    fn test_max_over_every_bound_column() {
        let catalog = catalog();
        let rules = RuleSet::new().exclude_column("t1.secret").unwrap();
        let plan = RuleEngine::new(rules).resolve(&catalog).unwrap();
        let graph = DependencyGraph::build(&catalog, &plan).unwrap();
        let order = EmissionOrder::compute(&catalog, &plan, &graph).unwrap();

        let mut rows = RowSets::new(2);
        rows.set(TableId(0), rows_of(&[3, 40]));
        rows.set(TableId(1), rows_of(&[87, 5]));

        let mut source = MemorySource::new().with_rows(
            QualifiedName::new("public", "t1"),
            vec![
                vec![Value::Int(3), Value::Int(500)],
                vec![Value::Int(40), Value::Int(12)],
            ],
        );
        let targets = reconcile(&mut source, &catalog, &plan, &order, &rows, &CancelToken::new()).unwrap();

        let by_name = |n: &str| targets.iter().find(|t| t.name == n).unwrap();
        assert_eq!(by_name("public.seq1").next_value, 88);
        // excluded column falls back to the live maximum
        assert_eq!(by_name("public.seq2").next_value, 501);
        assert!(targets.iter().all(|t| t.name != "public.loose"));
        assert_eq!(
            by_name("public.seq1").setval_sql(&QualifiedName::new("public", "seq1")),
            "SELECT pg_catalog.setval('\"public\".\"seq1\"', 88, false);"
        );
    }

    #[test]
    fn test_empty_sample_starts_at_one() {
        let catalog = catalog();
        let plan = RuleEngine::new(RuleSet::new()).resolve(&catalog).unwrap();
        let graph = DependencyGraph::build(&catalog, &plan).unwrap();
        let order = EmissionOrder::compute(&catalog, &plan, &graph).unwrap();
        let rows = RowSets::new(2);

        let targets = reconcile(
            &mut MemorySource::new(),
            &catalog,
            &plan,
            &order,
            &rows,
            &CancelToken::new(),
        )
        .unwrap();
        assert!(targets.iter().all(|t| t.next_value == 1));
    }
}
