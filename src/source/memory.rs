//! In-memory source for tests and benchmarks.
//!
//! Holds rows per table and evaluates predicates through registered
//! closures keyed by the predicate text. Scratch schemas are kept in memory
//! too, and every scratch operation is appended to a lifecycle log so that
//! tests can assert setup and teardown.

use super::{ScratchStore, SourceDb};
use crate::catalog::{QualifiedName, Table, TableId};
use crate::error::{Result, SampleError};
use crate::graph::FkEdge;
use crate::rules::{RowOrder, TablePlan};
use crate::value::{has_null, project, RowKey, SampledRow, Value};
use ahash::{AHashMap, AHashSet};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

type Predicate = Box<dyn Fn(&[Value]) -> bool>;

/// In-memory implementation of `SourceDb` and `ScratchStore`
#[derive(Default)]
pub struct MemorySource {
    tables: AHashMap<QualifiedName, Vec<Vec<Value>>>,
    predicates: AHashMap<String, Predicate>,
    seed: Option<u64>,
    /// Schemas that already exist before the run
    existing_schemas: AHashSet<String>,
    scratch: AHashMap<String, AHashMap<TableId, Vec<SampledRow>>>,
    deny_scratch: bool,
    read_only: bool,
    failing_table: Option<QualifiedName>,
    log: Vec<String>,
    round_trips: usize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_row(&mut self, table: &QualifiedName, values: Vec<Value>) {
        self.tables.entry(table.clone()).or_default().push(values);
    }

    pub fn with_rows(mut self, table: QualifiedName, rows: Vec<Vec<Value>>) -> Self {
        self.tables.entry(table).or_default().extend(rows);
        self
    }

    /// Register the evaluator for a predicate rule text
    pub fn with_predicate<F>(mut self, text: &str, predicate: F) -> Self
    where
        F: Fn(&[Value]) -> bool + 'static,
    {
        self.predicates.insert(text.to_string(), Box::new(predicate));
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Pretend a schema already exists in the source
    pub fn with_existing_schema(mut self, schema: &str) -> Self {
        self.existing_schemas.insert(schema.to_string());
        self
    }

    /// Make scratch schema creation fail with a permission error
    pub fn deny_scratch_schema(mut self) -> Self {
        self.deny_scratch = true;
        self
    }

    /// Make scratch schema creation fail the way a hot standby does
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Make every query against `table` fail
    pub fn fail_queries_on(mut self, table: QualifiedName) -> Self {
        self.failing_table = Some(table);
        self
    }

    /// Scratch lifecycle events, in order
    pub fn log(&self) -> &[String] {
        &self.log
    }

    /// Number of source queries issued
    pub fn round_trips(&self) -> usize {
        self.round_trips
    }

    pub fn schema_present(&self, schema: &str) -> bool {
        self.existing_schemas.contains(schema) || self.scratch.contains_key(schema)
    }

    pub fn row_count(&self, table: &QualifiedName) -> usize {
        self.tables.get(table).map_or(0, Vec::len)
    }

    fn round_trip(&mut self, table: &Table) -> Result<()> {
        self.round_trips += 1;
        if self.failing_table.as_ref() == Some(&table.qualified()) {
            return Err(SampleError::query(table.display_name(), "simulated query failure"));
        }
        Ok(())
    }

    fn rows(&self, table: &Table) -> &[Vec<Value>] {
        self.tables.get(&table.qualified()).map_or(&[], Vec::as_slice)
    }

    fn to_sampled(table: &Table, plan: &TablePlan, index: usize, row: &[Value]) -> SampledRow {
        let values: Vec<Value> = (0..table.columns.len())
            .map(|c| {
                if plan.is_excluded(c) {
                    Value::Null
                } else {
                    row.get(c).cloned().unwrap_or(Value::Null)
                }
            })
            .collect();
        let key: RowKey = match table.primary_key_columns() {
            [] => [Value::Int(index as i64)].into_iter().collect(),
            pk => project(&values, pk),
        };
        SampledRow { key, values }
    }
}

impl SourceDb for MemorySource {
    fn select_candidates(&mut self, table: &Table, plan: &TablePlan) -> Result<Vec<SampledRow>> {
        let predicate = match plan.predicate() {
            Some(text) => Some(self.predicates.get(text).ok_or_else(|| {
                SampleError::query(table.display_name(), format!("unknown predicate '{}'", text))
            })?),
            None => None,
        };
        let mut selected: Vec<SampledRow> = self
            .rows(table)
            .iter()
            .enumerate()
            .filter(|(_, row)| predicate.is_none_or(|p| p(row)))
            .map(|(i, row)| Self::to_sampled(table, plan, i, row))
            .collect();
        self.round_trip(table)?;

        match plan.ordering {
            RowOrder::None => {}
            RowOrder::Ascending => selected.sort_by(|a, b| a.key.cmp(&b.key)),
            RowOrder::Descending => selected.sort_by(|a, b| b.key.cmp(&a.key)),
            RowOrder::Random => {
                let seed = self.seed.unwrap_or_else(rand::random) ^ u64::from(table.id.0);
                selected.shuffle(&mut StdRng::seed_from_u64(seed));
            }
        }
        if let Some(cap) = plan.cap {
            selected.truncate(cap as usize);
        }
        Ok(selected)
    }

    fn fetch_by_keys(
        &mut self,
        table: &Table,
        plan: &TablePlan,
        columns: &[usize],
        keys: &[RowKey],
    ) -> Result<Vec<SampledRow>> {
        self.round_trip(table)?;
        let wanted: AHashSet<&RowKey> = keys.iter().collect();
        Ok(self
            .rows(table)
            .iter()
            .enumerate()
            .filter(|(_, row)| wanted.contains(&project(row, columns)))
            .map(|(i, row)| Self::to_sampled(table, plan, i, row))
            .collect())
    }

    fn max_value(&mut self, table: &Table, column: usize) -> Result<Option<i64>> {
        self.round_trip(table)?;
        Ok(self
            .rows(table)
            .iter()
            .filter_map(|row| row.get(column).and_then(Value::as_i64))
            .max())
    }
}

impl ScratchStore for MemorySource {
    fn schema_exists(&mut self, schema: &str) -> Result<bool> {
        Ok(self.schema_present(schema))
    }

    fn create_schema(&mut self, schema: &str) -> Result<()> {
        if self.deny_scratch {
            return Err(SampleError::permission(
                schema,
                "permission denied for database",
            ));
        }
        if self.read_only {
            return Err(SampleError::query(
                schema,
                "cannot execute CREATE SCHEMA in a read-only transaction",
            ));
        }
        self.log.push(format!("create {}", schema));
        self.existing_schemas.remove(schema);
        self.scratch.insert(schema.to_string(), AHashMap::new());
        Ok(())
    }

    fn drop_schema(&mut self, schema: &str) -> Result<()> {
        self.log.push(format!("drop {}", schema));
        self.existing_schemas.remove(schema);
        self.scratch.remove(schema);
        Ok(())
    }

    fn stage_candidates(&mut self, schema: &str, table: &Table, plan: &TablePlan) -> Result<u64> {
        let rows = self.select_candidates(table, plan)?;
        let count = rows.len() as u64;
        self.log.push(format!("stage {}", table.display_name()));
        self.scratch
            .get_mut(schema)
            .ok_or_else(|| SampleError::resource(schema, "scratch schema does not exist"))?
            .insert(table.id, rows);
        Ok(count)
    }

    fn index_keys(&mut self, _schema: &str, table: &Table, columns: &[usize]) -> Result<()> {
        self.log.push(format!(
            "index {} ({})",
            table.display_name(),
            columns
                .iter()
                .map(|&c| table.columns[c].name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ));
        Ok(())
    }

    fn admit_missing_parents(
        &mut self,
        schema: &str,
        edge: &FkEdge,
        child: &Table,
        parent: &Table,
        parent_plan: &TablePlan,
    ) -> Result<u64> {
        let staged = self
            .scratch
            .get(schema)
            .ok_or_else(|| SampleError::resource(schema, "scratch schema does not exist"))?;
        let present: AHashSet<RowKey> = staged
            .get(&parent.id)
            .map(|rows| {
                rows.iter()
                    .map(|r| project(&r.values, &edge.referenced_columns))
                    .collect()
            })
            .unwrap_or_default();
        let mut missing: Vec<RowKey> = Vec::new();
        let mut seen: AHashSet<RowKey> = AHashSet::new();
        for row in staged.get(&child.id).map(Vec::as_slice).unwrap_or(&[]) {
            let key = project(&row.values, &edge.columns);
            if has_null(&key) || present.contains(&key) || !seen.insert(key.clone()) {
                continue;
            }
            missing.push(key);
        }
        if missing.is_empty() {
            return Ok(0);
        }

        let fetched = self.fetch_by_keys(parent, parent_plan, &edge.referenced_columns, &missing)?;
        let target = self
            .scratch
            .get_mut(schema)
            .and_then(|s| s.get_mut(&parent.id))
            .ok_or_else(|| SampleError::resource(schema, "parent table was not staged"))?;
        let known: AHashSet<RowKey> = target.iter().map(|r| r.key.clone()).collect();
        let mut added = 0;
        for row in fetched {
            if !known.contains(&row.key) {
                target.push(row);
                added += 1;
            }
        }
        Ok(added)
    }

    fn read_staged(&mut self, schema: &str, table: &Table, _plan: &TablePlan) -> Result<Vec<SampledRow>> {
        self.log.push(format!("read {}", table.display_name()));
        Ok(self
            .scratch
            .get(schema)
            .and_then(|s| s.get(&table.id))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, Column};
    use crate::rules::{LimitAction, RuleSource};

    fn users() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.add_table(
            Table::new("public", "users")
                .column(Column::new("id", "integer").not_null())
                .column(Column::new("active", "boolean"))
                .primary_key("users_pkey", &["id"]),
        );
        catalog.finish().unwrap()
    }

    fn plan(action: LimitAction, ordering: RowOrder) -> TablePlan {
        TablePlan {
            table: TableId(0),
            cap: action.cap(10),
            action,
            excluded_columns: Vec::new(),
            ordering,
            source: RuleSource::Default,
            dropped_foreign_keys: Vec::new(),
        }
    }

    fn source() -> MemorySource {
        let rows = (1..=10)
            .map(|i| vec![Value::Int(i), Value::from(if i % 2 == 0 { "t" } else { "f" })])
            .collect();
        MemorySource::new()
            .with_rows(QualifiedName::new("public", "users"), rows)
            .with_predicate("active", |row| row[1] == Value::from("t"))
    }

    #[test]
    fn test_cap_and_descending_order() {
        let catalog = users();
        let rows = source()
            .select_candidates(catalog.table(TableId(0)), &plan(LimitAction::Rows(3), RowOrder::Descending))
            .unwrap();
        let ids: Vec<i64> = rows.iter().filter_map(|r| r.values[0].as_i64()).collect();
        assert_eq!(ids, vec![10, 9, 8]);
    }

    #[test]
    fn test_predicate_filters_rows() {
        let catalog = users();
        let rows = source()
            .select_candidates(
                catalog.table(TableId(0)),
                &plan(LimitAction::Predicate("active".to_string()), RowOrder::None),
            )
            .unwrap();
        assert_eq!(rows.len(), 5);
    }

    #[test]
    fn test_seeded_random_order_is_reproducible() {
        let catalog = users();
        let table = catalog.table(TableId(0));
        let p = plan(LimitAction::Rows(4), RowOrder::Random);
        let a = source().with_seed(7).select_candidates(table, &p).unwrap();
        let b = source().with_seed(7).select_candidates(table, &p).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_denied_scratch_schema_is_permission_error() {
        let mut source = source().deny_scratch_schema();
        let err = source.create_schema("_dbsample").unwrap_err();
        assert!(matches!(err, SampleError::Permission { .. }));
        assert!(!source.schema_present("_dbsample"));
    }
}
