//! PostgreSQL source over a single snapshot transaction.
//!
//! Values are read as their text representation (`col::text`) so that the
//! emitter can write them back verbatim, whatever their type. Tables
//! without a primary key are identified by `ctid` (plus `tableoid` for
//! partitioned roots, whose rows live in several heaps).

use super::{scratch_table_name, ScratchStore, SourceDb, KEY_BATCH_SIZE};
use crate::catalog::{quote_ident, quote_literal, Partitioning, Table};
use crate::error::{Result, SampleError};
use crate::graph::FkEdge;
use crate::rules::{RowOrder, TablePlan};
use crate::value::{project, RowKey, SampledRow, Value};
use postgres::error::SqlState;
use postgres::{Row, Transaction};
use tracing::debug;

/// Map a driver error to a `SampleError`, naming the object involved.
pub fn classify_error(err: postgres::Error, object: &str) -> SampleError {
    match err.code() {
        Some(code) if *code == SqlState::INSUFFICIENT_PRIVILEGE => SampleError::permission(
            object,
            err.as_db_error()
                .map(|db| db.message().to_string())
                .unwrap_or_else(|| err.to_string()),
        ),
        Some(code) if *code == SqlState::QUERY_CANCELED => {
            SampleError::resource(object, "statement cancelled or timed out")
        }
        Some(_) => SampleError::query(
            object,
            err.as_db_error()
                .map(|db| db.message().to_string())
                .unwrap_or_else(|| err.to_string()),
        ),
        None => SampleError::Connection(err),
    }
}

/// Map `--seed` onto the `[-1, 1]` range `setseed` accepts
pub fn pg_seed(seed: u64) -> f64 {
    (seed % 2001) as f64 / 1000.0 - 1.0
}

/// Source reading through the run's snapshot transaction
pub struct PgSource<'t> {
    tx: Transaction<'t>,
    random_seed: Option<f64>,
}

impl<'t> PgSource<'t> {
    pub fn new(tx: Transaction<'t>) -> Self {
        Self {
            tx,
            random_seed: None,
        }
    }

    /// Seed `random()` before every randomly ordered selection
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.random_seed = seed.map(pg_seed);
        self
    }

    /// The underlying transaction, for catalog reads
    pub fn client(&mut self) -> &mut Transaction<'t> {
        &mut self.tx
    }

    pub fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }

    pub fn rollback(self) -> Result<()> {
        self.tx.rollback()?;
        Ok(())
    }

    fn query(&mut self, sql: &str, table: &Table) -> Result<Vec<Row>> {
        debug!("{}: {}", table.display_name(), sql);
        self.tx
            .query(sql, &[])
            .map_err(|e| classify_error(e, &table.display_name()))
    }

    fn execute(&mut self, sql: &str, object: &str) -> Result<u64> {
        debug!("{}: {}", object, sql);
        self.tx
            .execute(sql, &[])
            .map_err(|e| classify_error(e, object))
    }

    fn seed_random(&mut self, table: &Table) -> Result<()> {
        if let Some(seed) = self.random_seed {
            self.tx
                .execute("SELECT pg_catalog.setseed($1)", &[&seed])
                .map_err(|e| classify_error(e, &table.display_name()))?;
        }
        Ok(())
    }
}

/// Identity columns selected for tables without a primary key
fn identity_expressions(table: &Table, alias: &str) -> Vec<(String, &'static str)> {
    if !table.primary_key_columns().is_empty() {
        return Vec::new();
    }
    let mut exprs = Vec::new();
    if matches!(table.partitioning, Partitioning::Parent { .. }) {
        exprs.push((format!("{}.tableoid::pg_catalog.regclass::text", alias), "__tableoid"));
    }
    exprs.push((format!("{}.ctid::text", alias), "__ctid"));
    exprs
}

/// Select list: every column as text (excluded ones as NULL), then the
/// row identity. With `named`, items get stable column aliases so the
/// list can populate a scratch table.
fn select_list(table: &Table, plan: &TablePlan, alias: &str, named: bool) -> String {
    let mut items: Vec<String> = table
        .columns
        .iter()
        .enumerate()
        .map(|(pos, column)| {
            let expr = if plan.is_excluded(pos) {
                "NULL::text".to_string()
            } else {
                format!("{}.{}::text", alias, quote_ident(&column.name))
            };
            if named {
                format!("{} AS {}", expr, quote_ident(&column.name))
            } else {
                expr
            }
        })
        .collect();
    for (expr, name) in identity_expressions(table, alias) {
        items.push(if named {
            format!("{} AS {}", expr, quote_ident(name))
        } else {
            expr
        });
    }
    items.join(", ")
}

fn order_clause(table: &Table, ordering: RowOrder, alias: &str) -> Option<String> {
    let direction = match ordering {
        RowOrder::None => return None,
        RowOrder::Random => return Some("ORDER BY random()".to_string()),
        RowOrder::Ascending => "ASC",
        RowOrder::Descending => "DESC",
    };
    let keys: Vec<String> = match table.primary_key_columns() {
        [] => identity_expressions(table, alias)
            .into_iter()
            .map(|(expr, _)| expr.replace("::text", ""))
            .collect(),
        pk => pk
            .iter()
            .map(|&c| format!("{}.{}", alias, quote_ident(&table.columns[c].name)))
            .collect(),
    };
    Some(format!(
        "ORDER BY {}",
        keys.iter()
            .map(|k| format!("{} {}", k, direction))
            .collect::<Vec<_>>()
            .join(", ")
    ))
}

/// `SELECT ... FROM table AS t [WHERE ..] [ORDER BY ..] [LIMIT ..]`
fn candidate_query(table: &Table, plan: &TablePlan, named: bool) -> String {
    let mut sql = format!(
        "SELECT {} FROM {} AS t",
        select_list(table, plan, "t", named),
        table.quoted()
    );
    if let Some(predicate) = plan.predicate() {
        sql.push_str(&format!(" WHERE ({})", predicate));
    }
    if let Some(order) = order_clause(table, plan.ordering, "t") {
        sql.push(' ');
        sql.push_str(&order);
    }
    if let Some(cap) = plan.cap {
        sql.push_str(&format!(" LIMIT {}", cap));
    }
    sql
}

fn decode_row(row: &Row, table: &Table) -> SampledRow {
    let width = table.columns.len();
    let values: Vec<Value> = (0..width)
        .map(|i| Value::from(row.get::<_, Option<String>>(i)))
        .collect();
    let key: RowKey = match table.primary_key_columns() {
        [] => (width..row.len())
            .map(|i| Value::from(row.get::<_, Option<String>>(i)))
            .collect(),
        pk => project(&values, pk),
    };
    SampledRow { key, values }
}

/// `(t."a", t."b") IN (('1'::integer, 'x'::text), ...)`
fn key_filter(table: &Table, columns: &[usize], keys: &[RowKey]) -> String {
    let target = columns
        .iter()
        .map(|&c| format!("t.{}", quote_ident(&table.columns[c].name)))
        .collect::<Vec<_>>()
        .join(", ");
    let tuples = keys
        .iter()
        .map(|key| {
            let parts = key
                .iter()
                .zip(columns)
                .map(|(value, &c)| match value.as_text() {
                    Some(text) => format!("{}::{}", quote_literal(&text), table.columns[c].data_type),
                    None => "NULL".to_string(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("({})", parts)
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("({}) IN ({})", target, tuples)
}

impl SourceDb for PgSource<'_> {
    fn select_candidates(&mut self, table: &Table, plan: &TablePlan) -> Result<Vec<SampledRow>> {
        if plan.ordering == RowOrder::Random {
            self.seed_random(table)?;
        }
        let sql = candidate_query(table, plan, false);
        let rows = self.query(&sql, table)?;
        Ok(rows.iter().map(|r| decode_row(r, table)).collect())
    }

    fn fetch_by_keys(
        &mut self,
        table: &Table,
        plan: &TablePlan,
        columns: &[usize],
        keys: &[RowKey],
    ) -> Result<Vec<SampledRow>> {
        let mut fetched = Vec::new();
        for batch in keys.chunks(KEY_BATCH_SIZE) {
            let sql = format!(
                "SELECT {} FROM {} AS t WHERE {}",
                select_list(table, plan, "t", false),
                table.quoted(),
                key_filter(table, columns, batch)
            );
            let rows = self.query(&sql, table)?;
            fetched.extend(rows.iter().map(|r| decode_row(r, table)));
        }
        Ok(fetched)
    }

    fn max_value(&mut self, table: &Table, column: usize) -> Result<Option<i64>> {
        let sql = format!(
            "SELECT max(t.{})::int8 FROM {} AS t",
            quote_ident(&table.columns[column].name),
            table.quoted()
        );
        let rows = self.query(&sql, table)?;
        Ok(rows.first().and_then(|r| r.get::<_, Option<i64>>(0)))
    }
}

impl ScratchStore for PgSource<'_> {
    fn schema_exists(&mut self, schema: &str) -> Result<bool> {
        let row = self
            .tx
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM pg_catalog.pg_namespace WHERE nspname = $1)",
                &[&schema],
            )
            .map_err(|e| classify_error(e, schema))?;
        Ok(row.get(0))
    }

    /// Created behind a savepoint so that a failure leaves the snapshot
    /// transaction usable for direct mode.
    fn create_schema(&mut self, schema: &str) -> Result<()> {
        let mut savepoint = self
            .tx
            .savepoint("scratch_setup")
            .map_err(|e| classify_error(e, schema))?;
        match savepoint.batch_execute(&format!("CREATE SCHEMA {}", quote_ident(schema))) {
            Ok(()) => savepoint.commit().map_err(|e| classify_error(e, schema)),
            Err(e) => {
                // dropping the savepoint rolls it back
                drop(savepoint);
                Err(classify_error(e, schema))
            }
        }
    }

    fn drop_schema(&mut self, schema: &str) -> Result<()> {
        self.execute(
            &format!("DROP SCHEMA IF EXISTS {} CASCADE", quote_ident(schema)),
            schema,
        )?;
        Ok(())
    }

    fn stage_candidates(&mut self, schema: &str, table: &Table, plan: &TablePlan) -> Result<u64> {
        if plan.ordering == RowOrder::Random {
            self.seed_random(table)?;
        }
        let sql = format!(
            "CREATE TABLE {}.{} AS {}",
            quote_ident(schema),
            quote_ident(&scratch_table_name(table)),
            candidate_query(table, plan, true)
        );
        self.execute(&sql, &table.display_name())
    }

    fn index_keys(&mut self, schema: &str, table: &Table, columns: &[usize]) -> Result<()> {
        let column_list = if columns.is_empty() {
            identity_expressions(table, "t")
                .iter()
                .map(|(_, name)| quote_ident(name))
                .collect::<Vec<_>>()
                .join(", ")
        } else {
            columns
                .iter()
                .map(|&c| quote_ident(&table.columns[c].name))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let sql = format!(
            "CREATE INDEX ON {}.{} ({})",
            quote_ident(schema),
            quote_ident(&scratch_table_name(table)),
            column_list
        );
        self.execute(&sql, &table.display_name())?;
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
        let scratch = |t: &Table| format!("{}.{}", quote_ident(schema), quote_ident(&scratch_table_name(t)));
        let child_col = |c: usize| quote_ident(&child.columns[c].name);
        let parent_col = |c: usize| quote_ident(&parent.columns[c].name);

        let target = edge
            .referenced_columns
            .iter()
            .map(|&c| format!("t.{}", parent_col(c)))
            .collect::<Vec<_>>()
            .join(", ");
        let referencing = edge
            .columns
            .iter()
            .zip(&edge.referenced_columns)
            .map(|(&c, &p)| format!("c.{}::{}", child_col(c), parent.columns[p].data_type))
            .collect::<Vec<_>>()
            .join(", ");
        let not_null = edge
            .columns
            .iter()
            .map(|&c| format!("c.{} IS NOT NULL", child_col(c)))
            .collect::<Vec<_>>()
            .join(" AND ");
        let matched = edge
            .columns
            .iter()
            .zip(&edge.referenced_columns)
            .map(|(&c, &p)| format!("s.{} = c.{}", parent_col(p), child_col(c)))
            .collect::<Vec<_>>()
            .join(" AND ");

        let sql = format!(
            "INSERT INTO {parent_scratch} SELECT {list} FROM {parent} AS t WHERE ({target}) IN (\
             SELECT {referencing} FROM {child_scratch} AS c WHERE {not_null} \
             AND NOT EXISTS (SELECT 1 FROM {parent_scratch} AS s WHERE {matched}))",
            parent_scratch = scratch(parent),
            list = select_list(parent, parent_plan, "t", false),
            parent = parent.quoted(),
            target = target,
            referencing = referencing,
            child_scratch = scratch(child),
            not_null = not_null,
            matched = matched,
        );
        self.execute(&sql, &parent.display_name())
    }

    fn read_staged(&mut self, schema: &str, table: &Table, _plan: &TablePlan) -> Result<Vec<SampledRow>> {
        let sql = format!(
            "SELECT * FROM {}.{}",
            quote_ident(schema),
            quote_ident(&scratch_table_name(table))
        );
        let rows = self.query(&sql, table)?;
        Ok(rows.iter().map(|r| decode_row(r, table)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, Column, TableId};
    use crate::rules::{LimitAction, RuleSource};

    fn plan_for(table: TableId, action: LimitAction, cap: Option<u64>) -> TablePlan {
        TablePlan {
            table,
            action,
            cap,
            excluded_columns: Vec::new(),
            ordering: RowOrder::None,
            source: RuleSource::Default,
            dropped_foreign_keys: Vec::new(),
        }
    }

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.add_table(
            Table::new("public", "users")
                .column(Column::new("id", "integer").not_null())
                .column(Column::new("password", "text"))
                .primary_key("users_pkey", &["id"]),
        );
        catalog.add_table(
            Table::new("public", "events")
                .column(Column::new("payload", "jsonb"))
                .partitioning(Partitioning::Parent {
                    key: "RANGE (payload)".to_string(),
                }),
        );
        catalog.finish().unwrap()
    }

    #[test]
    fn test_candidate_query_applies_limit_order_and_exclusions() {
        let catalog = catalog();
        let users = catalog.table(TableId(0));
        let mut plan = plan_for(users.id, LimitAction::Rows(50), Some(50));
        plan.excluded_columns = vec![1];
        plan.ordering = RowOrder::Descending;
        assert_eq!(
            candidate_query(users, &plan, false),
            r#"SELECT t."id"::text, NULL::text FROM "public"."users" AS t ORDER BY t."id" DESC LIMIT 50"#
        );
    }

    #[test]
    fn test_candidate_query_with_predicate() {
        let catalog = catalog();
        let users = catalog.table(TableId(0));
        let plan = plan_for(
            users.id,
            LimitAction::Predicate("id < 10".to_string()),
            None,
        );
        assert!(candidate_query(users, &plan, false).ends_with(r#"AS t WHERE (id < 10)"#));
    }

    #[test]
    fn test_tables_without_pk_use_physical_identity() {
        let catalog = catalog();
        let events = catalog.table(TableId(1));
        let mut plan = plan_for(events.id, LimitAction::Full, None);
        plan.ordering = RowOrder::Ascending;
        assert_eq!(
            candidate_query(events, &plan, true),
            "SELECT t.\"payload\"::text AS \"payload\", \
             t.tableoid::pg_catalog.regclass::text AS \"__tableoid\", \
             t.ctid::text AS \"__ctid\" FROM \"public\".\"events\" AS t \
             ORDER BY t.tableoid::pg_catalog.regclass ASC, t.ctid ASC"
        );
    }

    #[test]
    fn test_key_filter_casts_literals() {
        let catalog = catalog();
        let users = catalog.table(TableId(0));
        let keys: Vec<RowKey> = vec![
            [Value::from("1")].into_iter().collect(),
            [Value::from("it's")].into_iter().collect(),
        ];
        assert_eq!(
            key_filter(users, &[0], &keys),
            r#"(t."id") IN (('1'::integer), ('it''s'::integer))"#
        );
    }

    #[test]
    fn test_seed_maps_into_setseed_range() {
        for seed in [0, 1, 1000, 2000, u64::MAX] {
            let s = pg_seed(seed);
            assert!((-1.0..=1.0).contains(&s));
        }
        assert_eq!(pg_seed(1000), 0.0);
    }
}
