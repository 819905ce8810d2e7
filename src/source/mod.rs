//! Source database access.
//!
//! The sampler talks to the source through two traits:
//! - `SourceDb`: read-only queries against live tables (direct mode, and
//!   the live `max()` lookups of the sequence reconciler)
//! - `ScratchStore`: scratch-schema operations used by staged mode
//!
//! `postgres::PgSource` implements both over one snapshot transaction;
//! `memory::MemorySource` implements both in memory for tests.

pub mod memory;
pub mod postgres;

pub use memory::MemorySource;
pub use self::postgres::PgSource;

use crate::catalog::Table;
use crate::error::Result;
use crate::graph::FkEdge;
use crate::rules::TablePlan;
use crate::value::{RowKey, SampledRow};

/// Maximum key tuples per `IN (...)` list
pub const KEY_BATCH_SIZE: usize = 500;

/// Read access to live source tables.
///
/// Rows come back with every column in table order; columns excluded by
/// the plan are `Value::Null`. Each row carries its identity key: the
/// primary key, or a physical row identity for tables without one.
pub trait SourceDb {
    /// Candidate rows of a table: the plan's predicate, cap and ordering
    /// applied.
    fn select_candidates(&mut self, table: &Table, plan: &TablePlan) -> Result<Vec<SampledRow>>;

    /// Rows whose `columns` tuple is one of `keys`, regardless of the
    /// table's own limit. `keys` never contain NULL components.
    fn fetch_by_keys(
        &mut self,
        table: &Table,
        plan: &TablePlan,
        columns: &[usize],
        keys: &[RowKey],
    ) -> Result<Vec<SampledRow>>;

    /// Live `max()` of an integer column, ignoring the plan
    fn max_value(&mut self, table: &Table, column: usize) -> Result<Option<i64>>;
}

/// Scratch-schema operations for staged sampling.
///
/// Every data table gets one scratch table in `schema` holding its
/// candidate rows. Closure grows the scratch tables in place; the final
/// row sets are read back once at the end.
pub trait ScratchStore {
    fn schema_exists(&mut self, schema: &str) -> Result<bool>;

    fn create_schema(&mut self, schema: &str) -> Result<()>;

    fn drop_schema(&mut self, schema: &str) -> Result<()>;

    /// Copy candidate rows into the table's scratch table; returns the
    /// number of rows staged.
    fn stage_candidates(&mut self, schema: &str, table: &Table, plan: &TablePlan) -> Result<u64>;

    /// Index the given columns of a scratch table
    fn index_keys(&mut self, schema: &str, table: &Table, columns: &[usize]) -> Result<()>;

    /// Copy into the parent's scratch table every source row referenced
    /// through `edge` by a staged child row and not yet staged. `child`
    /// and `parent` are the data tables of the edge. Returns rows added.
    fn admit_missing_parents(
        &mut self,
        schema: &str,
        edge: &FkEdge,
        child: &Table,
        parent: &Table,
        parent_plan: &TablePlan,
    ) -> Result<u64>;

    /// Final rows of a scratch table
    fn read_staged(&mut self, schema: &str, table: &Table, plan: &TablePlan) -> Result<Vec<SampledRow>>;
}

/// Name of the scratch table holding a data table's rows
pub fn scratch_table_name(table: &Table) -> String {
    format!("t_{}", table.id.0)
}
