//! Per-table row sets.

use crate::catalog::TableId;
use crate::value::{project, RowKey, SampledRow};
use ahash::{AHashMap, AHashSet};

/// Rows kept for one table, keyed by row identity.
///
/// Insertion order is preserved and a row set only ever grows: a key
/// that is already present is ignored. Projections onto other column
/// sets (the referenced side of a foreign key) are indexed lazily and
/// kept current on every insert.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    rows: Vec<SampledRow>,
    keys: AHashSet<RowKey>,
    projections: AHashMap<Vec<usize>, AHashSet<RowKey>>,
}

impl RowSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<SampledRow>) -> Self {
        let mut set = Self::new();
        set.extend(rows);
        set
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[SampledRow] {
        &self.rows
    }

    pub fn contains_key(&self, key: &RowKey) -> bool {
        self.keys.contains(key)
    }

    /// Add a row; false when its key was already present
    pub fn insert(&mut self, row: SampledRow) -> bool {
        if !self.keys.insert(row.key.clone()) {
            return false;
        }
        for (columns, index) in &mut self.projections {
            index.insert(project(&row.values, columns));
        }
        self.rows.push(row);
        true
    }

    /// Add rows, returning how many were new
    pub fn extend(&mut self, rows: impl IntoIterator<Item = SampledRow>) -> usize {
        let mut added = 0;
        for row in rows {
            if self.insert(row) {
                added += 1;
            }
        }
        added
    }

    /// Build the projection index for `columns` if it does not exist yet
    pub fn ensure_index(&mut self, columns: &[usize]) {
        if self.projections.contains_key(columns) {
            return;
        }
        let index = self
            .rows
            .iter()
            .map(|r| project(&r.values, columns))
            .collect();
        self.projections.insert(columns.to_vec(), index);
    }

    /// True when some row projects onto `key` over `columns`.
    /// `ensure_index(columns)` must have been called.
    pub fn contains_projection(&self, columns: &[usize], key: &RowKey) -> bool {
        match self.projections.get(columns) {
            Some(index) => index.contains(key),
            None => self
                .rows
                .iter()
                .any(|r| &project(&r.values, columns) == key),
        }
    }
}

/// One row set per catalog table, indexed by `TableId`
#[derive(Debug, Clone, Default)]
pub struct RowSets {
    sets: Vec<RowSet>,
}

impl RowSets {
    pub fn new(table_count: usize) -> Self {
        Self {
            sets: vec![RowSet::new(); table_count],
        }
    }

    pub fn get(&self, id: TableId) -> &RowSet {
        &self.sets[id.index()]
    }

    pub fn get_mut(&mut self, id: TableId) -> &mut RowSet {
        &mut self.sets[id.index()]
    }

    pub fn set(&mut self, id: TableId, rows: RowSet) {
        self.sets[id.index()] = rows;
    }

    pub fn total_rows(&self) -> usize {
        self.sets.iter().map(RowSet::len).sum()
    }
}
