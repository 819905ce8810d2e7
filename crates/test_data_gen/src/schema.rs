//! Fixture model: tables, columns, foreign keys and rows.

use serde::{Deserialize, Serialize};

/// Column value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Integer,
    Text,
}

impl ColumnKind {
    pub fn to_postgres(self) -> &'static str {
        match self {
            ColumnKind::Integer => "integer",
            ColumnKind::Text => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
    pub not_null: bool,
}

/// Single-column foreign key onto the referenced table's `id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FkSpec {
    pub name: String,
    /// Position of the referencing column
    pub column: usize,
    /// Position of the referenced table in `Fixture::tables`
    pub references: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Text(String),
    Null,
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

/// A table whose first column is always the integer primary key `id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
    pub foreign_keys: Vec<FkSpec>,
    pub rows: Vec<Vec<Value>>,
}

impl TableSpec {
    pub fn is_self_referencing(&self, position: usize) -> bool {
        self.foreign_keys.iter().any(|fk| fk.references == position)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub seed: u64,
    pub tables: Vec<TableSpec>,
}

impl Fixture {
    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|t| t.rows.len()).sum()
    }

    pub fn foreign_key_count(&self) -> usize {
        self.tables.iter().map(|t| t.foreign_keys.len()).sum()
    }

    /// True when every non-NULL reference resolves to a parent row
    pub fn is_consistent(&self) -> bool {
        self.tables.iter().all(|table| {
            table.foreign_keys.iter().all(|fk| {
                let parent = &self.tables[fk.references];
                table.rows.iter().all(|row| match row[fk.column].as_int() {
                    Some(id) => parent.rows.iter().any(|p| p[0].as_int() == Some(id)),
                    None => true,
                })
            })
        })
    }
}
