//! Catalog snapshot of the source database.
//!
//! This module provides:
//! - Data models for tables, columns, constraints, indexes and the other
//!   schema objects that end up in the emitted script
//! - `Catalog`, an immutable snapshot built once per run, with tables
//!   addressed by `TableId`
//! - The PostgreSQL catalog reader (`postgres` submodule)

pub mod postgres;

use crate::error::{Result, SampleError};
use ahash::AHashMap;
use serde::Serialize;
use std::fmt;

/// Unique identifier for a table within the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TableId(pub u32);

impl TableId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableId({})", self.0)
    }
}

/// Quote an identifier for PostgreSQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal (standard_conforming_strings = on).
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Schema-qualified object name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct QualifiedName {
    pub schema: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// `"schema"."name"` for use in SQL text
    pub fn quoted(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Semantic type tag, used only to decide how values are serialized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnKind {
    #[default]
    Scalar,
    /// Integer and numeric types, rendered unquoted
    Numeric,
    Json,
    Array,
    Composite,
    Domain,
}

impl ColumnKind {
    /// Classify from `pg_type.typcategory`, `typtype` and the formatted type name.
    pub fn from_pg(typcategory: &str, typtype: &str, type_name: &str) -> Self {
        match (typtype, typcategory) {
            ("d", _) => ColumnKind::Domain,
            ("c", _) => ColumnKind::Composite,
            (_, "A") => ColumnKind::Array,
            (_, "N") => ColumnKind::Numeric,
            _ if type_name == "json" || type_name == "jsonb" => ColumnKind::Json,
            _ => ColumnKind::Scalar,
        }
    }
}

/// Identity column kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Identity {
    #[default]
    None,
    ByDefault,
    Always,
}

/// Column definition within a table
#[derive(Debug, Clone)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Formatted type, e.g. `character varying(40)` or `public.mood`
    pub data_type: String,
    pub kind: ColumnKind,
    pub not_null: bool,
    /// Default expression (`pg_get_expr(adbin)`)
    pub default: Option<String>,
    pub identity: Identity,
    /// Expression of a stored generated column
    pub generated: Option<String>,
    /// User-defined type this column uses, if any
    pub type_ref: Option<QualifiedName>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let data_type = data_type.into();
        let kind = match data_type.as_str() {
            "integer" | "bigint" | "smallint" | "numeric" | "real" | "double precision" => {
                ColumnKind::Numeric
            }
            "json" | "jsonb" => ColumnKind::Json,
            t if t.ends_with("[]") => ColumnKind::Array,
            _ => ColumnKind::Scalar,
        };
        Self {
            name: name.into(),
            data_type,
            kind,
            not_null: false,
            default: None,
            identity: Identity::None,
            generated: None,
            type_ref: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn default_expr(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self.not_null = true;
        self
    }

    /// True when the default draws from a sequence; such defaults are set
    /// after the sequence has been created.
    pub fn default_uses_sequence(&self) -> bool {
        self.default
            .as_deref()
            .is_some_and(|d| d.contains("nextval("))
    }
}

/// Foreign key details of a constraint
#[derive(Debug, Clone)]
pub struct ForeignKey {
    /// Referenced table name (before resolution)
    pub referenced_name: QualifiedName,
    /// Referenced column names
    pub referenced_column_names: Vec<String>,
    /// Resolved referenced table, `None` when it is outside the snapshot
    pub referenced: Option<TableId>,
    /// Resolved referenced column positions
    pub referenced_columns: Vec<usize>,
}

/// Constraint kind
#[derive(Debug, Clone)]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    Check,
    ForeignKey(ForeignKey),
}

/// Table constraint
#[derive(Debug, Clone)]
pub struct Constraint {
    pub name: String,
    pub kind: ConstraintKind,
    /// Column names (before resolution)
    pub column_names: Vec<String>,
    /// Resolved column positions, in constraint order
    pub columns: Vec<usize>,
    /// Constraint body as accepted by `ADD CONSTRAINT name <definition>`
    pub definition: String,
}

impl Constraint {
    pub fn foreign_key(&self) -> Option<&ForeignKey> {
        match &self.kind {
            ConstraintKind::ForeignKey(fk) => Some(fk),
            _ => None,
        }
    }

    pub fn is_key(&self) -> bool {
        matches!(
            self.kind,
            ConstraintKind::PrimaryKey | ConstraintKind::Unique
        )
    }
}

/// Index definition (indexes backing constraints are not listed)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub column_names: Vec<String>,
    pub is_unique: bool,
    /// Partial indexes cannot back a foreign key
    pub is_partial: bool,
    /// Full `CREATE INDEX` statement (`pg_get_indexdef`)
    pub definition: String,
}

/// Partitioning role of a table
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Partitioning {
    #[default]
    Ordinary,
    /// Declaratively partitioned parent, with its `PARTITION BY` clause
    Parent { key: String },
    /// Partition of `parent`, with its `FOR VALUES` bound. `key` is set
    /// when the partition is itself partitioned.
    Child {
        parent_name: QualifiedName,
        bound: String,
        key: Option<String>,
        parent: Option<TableId>,
    },
}

/// Complete table definition
#[derive(Debug, Clone)]
pub struct Table {
    pub id: TableId,
    pub schema: String,
    pub name: String,
    pub columns: Vec<Column>,
    pub constraints: Vec<Constraint>,
    pub indexes: Vec<IndexDef>,
    pub partitioning: Partitioning,
    /// Live row estimate captured with the snapshot
    pub row_estimate: u64,
}

impl Table {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: TableId(0),
            schema: schema.into(),
            name: name.into(),
            columns: Vec::new(),
            constraints: Vec::new(),
            indexes: Vec::new(),
            partitioning: Partitioning::Ordinary,
            row_estimate: 0,
        }
    }

    pub fn qualified(&self) -> QualifiedName {
        QualifiedName::new(&self.schema, &self.name)
    }

    /// `schema.name` without quoting, for messages and sorting
    pub fn display_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn quoted(&self) -> String {
        self.qualified().quoted()
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn primary_key(self, name: &str, columns: &[&str]) -> Self {
        let definition = format!("PRIMARY KEY ({})", quote_list(columns));
        self.constraint(name, ConstraintKind::PrimaryKey, columns, definition)
    }

    pub fn unique(self, name: &str, columns: &[&str]) -> Self {
        let definition = format!("UNIQUE ({})", quote_list(columns));
        self.constraint(name, ConstraintKind::Unique, columns, definition)
    }

    pub fn check(self, name: &str, expression: &str) -> Self {
        let definition = format!("CHECK ({})", expression);
        self.constraint(name, ConstraintKind::Check, &[], definition)
    }

    pub fn foreign_key(
        self,
        name: &str,
        columns: &[&str],
        referenced: QualifiedName,
        referenced_columns: &[&str],
    ) -> Self {
        let definition = format!(
            "FOREIGN KEY ({}) REFERENCES {}({})",
            quote_list(columns),
            referenced.quoted(),
            quote_list(referenced_columns)
        );
        let fk = ForeignKey {
            referenced_name: referenced,
            referenced_column_names: referenced_columns.iter().map(|c| c.to_string()).collect(),
            referenced: None,
            referenced_columns: Vec::new(),
        };
        self.constraint(name, ConstraintKind::ForeignKey(fk), columns, definition)
    }

    fn constraint(
        mut self,
        name: &str,
        kind: ConstraintKind,
        columns: &[&str],
        definition: String,
    ) -> Self {
        self.constraints.push(Constraint {
            name: name.to_string(),
            kind,
            column_names: columns.iter().map(|c| c.to_string()).collect(),
            columns: Vec::new(),
            definition,
        });
        self
    }

    pub fn index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn estimate(mut self, rows: u64) -> Self {
        self.row_estimate = rows;
        self
    }

    pub fn partitioning(mut self, partitioning: Partitioning) -> Self {
        self.partitioning = partitioning;
        self
    }

    /// Get column position by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Primary key constraint, if any
    pub fn primary_key_constraint(&self) -> Option<&Constraint> {
        self.constraints
            .iter()
            .find(|c| matches!(c.kind, ConstraintKind::PrimaryKey))
    }

    /// Primary key column positions (empty when the table has none)
    pub fn primary_key_columns(&self) -> &[usize] {
        self.primary_key_constraint()
            .map(|c| c.columns.as_slice())
            .unwrap_or(&[])
    }

    /// Foreign key constraints with their position in `constraints`
    pub fn foreign_keys(&self) -> impl Iterator<Item = (usize, &Constraint, &ForeignKey)> {
        self.constraints
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.foreign_key().map(|fk| (i, c, fk)))
    }

    /// True when `columns` (as a set) is covered by a primary key, unique
    /// constraint or unique non-partial index.
    pub fn has_unique_cover(&self, columns: &[usize]) -> bool {
        let mut wanted: Vec<usize> = columns.to_vec();
        wanted.sort_unstable();

        let same = |cols: &[usize]| {
            let mut c = cols.to_vec();
            c.sort_unstable();
            c == wanted
        };

        if self
            .constraints
            .iter()
            .any(|c| c.is_key() && same(&c.columns))
        {
            return true;
        }

        self.indexes.iter().any(|idx| {
            if !idx.is_unique || idx.is_partial {
                return false;
            }
            let positions: Option<Vec<usize>> = idx
                .column_names
                .iter()
                .map(|n| self.column_index(n))
                .collect();
            positions.is_some_and(|p| same(&p))
        })
    }

    pub fn is_partition_child(&self) -> bool {
        matches!(self.partitioning, Partitioning::Child { .. })
    }
}

fn quote_list(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Sequence definition
#[derive(Debug, Clone)]
pub struct Sequence {
    pub name: QualifiedName,
    /// Data type (`bigint`, `integer`, `smallint`)
    pub data_type: String,
    pub start: i64,
    pub increment: i64,
    pub min_value: i64,
    pub max_value: i64,
    pub cycle: bool,
    /// Owning column (`OWNED BY`), if any
    pub owned_by: Option<(QualifiedName, String)>,
    /// Set when this is the implicit sequence of an identity column
    pub identity: bool,
    /// Every (table, column) whose default draws from this sequence
    pub bindings: Vec<(QualifiedName, String)>,
}

impl Sequence {
    pub fn new(name: QualifiedName) -> Self {
        Self {
            name,
            data_type: "bigint".to_string(),
            start: 1,
            increment: 1,
            min_value: 1,
            max_value: i64::MAX,
            cycle: false,
            owned_by: None,
            identity: false,
            bindings: Vec::new(),
        }
    }

    pub fn bind(mut self, table: QualifiedName, column: &str) -> Self {
        self.bindings.push((table, column.to_string()));
        self
    }
}

/// User-defined type kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Enum { labels: Vec<String> },
    Domain {
        base: String,
        not_null: bool,
        default: Option<String>,
        checks: Vec<String>,
    },
    Composite { attributes: Vec<(String, String)> },
    Range { subtype: String },
}

/// User-defined type (enum, domain, composite or range)
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name: QualifiedName,
    pub kind: TypeKind,
    /// Other user-defined types this one is built from
    pub depends_on: Vec<QualifiedName>,
}

/// View or materialized view
#[derive(Debug, Clone)]
pub struct ViewDef {
    pub name: QualifiedName,
    pub materialized: bool,
    /// `pg_get_viewdef` output
    pub definition: String,
    /// Tables, views and materialized views this view reads from
    pub depends_on: Vec<QualifiedName>,
}

/// Function or procedure
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: QualifiedName,
    /// Full `CREATE OR REPLACE FUNCTION` text (`pg_get_functiondef`)
    pub definition: String,
}

/// Trigger on a table
#[derive(Debug, Clone)]
pub struct TriggerDef {
    pub name: String,
    pub table: QualifiedName,
    /// Full `CREATE TRIGGER` text (`pg_get_triggerdef`)
    pub definition: String,
}

/// Installed extension
#[derive(Debug, Clone)]
pub struct ExtensionDef {
    pub name: String,
    pub schema: String,
}

/// Immutable snapshot of the source database
#[derive(Debug, Default)]
pub struct Catalog {
    /// Schemas in scope, sorted
    pub schemas: Vec<String>,
    /// Tables indexed by TableId
    pub tables: Vec<Table>,
    by_name: AHashMap<QualifiedName, TableId>,
    pub sequences: Vec<Sequence>,
    pub types: Vec<TypeDef>,
    pub views: Vec<ViewDef>,
    pub functions: Vec<FunctionDef>,
    pub triggers: Vec<TriggerDef>,
    pub extensions: Vec<ExtensionDef>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new table, returning its ID
    pub fn add_table(&mut self, mut table: Table) -> TableId {
        let id = TableId(self.tables.len() as u32);
        table.id = id;
        self.by_name.insert(table.qualified(), id);
        if !self.schemas.contains(&table.schema) {
            self.schemas.push(table.schema.clone());
            self.schemas.sort();
        }
        self.tables.push(table);
        id
    }

    pub fn table(&self, id: TableId) -> &Table {
        &self.tables[id.index()]
    }

    pub fn table_id(&self, name: &QualifiedName) -> Option<TableId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }

    /// Total number of foreign keys across all tables
    pub fn foreign_key_count(&self) -> usize {
        self.tables.iter().map(|t| t.foreign_keys().count()).sum()
    }

    /// Resolve constraint column names, foreign key targets and partition
    /// parents. Must be called once after all tables are added; the catalog
    /// is read-only afterwards.
    pub fn finish(mut self) -> Result<Self> {
        let lookup = self.by_name.clone();

        // Referenced column positions need the target table, so collect
        // column names per table first.
        let columns_by_table: Vec<Vec<String>> = self
            .tables
            .iter()
            .map(|t| t.columns.iter().map(|c| c.name.clone()).collect())
            .collect();

        for table in &mut self.tables {
            let display = table.display_name();

            for constraint in &mut table.constraints {
                constraint.columns = resolve_columns(
                    &columns_by_table[table.id.index()],
                    &constraint.column_names,
                )
                .ok_or_else(|| {
                    SampleError::structural(
                        &display,
                        format!("constraint '{}' names an unknown column", constraint.name),
                    )
                })?;

                if let ConstraintKind::ForeignKey(fk) = &mut constraint.kind {
                    fk.referenced = lookup.get(&fk.referenced_name).copied();
                    if let Some(target) = fk.referenced {
                        fk.referenced_columns = resolve_columns(
                            &columns_by_table[target.index()],
                            &fk.referenced_column_names,
                        )
                        .ok_or_else(|| {
                            SampleError::structural(
                                &display,
                                format!(
                                    "foreign key '{}' references unknown column(s) {:?} of {}",
                                    constraint.name, fk.referenced_column_names, fk.referenced_name
                                ),
                            )
                        })?;
                    }
                }
            }

            if let Partitioning::Child {
                parent_name,
                parent,
                ..
            } = &mut table.partitioning
            {
                *parent = lookup.get(parent_name).copied();
            }
        }

        Ok(self)
    }
}

fn resolve_columns(available: &[String], names: &[String]) -> Option<Vec<usize>> {
    names
        .iter()
        .map(|n| available.iter().position(|c| c == n))
        .collect()
}
