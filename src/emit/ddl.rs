//! DDL statement builders.
//!
//! Definitions the server formats itself (`pg_get_constraintdef`,
//! `pg_get_indexdef`, `pg_get_viewdef`, function and trigger bodies) are
//! passed through as read; only the statement around them is built here.

use super::TargetVersion;
use crate::catalog::{
    quote_ident, quote_literal, Catalog, Column, Constraint, ConstraintKind, ExtensionDef,
    Identity, Partitioning, QualifiedName, Sequence, Table, TypeDef, TypeKind, ViewDef,
};
use crate::error::{Result, SampleError};
use crate::rules::TablePlan;

/// Strip a trailing semicolon so that a statement can be terminated once
pub fn terminated(definition: &str) -> String {
    let body = definition.trim_end().trim_end_matches(';').trim_end();
    format!("{};", body)
}

pub fn create_schema(name: &str, target: TargetVersion) -> String {
    if target.supports_if_not_exists_schema() {
        format!("CREATE SCHEMA IF NOT EXISTS {};", quote_ident(name))
    } else {
        format!("CREATE SCHEMA {};", quote_ident(name))
    }
}

pub fn create_extension(extension: &ExtensionDef) -> String {
    format!(
        "CREATE EXTENSION IF NOT EXISTS {} WITH SCHEMA {};",
        quote_ident(&extension.name),
        quote_ident(&extension.schema)
    )
}

pub fn create_type(def: &TypeDef) -> String {
    let name = def.name.quoted();
    match &def.kind {
        TypeKind::Enum { labels } => format!(
            "CREATE TYPE {} AS ENUM ({});",
            name,
            labels
                .iter()
                .map(|l| quote_literal(l))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        TypeKind::Domain {
            base,
            not_null,
            default,
            checks,
        } => {
            let mut sql = format!("CREATE DOMAIN {} AS {}", name, base);
            if let Some(default) = default {
                sql.push_str(&format!(" DEFAULT {}", default));
            }
            if *not_null {
                sql.push_str(" NOT NULL");
            }
            for check in checks {
                sql.push(' ');
                sql.push_str(check);
            }
            sql.push(';');
            sql
        }
        TypeKind::Composite { attributes } => format!(
            "CREATE TYPE {} AS ({});",
            name,
            attributes
                .iter()
                .map(|(n, t)| format!("{} {}", quote_ident(n), t))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        TypeKind::Range { subtype } => {
            format!("CREATE TYPE {} AS RANGE (SUBTYPE = {});", name, subtype)
        }
    }
}

/// Implicit sequence of an identity column
pub fn identity_sequence<'c>(catalog: &'c Catalog, table: &Table, column: &Column) -> Option<&'c Sequence> {
    let owner = (table.qualified(), column.name.clone());
    catalog
        .sequences
        .iter()
        .find(|s| s.identity && s.owned_by.as_ref() == Some(&owner))
}

/// `CREATE TABLE` with columns and CHECK constraints. Keys, indexes and
/// foreign keys come after the data load.
///
/// `plan` is the table's own plan (partitions have none). A NOT NULL
/// column whose values are excluded loses its NOT NULL; a warning is
/// recorded.
pub fn create_table(
    catalog: &Catalog,
    table: &Table,
    plan: Option<&TablePlan>,
    target: TargetVersion,
    warnings: &mut Vec<String>,
) -> Result<String> {
    if let Partitioning::Child {
        parent_name,
        bound,
        key,
        ..
    } = &table.partitioning
    {
        if !target.supports_declarative_partitioning() {
            return Err(SampleError::Config(format!(
                "{} is a partition; declarative partitioning needs target version 10 or later",
                table.display_name()
            )));
        }
        let mut sql = format!(
            "CREATE TABLE {} PARTITION OF {} {}",
            table.quoted(),
            parent_name.quoted(),
            bound
        );
        if let Some(key) = key {
            sql.push_str(&format!(" PARTITION BY {}", key));
        }
        sql.push(';');
        return Ok(sql);
    }

    let mut lines = Vec::with_capacity(table.columns.len());
    for (pos, column) in table.columns.iter().enumerate() {
        let excluded = plan.is_some_and(|p| p.is_excluded(pos));
        if excluded && column.not_null {
            warnings.push(format!(
                "{}.{} is excluded; its NOT NULL constraint is not emitted",
                table.display_name(),
                column.name
            ));
        }
        lines.push(format!(
            "    {}",
            column_definition(catalog, table, column, excluded, target)?
        ));
    }
    for constraint in &table.constraints {
        if matches!(constraint.kind, ConstraintKind::Check) {
            lines.push(format!(
                "    CONSTRAINT {} {}",
                quote_ident(&constraint.name),
                constraint.definition
            ));
        }
    }

    let mut sql = format!("CREATE TABLE {} (\n{}\n)", table.quoted(), lines.join(",\n"));
    if let Partitioning::Parent { key } = &table.partitioning {
        if !target.supports_declarative_partitioning() {
            return Err(SampleError::Config(format!(
                "{} is partitioned; declarative partitioning needs target version 10 or later",
                table.display_name()
            )));
        }
        sql.push_str(&format!(" PARTITION BY {}", key));
    }
    sql.push(';');
    Ok(sql)
}

fn column_definition(
    catalog: &Catalog,
    table: &Table,
    column: &Column,
    excluded: bool,
    target: TargetVersion,
) -> Result<String> {
    let mut sql = format!("{} {}", quote_ident(&column.name), column.data_type);

    if let Some(expr) = &column.generated {
        if !target.supports_generated_columns() {
            return Err(SampleError::Config(format!(
                "{}.{} is a generated column; generated columns need target version 12 or later",
                table.display_name(),
                column.name
            )));
        }
        sql.push_str(&format!(" GENERATED ALWAYS AS ({}) STORED", expr));
    } else if column.identity != Identity::None && target.supports_identity() {
        let kind = match column.identity {
            Identity::Always => "ALWAYS",
            _ => "BY DEFAULT",
        };
        sql.push_str(&format!(" GENERATED {} AS IDENTITY", kind));
        if let Some(sequence) = identity_sequence(catalog, table, column) {
            sql.push_str(&format!(" (SEQUENCE NAME {})", sequence.name.quoted()));
        }
    } else if let Some(default) = &column.default {
        if !column.default_uses_sequence() {
            sql.push_str(&format!(" DEFAULT {}", default));
        }
    }

    if column.not_null && !excluded {
        sql.push_str(" NOT NULL");
    }
    Ok(sql)
}

/// Standalone `CREATE SEQUENCE`; identity sequences are only created this
/// way when the target has no identity columns
pub fn create_sequence(sequence: &Sequence, target: TargetVersion) -> String {
    let mut sql = format!("CREATE SEQUENCE {}", sequence.name.quoted());
    if target.supports_identity() {
        sql.push_str(&format!(" AS {}", sequence.data_type));
    }
    sql.push_str(&format!(
        " START WITH {} INCREMENT BY {} MINVALUE {} MAXVALUE {} {};",
        sequence.start,
        sequence.increment,
        sequence.min_value,
        sequence.max_value,
        if sequence.cycle { "CYCLE" } else { "NO CYCLE" }
    ));
    sql
}

pub fn sequence_owned_by(sequence: &Sequence, table: &QualifiedName, column: &str) -> String {
    format!(
        "ALTER SEQUENCE {} OWNED BY {}.{};",
        sequence.name.quoted(),
        table.quoted(),
        quote_ident(column)
    )
}

pub fn set_default(table: &Table, column: &Column, expression: &str) -> String {
    format!(
        "ALTER TABLE {} {} ALTER COLUMN {} SET DEFAULT {};",
        only(table),
        table.quoted(),
        quote_ident(&column.name),
        expression
    )
}

/// `nextval` default standing in for an identity column
pub fn nextval_expression(sequence: &Sequence) -> String {
    format!("nextval({}::regclass)", quote_literal(&sequence.name.quoted()))
}

/// `ALTER TABLE ... ADD CONSTRAINT` for keys and foreign keys
pub fn add_constraint(table: &Table, constraint: &Constraint) -> String {
    format!(
        "ALTER TABLE {} {} ADD CONSTRAINT {} {};",
        only(table),
        table.quoted(),
        quote_ident(&constraint.name),
        constraint.definition
    )
}

/// `ONLY` cannot add keys to a partitioned table
fn only(table: &Table) -> &'static str {
    match table.partitioning {
        Partitioning::Parent { .. } | Partitioning::Child { key: Some(_), .. } => "",
        _ => "ONLY",
    }
}

pub fn create_view(view: &ViewDef, target: TargetVersion) -> Result<String> {
    let body = view.definition.trim().trim_end_matches(';').trim_end();
    if view.materialized {
        if !target.supports_materialized_views() {
            return Err(SampleError::Config(format!(
                "{} is a materialized view; materialized views need target version 9.3 or later",
                view.name
            )));
        }
        Ok(format!(
            "CREATE MATERIALIZED VIEW {} AS\n{}\nWITH DATA;",
            view.name.quoted(),
            body
        ))
    } else {
        Ok(format!("CREATE VIEW {} AS\n{};", view.name.quoted(), body))
    }
}
