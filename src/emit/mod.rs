//! Output script emitter.
//!
//! The script runs in one transaction and rebuilds the sampled database in
//! an order that needs no deferred constraint checks:
//!
//! 1. schemas, extensions, types and domains
//! 2. tables with columns, CHECK, NOT NULL and plain defaults
//! 3. sequences, then the defaults that draw from them
//! 4. data, with triggers suspended through `session_replication_role`
//! 5. sequence `setval`s
//! 6. primary keys and unique constraints, indexes, foreign keys
//! 7. views, materialized views, functions and triggers
//!
//! Data-only scripts keep just steps 4 and 5.

pub mod data;
pub mod ddl;

use crate::catalog::{Catalog, Identity};
use crate::error::Result;
use crate::graph::EmissionOrder;
use crate::rules::SamplingPlan;
use crate::sample::RowSets;
use crate::sequence::SequenceTarget;
use crate::writer::ScriptWriter;
use serde::Serialize;
use std::fmt;
use std::io::Write;
use tracing::{debug, info};

/// PostgreSQL version the script must load into, as `major * 100 + minor`
/// (`903` for 9.3, `1600` for 16)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct TargetVersion(pub u32);

impl TargetVersion {
    pub const CURRENT: TargetVersion = TargetVersion(1700);

    pub fn supports_if_not_exists_schema(self) -> bool {
        self.0 >= 903
    }

    pub fn supports_materialized_views(self) -> bool {
        self.0 >= 903
    }

    pub fn supports_identity(self) -> bool {
        self.0 >= 1000
    }

    pub fn supports_declarative_partitioning(self) -> bool {
        self.0 >= 1000
    }

    pub fn supports_generated_columns(self) -> bool {
        self.0 >= 1200
    }
}

impl Default for TargetVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl std::str::FromStr for TargetVersion {
    type Err = String;

    /// Accepts `9.6`, `16`, `16.2` or a `server_version_num` such as `90600`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || format!("Invalid target version: {}. Expected e.g. 9.6 or 16", s);
        let s = s.trim();
        let mut parts = s.splitn(2, '.');
        let major: u32 = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let minor: u32 = match parts.next() {
            Some(p) => p.parse().map_err(|_| invalid())?,
            None => 0,
        };

        let version = if major >= 10000 {
            // server_version_num: 90600 or 160002
            if major >= 100000 {
                major / 10000 * 100
            } else {
                major / 100
            }
        } else if major >= 10 {
            major * 100
        } else {
            major * 100 + minor
        };
        if !(800..10000).contains(&version) {
            return Err(invalid());
        }
        Ok(TargetVersion(version))
    }
}

impl fmt::Display for TargetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= 1000 {
            write!(f, "{}", self.0 / 100)
        } else {
            write!(f, "{}.{}", self.0 / 100, self.0 % 100)
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmitOptions {
    pub data_only: bool,
    /// `client_encoding` of the script
    pub encoding: String,
    pub target: TargetVersion,
    /// Extra comment lines for the script header
    pub header: Vec<String>,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            data_only: false,
            encoding: "UTF8".to_string(),
            target: TargetVersion::CURRENT,
            header: Vec::new(),
        }
    }
}

/// Everything the emitter reads
pub struct EmitInput<'a> {
    pub catalog: &'a Catalog,
    pub plan: &'a SamplingPlan,
    pub order: &'a EmissionOrder,
    pub rows: &'a RowSets,
    pub sequences: &'a [SequenceTarget],
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EmitSummary {
    pub statements: usize,
    pub rows: u64,
    pub warnings: Vec<String>,
}

/// Fail early when a definition in the script cannot be written for
/// `options.target`, so that an unloadable target is reported before any
/// row is read or any output is opened
pub fn check_target(
    catalog: &Catalog,
    plan: &SamplingPlan,
    order: &EmissionOrder,
    options: &EmitOptions,
) -> Result<()> {
    if options.data_only {
        return Ok(());
    }
    let mut discarded = Vec::new();
    for &id in &order.tables {
        let table = catalog.table(id);
        ddl::create_table(catalog, table, plan.table_plan(id), options.target, &mut discarded)?;
    }
    for &i in &order.views {
        ddl::create_view(&catalog.views[i], options.target)?;
    }
    Ok(())
}

/// Write the complete script
pub fn emit_script<W: Write>(
    writer: &mut ScriptWriter<W>,
    input: &EmitInput,
    options: &EmitOptions,
) -> Result<EmitSummary> {
    let mut summary = EmitSummary::default();
    let target = options.target;
    let start = writer.statements();

    writer.write_line(&format!(
        "-- Sample generated by {} {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    ))?;
    for line in &options.header {
        writer.write_line(&format!("-- {}", line))?;
    }
    writer.write_line("")?;

    writer.write_statement("BEGIN;")?;
    write_settings(writer, options)?;

    if !options.data_only {
        write_definitions(writer, input, target, &mut summary.warnings)?;
    }

    summary.rows = write_data(writer, input, target)?;

    if !input.sequences.is_empty() {
        writer.write_line("")?;
        writer.write_line("-- Sequence values")?;
        for seq in input.sequences {
            let name = &input.catalog.sequences[seq.sequence].name;
            writer.write_statement(&seq.setval_sql(name))?;
        }
    }

    if !options.data_only {
        write_post_data(writer, input, target)?;
    }

    writer.write_line("")?;
    writer.write_statement("COMMIT;")?;
    writer.flush()?;

    summary.statements = writer.statements() - start;
    info!(
        "Wrote {} statement(s) with {} row(s)",
        summary.statements, summary.rows
    );
    Ok(summary)
}

fn write_settings<W: Write>(writer: &mut ScriptWriter<W>, options: &EmitOptions) -> Result<()> {
    writer.write_statement(&format!(
        "SET client_encoding = {};",
        crate::catalog::quote_literal(&options.encoding)
    ))?;
    writer.write_statement("SET standard_conforming_strings = on;")?;
    writer.write_statement("SET check_function_bodies = false;")?;
    writer.write_statement("SET client_min_messages = warning;")?;
    writer.write_statement("SELECT pg_catalog.set_config('search_path', '', false);")?;
    Ok(())
}

fn write_definitions<W: Write>(
    writer: &mut ScriptWriter<W>,
    input: &EmitInput,
    target: TargetVersion,
    warnings: &mut Vec<String>,
) -> Result<()> {
    let catalog = input.catalog;
    let order = input.order;

    writer.write_line("")?;
    writer.write_line("-- Schemas")?;
    for schema in &order.schemas {
        if schema == "public" && !target.supports_if_not_exists_schema() {
            continue;
        }
        writer.write_statement(&ddl::create_schema(schema, target))?;
    }

    if !order.extensions.is_empty() {
        writer.write_line("")?;
        writer.write_line("-- Extensions")?;
        for &i in &order.extensions {
            writer.write_statement(&ddl::create_extension(&catalog.extensions[i]))?;
        }
    }

    if !order.types.is_empty() {
        writer.write_line("")?;
        writer.write_line("-- Types")?;
        for &i in &order.types {
            writer.write_statement(&ddl::create_type(&catalog.types[i]))?;
        }
    }

    writer.write_line("")?;
    writer.write_line("-- Tables")?;
    for &id in &order.tables {
        let table = catalog.table(id);
        let sql = ddl::create_table(catalog, table, input.plan.table_plan(id), target, warnings)?;
        writer.write_statement(&sql)?;
    }

    writer.write_line("")?;
    writer.write_line("-- Sequences")?;
    for &i in &order.sequences {
        let sequence = &catalog.sequences[i];
        if sequence.identity && target.supports_identity() {
            continue;
        }
        writer.write_statement(&ddl::create_sequence(sequence, target))?;
        if let Some((table, column)) = &sequence.owned_by {
            if catalog.table_id(table).is_some_and(|id| input.plan.is_kept(id)) {
                writer.write_statement(&ddl::sequence_owned_by(sequence, table, column))?;
            }
        }
    }

    // Defaults drawing from sequences, and identity stand-ins
    for &id in &order.tables {
        let table = catalog.table(id);
        if table.is_partition_child() {
            continue;
        }
        for column in &table.columns {
            if column.identity != Identity::None && !target.supports_identity() {
                if let Some(sequence) = ddl::identity_sequence(catalog, table, column) {
                    writer.write_statement(&ddl::set_default(
                        table,
                        column,
                        &ddl::nextval_expression(sequence),
                    ))?;
                }
            } else if column.identity == Identity::None && column.default_uses_sequence() {
                if let Some(default) = &column.default {
                    writer.write_statement(&ddl::set_default(table, column, default))?;
                }
            }
        }
    }
    Ok(())
}

fn write_data<W: Write>(
    writer: &mut ScriptWriter<W>,
    input: &EmitInput,
    target: TargetVersion,
) -> Result<u64> {
    writer.write_line("")?;
    writer.write_line("-- Data")?;
    writer.write_statement("SET session_replication_role = replica;")?;

    let mut rows = 0;
    for &id in &input.order.data {
        let table = input.catalog.table(id);
        let written = data::write_rows(writer, table, input.rows.get(id), target)?;
        debug!("{}: {} row(s)", table.display_name(), written);
        rows += written;
    }

    writer.write_statement("SET session_replication_role = DEFAULT;")?;
    Ok(rows)
}

fn write_post_data<W: Write>(
    writer: &mut ScriptWriter<W>,
    input: &EmitInput,
    target: TargetVersion,
) -> Result<()> {
    let catalog = input.catalog;
    let order = input.order;

    if !order.key_constraints.is_empty() {
        writer.write_line("")?;
        writer.write_line("-- Keys")?;
        for &(id, pos) in &order.key_constraints {
            let table = catalog.table(id);
            writer.write_statement(&ddl::add_constraint(table, &table.constraints[pos]))?;
        }
    }

    if !order.indexes.is_empty() {
        writer.write_line("")?;
        writer.write_line("-- Indexes")?;
        for &(id, pos) in &order.indexes {
            let index = &catalog.table(id).indexes[pos];
            writer.write_statement(&ddl::terminated(&index.definition))?;
        }
    }

    if !order.foreign_keys.is_empty() {
        writer.write_line("")?;
        writer.write_line("-- Foreign keys")?;
        for &(id, pos) in &order.foreign_keys {
            let table = catalog.table(id);
            writer.write_statement(&ddl::add_constraint(table, &table.constraints[pos]))?;
        }
    }

    if !order.views.is_empty() {
        writer.write_line("")?;
        writer.write_line("-- Views")?;
        for &i in &order.views {
            writer.write_statement(&ddl::create_view(&catalog.views[i], target)?)?;
        }
    }

    if !order.functions.is_empty() {
        writer.write_line("")?;
        writer.write_line("-- Functions")?;
        for &i in &order.functions {
            writer.write_statement(&ddl::terminated(&catalog.functions[i].definition))?;
        }
    }

    if !order.triggers.is_empty() {
        writer.write_line("")?;
        writer.write_line("-- Triggers")?;
        for &i in &order.triggers {
            writer.write_statement(&ddl::terminated(&catalog.triggers[i].definition))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_versions() {
        assert_eq!("9.3".parse::<TargetVersion>().unwrap(), TargetVersion(903));
        assert_eq!("16".parse::<TargetVersion>().unwrap(), TargetVersion(1600));
        assert_eq!("16.4".parse::<TargetVersion>().unwrap(), TargetVersion(1600));
        assert_eq!("90600".parse::<TargetVersion>().unwrap(), TargetVersion(906));
        assert_eq!("160002".parse::<TargetVersion>().unwrap(), TargetVersion(1600));
        assert!("seven".parse::<TargetVersion>().is_err());
        assert_eq!(TargetVersion(906).to_string(), "9.6");
        assert_eq!(TargetVersion(1600).to_string(), "16");
    }

    #[test]
    fn test_feature_gates() {
        let old = TargetVersion(906);
        assert!(old.supports_materialized_views());
        assert!(!old.supports_identity());
        assert!(!TargetVersion(902).supports_if_not_exists_schema());
        assert!(TargetVersion::CURRENT.supports_generated_columns());
    }
}
