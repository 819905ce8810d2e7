//! PostgreSQL catalog reader.
//!
//! Reads every object the emitter can reproduce with set-based catalog
//! queries (one round trip per object kind, not per table). The session
//! `search_path` is cleared first so that every name the server formats
//! (`format_type`, `pg_get_*def`, `regclass` output) comes back fully
//! qualified.

use super::{
    Catalog, Column, ColumnKind, Constraint, ConstraintKind, ExtensionDef, ForeignKey,
    FunctionDef, Identity, IndexDef, Partitioning, QualifiedName, Sequence, Table, TriggerDef,
    TypeDef, TypeKind, ViewDef,
};
use crate::error::{Result, SampleError};
use crate::source::postgres::classify_error;
use ahash::AHashMap;
use once_cell::sync::Lazy;
use postgres::GenericClient;
use regex::Regex;
use tracing::{debug, info};

/// Schemas never read from the source
const SYSTEM_SCHEMAS: &[&str] = &["pg_catalog", "information_schema", "pg_toast"];

static NEXTVAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"nextval\('((?:[^']|'')+)'::regclass\)").expect("valid regex"));

/// Which schemas to read
#[derive(Debug, Clone, Default)]
pub struct SchemaFilter {
    /// Only these schemas (all non-system schemas when empty)
    pub include: Vec<String>,
    /// Never read these (the scratch schema, for instance)
    pub skip: Vec<String>,
}

/// Read the catalog snapshot through `client`, which must already be
/// inside the run's snapshot transaction.
pub fn read_catalog<C: GenericClient>(client: &mut C, filter: &SchemaFilter) -> Result<Catalog> {
    client.execute("SELECT pg_catalog.set_config('search_path', '', true)", &[])?;

    let schemas = load_schemas(client, filter)?;
    info!("Reading catalog for {} schema(s)", schemas.len());

    let mut catalog = Catalog::new();
    let mut table_oids: AHashMap<i64, usize> = AHashMap::new();
    let mut counts_needed = Vec::new();

    for row in client.query(
        r#"
        SELECT c.oid::int8, n.nspname::text, c.relname::text, c.relkind::text,
               c.reltuples::float8,
               CASE WHEN c.relkind = 'p' THEN pg_catalog.pg_get_partkeydef(c.oid) END,
               CASE WHEN c.relispartition THEN pg_catalog.pg_get_expr(c.relpartbound, c.oid) END,
               pn.nspname::text, pc.relname::text
        FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        LEFT JOIN pg_catalog.pg_inherits i ON i.inhrelid = c.oid AND c.relispartition
        LEFT JOIN pg_catalog.pg_class pc ON pc.oid = i.inhparent
        LEFT JOIN pg_catalog.pg_namespace pn ON pn.oid = pc.relnamespace
        WHERE c.relkind IN ('r', 'p') AND n.nspname = ANY($1)
        ORDER BY n.nspname, c.relname
        "#,
        &[&schemas],
    )? {
        let oid: i64 = row.get(0);
        let relkind: String = row.get(3);
        let reltuples: f64 = row.get(4);
        let part_key: Option<String> = row.get(5);
        let bound: Option<String> = row.get(6);
        let parent_schema: Option<String> = row.get(7);
        let parent_name: Option<String> = row.get(8);

        let partitioning = match (bound, parent_schema, parent_name) {
            (Some(bound), Some(ps), Some(pn)) => Partitioning::Child {
                parent_name: QualifiedName::new(ps, pn),
                bound,
                key: part_key,
                parent: None,
            },
            _ => match part_key {
                Some(key) => Partitioning::Parent { key },
                None => Partitioning::Ordinary,
            },
        };

        let mut table = Table::new(row.get::<_, String>(1), row.get::<_, String>(2))
            .partitioning(partitioning);
        if reltuples > 0.0 && relkind != "p" {
            table.row_estimate = reltuples.round() as u64;
        } else {
            counts_needed.push(table.qualified());
        }
        let id = catalog.add_table(table);
        table_oids.insert(oid, id.index());
    }

    load_columns(client, &schemas, &mut catalog, &table_oids)?;
    load_constraints(client, &schemas, &mut catalog, &table_oids)?;
    load_indexes(client, &schemas, &mut catalog, &table_oids)?;

    // Tables never analyzed (or partitioned parents) have no usable
    // estimate; count them inside the same snapshot.
    for name in counts_needed {
        let count = exact_count(client, &name)?;
        if let Some(id) = catalog.table_id(&name) {
            catalog.tables[id.index()].row_estimate = count;
        }
    }

    let type_oids = load_types(client, &schemas, &mut catalog)?;
    resolve_column_types(client, &schemas, &mut catalog, &table_oids, &type_oids)?;
    load_sequences(client, &schemas, &mut catalog)?;
    load_views(client, &schemas, &mut catalog, &table_oids)?;
    load_functions(client, &schemas, &mut catalog)?;
    load_triggers(client, &schemas, &mut catalog)?;
    load_extensions(client, &mut catalog)?;

    // Keep schemas with no tables (they may still hold types or views)
    for schema in schemas {
        if !catalog.schemas.contains(&schema) {
            catalog.schemas.push(schema);
        }
    }
    catalog.schemas.sort();

    info!(
        "Catalog: {} tables, {} sequences, {} types, {} views",
        catalog.tables.len(),
        catalog.sequences.len(),
        catalog.types.len(),
        catalog.views.len()
    );

    catalog.finish()
}

fn load_schemas<C: GenericClient>(client: &mut C, filter: &SchemaFilter) -> Result<Vec<String>> {
    let rows = client.query(
        r#"
        SELECT n.nspname::text
        FROM pg_catalog.pg_namespace n
        WHERE n.nspname NOT LIKE 'pg\_%'
        ORDER BY 1
        "#,
        &[],
    )?;

    let schemas: Vec<String> = rows
        .iter()
        .map(|r| r.get::<_, String>(0))
        .filter(|s| !SYSTEM_SCHEMAS.contains(&s.as_str()))
        .filter(|s| filter.include.is_empty() || filter.include.contains(s))
        .filter(|s| !filter.skip.contains(s))
        .collect();

    for wanted in &filter.include {
        if !schemas.contains(wanted) {
            return Err(SampleError::Config(format!(
                "schema '{}' does not exist in the source database",
                wanted
            )));
        }
    }

    Ok(schemas)
}

fn load_columns<C: GenericClient>(
    client: &mut C,
    schemas: &[String],
    catalog: &mut Catalog,
    table_oids: &AHashMap<i64, usize>,
) -> Result<()> {
    let rows = client.query(
        r#"
        SELECT a.attrelid::int8, a.attname::text,
               pg_catalog.format_type(a.atttypid, a.atttypmod),
               a.attnotnull,
               pg_catalog.pg_get_expr(d.adbin, d.adrelid),
               a.attidentity::text,
               a.attgenerated::text,
               t.typcategory::text,
               t.typtype::text,
               t.typname::text
        FROM pg_catalog.pg_attribute a
        JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        JOIN pg_catalog.pg_type t ON t.oid = a.atttypid
        LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
        WHERE c.relkind IN ('r', 'p')
          AND n.nspname = ANY($1)
          AND a.attnum > 0
          AND NOT a.attisdropped
        ORDER BY a.attrelid, a.attnum
        "#,
        &[&schemas],
    )?;

    for row in rows {
        let Some(&idx) = table_oids.get(&row.get::<_, i64>(0)) else {
            continue;
        };
        let data_type: String = row.get(2);
        let default: Option<String> = row.get(4);
        let identity: String = row.get(5);
        let generated: String = row.get(6);
        let category: String = row.get(7);
        let typtype: String = row.get(8);
        let typname: String = row.get(9);

        let (default, generated) = if generated == "s" {
            (None, default)
        } else {
            (default, None)
        };

        let column = Column {
            name: row.get(1),
            kind: ColumnKind::from_pg(&category, &typtype, &typname),
            data_type,
            not_null: row.get(3),
            default,
            identity: match identity.as_str() {
                "a" => Identity::Always,
                "d" => Identity::ByDefault,
                _ => Identity::None,
            },
            generated,
            type_ref: None,
        };
        catalog.tables[idx].columns.push(column);
    }

    debug!("Loaded columns for {} tables", catalog.tables.len());
    Ok(())
}

fn load_constraints<C: GenericClient>(
    client: &mut C,
    schemas: &[String],
    catalog: &mut Catalog,
    table_oids: &AHashMap<i64, usize>,
) -> Result<()> {
    // Constraints cloned onto partitions (conparentid <> 0) or inherited
    // CHECKs are recreated by the parent's statement and are skipped.
    let rows = client.query(
        r#"
        SELECT con.conrelid::int8, con.conname::text, con.contype::text,
               ARRAY(SELECT a.attname::text
                     FROM unnest(con.conkey) WITH ORDINALITY k(attnum, ord)
                     JOIN pg_catalog.pg_attribute a
                       ON a.attrelid = con.conrelid AND a.attnum = k.attnum
                     ORDER BY k.ord),
               rn.nspname::text, rc.relname::text,
               ARRAY(SELECT a.attname::text
                     FROM unnest(con.confkey) WITH ORDINALITY k(attnum, ord)
                     JOIN pg_catalog.pg_attribute a
                       ON a.attrelid = con.confrelid AND a.attnum = k.attnum
                     ORDER BY k.ord),
               pg_catalog.pg_get_constraintdef(con.oid)
        FROM pg_catalog.pg_constraint con
        JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        LEFT JOIN pg_catalog.pg_class rc ON rc.oid = con.confrelid
        LEFT JOIN pg_catalog.pg_namespace rn ON rn.oid = rc.relnamespace
        WHERE con.contype IN ('p', 'u', 'f', 'c')
          AND n.nspname = ANY($1)
          AND con.conparentid = 0
          AND con.conislocal
        ORDER BY con.conrelid, con.conname
        "#,
        &[&schemas],
    )?;

    for row in rows {
        let Some(&idx) = table_oids.get(&row.get::<_, i64>(0)) else {
            continue;
        };
        let contype: String = row.get(2);
        let kind = match contype.as_str() {
            "p" => ConstraintKind::PrimaryKey,
            "u" => ConstraintKind::Unique,
            "c" => ConstraintKind::Check,
            _ => {
                let ref_schema: Option<String> = row.get(4);
                let ref_table: Option<String> = row.get(5);
                ConstraintKind::ForeignKey(ForeignKey {
                    referenced_name: QualifiedName::new(
                        ref_schema.unwrap_or_default(),
                        ref_table.unwrap_or_default(),
                    ),
                    referenced_column_names: row.get(6),
                    referenced: None,
                    referenced_columns: Vec::new(),
                })
            }
        };

        catalog.tables[idx].constraints.push(Constraint {
            name: row.get(1),
            kind,
            column_names: row.get(3),
            columns: Vec::new(),
            definition: row.get(7),
        });
    }
    Ok(())
}

fn load_indexes<C: GenericClient>(
    client: &mut C,
    schemas: &[String],
    catalog: &mut Catalog,
    table_oids: &AHashMap<i64, usize>,
) -> Result<()> {
    let rows = client.query(
        r#"
        SELECT ix.indrelid::int8, i.relname::text, ix.indisunique,
               ix.indpred IS NOT NULL OR ix.indexprs IS NOT NULL,
               ARRAY(SELECT a.attname::text
                     FROM unnest(ix.indkey::int2[]) WITH ORDINALITY k(attnum, ord)
                     JOIN pg_catalog.pg_attribute a
                       ON a.attrelid = ix.indrelid AND a.attnum = k.attnum
                     ORDER BY k.ord),
               pg_catalog.pg_get_indexdef(ix.indexrelid)
        FROM pg_catalog.pg_index ix
        JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid
        JOIN pg_catalog.pg_class c ON c.oid = ix.indrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = ANY($1)
          AND c.relkind IN ('r', 'p')
          AND NOT EXISTS (SELECT 1 FROM pg_catalog.pg_constraint con
                          WHERE con.conindid = ix.indexrelid
                            AND con.contype IN ('p', 'u', 'x'))
          AND NOT EXISTS (SELECT 1 FROM pg_catalog.pg_inherits inh
                          WHERE inh.inhrelid = ix.indexrelid)
        ORDER BY ix.indrelid, i.relname
        "#,
        &[&schemas],
    )?;

    for row in rows {
        let Some(&idx) = table_oids.get(&row.get::<_, i64>(0)) else {
            continue;
        };
        catalog.tables[idx].indexes.push(IndexDef {
            name: row.get(1),
            is_unique: row.get(2),
            is_partial: row.get(3),
            column_names: row.get(4),
            definition: row.get(5),
        });
    }
    Ok(())
}

fn exact_count<C: GenericClient>(client: &mut C, table: &QualifiedName) -> Result<u64> {
    let sql = format!("SELECT COUNT(*)::int8 FROM {}", table.quoted());
    let row = client
        .query_one(sql.as_str(), &[])
        .map_err(|e| classify_error(e, &table.to_string()))?;
    Ok(row.get::<_, i64>(0).max(0) as u64)
}

/// Returns the oid -> name map of the types read.
fn load_types<C: GenericClient>(
    client: &mut C,
    schemas: &[String],
    catalog: &mut Catalog,
) -> Result<AHashMap<i64, QualifiedName>> {
    // Standalone composites only (relkind 'c'): a table's row type is not
    // a type of its own.
    let rows = client.query(
        r#"
        SELECT t.oid::int8, n.nspname::text, t.typname::text, t.typtype::text,
               pg_catalog.format_type(t.typbasetype, t.typtypmod),
               t.typnotnull,
               t.typdefault,
               ARRAY(SELECT e.enumlabel::text FROM pg_catalog.pg_enum e
                     WHERE e.enumtypid = t.oid ORDER BY e.enumsortorder),
               ARRAY(SELECT pg_catalog.pg_get_constraintdef(dc.oid)
                     FROM pg_catalog.pg_constraint dc
                     WHERE dc.contypid = t.oid ORDER BY dc.conname),
               ARRAY(SELECT a.attname::text FROM pg_catalog.pg_attribute a
                     WHERE a.attrelid = t.typrelid AND a.attnum > 0 AND NOT a.attisdropped
                     ORDER BY a.attnum),
               ARRAY(SELECT pg_catalog.format_type(a.atttypid, a.atttypmod)
                     FROM pg_catalog.pg_attribute a
                     WHERE a.attrelid = t.typrelid AND a.attnum > 0 AND NOT a.attisdropped
                     ORDER BY a.attnum),
               CASE WHEN t.typtype = 'r' THEN pg_catalog.format_type(r.rngsubtype, NULL) END,
               ARRAY(SELECT dep::int8 FROM (
                        SELECT t.typbasetype AS dep WHERE t.typtype = 'd'
                        UNION
                        SELECT a.atttypid FROM pg_catalog.pg_attribute a
                        WHERE a.attrelid = t.typrelid AND a.attnum > 0 AND NOT a.attisdropped
                        UNION
                        SELECT r.rngsubtype WHERE t.typtype = 'r'
                     ) deps)
        FROM pg_catalog.pg_type t
        JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace
        LEFT JOIN pg_catalog.pg_class c ON c.oid = t.typrelid
        LEFT JOIN pg_catalog.pg_range r ON r.rngtypid = t.oid
        WHERE n.nspname = ANY($1)
          AND t.typtype IN ('c', 'd', 'e', 'r')
          AND (t.typtype <> 'c' OR c.relkind = 'c')
          AND NOT EXISTS (SELECT 1 FROM pg_catalog.pg_depend d
                          WHERE d.objid = t.oid AND d.deptype = 'e')
        ORDER BY n.nspname, t.typname
        "#,
        &[&schemas],
    )?;

    let mut oids = AHashMap::new();
    let mut pending_deps = Vec::new();

    for row in rows {
        let oid: i64 = row.get(0);
        let name = QualifiedName::new(row.get::<_, String>(1), row.get::<_, String>(2));
        let typtype: String = row.get(3);

        let kind = match typtype.as_str() {
            "e" => TypeKind::Enum {
                labels: row.get(7),
            },
            "d" => TypeKind::Domain {
                base: row.get(4),
                not_null: row.get(5),
                default: row.get(6),
                checks: row.get(8),
            },
            "r" => TypeKind::Range {
                subtype: row.get::<_, Option<String>>(11).unwrap_or_default(),
            },
            _ => {
                let names: Vec<String> = row.get(9);
                let types: Vec<String> = row.get(10);
                TypeKind::Composite {
                    attributes: names.into_iter().zip(types).collect(),
                }
            }
        };

        oids.insert(oid, name.clone());
        pending_deps.push(row.get::<_, Vec<i64>>(12));
        catalog.types.push(TypeDef {
            name,
            kind,
            depends_on: Vec::new(),
        });
    }

    for (type_def, deps) in catalog.types.iter_mut().zip(pending_deps) {
        type_def.depends_on = deps
            .iter()
            .filter_map(|oid| oids.get(oid).cloned())
            .filter(|dep| dep != &type_def.name)
            .collect();
    }

    Ok(oids)
}

/// Attach user-defined type references to columns (element type for arrays).
fn resolve_column_types<C: GenericClient>(
    client: &mut C,
    schemas: &[String],
    catalog: &mut Catalog,
    table_oids: &AHashMap<i64, usize>,
    type_oids: &AHashMap<i64, QualifiedName>,
) -> Result<()> {
    if type_oids.is_empty() {
        return Ok(());
    }

    let rows = client.query(
        r#"
        SELECT a.attrelid::int8, a.attnum::int4,
               CASE WHEN t.typcategory = 'A' THEN t.typelem ELSE t.oid END::int8
        FROM pg_catalog.pg_attribute a
        JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        JOIN pg_catalog.pg_type t ON t.oid = a.atttypid
        WHERE c.relkind IN ('r', 'p')
          AND n.nspname = ANY($1)
          AND a.attnum > 0
          AND NOT a.attisdropped
        ORDER BY a.attrelid, a.attnum
        "#,
        &[&schemas],
    )?;

    // attnum has gaps after dropped columns, so track position per table
    let mut position: AHashMap<i64, usize> = AHashMap::new();
    for row in rows {
        let relid: i64 = row.get(0);
        let Some(&idx) = table_oids.get(&relid) else {
            continue;
        };
        let pos = position.entry(relid).or_insert(0);
        if let Some(name) = type_oids.get(&row.get::<_, i64>(2)) {
            if let Some(column) = catalog.tables[idx].columns.get_mut(*pos) {
                column.type_ref = Some(name.clone());
            }
        }
        *pos += 1;
    }
    Ok(())
}

fn load_sequences<C: GenericClient>(
    client: &mut C,
    schemas: &[String],
    catalog: &mut Catalog,
) -> Result<()> {
    // deptype 'a' = OWNED BY (serial), 'i' = identity column
    let rows = client.query(
        r#"
        SELECT n.nspname::text, c.relname::text, c.oid::regclass::text,
               s.seqtypid::regtype::text, s.seqstart, s.seqincrement,
               s.seqmin, s.seqmax, s.seqcycle,
               tn.nspname::text, tc.relname::text, ta.attname::text,
               d.deptype::text
        FROM pg_catalog.pg_sequence s
        JOIN pg_catalog.pg_class c ON c.oid = s.seqrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        LEFT JOIN pg_catalog.pg_depend d
               ON d.classid = 'pg_catalog.pg_class'::regclass
              AND d.objid = c.oid
              AND d.refclassid = 'pg_catalog.pg_class'::regclass
              AND d.deptype IN ('a', 'i')
        LEFT JOIN pg_catalog.pg_class tc ON tc.oid = d.refobjid
        LEFT JOIN pg_catalog.pg_namespace tn ON tn.oid = tc.relnamespace
        LEFT JOIN pg_catalog.pg_attribute ta
               ON ta.attrelid = d.refobjid AND ta.attnum = d.refobjsubid
        WHERE n.nspname = ANY($1)
        ORDER BY n.nspname, c.relname
        "#,
        &[&schemas],
    )?;

    let mut by_regclass: AHashMap<String, usize> = AHashMap::new();

    for row in rows {
        let mut sequence = Sequence::new(QualifiedName::new(
            row.get::<_, String>(0),
            row.get::<_, String>(1),
        ));
        sequence.data_type = row.get(3);
        sequence.start = row.get(4);
        sequence.increment = row.get(5);
        sequence.min_value = row.get(6);
        sequence.max_value = row.get(7);
        sequence.cycle = row.get(8);

        let owner_schema: Option<String> = row.get(9);
        let owner_table: Option<String> = row.get(10);
        let owner_column: Option<String> = row.get(11);
        let deptype: Option<String> = row.get(12);

        if let (Some(s), Some(t), Some(col)) = (owner_schema, owner_table, owner_column) {
            let owner = QualifiedName::new(s, t);
            sequence.identity = deptype.as_deref() == Some("i");
            if sequence.identity {
                sequence.bindings.push((owner.clone(), col.clone()));
            }
            sequence.owned_by = Some((owner, col));
        }

        by_regclass.insert(row.get::<_, String>(2), catalog.sequences.len());
        catalog.sequences.push(sequence);
    }

    // Bindings from column defaults; a sequence may feed several tables.
    for table in &catalog.tables {
        for column in &table.columns {
            let Some(default) = column.default.as_deref() else {
                continue;
            };
            for cap in NEXTVAL_RE.captures_iter(default) {
                let regclass = cap[1].replace("''", "'");
                if let Some(&seq_idx) = by_regclass.get(&regclass) {
                    let binding = (table.qualified(), column.name.clone());
                    let bindings = &mut catalog.sequences[seq_idx].bindings;
                    if !bindings.contains(&binding) {
                        bindings.push(binding);
                    }
                }
            }
        }
    }

    debug!("Loaded {} sequences", catalog.sequences.len());
    Ok(())
}

fn load_views<C: GenericClient>(
    client: &mut C,
    schemas: &[String],
    catalog: &mut Catalog,
    table_oids: &AHashMap<i64, usize>,
) -> Result<()> {
    let rows = client.query(
        r#"
        SELECT c.oid::int8, n.nspname::text, c.relname::text, c.relkind = 'm',
               pg_catalog.pg_get_viewdef(c.oid),
               ARRAY(SELECT DISTINCT d.refobjid::int8
                     FROM pg_catalog.pg_depend d
                     JOIN pg_catalog.pg_rewrite r ON r.oid = d.objid
                     WHERE r.ev_class = c.oid
                       AND d.classid = 'pg_catalog.pg_rewrite'::regclass
                       AND d.refclassid = 'pg_catalog.pg_class'::regclass
                       AND d.refobjid <> c.oid)
        FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        WHERE c.relkind IN ('v', 'm')
          AND n.nspname = ANY($1)
          AND NOT EXISTS (SELECT 1 FROM pg_catalog.pg_depend d
                          WHERE d.objid = c.oid AND d.deptype = 'e')
        ORDER BY n.nspname, c.relname
        "#,
        &[&schemas],
    )?;

    let mut view_oids: AHashMap<i64, QualifiedName> = AHashMap::new();
    let mut pending = Vec::new();
    for row in rows {
        let name = QualifiedName::new(row.get::<_, String>(1), row.get::<_, String>(2));
        view_oids.insert(row.get(0), name.clone());
        pending.push(row.get::<_, Vec<i64>>(5));
        catalog.views.push(ViewDef {
            name,
            materialized: row.get(3),
            definition: row.get(4),
            depends_on: Vec::new(),
        });
    }

    for (view, deps) in catalog.views.iter_mut().zip(pending) {
        view.depends_on = deps
            .iter()
            .filter_map(|oid| {
                table_oids
                    .get(oid)
                    .map(|&idx| catalog.tables[idx].qualified())
                    .or_else(|| view_oids.get(oid).cloned())
            })
            .collect();
    }
    Ok(())
}

fn load_functions<C: GenericClient>(
    client: &mut C,
    schemas: &[String],
    catalog: &mut Catalog,
) -> Result<()> {
    let rows = client.query(
        r#"
        SELECT n.nspname::text, p.proname::text, pg_catalog.pg_get_functiondef(p.oid)
        FROM pg_catalog.pg_proc p
        JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace
        WHERE n.nspname = ANY($1)
          AND p.prokind IN ('f', 'p')
          AND NOT EXISTS (SELECT 1 FROM pg_catalog.pg_depend d
                          WHERE d.classid = 'pg_catalog.pg_proc'::regclass
                            AND d.objid = p.oid AND d.deptype = 'e')
        ORDER BY n.nspname, p.proname, p.oid
        "#,
        &[&schemas],
    )?;

    for row in rows {
        catalog.functions.push(FunctionDef {
            name: QualifiedName::new(row.get::<_, String>(0), row.get::<_, String>(1)),
            definition: row.get(2),
        });
    }
    Ok(())
}

fn load_triggers<C: GenericClient>(
    client: &mut C,
    schemas: &[String],
    catalog: &mut Catalog,
) -> Result<()> {
    let rows = client.query(
        r#"
        SELECT n.nspname::text, c.relname::text, t.tgname::text,
               pg_catalog.pg_get_triggerdef(t.oid)
        FROM pg_catalog.pg_trigger t
        JOIN pg_catalog.pg_class c ON c.oid = t.tgrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        WHERE NOT t.tgisinternal
          AND c.relkind IN ('r', 'p')
          AND n.nspname = ANY($1)
        ORDER BY n.nspname, c.relname, t.tgname
        "#,
        &[&schemas],
    )?;

    for row in rows {
        catalog.triggers.push(TriggerDef {
            table: QualifiedName::new(row.get::<_, String>(0), row.get::<_, String>(1)),
            name: row.get(2),
            definition: row.get(3),
        });
    }
    Ok(())
}

fn load_extensions<C: GenericClient>(client: &mut C, catalog: &mut Catalog) -> Result<()> {
    let rows = client.query(
        r#"
        SELECT e.extname::text, n.nspname::text
        FROM pg_catalog.pg_extension e
        JOIN pg_catalog.pg_namespace n ON n.oid = e.extnamespace
        WHERE e.extname <> 'plpgsql'
        ORDER BY e.extname
        "#,
        &[],
    )?;

    for row in rows {
        catalog.extensions.push(ExtensionDef {
            name: row.get(0),
            schema: row.get(1),
        });
    }
    Ok(())
}
