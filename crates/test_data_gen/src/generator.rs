//! Random schema and row generation.
//!
//! Tables are generated in order; a table may reference any earlier table
//! through a NOT NULL or nullable column, itself through a nullable
//! `parent_id`, and a later table through a nullable column (which closes
//! a cycle). References are filled with ids that exist in the parent, so
//! every fixture is consistent.

use crate::fake::{self, TextKind};
use crate::schema::{ColumnKind, ColumnSpec, Fixture, FkSpec, TableSpec, Value};
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Generation scale presets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    /// 4-6 tables, up to 30 rows each
    Small,
    /// 8-12 tables, up to 200 rows each
    Medium,
    /// 20-30 tables, up to 2,000 rows each
    Large,
}

impl Scale {
    fn table_range(self) -> (usize, usize) {
        match self {
            Scale::Small => (4, 6),
            Scale::Medium => (8, 12),
            Scale::Large => (20, 30),
        }
    }

    fn max_rows(self) -> usize {
        match self {
            Scale::Small => 30,
            Scale::Medium => 200,
            Scale::Large => 2_000,
        }
    }
}

impl std::str::FromStr for Scale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "small" => Ok(Scale::Small),
            "medium" => Ok(Scale::Medium),
            "large" => Ok(Scale::Large),
            _ => Err(format!(
                "Unknown scale: {}. Valid options: small, medium, large",
                s
            )),
        }
    }
}

/// Probability that a table references a given earlier table
const FORWARD_FK_PROBABILITY: f64 = 0.35;
const SELF_FK_PROBABILITY: f64 = 0.2;
const BACK_FK_PROBABILITY: f64 = 0.1;
const NULL_PROBABILITY: f64 = 0.2;

/// Reference still to be filled once the later table has rows
struct BackReference {
    table: usize,
    column: usize,
    references: usize,
}

pub struct Generator {
    seed: u64,
    scale: Scale,
    rng: ChaCha8Rng,
}

impl Generator {
    pub fn new(seed: u64, scale: Scale) -> Self {
        Self {
            seed,
            scale,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn generate(&mut self) -> Fixture {
        let (min, max) = self.scale.table_range();
        let table_count = self.rng.random_range(min..=max);

        let mut tables: Vec<TableSpec> = Vec::with_capacity(table_count);
        let mut back_refs = Vec::new();

        for position in 0..table_count {
            let table = self.table(position, table_count, &tables, &mut back_refs);
            tables.push(table);
        }

        for back in back_refs {
            let ids: Vec<i64> = (1..=tables[back.references].rows.len() as i64).collect();
            for row in tables[back.table].rows.iter_mut() {
                row[back.column] = self.maybe_null(&ids);
            }
        }

        Fixture {
            seed: self.seed,
            tables,
        }
    }

    fn table(
        &mut self,
        position: usize,
        table_count: usize,
        earlier: &[TableSpec],
        back_refs: &mut Vec<BackReference>,
    ) -> TableSpec {
        let name = format!("t{:02}", position);
        let mut columns = vec![ColumnSpec {
            name: "id".to_string(),
            kind: ColumnKind::Integer,
            not_null: true,
        }];
        let mut foreign_keys = Vec::new();

        let text_kind = *TextKind::ALL.choose(&mut self.rng).unwrap_or(&TextKind::Name);
        columns.push(ColumnSpec {
            name: text_kind.column_name().to_string(),
            kind: ColumnKind::Text,
            not_null: false,
        });

        // (column, referenced table, not null)
        let mut forward = Vec::new();
        for (parent, spec) in earlier.iter().enumerate() {
            if !self.rng.random_bool(FORWARD_FK_PROBABILITY) {
                continue;
            }
            let not_null = self.rng.random_bool(0.5);
            forward.push((columns.len(), parent, not_null));
            columns.push(ColumnSpec {
                name: format!("{}_id", spec.name),
                kind: ColumnKind::Integer,
                not_null,
            });
        }

        let self_column = self.rng.random_bool(SELF_FK_PROBABILITY).then(|| {
            columns.push(ColumnSpec {
                name: "parent_id".to_string(),
                kind: ColumnKind::Integer,
                not_null: false,
            });
            columns.len() - 1
        });

        let later = position + 1..table_count;
        let back_column = (!later.is_empty() && self.rng.random_bool(BACK_FK_PROBABILITY)).then(|| {
            let references = self.rng.random_range(later);
            columns.push(ColumnSpec {
                name: format!("t{:02}_id", references),
                kind: ColumnKind::Integer,
                not_null: false,
            });
            (columns.len() - 1, references)
        });

        let row_count = self.rng.random_range(1..=self.scale.max_rows());
        let mut rows = Vec::with_capacity(row_count);
        for id in 1..=row_count as i64 {
            let mut row = vec![Value::Null; columns.len()];
            row[0] = Value::Int(id);
            row[1] = Value::Text(fake::text(text_kind, &mut self.rng));
            for &(column, parent, not_null) in &forward {
                let ids: Vec<i64> = (1..=earlier[parent].rows.len() as i64).collect();
                row[column] = if not_null {
                    Value::Int(*ids.choose(&mut self.rng).unwrap_or(&1))
                } else {
                    self.maybe_null(&ids)
                };
            }
            if let Some(column) = self_column {
                let ids: Vec<i64> = (1..id).collect();
                row[column] = self.maybe_null(&ids);
            }
            rows.push(row);
        }

        for &(column, parent, _) in &forward {
            foreign_keys.push(FkSpec {
                name: format!("{}_{}_fkey", name, columns[column].name),
                column,
                references: parent,
            });
        }
        if let Some(column) = self_column {
            foreign_keys.push(FkSpec {
                name: format!("{}_parent_id_fkey", name),
                column,
                references: position,
            });
        }
        if let Some((column, references)) = back_column {
            foreign_keys.push(FkSpec {
                name: format!("{}_{}_fkey", name, columns[column].name),
                column,
                references,
            });
            back_refs.push(BackReference {
                table: position,
                column,
                references,
            });
        }

        TableSpec {
            name,
            columns,
            foreign_keys,
            rows,
        }
    }

    fn maybe_null(&mut self, ids: &[i64]) -> Value {
        if ids.is_empty() || self.rng.random_bool(NULL_PROBABILITY) {
            return Value::Null;
        }
        ids.choose(&mut self.rng).map_or(Value::Null, |id| Value::Int(*id))
    }
}
