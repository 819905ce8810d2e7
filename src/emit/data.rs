//! Data phase: multi-row INSERT statements.

use super::TargetVersion;
use crate::catalog::{quote_ident, quote_literal, Column, ColumnKind, Identity, Table};
use crate::sample::RowSet;
use crate::value::Value;
use crate::writer::ScriptWriter;
use std::io::{self, Write};

/// Rows per INSERT statement
pub const INSERT_BATCH_ROWS: usize = 1000;

/// SQL literal for a value of `column`. Numeric columns are written bare
/// when the text is a plain number; everything else is a quoted literal
/// that the server casts to the column type.
pub fn render_value(value: &Value, column: &Column) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Int(i) if column.kind == ColumnKind::Numeric => i.to_string(),
        Value::Int(i) => quote_literal(&i.to_string()),
        Value::Text(s) if column.kind == ColumnKind::Numeric && is_plain_number(s) => s.clone(),
        Value::Text(s) => quote_literal(s),
    }
}

/// Digits with optional sign, point and exponent; `NaN` and `Infinity`
/// need quoting
fn is_plain_number(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().any(|b| b.is_ascii_digit())
        && s
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E'))
}

/// Write the rows of one data table; returns the number of rows written.
/// Generated columns are left out and identity ALWAYS columns are
/// overridden.
pub fn write_rows<W: Write>(
    writer: &mut ScriptWriter<W>,
    table: &Table,
    rows: &RowSet,
    target: TargetVersion,
) -> io::Result<u64> {
    if rows.is_empty() {
        return Ok(0);
    }

    let columns: Vec<usize> = table
        .columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.generated.is_none())
        .map(|(i, _)| i)
        .collect();
    let column_list = columns
        .iter()
        .map(|&i| quote_ident(&table.columns[i].name))
        .collect::<Vec<_>>()
        .join(", ");
    let overriding = target.supports_identity()
        && columns
            .iter()
            .any(|&i| table.columns[i].identity == Identity::Always);

    let mut written = 0u64;
    for chunk in rows.rows().chunks(INSERT_BATCH_ROWS) {
        let mut sql = format!("INSERT INTO {} ({})", table.quoted(), column_list);
        if overriding {
            sql.push_str(" OVERRIDING SYSTEM VALUE");
        }
        sql.push_str(" VALUES\n");

        for (n, row) in chunk.iter().enumerate() {
            if n > 0 {
                sql.push_str(",\n");
            }
            sql.push('(');
            for (k, &i) in columns.iter().enumerate() {
                if k > 0 {
                    sql.push_str(", ");
                }
                let value = row.values.get(i).unwrap_or(&Value::Null);
                sql.push_str(&render_value(value, &table.columns[i]));
            }
            sql.push(')');
        }
        sql.push(';');

        writer.write_statement(&sql)?;
        written += chunk.len() as u64;
    }
    Ok(written)
}
