//! Row values and compact row keys.
//!
//! Values travel from the source as their PostgreSQL text representation,
//! which is what the emitter writes back. Keys for primary keys, unique
//! keys and foreign-key tuples are small vectors of values so that the
//! common single-column case never allocates.

use smallvec::SmallVec;
use std::fmt;

/// A single column value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    Null,
    Int(i64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view of the value, used for sequence reconciliation.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Null => None,
        }
    }

    /// Text form as it would be sent to PostgreSQL, `None` for NULL.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Int(i) => Some(i.to_string()),
            Value::Text(s) => Some(s.clone()),
        }
    }
}

impl From<Option<String>> for Value {
    fn from(v: Option<String>) -> Self {
        match v {
            Some(s) => Value::Text(s),
            None => Value::Null,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Key tuple (primary key, unique key, FK columns or physical row identity).
pub type RowKey = SmallVec<[Value; 2]>;

/// Project the given column positions out of a row.
pub fn project(values: &[Value], columns: &[usize]) -> RowKey {
    columns
        .iter()
        .map(|&c| values.get(c).cloned().unwrap_or(Value::Null))
        .collect()
}

/// True when any component of the key is NULL. Such tuples never
/// reference a parent row under MATCH SIMPLE semantics.
pub fn has_null(key: &RowKey) -> bool {
    key.iter().any(Value::is_null)
}

/// A row kept in the sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampledRow {
    /// Row identity (primary key, or physical identity for tables without one)
    pub key: RowKey,
    /// Column values in table column order; excluded columns are NULL
    pub values: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_as_i64_parses_text() {
        assert_eq!(Value::Text(" 42".to_string()).as_i64(), Some(42));
        assert_eq!(Value::Int(-3).as_i64(), Some(-3));
        assert_eq!(Value::Text("abc".to_string()).as_i64(), None);
        assert_eq!(Value::Null.as_i64(), None);
    }

    #[test]
    fn test_project_and_null_detection() {
        let row = vec![Value::Int(1), Value::Null, Value::from("x")];
        let key = project(&row, &[0, 2]);
        let expected: RowKey = smallvec![Value::Int(1), Value::from("x")];
        assert_eq!(key, expected);
        assert!(!has_null(&key));
        assert!(has_null(&project(&row, &[1])));
    }
}
