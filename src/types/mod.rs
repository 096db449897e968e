//! Runtime value and row types for the SQL engine

mod column;
mod datetime;
mod table;

pub use column::{CastError, Column, DatetimeColumn, IntegerColumn, IntegerWidth, VarcharColumn};
pub use datetime::Datetime;
pub use table::Table;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// Scalar value flowing through the pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Datetime(Datetime),
    Null,
    /// Transient marker for DEFAULT in INSERT value positions. Never leaves
    /// the insert processor.
    Default,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// MySQL truthiness: non-zero, non-null, non-empty string.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Bool(b) => *b,
            Value::Datetime(_) => true,
            Value::Null | Value::Default => false,
        }
    }

    /// Numeric coercion. Strings follow MySQL and collapse to 0 when they
    /// do not parse; null and datetime yield `None`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => Some(s.trim().parse::<f64>().unwrap_or(0.0)),
            Value::Datetime(_) | Value::Null | Value::Default => None,
        }
    }

    /// Canonical string form, used for group keys, DISTINCT keys, and
    /// VARCHAR coercion.
    pub fn sql_string(&self) -> String {
        match self {
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Value::Datetime(d) => d.to_string(),
            Value::Null => "NULL".to_string(),
            Value::Default => "DEFAULT".to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql_string())
    }
}

/// Type-aware comparison used by the comparison operators, ORDER BY, and
/// MIN/MAX. Numbers compare numerically, strings lexicographically; null
/// compares to nothing.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Integer(x), Value::Integer(y)) => Some(x.cmp(y)),
        (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
        (Value::Datetime(x), Value::Datetime(y)) => Some(x.cmp(y)),
        (Value::Datetime(x), Value::Text(y)) => Datetime::parse(y).map(|d| x.cmp(&d)),
        (Value::Text(x), Value::Datetime(y)) => Datetime::parse(x).map(|d| d.cmp(y)),
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => None,
        },
    }
}

/// A runtime row: qualified key to value.
///
/// Keys between pipeline stages are either `T::c` (column `c` of the source
/// named `T`) or `::a` (SELECT alias `a`, visible to HAVING only). Bare keys
/// appear only in stored table rows and user-visible output.
pub type Row = HashMap<String, Value>;

/// Separator between the source qualifier and the column name in row keys.
pub const KEY_SEPARATOR: &str = "::";

pub fn qualified_key(source: &str, column: &str) -> String {
    format!("{source}{KEY_SEPARATOR}{column}")
}

pub fn alias_key(alias: &str) -> String {
    format!("{KEY_SEPARATOR}{alias}")
}

/// Split a qualified key into (qualifier, column). Alias-scope keys yield an
/// empty qualifier; bare keys yield `None`.
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    key.split_once(KEY_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(Value::Integer(2).is_truthy());
        assert!(!Value::Integer(0).is_truthy());
        assert!(Value::Text("x".into()).is_truthy());
        assert!(!Value::Text("".into()).is_truthy());
        assert!(!Value::Null.is_truthy());
    }

    #[test]
    fn test_compare_mixed_numeric() {
        assert_eq!(
            compare_values(&Value::Integer(2), &Value::Float(2.5)),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare_values(&Value::Text("2".into()), &Value::Integer(2)),
            Some(Ordering::Equal)
        );
        assert_eq!(compare_values(&Value::Null, &Value::Integer(1)), None);
    }

    #[test]
    fn test_compare_strings() {
        assert_eq!(
            compare_values(&Value::Text("a".into()), &Value::Text("b".into())),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn test_key_helpers() {
        assert_eq!(qualified_key("users", "id"), "users::id");
        assert_eq!(alias_key("total"), "::total");
        assert_eq!(split_key("users::id"), Some(("users", "id")));
        assert_eq!(split_key("::total"), Some(("", "total")));
        assert_eq!(split_key("id"), None);
    }
}
