//! Column definitions and the cast system enforcing MySQL value semantics

use super::{Datetime, Value};
use crate::error::CastCode;
use crate::sql::ast::Expr;

/// Cast failure. The machine code lets the insert processor rewrite the
/// message with positional context before it reaches the caller.
#[derive(Debug, Clone)]
pub struct CastError {
    pub code: CastCode,
    pub message: String,
}

impl CastError {
    fn out_of_range(message: String) -> Self {
        Self {
            code: CastCode::OutOfRangeValue,
            message,
        }
    }

    fn incorrect(message: String) -> Self {
        Self {
            code: CastCode::IncorrectIntegerValue,
            message,
        }
    }
}

/// Declared storage width of an integer column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerWidth {
    TinyInt,
    SmallInt,
    Int,
    BigInt,
}

impl IntegerWidth {
    fn bits(&self) -> u32 {
        match self {
            IntegerWidth::TinyInt => 8,
            IntegerWidth::SmallInt => 16,
            IntegerWidth::Int => 32,
            IntegerWidth::BigInt => 64,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IntegerColumn {
    pub name: String,
    pub width: IntegerWidth,
    pub unsigned: bool,
    pub nullable: bool,
    pub auto_increment: bool,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct VarcharColumn {
    pub name: String,
    pub length: usize,
    pub nullable: bool,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct DatetimeColumn {
    pub name: String,
    pub nullable: bool,
    pub default: Option<Expr>,
}

/// A column definition: a tagged variant per column kind with a common
/// `cast` operation. The auto-increment capability is a flag on the integer
/// variant only.
#[derive(Debug, Clone)]
pub enum Column {
    Integer(IntegerColumn),
    Varchar(VarcharColumn),
    Datetime(DatetimeColumn),
}

impl Column {
    pub fn name(&self) -> &str {
        match self {
            Column::Integer(c) => &c.name,
            Column::Varchar(c) => &c.name,
            Column::Datetime(c) => &c.name,
        }
    }

    pub fn is_nullable(&self) -> bool {
        match self {
            Column::Integer(c) => c.nullable,
            Column::Varchar(c) => c.nullable,
            Column::Datetime(c) => c.nullable,
        }
    }

    pub fn default_expr(&self) -> Option<&Expr> {
        match self {
            Column::Integer(c) => c.default.as_ref(),
            Column::Varchar(c) => c.default.as_ref(),
            Column::Datetime(c) => c.default.as_ref(),
        }
    }

    pub fn has_auto_increment(&self) -> bool {
        matches!(self, Column::Integer(c) if c.auto_increment)
    }

    /// Enforce this column's type and range on a value. Null passes iff the
    /// column is nullable.
    pub fn cast(&self, value: Value) -> Result<Value, CastError> {
        if value.is_null() {
            if self.is_nullable() {
                return Ok(Value::Null);
            }
            return Err(CastError {
                code: CastCode::BadNull,
                message: format!("Field '{}' doesn't have a default value", self.name()),
            });
        }
        match self {
            Column::Integer(c) => c.cast(value),
            Column::Varchar(c) => c.cast(value),
            Column::Datetime(c) => c.cast(value),
        }
    }
}

impl IntegerColumn {
    fn range(&self) -> (i128, i128) {
        let bits = self.width.bits();
        if self.unsigned {
            (0, (1i128 << bits) - 1)
        } else {
            let half = 1i128 << (bits - 1);
            (-half, half - 1)
        }
    }

    fn cast(&self, value: Value) -> Result<Value, CastError> {
        let parsed: i128 = match &value {
            Value::Integer(i) => *i as i128,
            Value::Float(f) if f.is_finite() => f.round() as i128,
            Value::Bool(b) => *b as i128,
            Value::Text(s) => {
                let trimmed = s.trim();
                if let Ok(i) = trimmed.parse::<i128>() {
                    i
                } else if let Ok(f) = trimmed.parse::<f64>() {
                    f.round() as i128
                } else {
                    return Err(CastError::incorrect(format!(
                        "Incorrect integer value: '{}' for column '{}'",
                        s, self.name
                    )));
                }
            }
            _ => {
                return Err(CastError::incorrect(format!(
                    "Incorrect integer value: '{}' for column '{}'",
                    value, self.name
                )))
            }
        };
        let (low, high) = self.range();
        if parsed < low || parsed > high || parsed > i64::MAX as i128 {
            return Err(CastError::out_of_range(format!(
                "Out of range value for column '{}'",
                self.name
            )));
        }
        Ok(Value::Integer(parsed as i64))
    }
}

impl VarcharColumn {
    fn cast(&self, value: Value) -> Result<Value, CastError> {
        let text = value.sql_string();
        // Over-long values are an error, not a silent truncation.
        if text.chars().count() > self.length {
            return Err(CastError::out_of_range(format!(
                "Data too long for column '{}'",
                self.name
            )));
        }
        Ok(Value::Text(text))
    }
}

impl DatetimeColumn {
    fn cast(&self, value: Value) -> Result<Value, CastError> {
        match &value {
            Value::Datetime(d) => Ok(Value::Datetime(*d)),
            Value::Text(s) => Datetime::parse(s).map(Value::Datetime).ok_or_else(|| {
                CastError::incorrect(format!(
                    "Incorrect datetime value: '{}' for column '{}'",
                    s, self.name
                ))
            }),
            Value::Integer(i) => Ok(Value::Datetime(Datetime::from_secs(*i))),
            Value::Float(f) => Ok(Value::Datetime(Datetime::from_secs(*f as i64))),
            _ => Err(CastError::incorrect(format!(
                "Incorrect datetime value: '{}' for column '{}'",
                value, self.name
            ))),
        }
    }
}
