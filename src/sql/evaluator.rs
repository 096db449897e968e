//! Expression evaluator - evaluates expressions against pipeline rows
//!
//! The evaluator is stateless with respect to rows: it holds the server (for
//! sub-queries and `database()`), the list of qualified keys currently in
//! scope, and an optional outer row used for correlated sub-query lookups.
//! Aggregates additionally receive the group of rows they fold over.

use std::collections::HashSet;

use super::ast::{BinaryOp, ColumnRef, Expr, SelectQuery};
use super::executor::SelectPipeline;
use crate::catalog::Server;
use crate::error::{EngineError, Result};
use crate::types::{alias_key, compare_values, qualified_key, split_key, Row, Value};

const AGGREGATE_FUNCTIONS: &[&str] = &["count", "sum", "min", "max", "avg"];

pub fn is_aggregate_name(name: &str) -> bool {
    AGGREGATE_FUNCTIONS.contains(&name.to_lowercase().as_str())
}

pub struct Evaluator<'a> {
    server: &'a Server,
    /// Qualified keys visible to column references, in FROM-declaration
    /// order. Grows as FROM adds sources and SELECT defines aliases.
    scope: Vec<String>,
    /// Outer row for correlated sub-queries.
    context: Option<Row>,
}

impl<'a> Evaluator<'a> {
    pub fn new(server: &'a Server) -> Self {
        Self {
            server,
            scope: Vec::new(),
            context: None,
        }
    }

    pub fn with_context(server: &'a Server, context: Option<Row>) -> Self {
        Self {
            server,
            scope: Vec::new(),
            context,
        }
    }

    pub fn scope(&self) -> &[String] {
        &self.scope
    }

    pub fn push_scope(&mut self, key: String) {
        self.scope.push(key);
    }

    pub fn extend_scope(&mut self, keys: impl IntoIterator<Item = String>) {
        self.scope.extend(keys);
    }

    /// Evaluate an expression against a row. `group` must be provided for
    /// aggregate functions; they re-evaluate their argument per group row.
    pub fn evaluate(&self, expr: &Expr, row: &Row, group: Option<&[Row]>) -> Result<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Column(column) => self.resolve_column(column, row),
            Expr::Star { .. } => Err(EngineError::Evaluator(
                "Unexpected '*' outside of the select list".to_string(),
            )),
            Expr::Array(_) => Err(EngineError::Evaluator(
                "Unexpected value list outside of IN".to_string(),
            )),
            Expr::Binary { op, left, right } => self.evaluate_binary(*op, left, right, row, group),
            Expr::Function {
                name,
                args,
                distinct,
            } => self.evaluate_function(name, args, *distinct, row, group),
            Expr::Case {
                branches,
                else_branch,
            } => {
                for (condition, value) in branches {
                    if self.evaluate(condition, row, group)?.is_truthy() {
                        return self.evaluate(value, row, group);
                    }
                }
                match else_branch {
                    Some(value) => self.evaluate(value, row, group),
                    None => Ok(Value::Null),
                }
            }
            Expr::Subquery(query) => self.evaluate_subquery(query, row),
        }
    }

    /// Expand `*`/`t.*` against the scope list: (output name, value) pairs
    /// keyed by the unqualified column name, in scope order.
    pub fn evaluate_star(&self, table: Option<&str>, row: &Row) -> Result<Vec<(String, Value)>> {
        let entries = self.star_entries(table)?;
        Ok(entries
            .into_iter()
            .map(|(name, key)| {
                let value = row.get(&key).cloned().unwrap_or(Value::Null);
                (name, value)
            })
            .collect())
    }

    /// The (unqualified name, qualified key) pairs a star expands to.
    pub fn star_entries(&self, table: Option<&str>) -> Result<Vec<(String, String)>> {
        let mut entries = Vec::new();
        for key in &self.scope {
            let Some((qualifier, column)) = split_key(key) else {
                continue;
            };
            if qualifier.is_empty() {
                continue; // alias-scope entries are invisible to stars
            }
            if let Some(wanted) = table {
                if qualifier != wanted {
                    continue;
                }
            }
            entries.push((column.to_string(), key.clone()));
        }
        if entries.is_empty() {
            return Err(match table {
                Some(table) => EngineError::Evaluator(format!("Unknown table '{table}'")),
                None => EngineError::Processor("No tables used".to_string()),
            });
        }
        Ok(entries)
    }

    /// Resolve a column reference: `T::c` for qualified references, the
    /// alias scope `::c` and then a single `?::c` scope match for bare ones.
    /// Falls back to the outer context row for correlated sub-queries.
    fn resolve_column(&self, column: &ColumnRef, row: &Row) -> Result<Value> {
        if let Some(value) = self.lookup(column, row, &self.scope)? {
            return Ok(value);
        }
        if let Some(context) = &self.context {
            let context_keys: Vec<String> = context.keys().cloned().collect();
            if let Some(value) = self.lookup(column, context, &context_keys)? {
                return Ok(value);
            }
        }
        Err(EngineError::Evaluator(format!("Unknown column '{column}'")))
    }

    fn lookup(&self, column: &ColumnRef, row: &Row, scope: &[String]) -> Result<Option<Value>> {
        if let Some(table) = &column.table {
            return Ok(row.get(&qualified_key(table, &column.column)).cloned());
        }
        if let Some(value) = row.get(&alias_key(&column.column)) {
            return Ok(Some(value.clone()));
        }
        let mut matches = scope.iter().filter(|key| {
            split_key(key).is_some_and(|(qualifier, name)| {
                !qualifier.is_empty() && name == column.column
            })
        });
        let first = matches.next();
        if matches.next().is_some() {
            return Err(EngineError::Processor(format!(
                "Column '{}' in field list is ambiguous",
                column.column
            )));
        }
        Ok(first.map(|key| row.get(key).cloned().unwrap_or(Value::Null)))
    }

    fn evaluate_binary(
        &self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        row: &Row,
        group: Option<&[Row]>,
    ) -> Result<Value> {
        match op {
            BinaryOp::And | BinaryOp::Or => {
                let lhs = truth(&self.evaluate(left, row, group)?);
                let rhs = truth(&self.evaluate(right, row, group)?);
                // MySQL three-valued logic.
                let result = if op == BinaryOp::And {
                    match (lhs, rhs) {
                        (Some(false), _) | (_, Some(false)) => Some(false),
                        (Some(true), Some(true)) => Some(true),
                        _ => None,
                    }
                } else {
                    match (lhs, rhs) {
                        (Some(true), _) | (_, Some(true)) => Some(true),
                        (Some(false), Some(false)) => Some(false),
                        _ => None,
                    }
                };
                Ok(result.map(Value::Bool).unwrap_or(Value::Null))
            }

            BinaryOp::Is | BinaryOp::IsNot => {
                let lhs = self.evaluate(left, row, group)?;
                let rhs = self.evaluate(right, row, group)?;
                let outcome = match rhs {
                    Value::Null => lhs.is_null(),
                    Value::Bool(b) => !lhs.is_null() && lhs.is_truthy() == b,
                    other => !lhs.is_null() && compare_values(&lhs, &other) == Some(std::cmp::Ordering::Equal),
                };
                Ok(Value::Bool(if op == BinaryOp::Is { outcome } else { !outcome }))
            }

            BinaryOp::In => {
                let Expr::Array(items) = right else {
                    return Err(EngineError::Evaluator(
                        "IN expects a value list".to_string(),
                    ));
                };
                let needle = self.evaluate(left, row, group)?;
                if needle.is_null() {
                    return Ok(Value::Null);
                }
                let mut saw_null = false;
                for item in items {
                    let candidate = self.evaluate(item, row, group)?;
                    if candidate.is_null() {
                        saw_null = true;
                        continue;
                    }
                    if compare_values(&needle, &candidate) == Some(std::cmp::Ordering::Equal) {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(if saw_null { Value::Null } else { Value::Bool(false) })
            }

            BinaryOp::Like => {
                let lhs = self.evaluate(left, row, group)?;
                let rhs = self.evaluate(right, row, group)?;
                if lhs.is_null() || rhs.is_null() {
                    return Ok(Value::Null);
                }
                Ok(Value::Bool(like_match(
                    &lhs.sql_string(),
                    &rhs.sql_string(),
                )))
            }

            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let lhs = self.evaluate(left, row, group)?;
                let rhs = self.evaluate(right, row, group)?;
                if lhs.is_null() || rhs.is_null() {
                    return Ok(Value::Null);
                }
                let outcome = match compare_values(&lhs, &rhs) {
                    Some(ordering) => match op {
                        BinaryOp::Eq => ordering.is_eq(),
                        BinaryOp::Ne => ordering.is_ne(),
                        BinaryOp::Lt => ordering.is_lt(),
                        BinaryOp::Le => ordering.is_le(),
                        BinaryOp::Gt => ordering.is_gt(),
                        BinaryOp::Ge => ordering.is_ge(),
                        _ => unreachable!(),
                    },
                    None => false,
                };
                Ok(Value::Bool(outcome))
            }

            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                let lhs = self.evaluate(left, row, group)?;
                let rhs = self.evaluate(right, row, group)?;
                // Arithmetic on null yields null.
                if lhs.is_null() || rhs.is_null() {
                    return Ok(Value::Null);
                }
                self.arithmetic(op, &lhs, &rhs)
            }
        }
    }

    fn arithmetic(&self, op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value> {
        if let (Value::Integer(a), Value::Integer(b)) = (lhs, rhs) {
            if op != BinaryOp::Div {
                let result = match op {
                    BinaryOp::Add => a.checked_add(*b),
                    BinaryOp::Sub => a.checked_sub(*b),
                    BinaryOp::Mul => a.checked_mul(*b),
                    _ => unreachable!(),
                };
                return result.map(Value::Integer).ok_or_else(|| {
                    EngineError::Evaluator(format!(
                        "BIGINT value is out of range in '{a} {op} {b}'"
                    ))
                });
            }
        }

        let (a, b) = match (lhs.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => (a, b),
            _ => return Ok(Value::Null),
        };
        let result = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => {
                if b == 0.0 {
                    return Err(EngineError::Evaluator("Division by zero".to_string()));
                }
                a / b
            }
            _ => unreachable!(),
        };
        Ok(Value::Float(result))
    }

    fn evaluate_function(
        &self,
        name: &str,
        args: &[Expr],
        distinct: bool,
        row: &Row,
        group: Option<&[Row]>,
    ) -> Result<Value> {
        let name_lower = name.to_lowercase();

        if is_aggregate_name(&name_lower) {
            let Some(rows) = group else {
                return Err(EngineError::Evaluator(
                    "Invalid use of group function".to_string(),
                ));
            };
            return self.evaluate_aggregate(&name_lower, args, distinct, rows);
        }

        match name_lower.as_str() {
            "database" => Ok(self
                .server
                .current_database()
                .map(Value::Text)
                .unwrap_or(Value::Null)),

            "version" => Ok(Value::Text(self.server.version().to_string())),

            "lower" | "upper" => {
                let value = self.single_arg(&name_lower, args, row, group)?;
                if value.is_null() {
                    return Ok(Value::Null);
                }
                let text = value.sql_string();
                Ok(Value::Text(if name_lower == "lower" {
                    text.to_lowercase()
                } else {
                    text.to_uppercase()
                }))
            }

            "length" => {
                let value = self.single_arg(&name_lower, args, row, group)?;
                if value.is_null() {
                    return Ok(Value::Null);
                }
                Ok(Value::Integer(value.sql_string().len() as i64))
            }

            "concat" => {
                let mut result = String::new();
                for arg in args {
                    let value = self.evaluate(arg, row, group)?;
                    if value.is_null() {
                        return Ok(Value::Null);
                    }
                    result.push_str(&value.sql_string());
                }
                Ok(Value::Text(result))
            }

            "coalesce" => {
                for arg in args {
                    let value = self.evaluate(arg, row, group)?;
                    if !value.is_null() {
                        return Ok(value);
                    }
                }
                Ok(Value::Null)
            }

            "ifnull" => {
                if args.len() != 2 {
                    return Err(EngineError::Evaluator(
                        "Incorrect parameter count in the call to native function 'ifnull'"
                            .to_string(),
                    ));
                }
                let value = self.evaluate(&args[0], row, group)?;
                if value.is_null() {
                    self.evaluate(&args[1], row, group)
                } else {
                    Ok(value)
                }
            }

            _ => Err(EngineError::Evaluator(format!(
                "FUNCTION {name_lower} does not exist"
            ))),
        }
    }

    fn single_arg(
        &self,
        name: &str,
        args: &[Expr],
        row: &Row,
        group: Option<&[Row]>,
    ) -> Result<Value> {
        if args.len() != 1 {
            return Err(EngineError::Evaluator(format!(
                "Incorrect parameter count in the call to native function '{name}'"
            )));
        }
        self.evaluate(&args[0], row, group)
    }

    fn evaluate_aggregate(
        &self,
        name: &str,
        args: &[Expr],
        distinct: bool,
        rows: &[Row],
    ) -> Result<Value> {
        match name {
            "count" => {
                let star = args.is_empty() || matches!(args[0], Expr::Star { .. });
                if star {
                    return Ok(Value::Integer(rows.len() as i64));
                }
                if distinct {
                    let mut seen = HashSet::new();
                    for row in rows {
                        let mut parts = Vec::with_capacity(args.len());
                        let mut any_null = false;
                        for arg in args {
                            let value = self.evaluate(arg, row, None)?;
                            if value.is_null() {
                                any_null = true;
                                break;
                            }
                            parts.push(value.sql_string());
                        }
                        if !any_null {
                            seen.insert(parts.join("::"));
                        }
                    }
                    return Ok(Value::Integer(seen.len() as i64));
                }
                let mut count = 0i64;
                for row in rows {
                    if !self.evaluate(&args[0], row, None)?.is_null() {
                        count += 1;
                    }
                }
                Ok(Value::Integer(count))
            }

            "sum" | "avg" => {
                if args.is_empty() {
                    return Err(EngineError::Evaluator(format!(
                        "Incorrect parameter count in the call to native function '{name}'"
                    )));
                }
                let values = self.aggregate_values(&args[0], distinct, rows)?;
                if values.is_empty() {
                    return Ok(Value::Null);
                }
                let mut total = 0.0;
                let mut count = 0usize;
                let mut integral = true;
                for value in &values {
                    if !matches!(value, Value::Integer(_)) {
                        integral = false;
                    }
                    if let Some(n) = value.as_number() {
                        total += n;
                        count += 1;
                    }
                }
                if count == 0 {
                    return Ok(Value::Null);
                }
                if name == "avg" {
                    return Ok(Value::Float(total / count as f64));
                }
                if integral {
                    Ok(Value::Integer(total as i64))
                } else {
                    Ok(Value::Float(total))
                }
            }

            "min" | "max" => {
                if args.is_empty() {
                    return Err(EngineError::Evaluator(format!(
                        "Incorrect parameter count in the call to native function '{name}'"
                    )));
                }
                let mut best: Option<Value> = None;
                for row in rows {
                    let value = self.evaluate(&args[0], row, None)?;
                    if value.is_null() {
                        continue;
                    }
                    best = Some(match best {
                        None => value,
                        Some(current) => {
                            let ordering = compare_values(&value, &current);
                            let replace = match name {
                                "min" => ordering == Some(std::cmp::Ordering::Less),
                                _ => ordering == Some(std::cmp::Ordering::Greater),
                            };
                            if replace {
                                value
                            } else {
                                current
                            }
                        }
                    });
                }
                Ok(best.unwrap_or(Value::Null))
            }

            _ => unreachable!("not an aggregate: {name}"),
        }
    }

    /// Non-null argument values across a group, optionally de-duplicated by
    /// their string representation.
    fn aggregate_values(&self, arg: &Expr, distinct: bool, rows: &[Row]) -> Result<Vec<Value>> {
        let mut values = Vec::new();
        let mut seen = HashSet::new();
        for row in rows {
            let value = self.evaluate(arg, row, None)?;
            if value.is_null() {
                continue;
            }
            if distinct && !seen.insert(value.sql_string()) {
                continue;
            }
            values.push(value);
        }
        Ok(values)
    }

    /// Run a scalar sub-query with this row (merged over any enclosing
    /// context) as the correlation context.
    fn evaluate_subquery(&self, query: &SelectQuery, row: &Row) -> Result<Value> {
        let mut context = row.clone();
        if let Some(outer) = &self.context {
            for (key, value) in outer {
                context.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        let output = SelectPipeline::new(self.server, query, Some(context)).run()?;
        if output.rows.len() > 1 {
            return Err(EngineError::Processor(
                "Subquery returns more than 1 row".to_string(),
            ));
        }
        Ok(output
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .unwrap_or(Value::Null))
    }
}

/// Three-valued truth of a value: None for null.
fn truth(value: &Value) -> Option<bool> {
    if value.is_null() {
        None
    } else {
        Some(value.is_truthy())
    }
}

enum LikeSegment {
    Literal(String),
    AnyChar,
    AnyChars,
}

/// Compile a LIKE pattern: `%` and `_` wildcards, backslash escapes.
fn compile_like(pattern: &str) -> Vec<LikeSegment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = pattern.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => literal.push(chars.next().unwrap_or('\\')),
            '%' => {
                if !literal.is_empty() {
                    segments.push(LikeSegment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(LikeSegment::AnyChars);
            }
            '_' => {
                if !literal.is_empty() {
                    segments.push(LikeSegment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(LikeSegment::AnyChar);
            }
            c => literal.push(c),
        }
    }
    if !literal.is_empty() {
        segments.push(LikeSegment::Literal(literal));
    }
    segments
}

/// Case-insensitive LIKE match, following MySQL's default collation.
pub fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.to_lowercase().chars().collect();
    let segments = compile_like(&pattern.to_lowercase());
    match_segments(&text, &segments, 0, 0)
}

fn match_segments(text: &[char], segments: &[LikeSegment], ti: usize, si: usize) -> bool {
    if si >= segments.len() {
        return ti >= text.len();
    }

    match &segments[si] {
        LikeSegment::AnyChars => {
            if match_segments(text, segments, ti, si + 1) {
                return true;
            }
            ti < text.len() && match_segments(text, segments, ti + 1, si)
        }
        LikeSegment::AnyChar => {
            ti < text.len() && match_segments(text, segments, ti + 1, si + 1)
        }
        LikeSegment::Literal(literal) => {
            let chars: Vec<char> = literal.chars().collect();
            if ti + chars.len() > text.len() {
                return false;
            }
            for (i, &c) in chars.iter().enumerate() {
                if text[ti + i] != c {
                    return false;
                }
            }
            match_segments(text, segments, ti + chars.len(), si + 1)
        }
    }
}
