//! Query executor - dispatches parsed queries against a server
//!
//! SELECT queries run through `SelectPipeline`, a literal six-stage
//! execution of the declared clauses: FROM/JOIN, WHERE, GROUP BY, ORDER BY,
//! SELECT/HAVING, LIMIT. INSERT queries run through the insert processor,
//! which borrows the evaluator for value and default expressions. Rows
//! between stages are immutable; each stage produces a fresh sequence.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::ast::{
    ColumnDef, ColumnRef, CreateTableQuery, DataType, DropTableQuery, Expr, InsertQuery, JoinKind,
    Query, SelectColumn, SelectQuery, SortOrder, TableRef,
};
use super::evaluator::{is_aggregate_name, Evaluator};
use crate::catalog::Server;
use crate::error::{CastCode, EngineError, Result};
use crate::types::{
    alias_key, compare_values, qualified_key, Column, DatetimeColumn, IntegerColumn, Row, Table,
    Value, VarcharColumn,
};

/// Result of executing a query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// SELECT result: output column names and positional rows
    Select {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },

    /// INSERT summary
    Insert {
        affected_rows: usize,
        insert_id: i64,
    },

    /// CREATE/DROP acknowledgment
    Definition { message: String },

    /// Transaction statement acknowledgment; the engine keeps no
    /// transactional state
    Acknowledged,
}

impl QueryResult {
    pub fn affected_rows(&self) -> usize {
        match self {
            QueryResult::Insert { affected_rows, .. } => *affected_rows,
            _ => 0,
        }
    }

    pub fn insert_id(&self) -> i64 {
        match self {
            QueryResult::Insert { insert_id, .. } => *insert_id,
            _ => 0,
        }
    }

    /// Columns and rows of a SELECT result; `None` otherwise.
    pub fn select_rows(&self) -> Option<(&[String], &[Vec<Value>])> {
        match self {
            QueryResult::Select { columns, rows } => Some((columns.as_slice(), rows.as_slice())),
            _ => None,
        }
    }

    /// Rows as output-column-name to value maps. Empty for non-SELECT
    /// results.
    pub fn rows_as_maps(&self) -> Vec<HashMap<String, Value>> {
        match self {
            QueryResult::Select { columns, rows } => rows
                .iter()
                .map(|row| {
                    columns
                        .iter()
                        .cloned()
                        .zip(row.iter().cloned())
                        .collect()
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        match self {
            QueryResult::Select { rows, .. } => rows.len(),
            QueryResult::Insert { affected_rows, .. } => *affected_rows,
            _ => 0,
        }
    }
}

/// Materialized output of a select pipeline run.
pub(crate) struct SelectOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

pub struct QueryExecutor<'a> {
    server: &'a Server,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(server: &'a Server) -> Self {
        Self { server }
    }

    pub fn execute(&self, query: &Query) -> Result<QueryResult> {
        let result = match query {
            Query::Select(select) => {
                let output = SelectPipeline::new(self.server, select, None).run()?;
                Ok(QueryResult::Select {
                    columns: output.columns,
                    rows: output.rows,
                })
            }
            Query::Insert(insert) => self.execute_insert(insert),
            Query::CreateTable(create) => self.execute_create_table(create),
            Query::DropTable(drop) => self.execute_drop_table(drop),
            Query::Transaction(_) => Ok(QueryResult::Acknowledged),
        };
        // Derived-table validation surfaces as a plain processor error.
        result.map_err(|error| match error {
            EngineError::SubQuery(message) => EngineError::Processor(message),
            other => other,
        })
    }

    fn execute_create_table(&self, query: &CreateTableQuery) -> Result<QueryResult> {
        let database = self.server.database(query.database.as_deref())?;
        let mut columns = Vec::with_capacity(query.columns.len());
        for def in &query.columns {
            columns.push(build_column(def)?);
        }
        database.create_table(Table::new(query.table.clone(), columns))?;
        debug!(table = %query.table, "created table");
        Ok(QueryResult::Definition {
            message: format!("Table '{}' created", query.table),
        })
    }

    fn execute_drop_table(&self, query: &DropTableQuery) -> Result<QueryResult> {
        let database = self.server.database(query.database.as_deref())?;
        database.drop_table(&query.table)?;
        Ok(QueryResult::Definition {
            message: format!("Table '{}' dropped", query.table),
        })
    }

    /// Materialize and insert each VALUES row: evaluate value expressions
    /// into a raw row, resolve defaults and auto-increment, enforce
    /// nullability, and cast per column. Rows commit one at a time; a
    /// failure leaves earlier rows inserted.
    fn execute_insert(&self, query: &InsertQuery) -> Result<QueryResult> {
        let database = self.server.database(query.database.as_deref())?;
        let handle = database.table(&query.table)?;
        let mut table = handle.write();

        let table_name = table.name().to_string();
        let columns: Vec<Column> = table.columns().to_vec();

        let target_columns: Vec<String> = match &query.columns {
            Some(names) => {
                for name in names {
                    if table.column(name).is_none() {
                        return Err(EngineError::Processor(format!(
                            "Unknown column '{name}' in 'field list'"
                        )));
                    }
                }
                names.clone()
            }
            None => columns.iter().map(|c| c.name().to_string()).collect(),
        };

        let mut evaluator = Evaluator::new(self.server);
        for column in &columns {
            evaluator.push_scope(qualified_key(&table_name, column.name()));
        }

        let mut affected_rows = 0usize;
        let mut insert_id = 0i64;

        for (index, value_row) in query.values.iter().enumerate() {
            let row_number = index + 1;
            if value_row.len() != target_columns.len() {
                return Err(EngineError::Processor(format!(
                    "Column count doesn't match value count at row {row_number}"
                )));
            }

            // Evaluate the value expressions under the target table's
            // scope. DEFAULT markers resolve immediately so later value
            // expressions can read the partially built row.
            let mut raw = Row::new();
            for (name, expr) in target_columns.iter().zip(value_row) {
                let mut value = evaluator
                    .evaluate(expr, &raw, None)
                    .map_err(|e| e.in_clause("field list"))?;
                if matches!(value, Value::Default) {
                    let column = columns
                        .iter()
                        .find(|c| c.name() == name)
                        .expect("target columns are validated");
                    value = resolve_default(column, &raw, &mut table, &evaluator, &mut insert_id)?;
                }
                raw.insert(qualified_key(&table_name, name), value);
            }

            // Build the final row in the table's column order.
            let mut final_row = Row::new();
            for column in &columns {
                let key = qualified_key(&table_name, column.name());
                let mut value = match raw.remove(&key) {
                    Some(value) => value,
                    None => {
                        resolve_default(column, &raw, &mut table, &evaluator, &mut insert_id)?
                    }
                };

                if value.is_null() && column.has_auto_increment() {
                    // NULL asks the counter for a value, as MySQL does.
                    let generated = table.next_auto_increment(column.name());
                    insert_id = generated;
                    value = Value::Integer(generated);
                } else if column.has_auto_increment() {
                    if let Value::Integer(explicit) = value {
                        table.observe_auto_increment(column.name(), explicit);
                    }
                }

                let value = match column.cast(value) {
                    Ok(value) => value,
                    Err(cast_error) => {
                        let message = match cast_error.code {
                            CastCode::OutOfRangeValue | CastCode::IncorrectIntegerValue => {
                                format!("{} at row {row_number}", cast_error.message)
                            }
                            CastCode::BadNull => cast_error.message,
                        };
                        return Err(EngineError::Cast {
                            code: cast_error.code,
                            message,
                        });
                    }
                };
                final_row.insert(column.name().to_string(), value);
            }

            table.insert_row(final_row);
            affected_rows += 1;
        }

        debug!(table = %table_name, affected_rows, insert_id, "insert complete");
        Ok(QueryResult::Insert {
            affected_rows,
            insert_id,
        })
    }
}

/// Resolve the value of a column with no explicit value: auto-increment
/// counter for integer auto-increment columns, then the declared default
/// expression evaluated against the partially built row, then null.
fn resolve_default(
    column: &Column,
    raw: &Row,
    table: &mut Table,
    evaluator: &Evaluator<'_>,
    insert_id: &mut i64,
) -> Result<Value> {
    if column.has_auto_increment() {
        let generated = table.next_auto_increment(column.name());
        *insert_id = generated;
        return Ok(Value::Integer(generated));
    }
    if let Some(expr) = column.default_expr() {
        return evaluator
            .evaluate(expr, raw, None)
            .map_err(|e| e.in_clause("field list"));
    }
    Ok(Value::Null)
}

fn build_column(def: &ColumnDef) -> Result<Column> {
    match &def.data_type {
        DataType::Integer { width, unsigned } => Ok(Column::Integer(IntegerColumn {
            name: def.name.clone(),
            width: *width,
            unsigned: *unsigned,
            // Auto-increment implies NOT NULL.
            nullable: def.nullable && !def.auto_increment,
            auto_increment: def.auto_increment,
            default: def.default.clone(),
        })),
        DataType::Varchar(length) => {
            if def.auto_increment {
                return Err(incorrect_specifier(&def.name));
            }
            Ok(Column::Varchar(VarcharColumn {
                name: def.name.clone(),
                length: *length,
                nullable: def.nullable,
                default: def.default.clone(),
            }))
        }
        DataType::Datetime => {
            if def.auto_increment {
                return Err(incorrect_specifier(&def.name));
            }
            Ok(Column::Datetime(DatetimeColumn {
                name: def.name.clone(),
                nullable: def.nullable,
                default: def.default.clone(),
            }))
        }
    }
}

fn incorrect_specifier(column: &str) -> EngineError {
    EngineError::Processor(format!("Incorrect column specifier for column '{column}'"))
}

/// The six-stage relational executor behind every SELECT.
pub(crate) struct SelectPipeline<'a> {
    server: &'a Server,
    query: &'a SelectQuery,
    evaluator: Evaluator<'a>,
    rows: Vec<Row>,
    /// Populated only when GROUP BY fires or an aggregate in the select
    /// list forces single-group mode; groups keep first-seen order.
    grouped_rows: Option<Vec<Vec<Row>>>,
}

impl<'a> SelectPipeline<'a> {
    pub(crate) fn new(server: &'a Server, query: &'a SelectQuery, context: Option<Row>) -> Self {
        Self {
            server,
            query,
            evaluator: Evaluator::with_context(server, context),
            rows: Vec::new(),
            grouped_rows: None,
        }
    }

    pub(crate) fn run(mut self) -> Result<SelectOutput> {
        self.apply_from()?;
        self.apply_where()?;
        self.apply_group_by()?;
        self.apply_order_by()?;
        let output = self.apply_select_and_having()?;
        let rows = self.apply_limit(output.rows);
        Ok(SelectOutput {
            columns: output.columns,
            rows,
        })
    }

    /// Stage 1: load each FROM source, re-key its rows to
    /// `alias-or-table::column`, extend the scope, and combine according to
    /// the declared join.
    fn apply_from(&mut self) -> Result<()> {
        let query = self.query;
        for (index, source) in query.from.iter().enumerate() {
            let (keys, source_rows) = self.load_source(source)?;
            self.evaluator.extend_scope(keys.iter().cloned());

            if index == 0 {
                self.rows = source_rows;
                continue;
            }

            let left_rows = std::mem::take(&mut self.rows);
            self.rows = match source.join() {
                None | Some(JoinKind::Cross) => {
                    self.join_product(left_rows, source_rows, source.on())?
                }
                Some(JoinKind::Inner) => {
                    let Some(condition) = source.on() else {
                        return Err(EngineError::Processor(
                            "INNER JOIN requires an ON clause".to_string(),
                        ));
                    };
                    self.join_product(left_rows, source_rows, Some(condition))?
                }
                Some(JoinKind::Left) => {
                    self.join_left(left_rows, source_rows, source.on(), &keys)?
                }
            };
        }
        Ok(())
    }

    /// Rows and scope keys of one FROM source.
    fn load_source(&self, source: &TableRef) -> Result<(Vec<String>, Vec<Row>)> {
        match source {
            TableRef::Table {
                database,
                table,
                alias,
                ..
            } => {
                let db = self.server.database(database.as_deref())?;
                let handle = db.table(table)?;
                let guard = handle.read();
                let name = alias.as_deref().unwrap_or(table);

                let keys: Vec<String> = guard
                    .columns()
                    .iter()
                    .map(|column| qualified_key(name, column.name()))
                    .collect();

                let rows = guard
                    .rows()
                    .iter()
                    .map(|(_, row)| {
                        row.iter()
                            .map(|(column, value)| (qualified_key(name, column), value.clone()))
                            .collect()
                    })
                    .collect();
                Ok((keys, rows))
            }
            TableRef::Derived { query, alias, .. } => {
                let Some(alias) = alias else {
                    return Err(EngineError::SubQuery(
                        "Every derived table must have its own alias".to_string(),
                    ));
                };
                let output = SelectPipeline::new(self.server, query, None).run()?;

                let keys: Vec<String> = output
                    .columns
                    .iter()
                    .map(|column| qualified_key(alias, column))
                    .collect();
                let rows = output
                    .rows
                    .into_iter()
                    .map(|values| keys.iter().cloned().zip(values).collect())
                    .collect();
                Ok((keys, rows))
            }
        }
    }

    /// Cartesian product, filtered by `on` when present.
    fn join_product(
        &self,
        left: Vec<Row>,
        right: Vec<Row>,
        on: Option<&Expr>,
    ) -> Result<Vec<Row>> {
        let mut out = Vec::new();
        for left_row in &left {
            for right_row in &right {
                let mut combined = left_row.clone();
                combined.extend(right_row.iter().map(|(k, v)| (k.clone(), v.clone())));
                if let Some(condition) = on {
                    let keep = self
                        .evaluator
                        .evaluate(condition, &combined, None)
                        .map_err(|e| e.in_clause("on clause"))?;
                    if !keep.is_truthy() {
                        continue;
                    }
                }
                out.push(combined);
            }
        }
        Ok(out)
    }

    /// Left outer join: unmatched left rows are emitted once with the
    /// right-side keys filled with null.
    fn join_left(
        &self,
        left: Vec<Row>,
        right: Vec<Row>,
        on: Option<&Expr>,
        right_keys: &[String],
    ) -> Result<Vec<Row>> {
        let mut out = Vec::new();
        for left_row in &left {
            let mut matched = false;
            for right_row in &right {
                let mut combined = left_row.clone();
                combined.extend(right_row.iter().map(|(k, v)| (k.clone(), v.clone())));
                let keep = match on {
                    Some(condition) => self
                        .evaluator
                        .evaluate(condition, &combined, None)
                        .map_err(|e| e.in_clause("on clause"))?
                        .is_truthy(),
                    None => true,
                };
                if keep {
                    matched = true;
                    out.push(combined);
                }
            }
            if !matched {
                let mut combined = left_row.clone();
                for key in right_keys {
                    combined.insert(key.clone(), Value::Null);
                }
                out.push(combined);
            }
        }
        Ok(out)
    }

    /// Stage 2: filter by WHERE.
    fn apply_where(&mut self) -> Result<()> {
        let Some(condition) = &self.query.where_clause else {
            return Ok(());
        };
        let mut kept = Vec::with_capacity(self.rows.len());
        for row in std::mem::take(&mut self.rows) {
            let value = self
                .evaluator
                .evaluate(condition, &row, None)
                .map_err(|e| e.in_clause("where clause"))?;
            if value.is_truthy() {
                kept.push(row);
            }
        }
        self.rows = kept;
        Ok(())
    }

    /// Stage 3: bucket rows by the GROUP BY key, or synthesize a single
    /// group when the select list carries an aggregate without GROUP BY.
    fn apply_group_by(&mut self) -> Result<()> {
        let query = self.query;

        if query.group_by.is_empty() {
            if !select_contains_aggregate(&query.columns) {
                return Ok(());
            }
            for (position, column) in query.columns.iter().enumerate() {
                if let Some(offender) = find_nonaggregated_column(&column.expr) {
                    return Err(EngineError::Processor(format!(
                        "In aggregated query without GROUP BY, expression #{} of SELECT list \
                         contains nonaggregated column '{}'",
                        position + 1,
                        offender
                    )));
                }
            }
            self.grouped_rows = Some(vec![std::mem::take(&mut self.rows)]);
            return Ok(());
        }

        let mut order: Vec<String> = Vec::new();
        let mut buckets: HashMap<String, Vec<Row>> = HashMap::new();
        for row in std::mem::take(&mut self.rows) {
            let mut parts = Vec::with_capacity(query.group_by.len());
            for column in &query.group_by {
                let value = self
                    .evaluator
                    .evaluate(&Expr::Column(column.clone()), &row, None)
                    .map_err(|e| e.in_clause("group statement"))?;
                parts.push(value.sql_string());
            }
            let key = parts.join("::");
            if !buckets.contains_key(&key) {
                order.push(key.clone());
            }
            buckets.entry(key).or_default().push(row);
        }

        self.grouped_rows = Some(
            order
                .into_iter()
                .map(|key| buckets.remove(&key).unwrap_or_default())
                .collect(),
        );
        Ok(())
    }

    /// Stage 4: sort the (pre-projection) row stream. Grouped queries keep
    /// their group-first-seen order.
    fn apply_order_by(&mut self) -> Result<()> {
        let query = self.query;
        if query.order_by.is_empty() || self.rows.is_empty() {
            return Ok(());
        }

        let mut keyed: Vec<(Vec<Value>, Row)> = Vec::with_capacity(self.rows.len());
        for row in std::mem::take(&mut self.rows) {
            let mut key = Vec::with_capacity(query.order_by.len());
            for term in &query.order_by {
                key.push(self.order_key(&term.column, &row)?);
            }
            keyed.push((key, row));
        }

        keyed.sort_by(|(a, _), (b, _)| {
            for (term, (x, y)) in query.order_by.iter().zip(a.iter().zip(b.iter())) {
                let ordering = order_compare(x, y);
                let ordering = match term.order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                };
                if ordering != std::cmp::Ordering::Equal {
                    return ordering;
                }
            }
            std::cmp::Ordering::Equal
        });

        self.rows = keyed.into_iter().map(|(_, row)| row).collect();
        Ok(())
    }

    /// Sort key for one ORDER BY term. A bare name that fails to resolve is
    /// retried as a SELECT alias so `SELECT c AS a ... ORDER BY a` works.
    fn order_key(&self, column: &ColumnRef, row: &Row) -> Result<Value> {
        let query = self.query;
        match self
            .evaluator
            .evaluate(&Expr::Column(column.clone()), row, None)
        {
            Ok(value) => Ok(value),
            Err(EngineError::Evaluator(message)) => {
                if column.table.is_none() {
                    let aliased = query
                        .columns
                        .iter()
                        .find(|c| c.alias.as_deref() == Some(column.column.as_str()));
                    if let Some(select_column) = aliased {
                        return self
                            .evaluator
                            .evaluate(&select_column.expr, row, None)
                            .map_err(|e| e.in_clause("order clause"));
                    }
                }
                Err(EngineError::Evaluator(message).in_clause("order clause"))
            }
            Err(other) => Err(other.in_clause("order clause")),
        }
    }

    /// Stage 5: project the select list, materialize alias-scope entries
    /// for HAVING, filter by HAVING, and de-duplicate under DISTINCT.
    fn apply_select_and_having(&mut self) -> Result<SelectOutput> {
        let query = self.query;

        // SELECT aliases become visible to HAVING through the scope list.
        for column in &query.columns {
            if let Some(alias) = &column.alias {
                self.evaluator.push_scope(alias_key(alias));
            }
        }

        // Output names are fixed before iterating rows; stars expand from
        // the scope list.
        let mut output_columns: Vec<String> = Vec::new();
        for column in &query.columns {
            match &column.expr {
                Expr::Star { table } => {
                    let entries = self
                        .evaluator
                        .star_entries(table.as_deref())
                        .map_err(|e| e.in_clause("field list"))?;
                    output_columns.extend(entries.into_iter().map(|(name, _)| name));
                }
                _ => output_columns.push(output_name(column)),
            }
        }

        let inputs: Vec<(Row, Option<Vec<Row>>)> = match self.grouped_rows.take() {
            Some(groups) => groups
                .into_iter()
                .map(|group| (group.first().cloned().unwrap_or_default(), Some(group)))
                .collect(),
            None => {
                let mut rows = std::mem::take(&mut self.rows);
                // A select list made of functions, expressions, literals,
                // CASE, or sub-queries produces one row even without input,
                // so `SELECT database()` answers.
                if rows.is_empty() && has_rowless_column(&query.columns) {
                    rows.push(Row::new());
                }
                rows.into_iter().map(|row| (row, None)).collect()
            }
        };

        let mut out_rows: Vec<Vec<Value>> = Vec::new();
        for (raw_row, group) in inputs {
            let group_rows = group.as_deref();
            let mut values = Vec::with_capacity(output_columns.len());
            let mut with_aliases = raw_row.clone();

            for column in &query.columns {
                match &column.expr {
                    Expr::Star { table } => {
                        let expanded = self
                            .evaluator
                            .evaluate_star(table.as_deref(), &raw_row)
                            .map_err(|e| e.in_clause("field list"))?;
                        values.extend(expanded.into_iter().map(|(_, value)| value));
                    }
                    expr => {
                        let value = self
                            .evaluator
                            .evaluate(expr, &raw_row, group_rows)
                            .map_err(|e| e.in_clause("field list"))?;
                        if let Some(alias) = &column.alias {
                            with_aliases.insert(alias_key(alias), value.clone());
                        }
                        values.push(value);
                    }
                }
            }

            if let Some(condition) = &query.having {
                let keep = self
                    .evaluator
                    .evaluate(condition, &with_aliases, group_rows)
                    .map_err(|e| e.in_clause("having clause"))?;
                if !keep.is_truthy() {
                    continue;
                }
            }

            out_rows.push(values);
        }

        if query.distinct {
            let mut seen = HashSet::new();
            out_rows.retain(|values| {
                let key = values
                    .iter()
                    .map(|value| value.sql_string())
                    .collect::<Vec<_>>()
                    .join("::");
                seen.insert(key)
            });
        }

        Ok(SelectOutput {
            columns: output_columns,
            rows: out_rows,
        })
    }

    /// Stage 6: drop `offset` rows, then truncate to `limit` unless 0.
    fn apply_limit(&self, rows: Vec<Vec<Value>>) -> Vec<Vec<Value>> {
        let rows = rows.into_iter().skip(self.query.offset);
        if self.query.limit > 0 {
            rows.take(self.query.limit).collect()
        } else {
            rows.collect()
        }
    }
}

fn order_compare(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    // Nulls sort first under ASC.
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => compare_values(a, b).unwrap_or(Ordering::Equal),
    }
}

/// User-visible name of a select column: the alias when present, the bare
/// column name for references, the function name for zero-argument calls
/// (`database()` names its column `database`), else the rendered text.
fn output_name(column: &SelectColumn) -> String {
    if let Some(alias) = &column.alias {
        return alias.clone();
    }
    match &column.expr {
        Expr::Column(reference) => reference.column.clone(),
        Expr::Function { name, args, .. } if args.is_empty() => name.clone(),
        expr => expr.to_string(),
    }
}

/// True when any select column can produce a value without an input row.
fn has_rowless_column(columns: &[SelectColumn]) -> bool {
    columns
        .iter()
        .any(|column| !matches!(column.expr, Expr::Column(_) | Expr::Star { .. }))
}

fn select_contains_aggregate(columns: &[SelectColumn]) -> bool {
    columns
        .iter()
        .any(|column| expr_contains_aggregate(&column.expr))
}

fn expr_contains_aggregate(expr: &Expr) -> bool {
    match expr {
        Expr::Function { name, args, .. } => {
            is_aggregate_name(name) || args.iter().any(expr_contains_aggregate)
        }
        Expr::Binary { left, right, .. } => {
            expr_contains_aggregate(left) || expr_contains_aggregate(right)
        }
        Expr::Case {
            branches,
            else_branch,
        } => {
            branches
                .iter()
                .any(|(c, v)| expr_contains_aggregate(c) || expr_contains_aggregate(v))
                || else_branch
                    .as_ref()
                    .is_some_and(|e| expr_contains_aggregate(e))
        }
        Expr::Array(items) => items.iter().any(expr_contains_aggregate),
        Expr::Literal(_) | Expr::Column(_) | Expr::Star { .. } | Expr::Subquery(_) => false,
    }
}

/// First column reference sitting outside any aggregate call, if any.
fn find_nonaggregated_column(expr: &Expr) -> Option<&ColumnRef> {
    match expr {
        Expr::Column(reference) => Some(reference),
        Expr::Function { name, args, .. } => {
            if is_aggregate_name(name) {
                None
            } else {
                args.iter().find_map(find_nonaggregated_column)
            }
        }
        Expr::Binary { left, right, .. } => {
            find_nonaggregated_column(left).or_else(|| find_nonaggregated_column(right))
        }
        Expr::Case {
            branches,
            else_branch,
        } => branches
            .iter()
            .find_map(|(c, v)| {
                find_nonaggregated_column(c).or_else(|| find_nonaggregated_column(v))
            })
            .or_else(|| {
                else_branch
                    .as_ref()
                    .and_then(|e| find_nonaggregated_column(e))
            }),
        Expr::Array(items) => items.iter().find_map(find_nonaggregated_column),
        Expr::Literal(_) | Expr::Star { .. } | Expr::Subquery(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::execute_sql;

    fn server() -> Server {
        let server = Server::new();
        server.create_database("mydb").unwrap();
        server.use_database("mydb").unwrap();
        server
    }

    fn exec(server: &Server, sql: &str) -> QueryResult {
        execute_sql(server, sql, &[]).unwrap_or_else(|e| panic!("{sql}: {e}"))
    }

    fn exec_err(server: &Server, sql: &str) -> String {
        execute_sql(server, sql, &[])
            .expect_err(&format!("expected failure: {sql}"))
            .to_string()
    }

    fn maps(result: &QueryResult) -> Vec<HashMap<String, Value>> {
        result.rows_as_maps()
    }

    fn seed_users_posts(server: &Server) {
        exec(server, "CREATE TABLE users (id INT, name VARCHAR(32))");
        exec(
            server,
            "INSERT INTO users (id, name) VALUES (1, 'a'), (2, 'b')",
        );
        exec(
            server,
            "CREATE TABLE posts (user_id INT, body VARCHAR(32))",
        );
        exec(
            server,
            "INSERT INTO posts (user_id, body) VALUES (1, 'x'), (2, 'y')",
        );
    }

    #[test]
    fn test_select_database_function() {
        let server = server();
        let result = exec(&server, "SELECT database()");
        let rows = maps(&result);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["database"], Value::Text("mydb".into()));
    }

    #[test]
    fn test_round_trip_insert_select() {
        let server = server();
        exec(&server, "CREATE TABLE t (id INT, name VARCHAR(10))");
        exec(&server, "INSERT INTO t (id, name) VALUES (1, 'x')");
        let result = exec(&server, "SELECT id, name FROM t WHERE id = 1");
        let rows = maps(&result);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], Value::Integer(1));
        assert_eq!(rows[0]["name"], Value::Text("x".into()));
    }

    #[test]
    fn test_star_alias_in_order_limit_offset() {
        let server = server();
        seed_users_posts(&server);
        let result = exec(
            &server,
            "SELECT u.* FROM users u WHERE u.id IN (1, 2) ORDER BY id DESC LIMIT 1 OFFSET 0",
        );
        let rows = maps(&result);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], Value::Integer(2));
        assert_eq!(rows[0]["name"], Value::Text("b".into()));
    }

    #[test]
    fn test_group_by_join_keeps_first_seen_order() {
        let server = server();
        exec(&server, "CREATE TABLE users (id INT)");
        exec(&server, "INSERT INTO users (id) VALUES (1), (1), (2)");
        exec(
            &server,
            "CREATE TABLE posts (user_id INT, body VARCHAR(10))",
        );
        exec(
            &server,
            "INSERT INTO posts (user_id, body) VALUES (1, 'x'), (2, 'y')",
        );

        let result = exec(
            &server,
            "SELECT COUNT(*) c FROM users u JOIN posts p ON p.user_id = u.id GROUP BY u.id",
        );
        let (columns, rows) = result.select_rows().unwrap();
        assert_eq!(columns, &["c".to_string()]);
        assert_eq!(rows, &[vec![Value::Integer(2)], vec![Value::Integer(1)]]);
    }

    #[test]
    fn test_auto_increment_and_row_indexed_cast_error() {
        let server = server();
        exec(
            &server,
            "CREATE TABLE t (id INT UNSIGNED AUTO_INCREMENT, name VARCHAR(3) NOT NULL)",
        );
        let err = exec_err(
            &server,
            "INSERT INTO t (name) VALUES ('ok'), ('toolong')",
        );
        assert_eq!(err, "Data too long for column 'name' at row 2");

        // The first row committed before the failure.
        let result = exec(&server, "SELECT id, name FROM t");
        let rows = maps(&result);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], Value::Integer(1));
        assert_eq!(rows[0]["name"], Value::Text("ok".into()));
    }

    #[test]
    fn test_having_on_empty_table_injects_no_row() {
        let server = server();
        exec(&server, "CREATE TABLE t (id INT)");
        let result = exec(&server, "SELECT id FROM t HAVING id > 0");
        assert_eq!(result.row_count(), 0);
    }

    #[test]
    fn test_left_join_fills_missing_side_with_null() {
        let server = server();
        exec(&server, "CREATE TABLE users (id INT)");
        exec(&server, "INSERT INTO users (id) VALUES (3)");
        exec(
            &server,
            "CREATE TABLE posts (user_id INT, body VARCHAR(10))",
        );

        let result = exec(
            &server,
            "SELECT * FROM users u LEFT JOIN posts p ON p.user_id = u.id",
        );
        let rows = maps(&result);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], Value::Integer(3));
        assert_eq!(rows[0]["user_id"], Value::Null);
        assert_eq!(rows[0]["body"], Value::Null);
    }

    #[test]
    fn test_cartesian_product_size() {
        let server = server();
        exec(&server, "CREATE TABLE a (x INT)");
        exec(&server, "INSERT INTO a (x) VALUES (1), (2), (3)");
        exec(&server, "CREATE TABLE b (y INT)");
        exec(&server, "INSERT INTO b (y) VALUES (10), (20)");

        let result = exec(&server, "SELECT * FROM a, b");
        assert_eq!(result.row_count(), 6);

        let result = exec(&server, "SELECT * FROM a CROSS JOIN b");
        assert_eq!(result.row_count(), 6);
    }

    #[test]
    fn test_order_by_alias_idempotence() {
        let server = server();
        exec(&server, "CREATE TABLE t (c INT)");
        exec(&server, "INSERT INTO t (c) VALUES (3), (1), (2)");

        let aliased = exec(&server, "SELECT c AS a FROM t ORDER BY a");
        let direct = exec(&server, "SELECT c FROM t ORDER BY c");
        let aliased_values: Vec<&Vec<Value>> = aliased.select_rows().unwrap().1.iter().collect();
        let direct_values: Vec<&Vec<Value>> = direct.select_rows().unwrap().1.iter().collect();
        assert_eq!(aliased_values, direct_values);
    }

    #[test]
    fn test_insert_summary_and_table_growth() {
        let server = server();
        exec(
            &server,
            "CREATE TABLE t (id INT AUTO_INCREMENT, name VARCHAR(10))",
        );
        let result = exec(
            &server,
            "INSERT INTO t (name) VALUES ('a'), ('b'), ('c')",
        );
        assert_eq!(result.affected_rows(), 3);
        assert_eq!(result.insert_id(), 3);

        assert_eq!(exec(&server, "SELECT id FROM t").row_count(), 3);

        // Explicit values leave insert_id untouched and push the counter.
        let result = exec(&server, "INSERT INTO t (id, name) VALUES (10, 'd')");
        assert_eq!(result.insert_id(), 0);
        let result = exec(&server, "INSERT INTO t (name) VALUES ('e')");
        assert_eq!(result.insert_id(), 11);
    }

    #[test]
    fn test_insert_default_marker_and_column_defaults() {
        let server = server();
        exec(
            &server,
            "CREATE TABLE t (id INT AUTO_INCREMENT, status VARCHAR(10) DEFAULT 'new', note VARCHAR(10))",
        );
        exec(
            &server,
            "INSERT INTO t (id, status, note) VALUES (DEFAULT, DEFAULT, 'hi')",
        );
        let rows = maps(&exec(&server, "SELECT * FROM t"));
        assert_eq!(rows[0]["id"], Value::Integer(1));
        assert_eq!(rows[0]["status"], Value::Text("new".into()));
        assert_eq!(rows[0]["note"], Value::Text("hi".into()));

        // Omitted columns go through the same default resolution.
        exec(&server, "INSERT INTO t (note) VALUES ('yo')");
        let rows = maps(&exec(&server, "SELECT * FROM t WHERE id = 2"));
        assert_eq!(rows[0]["status"], Value::Text("new".into()));
    }

    #[test]
    fn test_insert_column_count_mismatch() {
        let server = server();
        exec(&server, "CREATE TABLE t (id INT, name VARCHAR(10))");
        let err = exec_err(&server, "INSERT INTO t (id, name) VALUES (1)");
        assert_eq!(err, "Column count doesn't match value count at row 1");
        let err = exec_err(&server, "INSERT INTO t (id) VALUES (1), (2, 3)");
        assert_eq!(err, "Column count doesn't match value count at row 2");
    }

    #[test]
    fn test_insert_non_null_violation() {
        let server = server();
        exec(&server, "CREATE TABLE t (id INT, name VARCHAR(10) NOT NULL)");
        let err = exec_err(&server, "INSERT INTO t (id) VALUES (1)");
        assert_eq!(err, "Field 'name' doesn't have a default value");
        let err = exec_err(&server, "INSERT INTO t (id, name) VALUES (1, NULL)");
        assert_eq!(err, "Field 'name' doesn't have a default value");
    }

    #[test]
    fn test_insert_incorrect_integer_with_row_index() {
        let server = server();
        exec(&server, "CREATE TABLE t (id INT)");
        let err = exec_err(&server, "INSERT INTO t (id) VALUES ('abc')");
        assert_eq!(err, "Incorrect integer value: 'abc' for column 'id' at row 1");
    }

    #[test]
    fn test_clause_tagged_errors() {
        let server = server();
        seed_users_posts(&server);

        assert_eq!(
            exec_err(&server, "SELECT missing FROM users"),
            "Unknown column 'missing' in 'field list'"
        );
        assert_eq!(
            exec_err(&server, "SELECT id FROM users WHERE missing = 1"),
            "Unknown column 'missing' in 'where clause'"
        );
        assert_eq!(
            exec_err(&server, "SELECT id FROM users ORDER BY missing"),
            "Unknown column 'missing' in 'order clause'"
        );
        assert_eq!(
            exec_err(&server, "SELECT id FROM users GROUP BY missing"),
            "Unknown column 'missing' in 'group statement'"
        );
        assert_eq!(
            exec_err(&server, "SELECT id FROM users HAVING missing > 1"),
            "Unknown column 'missing' in 'having clause'"
        );
        assert_eq!(
            exec_err(
                &server,
                "SELECT u.id FROM users u JOIN posts p ON missing = u.id"
            ),
            "Unknown column 'missing' in 'on clause'"
        );
    }

    #[test]
    fn test_ambiguous_column_across_join() {
        let server = server();
        exec(&server, "CREATE TABLE a (id INT)");
        exec(&server, "CREATE TABLE b (id INT)");
        exec(&server, "INSERT INTO a (id) VALUES (1)");
        exec(&server, "INSERT INTO b (id) VALUES (1)");
        let err = exec_err(&server, "SELECT id FROM a, b");
        assert_eq!(err, "Column 'id' in field list is ambiguous");
    }

    #[test]
    fn test_derived_table_requires_alias() {
        let server = server();
        exec(&server, "CREATE TABLE t (id INT)");
        let err = exec_err(&server, "SELECT * FROM (SELECT id FROM t)");
        assert_eq!(err, "Every derived table must have its own alias");

        exec(&server, "INSERT INTO t (id) VALUES (5)");
        let rows = maps(&exec(&server, "SELECT d.id FROM (SELECT id FROM t) d"));
        assert_eq!(rows[0]["id"], Value::Integer(5));
    }

    #[test]
    fn test_scalar_subquery_and_cardinality() {
        let server = server();
        exec(&server, "CREATE TABLE t (id INT)");
        exec(&server, "INSERT INTO t (id) VALUES (1), (2)");

        let rows = maps(&exec(&server, "SELECT (SELECT max(id) FROM t) m"));
        assert_eq!(rows[0]["m"], Value::Integer(2));

        // An empty sub-query result is null.
        let rows = maps(&exec(
            &server,
            "SELECT (SELECT id FROM t WHERE id > 100) m",
        ));
        assert_eq!(rows[0]["m"], Value::Null);

        let err = exec_err(&server, "SELECT (SELECT id FROM t) m");
        assert_eq!(err, "Subquery returns more than 1 row");
    }

    #[test]
    fn test_correlated_subquery_per_outer_row() {
        let server = server();
        exec(&server, "CREATE TABLE users (id INT)");
        exec(&server, "INSERT INTO users (id) VALUES (1), (2)");
        exec(&server, "CREATE TABLE posts (user_id INT)");
        exec(
            &server,
            "INSERT INTO posts (user_id) VALUES (1), (1), (2)",
        );

        let result = exec(
            &server,
            "SELECT u.id, (SELECT count(*) FROM posts p WHERE p.user_id = u.id) c FROM users u",
        );
        let rows = maps(&result);
        assert_eq!(rows[0]["c"], Value::Integer(2));
        assert_eq!(rows[1]["c"], Value::Integer(1));
    }

    #[test]
    fn test_aggregate_without_group_by_single_group() {
        let server = server();
        exec(&server, "CREATE TABLE t (id INT)");

        // Empty table still produces one row in single-group mode.
        let rows = maps(&exec(&server, "SELECT count(*) c, sum(id) s FROM t"));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["c"], Value::Integer(0));
        assert_eq!(rows[0]["s"], Value::Null);

        exec(&server, "INSERT INTO t (id) VALUES (1), (2), (3)");
        let rows = maps(&exec(&server, "SELECT count(*) c, sum(id) s FROM t"));
        assert_eq!(rows[0]["c"], Value::Integer(3));
        assert_eq!(rows[0]["s"], Value::Integer(6));
    }

    #[test]
    fn test_nonaggregated_column_error_message() {
        let server = server();
        exec(&server, "CREATE TABLE t (id INT)");
        let err = exec_err(&server, "SELECT count(*), id FROM t");
        assert_eq!(
            err,
            "In aggregated query without GROUP BY, expression #2 of SELECT list contains \
             nonaggregated column 'id'"
        );
    }

    #[test]
    fn test_having_sees_select_aliases() {
        let server = server();
        exec(&server, "CREATE TABLE t (uid INT)");
        exec(
            &server,
            "INSERT INTO t (uid) VALUES (1), (1), (2), (2), (2)",
        );
        let result = exec(
            &server,
            "SELECT uid, count(*) c FROM t GROUP BY uid HAVING c > 2",
        );
        let rows = maps(&result);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["uid"], Value::Integer(2));
        assert_eq!(rows[0]["c"], Value::Integer(3));
    }

    #[test]
    fn test_distinct_deduplicates_output() {
        let server = server();
        exec(&server, "CREATE TABLE t (x INT, y VARCHAR(5))");
        exec(
            &server,
            "INSERT INTO t (x, y) VALUES (1, 'a'), (1, 'a'), (1, 'b')",
        );
        let result = exec(&server, "SELECT DISTINCT x, y FROM t");
        assert_eq!(result.row_count(), 2);
    }

    #[test]
    fn test_where_with_like_and_case() {
        let server = server();
        exec(&server, "CREATE TABLE t (name VARCHAR(20))");
        exec(
            &server,
            "INSERT INTO t (name) VALUES ('alpha'), ('beta'), ('gamma')",
        );

        let result = exec(&server, "SELECT name FROM t WHERE name LIKE '%a'");
        let rows = maps(&result);
        assert_eq!(rows.len(), 3);

        let result = exec(&server, "SELECT name FROM t WHERE name LIKE 'b%'");
        let rows = maps(&result);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], Value::Text("beta".into()));

        let result = exec(
            &server,
            "SELECT name, CASE WHEN name = 'beta' THEN 1 ELSE 0 END flag FROM t WHERE name LIKE '_e%'",
        );
        let rows = maps(&result);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["flag"], Value::Integer(1));
    }

    #[test]
    fn test_limit_comma_form_matches_offset_form_end_to_end() {
        let server = server();
        exec(&server, "CREATE TABLE t (id INT)");
        exec(
            &server,
            "INSERT INTO t (id) VALUES (1), (2), (3), (4), (5)",
        );
        let comma = exec(&server, "SELECT id FROM t ORDER BY id LIMIT 1, 2");
        let offset = exec(&server, "SELECT id FROM t ORDER BY id LIMIT 2 OFFSET 1");
        assert_eq!(comma, offset);
        let (_, rows) = comma.select_rows().unwrap();
        assert_eq!(rows, &[vec![Value::Integer(2)], vec![Value::Integer(3)]]);
    }

    #[test]
    fn test_order_by_nulls_sort_first_ascending() {
        let server = server();
        exec(&server, "CREATE TABLE t (id INT)");
        exec(&server, "INSERT INTO t (id) VALUES (2), (NULL), (1)");
        let result = exec(&server, "SELECT id FROM t ORDER BY id");
        let (_, rows) = result.select_rows().unwrap();
        let ordered: Vec<Value> = rows.iter().map(|r| r[0].clone()).collect();
        assert_eq!(
            ordered,
            vec![Value::Null, Value::Integer(1), Value::Integer(2)]
        );

        let result = exec(&server, "SELECT id FROM t ORDER BY id DESC");
        let (_, rows) = result.select_rows().unwrap();
        let ordered: Vec<Value> = rows.iter().map(|r| r[0].clone()).collect();
        assert_eq!(
            ordered,
            vec![Value::Integer(2), Value::Integer(1), Value::Null]
        );
    }

    #[test]
    fn test_transaction_statements_are_no_ops() {
        let server = server();
        exec(&server, "CREATE TABLE t (id INT)");
        assert_eq!(exec(&server, "START TRANSACTION"), QueryResult::Acknowledged);
        exec(&server, "INSERT INTO t (id) VALUES (1)");
        assert_eq!(exec(&server, "ROLLBACK"), QueryResult::Acknowledged);
        // No transactional state: the insert survives the rollback.
        assert_eq!(exec(&server, "SELECT id FROM t").row_count(), 1);
        assert_eq!(exec(&server, "COMMIT"), QueryResult::Acknowledged);
    }

    #[test]
    fn test_create_and_drop_table() {
        let server = server();
        exec(&server, "CREATE TABLE t (id INT)");
        let err = exec_err(&server, "CREATE TABLE t (id INT)");
        assert_eq!(err, "Table 't' already exists");

        exec(&server, "DROP TABLE t");
        let err = exec_err(&server, "SELECT * FROM t");
        assert_eq!(err, "Table 'mydb.t' doesn't exist");

        let err = exec_err(&server, "CREATE TABLE v (name VARCHAR(5) AUTO_INCREMENT)");
        assert_eq!(err, "Incorrect column specifier for column 'name'");
    }

    #[test]
    fn test_database_qualified_access() {
        let server = server();
        server.create_database("other").unwrap();
        exec(&server, "CREATE TABLE other.t (id INT)");
        exec(&server, "INSERT INTO other.t (id) VALUES (9)");
        let rows = maps(&exec(&server, "SELECT id FROM other.t"));
        assert_eq!(rows[0]["id"], Value::Integer(9));
    }

    #[test]
    fn test_placeholders_end_to_end() {
        let server = server();
        exec(&server, "CREATE TABLE t (id INT, name VARCHAR(10))");
        execute_sql(
            &server,
            "INSERT INTO t (id, name) VALUES (?, ?)",
            &[Value::Integer(1), Value::Text("x".into())],
        )
        .unwrap();
        let result = execute_sql(
            &server,
            "SELECT name FROM t WHERE id = ?",
            &[Value::Integer(1)],
        )
        .unwrap();
        assert_eq!(maps(&result)[0]["name"], Value::Text("x".into()));
    }

    #[test]
    fn test_derived_table_with_joins_and_where() {
        let server = server();
        seed_users_posts(&server);
        let result = exec(
            &server,
            "SELECT d.name FROM (SELECT id, name FROM users WHERE id > 1) d \
             JOIN posts p ON p.user_id = d.id",
        );
        let rows = maps(&result);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], Value::Text("b".into()));
    }

    #[test]
    fn test_select_literal_expression_columns() {
        let server = server();
        let rows = maps(&exec(&server, "SELECT 1 + 2 three, 'x' tag"));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["three"], Value::Integer(3));
        assert_eq!(rows[0]["tag"], Value::Text("x".into()));
    }
}
