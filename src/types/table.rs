//! In-memory table storage

use super::{Column, Row};
use std::collections::HashMap;

/// An in-memory table: an insertion-ordered row store plus per-column
/// auto-increment counters. Rows are bare-keyed (column name to value);
/// qualification happens when the select pipeline scans the table.
#[derive(Debug)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    rows: Vec<(u64, Row)>,
    next_row_id: u64,
    auto_increment: HashMap<String, i64>,
}

impl Table {
    pub fn new(name: String, columns: Vec<Column>) -> Self {
        let auto_increment = columns
            .iter()
            .filter(|c| c.has_auto_increment())
            .map(|c| (c.name().to_string(), 1))
            .collect();
        Self {
            name,
            columns,
            rows: Vec::new(),
            next_row_id: 1,
            auto_increment,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Rows in insertion order, keyed by a stable row id.
    pub fn rows(&self) -> &[(u64, Row)] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn insert_row(&mut self, row: Row) {
        self.rows.push((self.next_row_id, row));
        self.next_row_id += 1;
    }

    /// Return the next value for an auto-increment column and advance the
    /// counter.
    pub fn next_auto_increment(&mut self, column: &str) -> i64 {
        let counter = self.auto_increment.entry(column.to_string()).or_insert(1);
        let value = *counter;
        *counter = value + 1;
        value
    }

    /// Record an explicitly inserted value so later generated values
    /// continue past it, as MySQL does.
    pub fn observe_auto_increment(&mut self, column: &str, value: i64) {
        let counter = self.auto_increment.entry(column.to_string()).or_insert(1);
        if value >= *counter {
            *counter = value + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IntegerColumn, IntegerWidth, Value, VarcharColumn};

    fn users_table() -> Table {
        Table::new(
            "users".into(),
            vec![
                Column::Integer(IntegerColumn {
                    name: "id".into(),
                    width: IntegerWidth::Int,
                    unsigned: true,
                    nullable: false,
                    auto_increment: true,
                    default: None,
                }),
                Column::Varchar(VarcharColumn {
                    name: "name".into(),
                    length: 32,
                    nullable: true,
                    default: None,
                }),
            ],
        )
    }

    #[test]
    fn test_rows_keep_insertion_order() {
        let mut table = users_table();
        for i in 0..3 {
            let mut row = Row::new();
            row.insert("id".into(), Value::Integer(i));
            table.insert_row(row);
        }
        let ids: Vec<u64> = table.rows().iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_auto_increment_advances() {
        let mut table = users_table();
        assert_eq!(table.next_auto_increment("id"), 1);
        assert_eq!(table.next_auto_increment("id"), 2);
    }

    #[test]
    fn test_observed_values_push_counter_forward() {
        let mut table = users_table();
        table.observe_auto_increment("id", 5);
        assert_eq!(table.next_auto_increment("id"), 6);

        // Values below the counter leave it alone.
        table.observe_auto_increment("id", 2);
        assert_eq!(table.next_auto_increment("id"), 7);
    }

    #[test]
    fn test_column_lookup() {
        let table = users_table();
        assert!(table.column("name").is_some());
        assert!(table.column("missing").is_none());
        assert!(table.column("id").unwrap().has_auto_increment());
    }
}
