//! Collected query results.

use alloc::string::String;
use alloc::vec::Vec;
use strata_core::{DataType, Value};
use strata_query::planner::Schema;

/// Name and type of one output column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultColumn {
    pub name: String,
    pub data_type: DataType,
}

/// A fully materialized query result.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryResult {
    columns: Vec<ResultColumn>,
    rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn new(columns: Vec<ResultColumn>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Builds a result from an execution's output schema.
    pub fn from_schema(schema: &Schema, rows: Vec<Vec<Value>>) -> Self {
        let columns = schema
            .fields()
            .iter()
            .map(|f| ResultColumn {
                name: f.name.clone(),
                data_type: f.data_type,
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[ResultColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value at `row`, `column`, if both are in range.
    pub fn value(&self, row: usize, column: usize) -> Option<&Value> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    pub fn into_rows(self) -> Vec<Vec<Value>> {
        self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use strata_query::planner::Field;

    #[test]
    fn test_from_schema() {
        let schema = Schema::new(vec![
            Field::new(Some("t"), "id", DataType::Int64),
            Field::new(None, "total", DataType::Float64),
        ]);
        let result = QueryResult::from_schema(&schema, vec![vec![Value::Int64(1), Value::Float64(2.5)]]);
        assert_eq!(result.column_names(), vec!["id", "total"]);
        assert_eq!(result.columns()[1].data_type, DataType::Float64);
        assert_eq!(result.column_index("TOTAL"), Some(1));
        assert_eq!(result.value(0, 1), Some(&Value::Float64(2.5)));
        assert_eq!(result.value(1, 0), None);
        assert_eq!(result.row_count(), 1);
    }
}
