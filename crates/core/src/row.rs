//! Row structure for Strata.
//!
//! A `Row` is the row-store representation of one table tuple. Query
//! execution works on columnar blocks instead; rows are the unit of
//! mutation and of the scan cache's source data.

use crate::value::Value;
use alloc::vec::Vec;

/// A row in a database table.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Row {
    /// Values stored in this row, indexed by column position.
    values: Vec<Value>,
}

impl Row {
    /// Creates a new row from its values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Returns a reference to the values.
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns a mutable reference to the values.
    #[inline]
    pub fn values_mut(&mut self) -> &mut Vec<Value> {
        &mut self.values
    }

    /// Consumes the row and returns its values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Gets a value by column index.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Returns the number of values in this row.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if this row has no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_row_accessors() {
        let row = Row::new(vec![Value::Int32(1), Value::Text("a".into())]);
        assert_eq!(row.len(), 2);
        assert_eq!(row.get(1), Some(&Value::Text("a".into())));
        assert_eq!(row.get(2), None);
        assert!(!row.is_empty());
    }

    #[test]
    fn test_row_into_values() {
        let row: Row = vec![Value::Int64(5)].into();
        assert_eq!(row.into_values(), vec![Value::Int64(5)]);
    }
}
