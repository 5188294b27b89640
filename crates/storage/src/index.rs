//! Single-column secondary indexes.
//!
//! An index maps a column value to the positions of the rows holding it. NULL
//! keys are never indexed, so a NULL never matches an index lookup and never
//! conflicts with a UNIQUE constraint.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use strata_core::{DataType, Row, Value};

/// An ordered index over one column of a table.
#[derive(Clone, Debug)]
pub struct ColumnIndex {
    /// Indexed column position.
    column: usize,
    /// Declared type of the indexed column; lookup keys are cast to it.
    key_type: DataType,
    /// Whether duplicate non-null keys are rejected.
    unique: bool,
    /// Key to row positions, positions ascending.
    map: BTreeMap<Value, Vec<u32>>,
}

impl ColumnIndex {
    /// Creates an empty index.
    pub fn new(column: usize, key_type: DataType, unique: bool) -> Self {
        Self {
            column,
            key_type,
            unique,
            map: BTreeMap::new(),
        }
    }

    /// Returns the indexed column position.
    #[inline]
    pub fn column(&self) -> usize {
        self.column
    }

    /// Returns whether this is a unique index.
    #[inline]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Number of distinct keys.
    pub fn key_count(&self) -> usize {
        self.map.len()
    }

    /// Records that row `position` holds `key`.
    pub fn add(&mut self, key: &Value, position: u32) {
        if key.is_null() {
            return;
        }
        self.map.entry(key.clone()).or_default().push(position);
    }

    /// Returns the row positions holding `key`.
    ///
    /// The key is converted to the column type first; a key that cannot be
    /// represented in that type matches nothing.
    pub fn get(&self, key: &Value) -> Vec<u32> {
        if key.is_null() {
            return Vec::new();
        }
        match key.cast_to(self.key_type) {
            Ok(k) => self.map.get(&k).cloned().unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// Returns true if some row holds `key`.
    pub fn contains_key(&self, key: &Value) -> bool {
        !key.is_null() && self.map.contains_key(key)
    }

    /// Rebuilds the index from the full row set.
    pub fn rebuild(&mut self, rows: &[Row]) {
        self.map.clear();
        for (pos, row) in rows.iter().enumerate() {
            if let Some(key) = row.get(self.column) {
                self.add(key, pos as u32);
            }
        }
    }

    /// Changes the key type after the column was converted.
    pub(crate) fn set_key_type(&mut self, key_type: DataType) {
        self.key_type = key_type;
    }
}
