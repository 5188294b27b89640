//! Join executors.
//!
//! All joins output the left input's columns followed by the right input's.
//! Matches are collected as pairs of row indices and turned into output
//! blocks by gathering from each side; a missing index on the padded side of
//! an outer join becomes a null.

mod hash;
mod nested_loop;
mod semi;

pub use hash::{HashJoinExecutor, HashJoinSpec};
pub use nested_loop::NestedLoopJoinExecutor;
pub use semi::HashSemiJoinExecutor;

use alloc::format;
use alloc::vec::Vec;
use strata_core::block::{ColumnBlock, FlatColumns, RowBlock};
use strata_core::{DataType, Error, Result, BLOCK_CAPACITY};

/// Where one side of an output block is gathered from.
#[derive(Clone, Copy)]
pub(crate) enum Side<'a> {
    /// Dense (compacted) row block.
    Block(&'a RowBlock),
    /// Materialized rows.
    Flat(&'a FlatColumns),
    /// No source rows; every index must be `None`.
    Nulls,
}

impl Side<'_> {
    fn gather(&self, types: &[DataType], indices: &[Option<u32>]) -> Vec<ColumnBlock> {
        match self {
            Side::Block(b) => (0..b.width()).map(|c| b.column(c).gather_optional(indices)).collect(),
            Side::Flat(f) => f.columns().iter().map(|c| c.gather_optional(indices)).collect(),
            Side::Nulls => types.iter().map(|&t| ColumnBlock::nulls(t, indices.len())).collect(),
        }
    }
}

/// Pending output pairs plus the running row count checked against the join row limit.
pub(crate) struct JoinOutput {
    left_types: Vec<DataType>,
    right_types: Vec<DataType>,
    left: Vec<Option<u32>>,
    right: Vec<Option<u32>>,
    produced: u64,
    max_rows: u64,
}

impl JoinOutput {
    pub(crate) fn new(left_types: Vec<DataType>, right_types: Vec<DataType>, max_rows: u64) -> Self {
        Self {
            left_types,
            right_types,
            left: Vec::with_capacity(BLOCK_CAPACITY),
            right: Vec::with_capacity(BLOCK_CAPACITY),
            produced: 0,
            max_rows,
        }
    }

    pub(crate) fn push(&mut self, left: Option<u32>, right: Option<u32>) -> Result<()> {
        self.produced += 1;
        if self.produced > self.max_rows {
            return Err(Error::limit_exceeded(format!(
                "join produced more than {} rows",
                self.max_rows
            )));
        }
        self.left.push(left);
        self.right.push(right);
        Ok(())
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.left.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.left.len() >= BLOCK_CAPACITY
    }

    /// Turns up to one block of pending pairs into an output block.
    pub(crate) fn take_block(&mut self, left: Side<'_>, right: Side<'_>) -> RowBlock {
        let n = self.left.len().min(BLOCK_CAPACITY);
        let l: Vec<Option<u32>> = self.left.drain(..n).collect();
        let r: Vec<Option<u32>> = self.right.drain(..n).collect();
        let mut columns = left.gather(&self.left_types, &l);
        columns.extend(right.gather(&self.right_types, &r));
        RowBlock::from_columns(columns, n)
    }

    pub(crate) fn reset(&mut self) {
        self.left.clear();
        self.right.clear();
        self.produced = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use strata_core::Value;

    #[test]
    fn test_join_output_gather_and_limit() {
        let mut flat = FlatColumns::new(&[DataType::Int32]);
        flat.append_values(&[Value::Int32(7)]).unwrap();
        let mut out = JoinOutput::new(vec![DataType::Int32], vec![DataType::Text], 2);
        out.push(Some(0), None).unwrap();
        out.push(None, None).unwrap();
        assert_eq!(out.push(Some(0), None).unwrap_err().sqlstate(), "54000");
        let block = out.take_block(Side::Flat(&flat), Side::Nulls);
        assert_eq!(block.width(), 2);
        assert_eq!(block.row_values(0), vec![Value::Int32(7), Value::Null]);
        assert_eq!(block.row_values(1), vec![Value::Null, Value::Null]);
        assert!(out.is_empty());
    }
}
