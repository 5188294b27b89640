//! Columnar scan cache.
//!
//! A scan cache is a materialization of a table's rows into typed column
//! blocks of [`BLOCK_CAPACITY`] rows, tagged with the table generation it was
//! built at. A cache is valid iff its tag equals the table's current
//! generation; [`Table::scan_cache`](crate::Table::scan_cache) checks the tag
//! before every use and rebuilds on mismatch.

use alloc::rc::Rc;
use alloc::vec::Vec;
use strata_core::block::{ColumnBlock, RowBlock};
use strata_core::{DataType, Result, Row, BLOCK_CAPACITY};

/// Flat per-column copy of a table at one generation.
#[derive(Debug)]
pub struct ScanCache {
    generation: u64,
    row_count: usize,
    types: Vec<DataType>,
    blocks: Vec<RowBlock>,
}

impl ScanCache {
    /// Materializes `rows` as column blocks of the given types.
    pub fn build(rows: &[Row], types: &[DataType], generation: u64) -> Result<Self> {
        let mut blocks = Vec::with_capacity(rows.len().div_ceil(BLOCK_CAPACITY));
        for chunk in rows.chunks(BLOCK_CAPACITY) {
            let mut columns: Vec<ColumnBlock> = types
                .iter()
                .map(|&t| ColumnBlock::with_capacity(t, chunk.len()))
                .collect();
            for row in chunk {
                for (col, value) in columns.iter_mut().zip(row.values()) {
                    col.push(value)?;
                }
            }
            blocks.push(RowBlock::from_columns(columns, chunk.len()));
        }
        Ok(Self {
            generation,
            row_count: rows.len(),
            types: types.to_vec(),
            blocks,
        })
    }

    /// Generation the cache was built at.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of cached rows.
    #[inline]
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Number of blocks.
    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Returns block `index`, sharing its column data.
    pub fn block(&self, index: usize) -> Option<RowBlock> {
        self.blocks.get(index).cloned()
    }

    /// Returns rows `[start, start + len)` as one block.
    ///
    /// A range aligned to a whole cached block is returned without copying.
    /// `len` is clamped to [`BLOCK_CAPACITY`] and to the end of the table.
    pub fn read(&self, start: usize, len: usize) -> Result<RowBlock> {
        let len = len.min(BLOCK_CAPACITY).min(self.row_count.saturating_sub(start));
        let first = start / BLOCK_CAPACITY;
        let offset = start % BLOCK_CAPACITY;
        if len == 0 {
            return Ok(self.empty_like());
        }
        if offset == 0 {
            if let Some(block) = self.blocks.get(first) {
                if block.physical_len() == len {
                    return Ok(block.clone());
                }
            }
        }
        let width = self.blocks[first].width();
        let mut columns: Vec<ColumnBlock> = (0..width)
            .map(|c| ColumnBlock::with_capacity(self.blocks[first].column(c).data_type(), len))
            .collect();
        let mut remaining = len;
        let mut block_index = first;
        let mut pos = offset;
        while remaining > 0 {
            let block = &self.blocks[block_index];
            let take = remaining.min(block.physical_len() - pos);
            for (c, dst) in columns.iter_mut().enumerate() {
                dst.extend_from(block.column(c), pos..pos + take)?;
            }
            remaining -= take;
            block_index += 1;
            pos = 0;
        }
        Ok(RowBlock::new(columns.into_iter().map(Rc::new).collect(), len))
    }

    /// Column types of the cached table.
    pub fn types(&self) -> &[DataType] {
        &self.types
    }

    fn empty_like(&self) -> RowBlock {
        let columns = self.types.iter().map(|&t| ColumnBlock::new(t)).collect();
        RowBlock::from_columns(columns, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use strata_core::Value;

    fn rows(n: usize) -> Vec<Row> {
        (0..n)
            .map(|i| Row::new(vec![Value::Int64(i as i64), Value::from(if i % 2 == 0 { "even" } else { "odd" })]))
            .collect()
    }

    #[test]
    fn test_build_chunks() {
        let cache = ScanCache::build(&rows(2500), &[DataType::Int64, DataType::Text], 7).unwrap();
        assert_eq!(cache.generation(), 7);
        assert_eq!(cache.row_count(), 2500);
        assert_eq!(cache.block_count(), 3);
        assert_eq!(cache.block(2).unwrap().row_count(), 452);
    }

    #[test]
    fn test_read_unaligned_range() {
        let cache = ScanCache::build(&rows(2500), &[DataType::Int64, DataType::Text], 1).unwrap();
        let block = cache.read(1020, 10).unwrap();
        assert_eq!(block.row_count(), 10);
        assert_eq!(block.value(0, 0), Value::Int64(1020));
        assert_eq!(block.value(0, 9), Value::Int64(1029));
        assert_eq!(block.value(1, 5), Value::from("odd"));
        assert_eq!(cache.read(2495, 100).unwrap().row_count(), 5);
        assert_eq!(cache.read(3000, 10).unwrap().row_count(), 0);
    }

    #[test]
    fn test_empty_table() {
        let types = [DataType::Int64, DataType::Text, DataType::Date];
        let cache = ScanCache::build(&[], &types, 0).unwrap();
        assert_eq!(cache.block_count(), 0);
        let block = cache.read(0, 10).unwrap();
        assert_eq!(block.row_count(), 0);
        assert_eq!(block.width(), 3);
        for (c, t) in types.iter().enumerate() {
            assert_eq!(block.column(c).data_type(), *t);
            assert_eq!(block.column(c).len(), 0);
        }
    }

    #[test]
    fn test_read_past_end_keeps_shape() {
        let cache = ScanCache::build(&rows(3), &[DataType::Int64, DataType::Text], 2).unwrap();
        let block = cache.read(usize::MAX, usize::MAX).unwrap();
        assert_eq!(block.row_count(), 0);
        assert_eq!(block.width(), 2);
        assert_eq!(block.column(1).data_type(), DataType::Text);
    }
}
