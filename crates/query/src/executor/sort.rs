//! Sort and top-N executors.

use super::{drain, BlockOperator, BufferCursor, ExecContext};
use crate::planner::SortKey;
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cmp::Ordering;
use strata_core::block::{FlatColumns, RowBlock};
use strata_core::{DataType, Result, BLOCK_CAPACITY};
use tracing::trace;

/// Compares rows `a` and `b` of `rows` by `keys`.
pub(crate) fn compare_rows(rows: &FlatColumns, keys: &[SortKey], a: usize, b: usize) -> Ordering {
    for key in keys {
        let col = rows.column(key.column);
        let ord = match (col.is_null(a), col.is_null(b)) {
            (true, true) => Ordering::Equal,
            (true, false) => {
                if key.nulls_first {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            }
            (false, true) => {
                if key.nulls_first {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            }
            (false, false) => {
                let ord = col.compare_at(a, col, b);
                if key.descending {
                    ord.reverse()
                } else {
                    ord
                }
            }
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Stable sort permutation of `rows`.
pub(crate) fn sort_order(rows: &FlatColumns, keys: &[SortKey]) -> Vec<u32> {
    let mut order: Vec<u32> = (0..rows.len() as u32).collect();
    order.sort_by(|&a, &b| compare_rows(rows, keys, a as usize, b as usize));
    order
}

/// Copies the rows at `order` into a new buffer.
pub(crate) fn reorder(rows: &FlatColumns, order: &[u32]) -> Result<FlatColumns> {
    let mut out = FlatColumns::new(&rows.types());
    for chunk in order.chunks(BLOCK_CAPACITY) {
        out.append_block(&rows.gather_block(chunk))?;
    }
    Ok(out)
}

/// Materializes the input, then emits it in key order.
pub struct SortExecutor {
    input: Box<dyn BlockOperator>,
    keys: Vec<SortKey>,
    types: Vec<DataType>,
    cursor: BufferCursor,
}

impl SortExecutor {
    pub fn new(input: Box<dyn BlockOperator>, keys: Vec<SortKey>, types: Vec<DataType>) -> Self {
        Self {
            input,
            keys,
            types,
            cursor: BufferCursor::default(),
        }
    }
}

impl BlockOperator for SortExecutor {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        self.input.open(ctx)?;
        let rows = drain(self.input.as_mut(), ctx, &self.types)?;
        self.input.close();
        let order = sort_order(&rows, &self.keys);
        trace!(rows = rows.len(), "sorted");
        self.cursor = BufferCursor::new(rows, Some(order));
        Ok(())
    }

    fn next(&mut self, _ctx: &ExecContext<'_>) -> Result<Option<RowBlock>> {
        Ok(self.cursor.next_block())
    }

    fn close(&mut self) {
        self.cursor.clear();
    }
}

/// Sort fused with LIMIT/OFFSET: only the best `limit + offset` rows are kept
/// while the input streams through.
pub struct TopNExecutor {
    input: Box<dyn BlockOperator>,
    keys: Vec<SortKey>,
    limit: u64,
    offset: u64,
    types: Vec<DataType>,
    cursor: BufferCursor,
}

impl TopNExecutor {
    pub fn new(
        input: Box<dyn BlockOperator>,
        keys: Vec<SortKey>,
        limit: u64,
        offset: u64,
        types: Vec<DataType>,
    ) -> Self {
        Self {
            input,
            keys,
            limit,
            offset,
            types,
            cursor: BufferCursor::default(),
        }
    }
}

impl BlockOperator for TopNExecutor {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        let keep = usize::try_from(self.limit.saturating_add(self.offset)).unwrap_or(usize::MAX);
        if self.limit == 0 {
            self.cursor = BufferCursor::new(FlatColumns::new(&self.types), None);
            return Ok(());
        }
        let threshold = keep.saturating_mul(2).max(BLOCK_CAPACITY);
        self.input.open(ctx)?;
        let mut rows = FlatColumns::new(&self.types);
        while let Some(block) = self.input.next(ctx)? {
            rows.append_block(&block)?;
            if rows.len() >= threshold {
                let mut order = sort_order(&rows, &self.keys);
                order.truncate(keep);
                rows = reorder(&rows, &order)?;
            }
        }
        self.input.close();
        let mut order = sort_order(&rows, &self.keys);
        order.truncate(keep);
        let skip = usize::try_from(self.offset).unwrap_or(usize::MAX).min(order.len());
        order.drain(..skip);
        self.cursor = BufferCursor::new(rows, Some(order));
        Ok(())
    }

    fn next(&mut self, _ctx: &ExecContext<'_>) -> Result<Option<RowBlock>> {
        Ok(self.cursor.next_block())
    }

    fn close(&mut self) {
        self.cursor.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::QueryArena;
    use crate::config::EngineConfig;
    use crate::executor::test_util::{run, text, BlocksSource};
    use alloc::vec;
    use strata_core::Value;
    use strata_storage::Database;

    fn input() -> Vec<Vec<Value>> {
        vec![
            vec![Value::Int32(3), text("c")],
            vec![Value::Null, text("n")],
            vec![Value::Int32(1), text("a")],
            vec![Value::Int32(3), text("c2")],
            vec![Value::Int32(2), text("b")],
        ]
    }

    fn sorted(keys: Vec<SortKey>) -> Vec<Value> {
        let db = Database::new();
        let arena = QueryArena::new();
        let config = EngineConfig::default();
        let ctx = ExecContext::new(&db, &arena, &config);
        let types = vec![DataType::Int32, DataType::Text];
        let source = BlocksSource::rows(&types, &input());
        let mut sort = SortExecutor::new(Box::new(source), keys, types);
        run(&mut sort, &ctx).into_iter().map(|r| r[1].clone()).collect()
    }

    #[test]
    fn test_sort_null_placement() {
        // ASC puts NULL last, DESC puts it first; ties keep input order
        assert_eq!(
            sorted(vec![SortKey::new(0, false)]),
            vec![text("a"), text("b"), text("c"), text("c2"), text("n")]
        );
        assert_eq!(
            sorted(vec![SortKey::new(0, true)]),
            vec![text("n"), text("c"), text("c2"), text("b"), text("a")]
        );
        let nulls_first = SortKey {
            column: 0,
            descending: false,
            nulls_first: true,
        };
        assert_eq!(sorted(vec![nulls_first])[0], text("n"));
    }

    #[test]
    fn test_top_n_across_blocks() {
        let db = Database::new();
        let arena = QueryArena::new();
        let config = EngineConfig::default();
        let ctx = ExecContext::new(&db, &arena, &config);
        let types = vec![DataType::Int64];
        let blocks: Vec<RowBlock> = (0..5)
            .map(|b| {
                let mut flat = FlatColumns::new(&types);
                for i in 0..1000i64 {
                    flat.append_values(&[Value::Int64((i * 7919 + b * 13) % 5000)]).unwrap();
                }
                flat.slice_block(0, 1000)
            })
            .collect();
        let mut top = TopNExecutor::new(
            Box::new(BlocksSource::new(blocks)),
            vec![SortKey::new(0, true)],
            3,
            1,
            types,
        );
        let rows = run(&mut top, &ctx);
        assert_eq!(rows.len(), 3);
        let values: Vec<i64> = rows.iter().map(|r| r[0].as_i64().unwrap()).collect();
        assert!(values.windows(2).all(|w| w[0] >= w[1]));
        assert!(values[0] <= 4999);
    }
}
