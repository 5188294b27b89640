//! Table, index and CTE scan executors.

use super::filter::select_compare;
use super::{BlockOperator, BufferCursor, ExecContext};
use crate::planner::LeafFilter;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use strata_core::block::{FlatColumns, RowBlock, SelectionVector};
use strata_core::{Result, Value};
use strata_storage::ScanCache;
use tracing::trace;

/// Streams the scan cache of a stored table, applying leaf filters per block.
pub struct SeqScanExecutor {
    table: String,
    leaf_filters: Vec<LeafFilter>,
    cache: Option<Rc<ScanCache>>,
    next_block: usize,
}

impl SeqScanExecutor {
    pub fn new(table: String, leaf_filters: Vec<LeafFilter>) -> Self {
        Self {
            table,
            leaf_filters,
            cache: None,
            next_block: 0,
        }
    }
}

impl BlockOperator for SeqScanExecutor {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        let table = ctx.db.get_table(&self.table)?;
        self.cache = Some(table.scan_cache()?);
        self.next_block = 0;
        Ok(())
    }

    fn next(&mut self, _ctx: &ExecContext<'_>) -> Result<Option<RowBlock>> {
        let Some(cache) = &self.cache else {
            return Ok(None);
        };
        let Some(block) = cache.block(self.next_block) else {
            return Ok(None);
        };
        self.next_block += 1;
        Ok(Some(apply_leaf_filters(block, &self.leaf_filters)))
    }

    fn close(&mut self) {
        self.cache = None;
    }
}

/// Narrows the selection of `block` by each `column <op> literal` in turn.
pub(crate) fn apply_leaf_filters(block: RowBlock, filters: &[LeafFilter]) -> RowBlock {
    if filters.is_empty() {
        return block;
    }
    let mut selection = match block.selection() {
        Some(sel) => sel.clone(),
        None => SelectionVector::all(block.physical_len()),
    };
    for f in filters {
        if selection.is_empty() {
            break;
        }
        selection = select_compare(block.column(f.column), &selection, f.op, &f.value);
    }
    trace!(rows = selection.len(), "leaf filters applied");
    block.with_selection(selection)
}

/// Point lookup through a column index.
pub struct IndexScanExecutor {
    table: String,
    column: usize,
    key: Value,
    cursor: BufferCursor,
}

impl IndexScanExecutor {
    pub fn new(table: String, column: usize, key: Value) -> Self {
        Self {
            table,
            column,
            key,
            cursor: BufferCursor::default(),
        }
    }
}

impl BlockOperator for IndexScanExecutor {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        let table = ctx.db.get_table(&self.table)?;
        let mut positions = table.lookup(self.column, &self.key);
        positions.sort_unstable();
        let mut rows = FlatColumns::new(&table.schema().data_types());
        for pos in positions {
            if let Some(row) = table.row(pos as usize) {
                rows.append_values(row.values())?;
            }
        }
        trace!(table = %self.table, rows = rows.len(), "index lookup");
        self.cursor = BufferCursor::new(rows, None);
        Ok(())
    }

    fn next(&mut self, _ctx: &ExecContext<'_>) -> Result<Option<RowBlock>> {
        Ok(self.cursor.next_block())
    }

    fn close(&mut self) {
        self.cursor.clear();
    }
}

/// Scans the temporary table materialized for a common table expression.
pub struct CteScanExecutor {
    slot: usize,
    cache: Option<Rc<ScanCache>>,
    next_block: usize,
}

impl CteScanExecutor {
    pub fn new(slot: usize) -> Self {
        Self {
            slot,
            cache: None,
            next_block: 0,
        }
    }
}

impl BlockOperator for CteScanExecutor {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        self.cache = Some(ctx.cte_table(self.slot)?.scan_cache()?);
        self.next_block = 0;
        Ok(())
    }

    fn next(&mut self, _ctx: &ExecContext<'_>) -> Result<Option<RowBlock>> {
        let block = self.cache.as_ref().and_then(|c| c.block(self.next_block));
        self.next_block += 1;
        Ok(block)
    }

    fn close(&mut self) {
        self.cache = None;
    }
}
