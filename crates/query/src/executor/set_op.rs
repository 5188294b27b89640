//! Set operations and DISTINCT.
//!
//! Rows are compared whole, with NULLs equal to each other. The `ALL`
//! variants follow multiset semantics: `INTERSECT ALL` keeps a row
//! `min(l, r)` times and `EXCEPT ALL` keeps it `max(l - r, 0)` times.

use super::{conform, drain, BlockOperator, ExecContext};
use crate::ast::SetOpKind;
use crate::hash_table::{keys_same, BlockHashTable, KeyHasher};
use alloc::boxed::Box;
use alloc::vec::Vec;
use strata_core::block::{ColumnBlock, FlatColumns, RowBlock, SelectionVector};
use strata_core::{DataType, Result};
use tracing::trace;

/// Hash set of whole rows with a counter per distinct row.
pub(crate) struct RowSet {
    hasher: KeyHasher,
    table: BlockHashTable,
    rows: FlatColumns,
    counts: Vec<u64>,
}

impl RowSet {
    pub(crate) fn new(types: &[DataType]) -> Self {
        Self {
            hasher: KeyHasher::new(),
            table: BlockHashTable::with_capacity(64),
            rows: FlatColumns::new(types),
            counts: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.counts.len()
    }

    fn lookup(&self, columns: &[&ColumnBlock], pos: usize) -> (u64, Option<u32>) {
        let h = self.hasher.hash_row(columns.iter().copied(), pos);
        (h, self.table.find(h, |row| keys_same(columns, pos, &self.rows, row)))
    }

    /// Adds one occurrence of row `pos` of `block`; returns true if it was new.
    pub(crate) fn insert(&mut self, block: &RowBlock, pos: usize) -> Result<bool> {
        let columns: Vec<&ColumnBlock> = block.columns().iter().map(|c| c.as_ref()).collect();
        match self.lookup(&columns, pos) {
            (_, Some(row)) => {
                self.counts[row as usize] += 1;
                Ok(false)
            }
            (h, None) => {
                self.table.insert(h);
                self.rows.append_position(block, pos)?;
                self.counts.push(1);
                Ok(true)
            }
        }
    }

    /// Id of the row equal to row `pos` of `block`.
    pub(crate) fn find(&self, block: &RowBlock, pos: usize) -> Option<u32> {
        let columns: Vec<&ColumnBlock> = block.columns().iter().map(|c| c.as_ref()).collect();
        self.lookup(&columns, pos).1
    }

    pub(crate) fn count_mut(&mut self, row: u32) -> &mut u64 {
        &mut self.counts[row as usize]
    }
}

/// Streams rows seen for the first time.
pub struct DistinctExecutor {
    input: Box<dyn BlockOperator>,
    types: Vec<DataType>,
    seen: Option<RowSet>,
}

impl DistinctExecutor {
    pub fn new(input: Box<dyn BlockOperator>, types: Vec<DataType>) -> Self {
        Self {
            input,
            types,
            seen: None,
        }
    }
}

/// Keeps the rows of `block` not yet in `seen`, adding them.
fn first_seen(seen: &mut RowSet, block: RowBlock) -> Result<Option<RowBlock>> {
    let mut selection = SelectionVector::with_capacity(block.row_count());
    for pos in block.positions() {
        if seen.insert(&block, pos)? {
            selection.push(pos as u32);
        }
    }
    if selection.is_empty() {
        return Ok(None);
    }
    Ok(Some(block.with_selection(selection)))
}

impl BlockOperator for DistinctExecutor {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        self.seen = Some(RowSet::new(&self.types));
        self.input.open(ctx)
    }

    fn next(&mut self, ctx: &ExecContext<'_>) -> Result<Option<RowBlock>> {
        let Some(seen) = self.seen.as_mut() else {
            return Ok(None);
        };
        while let Some(block) = self.input.next(ctx)? {
            let block = conform(block, &self.types)?;
            if let Some(out) = first_seen(seen, block)? {
                return Ok(Some(out));
            }
        }
        Ok(None)
    }

    fn close(&mut self) {
        self.input.close();
        self.seen = None;
    }
}

/// UNION, INTERSECT and EXCEPT, with or without ALL.
pub struct SetOpExecutor {
    left: Box<dyn BlockOperator>,
    right: Box<dyn BlockOperator>,
    op: SetOpKind,
    all: bool,
    types: Vec<DataType>,
    /// Right rows with multiplicities (INTERSECT/EXCEPT), or rows seen (UNION).
    right_rows: Option<RowSet>,
    /// Rows already emitted by a distinct EXCEPT.
    emitted: Option<RowSet>,
    left_done: bool,
}

impl SetOpExecutor {
    pub fn new(
        left: Box<dyn BlockOperator>,
        right: Box<dyn BlockOperator>,
        op: SetOpKind,
        all: bool,
        types: Vec<DataType>,
    ) -> Self {
        Self {
            left,
            right,
            op,
            all,
            types,
            right_rows: None,
            emitted: None,
            left_done: false,
        }
    }

    fn next_union(&mut self, ctx: &ExecContext<'_>) -> Result<Option<RowBlock>> {
        loop {
            let block = if !self.left_done {
                match self.left.next(ctx)? {
                    Some(b) => b,
                    None => {
                        self.left_done = true;
                        continue;
                    }
                }
            } else {
                match self.right.next(ctx)? {
                    Some(b) => b,
                    None => return Ok(None),
                }
            };
            let block = conform(block, &self.types)?;
            if self.all {
                return Ok(Some(block));
            }
            if let Some(seen) = self.right_rows.as_mut() {
                if let Some(out) = first_seen(seen, block)? {
                    return Ok(Some(out));
                }
            }
        }
    }

    fn keep(&mut self, block: &RowBlock, pos: usize) -> Result<bool> {
        let Some(right) = self.right_rows.as_mut() else {
            return Ok(false);
        };
        let found = right.find(block, pos);
        Ok(match (self.op, found) {
            (SetOpKind::Intersect, Some(row)) => {
                let count = right.count_mut(row);
                if *count == 0 {
                    false
                } else {
                    // a distinct INTERSECT emits each row once
                    *count = if self.all { *count - 1 } else { 0 };
                    true
                }
            }
            (SetOpKind::Intersect, None) => false,
            (SetOpKind::Except, Some(row)) if self.all => {
                let count = right.count_mut(row);
                if *count > 0 {
                    *count -= 1;
                    false
                } else {
                    true
                }
            }
            (SetOpKind::Except, Some(_)) => false,
            (SetOpKind::Except, None) if self.all => true,
            (SetOpKind::Except, None) => match self.emitted.as_mut() {
                Some(emitted) => emitted.insert(block, pos)?,
                None => true,
            },
            (SetOpKind::Union, _) => true,
        })
    }
}

impl BlockOperator for SetOpExecutor {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        self.left.open(ctx)?;
        self.right.open(ctx)?;
        self.left_done = false;
        self.emitted = None;
        self.right_rows = match self.op {
            SetOpKind::Union if self.all => None,
            SetOpKind::Union => Some(RowSet::new(&self.types)),
            SetOpKind::Intersect | SetOpKind::Except => {
                let rows = drain(self.right.as_mut(), ctx, &self.types)?;
                let mut set = RowSet::new(&self.types);
                for (start, len) in super::chunk_ranges(rows.len()) {
                    let block = rows.slice_block(start, len);
                    for pos in 0..len {
                        set.insert(&block, pos)?;
                    }
                }
                trace!(rows = rows.len(), distinct = set.len(), op = self.op.name(), "set op build");
                if self.op == SetOpKind::Except && !self.all {
                    self.emitted = Some(RowSet::new(&self.types));
                }
                Some(set)
            }
        };
        Ok(())
    }

    fn next(&mut self, ctx: &ExecContext<'_>) -> Result<Option<RowBlock>> {
        if self.op == SetOpKind::Union {
            return self.next_union(ctx);
        }
        while let Some(block) = self.left.next(ctx)? {
            let block = conform(block, &self.types)?;
            let mut selection = SelectionVector::with_capacity(block.row_count());
            for pos in block.positions() {
                if self.keep(&block, pos)? {
                    selection.push(pos as u32);
                }
            }
            if !selection.is_empty() {
                return Ok(Some(block.with_selection(selection)));
            }
        }
        Ok(None)
    }

    fn close(&mut self) {
        self.left.close();
        self.right.close();
        self.right_rows = None;
        self.emitted = None;
    }
}
