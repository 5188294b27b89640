//! Nested-loop join, used for cross joins and non-equi conditions.

use super::{JoinOutput, Side};
use crate::ast::JoinKind;
use crate::eval::{self, BlockRow, FlatRow, JoinedRow};
use crate::executor::{drain, BlockOperator, ExecContext};
use crate::planner::PhysExprId;
use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use strata_core::block::{FlatColumns, RowBlock};
use strata_core::{DataType, Result};

struct OuterState {
    block: RowBlock,
    row: usize,
    inner: usize,
    matched: bool,
}

/// Compares every left row with every materialized right row.
pub struct NestedLoopJoinExecutor {
    left: Box<dyn BlockOperator>,
    right: Box<dyn BlockOperator>,
    kind: JoinKind,
    condition: Option<PhysExprId>,
    left_types: Vec<DataType>,
    right_types: Vec<DataType>,
    inner: Option<FlatColumns>,
    inner_matched: Vec<bool>,
    outer: Option<OuterState>,
    output: JoinOutput,
    left_done: bool,
    unmatched_cursor: usize,
}

impl NestedLoopJoinExecutor {
    pub fn new(
        left: Box<dyn BlockOperator>,
        right: Box<dyn BlockOperator>,
        kind: JoinKind,
        condition: Option<PhysExprId>,
        left_types: Vec<DataType>,
        right_types: Vec<DataType>,
    ) -> Self {
        let output = JoinOutput::new(left_types.clone(), right_types.clone(), u64::MAX);
        Self {
            left,
            right,
            kind,
            condition,
            left_types,
            right_types,
            inner: None,
            inner_matched: Vec::new(),
            outer: None,
            output,
            left_done: false,
            unmatched_cursor: 0,
        }
    }

    fn emit(&mut self) -> RowBlock {
        let left = match &self.outer {
            Some(o) => Side::Block(&o.block),
            None => Side::Nulls,
        };
        let right = match &self.inner {
            Some(rows) => Side::Flat(rows),
            None => Side::Nulls,
        };
        self.output.take_block(left, right)
    }

    /// Advances the current outer row until the output fills or the row is done.
    /// Returns false once the outer block is exhausted.
    fn step(&mut self, ctx: &ExecContext<'_>) -> Result<bool> {
        let (Some(outer), Some(inner)) = (self.outer.as_mut(), self.inner.as_ref()) else {
            return Ok(false);
        };
        if outer.row >= outer.block.physical_len() {
            return Ok(false);
        }
        while outer.inner < inner.len() {
            if self.output.is_full() {
                return Ok(true);
            }
            let j = outer.inner;
            outer.inner += 1;
            let hit = match self.condition {
                None => true,
                Some(cond) => {
                    let l = BlockRow {
                        block: &outer.block,
                        pos: outer.row,
                    };
                    let r = FlatRow { rows: inner, row: j };
                    eval::eval_predicate(ctx, cond, &JoinedRow { left: &l, right: &r })? == Some(true)
                }
            };
            if hit {
                outer.matched = true;
                self.inner_matched[j] = true;
                self.output.push(Some(outer.row as u32), Some(j as u32))?;
            }
        }
        if !outer.matched && self.kind.preserves_left() {
            self.output.push(Some(outer.row as u32), None)?;
        }
        outer.row += 1;
        outer.inner = 0;
        outer.matched = false;
        Ok(true)
    }
}

impl BlockOperator for NestedLoopJoinExecutor {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        self.left.open(ctx)?;
        self.right.open(ctx)?;
        let inner = drain(self.right.as_mut(), ctx, &self.right_types)?;
        self.inner_matched = vec![false; inner.len()];
        self.inner = Some(inner);
        self.outer = None;
        self.left_done = false;
        self.unmatched_cursor = 0;
        self.output = JoinOutput::new(
            self.left_types.clone(),
            self.right_types.clone(),
            ctx.config.max_join_rows,
        );
        Ok(())
    }

    fn next(&mut self, ctx: &ExecContext<'_>) -> Result<Option<RowBlock>> {
        loop {
            if self.output.is_full() {
                return Ok(Some(self.emit()));
            }
            if self.step(ctx)? {
                continue;
            }
            if !self.output.is_empty() {
                return Ok(Some(self.emit()));
            }
            if !self.left_done {
                match self.left.next(ctx)? {
                    Some(block) => {
                        self.outer = Some(OuterState {
                            block: block.compact(),
                            row: 0,
                            inner: 0,
                            matched: false,
                        });
                    }
                    None => {
                        self.outer = None;
                        self.left_done = true;
                    }
                }
                continue;
            }
            if !self.kind.preserves_right() {
                return Ok(None);
            }
            while self.unmatched_cursor < self.inner_matched.len() && !self.output.is_full() {
                let j = self.unmatched_cursor;
                self.unmatched_cursor += 1;
                if !self.inner_matched[j] {
                    self.output.push(None, Some(j as u32))?;
                }
            }
            if self.output.is_empty() {
                return Ok(None);
            }
            return Ok(Some(self.emit()));
        }
    }

    fn close(&mut self) {
        self.left.close();
        self.right.close();
        self.inner = None;
        self.outer = None;
        self.inner_matched = Vec::new();
        self.output.reset();
    }
}
