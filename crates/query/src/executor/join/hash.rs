//! Hash join.
//!
//! The build side is drained into a [`FlatColumns`] buffer with a parallel
//! buffer of evaluated key columns, indexed by a [`BlockHashTable`]. Probe
//! blocks are compacted, their keys evaluated column-wise, and each row walks
//! its hash chain. Null keys never match.

use super::{JoinOutput, Side};
use crate::eval::{self, BlockRow, FlatRow, JoinedRow, RowView};
use crate::executor::{BlockOperator, ExecContext};
use crate::hash_table::{any_null, keys_equal, BlockHashTable, KeyHasher};
use crate::planner::PhysExprId;
use crate::ast::JoinKind;
use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;
use strata_core::block::{ColumnBlock, FlatColumns, RowBlock};
use strata_core::{DataType, Result};
use tracing::debug;

/// Parameters of a hash join node.
#[derive(Clone, Debug)]
pub struct HashJoinSpec {
    pub kind: JoinKind,
    pub left_keys: Vec<PhysExprId>,
    pub right_keys: Vec<PhysExprId>,
    pub key_types: Vec<DataType>,
    pub residual: Option<PhysExprId>,
    pub build_left: bool,
    pub left_types: Vec<DataType>,
    pub right_types: Vec<DataType>,
}

struct ProbeState {
    block: RowBlock,
    keys: Vec<Rc<ColumnBlock>>,
    next_row: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    Probing,
    Unmatched(usize),
    Done,
}

/// Equi-join through a block hash table.
pub struct HashJoinExecutor {
    left: Box<dyn BlockOperator>,
    right: Box<dyn BlockOperator>,
    spec: HashJoinSpec,
    hasher: KeyHasher,
    table: BlockHashTable,
    build_rows: Option<FlatColumns>,
    build_keys: Option<FlatColumns>,
    matched: Vec<bool>,
    probe: Option<ProbeState>,
    output: JoinOutput,
    phase: Phase,
}

impl HashJoinExecutor {
    pub fn new(left: Box<dyn BlockOperator>, right: Box<dyn BlockOperator>, spec: HashJoinSpec) -> Self {
        let output = JoinOutput::new(spec.left_types.clone(), spec.right_types.clone(), u64::MAX);
        Self {
            left,
            right,
            spec,
            hasher: KeyHasher::new(),
            table: BlockHashTable::with_capacity(0),
            build_rows: None,
            build_keys: None,
            matched: Vec::new(),
            probe: None,
            output,
            phase: Phase::Probing,
        }
    }

    fn build_types(&self) -> &[DataType] {
        if self.spec.build_left {
            &self.spec.left_types
        } else {
            &self.spec.right_types
        }
    }

    fn build_key_exprs(&self) -> &[PhysExprId] {
        if self.spec.build_left {
            &self.spec.left_keys
        } else {
            &self.spec.right_keys
        }
    }

    fn probe_key_exprs(&self) -> &[PhysExprId] {
        if self.spec.build_left {
            &self.spec.right_keys
        } else {
            &self.spec.left_keys
        }
    }

    fn probe_preserved(&self) -> bool {
        if self.spec.build_left {
            self.spec.kind.preserves_right()
        } else {
            self.spec.kind.preserves_left()
        }
    }

    fn build_preserved(&self) -> bool {
        if self.spec.build_left {
            self.spec.kind.preserves_left()
        } else {
            self.spec.kind.preserves_right()
        }
    }

    fn build(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        let mut rows = FlatColumns::new(self.build_types());
        let mut keys = FlatColumns::new(&self.spec.key_types);
        let exprs = self.build_key_exprs().to_vec();
        let side = if self.spec.build_left {
            self.left.as_mut()
        } else {
            self.right.as_mut()
        };
        let mut hashes = Vec::new();
        while let Some(block) = side.next(ctx)? {
            if block.is_empty() {
                continue;
            }
            let key_columns = crate::executor::eval_columns(ctx, &exprs, &self.spec.key_types, &block)?;
            let count = block.row_count();
            for i in 0..count {
                hashes.push(self.hasher.hash_row(key_columns.iter().map(|c| c.as_ref()), i));
            }
            rows.append_block(&block)?;
            keys.append_block(&RowBlock::new(key_columns, count))?;
        }
        let mut table = BlockHashTable::with_capacity(hashes.len());
        for h in hashes {
            table.insert(h);
        }
        table.seal();
        debug!(rows = rows.len(), buckets = table.bucket_count(), "hash join build");
        self.matched = vec![false; rows.len()];
        self.table = table;
        self.build_rows = Some(rows);
        self.build_keys = Some(keys);
        Ok(())
    }

    /// Emits pending pairs with the current probe block as the probe side.
    fn emit(&mut self) -> RowBlock {
        let Some(build) = self.build_rows.as_ref() else {
            return self.output.take_block(Side::Nulls, Side::Nulls);
        };
        let probe = match &self.probe {
            Some(p) => Side::Block(&p.block),
            None => Side::Nulls,
        };
        if self.spec.build_left {
            self.output.take_block(Side::Flat(build), probe)
        } else {
            self.output.take_block(probe, Side::Flat(build))
        }
    }

    /// Matches probe row `i`, pushing output pairs.
    fn probe_row(&mut self, ctx: &ExecContext<'_>, i: usize) -> Result<()> {
        let (Some(state), Some(build_keys), Some(build_rows)) =
            (self.probe.as_ref(), self.build_keys.as_ref(), self.build_rows.as_ref())
        else {
            return Ok(());
        };
        let probe_keys: Vec<&ColumnBlock> = state.keys.iter().map(|c| c.as_ref()).collect();
        let mut found = false;
        if !any_null(probe_keys.iter().copied(), i) {
            let h = self.hasher.hash_row(probe_keys.iter().copied(), i);
            for b in self.table.probe(h) {
                if !keys_equal(&probe_keys, i, build_keys, b) {
                    continue;
                }
                if let Some(residual) = self.spec.residual {
                    let probe_row = BlockRow {
                        block: &state.block,
                        pos: i,
                    };
                    let build_row = FlatRow {
                        rows: build_rows,
                        row: b as usize,
                    };
                    let (l, r): (&dyn RowView, &dyn RowView) = if self.spec.build_left {
                        (&build_row, &probe_row)
                    } else {
                        (&probe_row, &build_row)
                    };
                    if eval::eval_predicate(ctx, residual, &JoinedRow { left: l, right: r })? != Some(true) {
                        continue;
                    }
                }
                found = true;
                self.matched[b as usize] = true;
                if self.spec.build_left {
                    self.output.push(Some(b), Some(i as u32))?;
                } else {
                    self.output.push(Some(i as u32), Some(b))?;
                }
            }
        }
        if !found && self.probe_preserved() {
            if self.spec.build_left {
                self.output.push(None, Some(i as u32))?;
            } else {
                self.output.push(Some(i as u32), None)?;
            }
        }
        Ok(())
    }
}

impl BlockOperator for HashJoinExecutor {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        self.left.open(ctx)?;
        self.right.open(ctx)?;
        self.output = JoinOutput::new(
            self.spec.left_types.clone(),
            self.spec.right_types.clone(),
            ctx.config.max_join_rows,
        );
        self.phase = Phase::Probing;
        self.probe = None;
        self.build(ctx)
    }

    fn next(&mut self, ctx: &ExecContext<'_>) -> Result<Option<RowBlock>> {
        loop {
            if self.output.is_full() {
                return Ok(Some(self.emit()));
            }
            if let Some(state) = &mut self.probe {
                if state.next_row < state.block.physical_len() {
                    let i = state.next_row;
                    state.next_row += 1;
                    self.probe_row(ctx, i)?;
                    continue;
                }
            }
            if !self.output.is_empty() {
                return Ok(Some(self.emit()));
            }
            match self.phase {
                Phase::Probing => {
                    let probe_side = if self.spec.build_left {
                        self.right.as_mut()
                    } else {
                        self.left.as_mut()
                    };
                    match probe_side.next(ctx)? {
                        Some(block) => {
                            let block = block.compact();
                            let exprs = self.probe_key_exprs().to_vec();
                            let keys = crate::executor::eval_columns(ctx, &exprs, &self.spec.key_types, &block)?;
                            self.probe = Some(ProbeState {
                                block,
                                keys,
                                next_row: 0,
                            });
                        }
                        None => {
                            self.probe = None;
                            self.phase = if self.build_preserved() {
                                Phase::Unmatched(0)
                            } else {
                                Phase::Done
                            };
                        }
                    }
                }
                Phase::Unmatched(start) => {
                    let mut b = start;
                    while b < self.matched.len() && !self.output.is_full() {
                        if !self.matched[b] {
                            if self.spec.build_left {
                                self.output.push(Some(b as u32), None)?;
                            } else {
                                self.output.push(None, Some(b as u32))?;
                            }
                        }
                        b += 1;
                    }
                    self.phase = if b < self.matched.len() {
                        Phase::Unmatched(b)
                    } else {
                        Phase::Done
                    };
                    if !self.output.is_empty() {
                        return Ok(Some(self.emit()));
                    }
                }
                Phase::Done => return Ok(None),
            }
        }
    }

    fn close(&mut self) {
        self.left.close();
        self.right.close();
        self.build_rows = None;
        self.build_keys = None;
        self.probe = None;
        self.matched = Vec::new();
        self.table = BlockHashTable::with_capacity(0);
        self.output.reset();
    }
}
