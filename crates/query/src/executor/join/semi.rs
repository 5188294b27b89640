//! Hash semi and anti join for `IN (subquery)` and `NOT IN (subquery)`.
//!
//! The right input has a single column. `NOT IN` follows SQL semantics: a
//! NULL anywhere in the subquery result makes every non-matching row unknown,
//! so such rows are dropped.

use crate::eval;
use crate::executor::{drain, BlockOperator, ExecContext};
use crate::hash_table::{keys_equal, BlockHashTable, KeyHasher};
use crate::planner::PhysExprId;
use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use strata_core::block::{FlatColumns, RowBlock, SelectionVector};
use strata_core::{DataType, Result};
use tracing::debug;

/// Filters left rows by membership of a key in the right input.
pub struct HashSemiJoinExecutor {
    left: Box<dyn BlockOperator>,
    right: Box<dyn BlockOperator>,
    probe_key: PhysExprId,
    key_type: DataType,
    anti: bool,
    right_types: Vec<DataType>,
    hasher: KeyHasher,
    table: BlockHashTable,
    keys: Option<FlatColumns>,
    build_has_null: bool,
}

impl HashSemiJoinExecutor {
    pub fn new(
        left: Box<dyn BlockOperator>,
        right: Box<dyn BlockOperator>,
        probe_key: PhysExprId,
        key_type: DataType,
        anti: bool,
        right_types: Vec<DataType>,
    ) -> Self {
        Self {
            left,
            right,
            probe_key,
            key_type,
            anti,
            right_types,
            hasher: KeyHasher::new(),
            table: BlockHashTable::with_capacity(0),
            keys: None,
            build_has_null: false,
        }
    }
}

impl BlockOperator for HashSemiJoinExecutor {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        self.left.open(ctx)?;
        self.right.open(ctx)?;
        let rows = drain(self.right.as_mut(), ctx, &self.right_types)?;
        self.right.close();
        let mut keys = FlatColumns::new(&[self.key_type]);
        let mut has_null = false;
        for row in 0..rows.len() {
            let value = rows.value(0, row);
            if value.is_null() {
                has_null = true;
                continue;
            }
            keys.append_values(&[value.cast_to(self.key_type)?])?;
        }
        let mut table = BlockHashTable::with_capacity(keys.len());
        for row in 0..keys.len() {
            table.insert(self.hasher.hash_row([keys.column(0)], row));
        }
        table.seal();
        debug!(keys = keys.len(), has_null, anti = self.anti, "semi join build");
        self.table = table;
        self.keys = Some(keys);
        self.build_has_null = has_null;
        Ok(())
    }

    fn next(&mut self, ctx: &ExecContext<'_>) -> Result<Option<RowBlock>> {
        let Some(keys) = self.keys.as_ref() else {
            return Ok(None);
        };
        // NOT IN over an empty set keeps everything, NULL keys included.
        let build_empty = keys.is_empty() && !self.build_has_null;
        loop {
            let Some(block) = self.left.next(ctx)? else {
                return Ok(None);
            };
            if build_empty {
                if self.anti {
                    return Ok(Some(block));
                }
                continue;
            }
            let probe = eval::eval_column(ctx, self.probe_key, self.key_type, &block)?;
            let mut selection = SelectionVector::with_capacity(block.row_count());
            for (dense, pos) in block.positions().enumerate() {
                let keep = if probe.is_null(dense) {
                    false
                } else {
                    let h = self.hasher.hash_row([probe.as_ref()], dense);
                    let found = self
                        .table
                        .find(h, |row| keys_equal(&[probe.as_ref()], dense, keys, row))
                        .is_some();
                    if self.anti {
                        !found && !self.build_has_null
                    } else {
                        found
                    }
                };
                if keep {
                    selection.push(pos as u32);
                }
            }
            if selection.is_empty() {
                continue;
            }
            return Ok(Some(block.with_selection(selection)));
        }
    }

    fn close(&mut self) {
        self.left.close();
        self.right.close();
        self.keys = None;
        self.table = BlockHashTable::with_capacity(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::QueryArena;
    use crate::config::EngineConfig;
    use crate::executor::test_util::{ints, run, BlocksSource};
    use crate::planner::PhysExpr;
    use strata_core::Value;
    use strata_storage::Database;

    fn semi(left: &[Vec<Value>], right: &[Vec<Value>], anti: bool) -> Vec<Vec<Value>> {
        let mut arena = QueryArena::new();
        let key = arena.phys_exprs.push(PhysExpr::Column(0)).unwrap();
        let db = Database::new();
        let config = EngineConfig::default();
        let ctx = ExecContext::new(&db, &arena, &config);
        let mut exec = HashSemiJoinExecutor::new(
            Box::new(BlocksSource::rows(&[DataType::Int64], left)),
            Box::new(BlocksSource::rows(&[DataType::Int32], right)),
            key,
            DataType::Int64,
            anti,
            vec![DataType::Int32],
        );
        run(&mut exec, &ctx)
    }

    fn with_null(values: &[i64]) -> Vec<Vec<Value>> {
        let mut rows = ints(values);
        rows.push(vec![Value::Null]);
        rows
    }

    #[test]
    fn test_in_subquery() {
        let right = vec![vec![Value::Int32(2)], vec![Value::Int32(4)], vec![Value::Int32(2)]];
        assert_eq!(semi(&with_null(&[1, 2, 3, 4]), &right, false), ints(&[2, 4]));
        assert_eq!(semi(&with_null(&[1, 2, 3, 4]), &right, true), ints(&[1, 3]));
    }

    #[test]
    fn test_not_in_with_null_in_subquery() {
        let right = vec![vec![Value::Int32(2)], vec![Value::Null]];
        assert!(semi(&ints(&[1, 2, 3]), &right, true).is_empty());
        assert_eq!(semi(&ints(&[1, 2, 3]), &right, false), ints(&[2]));
    }

    #[test]
    fn test_not_in_empty_subquery() {
        let left = with_null(&[1, 2]);
        assert_eq!(semi(&left, &[], true), left);
        assert!(semi(&left, &[], false).is_empty());
    }
}
