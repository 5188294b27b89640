//! Common table expression materialization.
//!
//! The definition is drained into a query-scoped temporary [`Table`] that
//! `CteScan` nodes read through the regular scan cache. For `WITH RECURSIVE`
//! the same slot first holds the working table (the previous iteration's new
//! rows) while the step runs, then the accumulated result.

use super::set_op::RowSet;
use super::{chunk_ranges, drain, BlockOperator, ExecContext};
use crate::planner::Schema;
use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use strata_core::block::FlatColumns;
use strata_core::schema::TableSchema;
use strata_core::{DataType, Result, Row};
use strata_storage::Table;
use tracing::{debug, warn};

/// Materializes a CTE, then streams the consuming query.
pub struct CteMaterializeExecutor {
    consumer: Box<dyn BlockOperator>,
    base: Box<dyn BlockOperator>,
    step: Option<Box<dyn BlockOperator>>,
    slot: usize,
    name: String,
    union_all: bool,
    schema: Schema,
}

impl CteMaterializeExecutor {
    pub fn new(
        consumer: Box<dyn BlockOperator>,
        base: Box<dyn BlockOperator>,
        step: Option<Box<dyn BlockOperator>>,
        slot: usize,
        name: String,
        union_all: bool,
        schema: Schema,
    ) -> Self {
        Self {
            consumer,
            base,
            step,
            slot,
            name,
            union_all,
            schema,
        }
    }

    fn temporary_table(&self) -> Table {
        let columns = self
            .schema
            .fields()
            .iter()
            .map(|f| (f.name.clone(), f.data_type));
        Table::new(0, TableSchema::from_columns(self.name.clone(), columns))
    }

    /// Replaces the contents of the slot's table with `rows`.
    fn load(&self, ctx: &ExecContext<'_>, rows: &FlatColumns) {
        let mut table = match ctx.take_cte_table(self.slot) {
            Some(t) => Rc::unwrap_or_clone(t),
            None => self.temporary_table(),
        };
        table.load_temporary(to_rows(rows));
        ctx.set_cte_table(self.slot, Rc::new(table));
    }

    fn recurse(&mut self, ctx: &ExecContext<'_>, base: FlatColumns, types: &[DataType]) -> Result<FlatColumns> {
        let mut seen = (!self.union_all).then(|| RowSet::new(types));
        let mut total = FlatColumns::new(types);
        let mut working = keep_new(seen.as_mut(), &base, types)?;
        append_all(&mut total, &working)?;
        let limit = ctx.config.max_recursive_iterations;
        let mut iterations = 0;
        while !working.is_empty() {
            if iterations == limit {
                warn!(cte = %self.name, iterations, "recursive CTE stopped at the iteration limit");
                break;
            }
            iterations += 1;
            self.load(ctx, &working);
            let Some(step) = self.step.as_mut() else {
                break;
            };
            step.open(ctx)?;
            let produced = drain(step.as_mut(), ctx, types);
            step.close();
            working = keep_new(seen.as_mut(), &produced?, types)?;
            append_all(&mut total, &working)?;
        }
        debug!(cte = %self.name, iterations, rows = total.len(), "recursive CTE materialized");
        Ok(total)
    }
}

fn to_rows(rows: &FlatColumns) -> Vec<Row> {
    (0..rows.len()).map(|r| Row::new(rows.row_values(r))).collect()
}

fn append_all(dst: &mut FlatColumns, src: &FlatColumns) -> Result<()> {
    for (start, len) in chunk_ranges(src.len()) {
        dst.append_block(&src.slice_block(start, len))?;
    }
    Ok(())
}

/// Rows of `rows` not yet in `seen`; every row when `seen` is `None`.
fn keep_new(seen: Option<&mut RowSet>, rows: &FlatColumns, types: &[DataType]) -> Result<FlatColumns> {
    let Some(seen) = seen else {
        return Ok(rows.clone());
    };
    let mut out = FlatColumns::new(types);
    for (start, len) in chunk_ranges(rows.len()) {
        let block = rows.slice_block(start, len);
        for pos in 0..len {
            if seen.insert(&block, pos)? {
                out.append_position(&block, pos)?;
            }
        }
    }
    Ok(out)
}

impl BlockOperator for CteMaterializeExecutor {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        let types = self.schema.types();
        self.base.open(ctx)?;
        let base = drain(self.base.as_mut(), ctx, &types);
        self.base.close();
        let base = base?;
        let rows = if self.step.is_some() {
            self.recurse(ctx, base, &types)?
        } else {
            base
        };
        self.load(ctx, &rows);
        debug!(cte = %self.name, slot = self.slot, rows = rows.len(), "CTE materialized");
        self.consumer.open(ctx)
    }

    fn next(&mut self, ctx: &ExecContext<'_>) -> Result<Option<strata_core::block::RowBlock>> {
        self.consumer.next(ctx)
    }

    fn close(&mut self) {
        self.consumer.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::QueryArena;
    use crate::ast::{BinaryOp, CompareOp};
    use crate::config::EngineConfig;
    use crate::executor::test_util::{ints, run};
    use crate::executor::{CteScanExecutor, ExprProjectExecutor, FilterExecutor, ValuesExecutor};
    use crate::planner::{Field, PhysExpr};
    use alloc::vec;
    use strata_core::Value;
    use strata_storage::Database;

    fn schema() -> Schema {
        Schema::new(vec![Field::new(Some("nums"), "n", DataType::Int64)])
    }

    /// `WITH RECURSIVE nums(n) AS (SELECT 1 UNION [ALL] SELECT n + 1 FROM nums WHERE n < bound)`
    fn counting(arena: &mut QueryArena, bound: Value, union_all: bool) -> CteMaterializeExecutor {
        let col = arena.phys_exprs.push(PhysExpr::Column(0)).unwrap();
        let one = arena.phys_exprs.push(PhysExpr::Literal(Value::Int64(1))).unwrap();
        let limit = arena.phys_exprs.push(PhysExpr::Literal(bound)).unwrap();
        let plus = arena
            .phys_exprs
            .push(PhysExpr::Binary {
                op: BinaryOp::Add,
                left: col,
                right: one,
            })
            .unwrap();
        let below = arena
            .phys_exprs
            .push(PhysExpr::Compare {
                op: CompareOp::Lt,
                left: col,
                right: limit,
            })
            .unwrap();
        let step = ExprProjectExecutor::new(
            Box::new(FilterExecutor::new(Box::new(CteScanExecutor::new(0)), below)),
            vec![plus],
            vec![DataType::Int64],
        );
        CteMaterializeExecutor::new(
            Box::new(CteScanExecutor::new(0)),
            Box::new(ValuesExecutor::new(vec![vec![Value::Int64(1)]], vec![DataType::Int64])),
            Some(Box::new(step)),
            0,
            String::from("nums"),
            union_all,
            schema(),
        )
    }

    #[test]
    fn test_recursive_counting() {
        let mut arena = QueryArena::new();
        let mut exec = counting(&mut arena, Value::Int64(5), true);
        let db = Database::new();
        let config = EngineConfig::default();
        let ctx = ExecContext::new(&db, &arena, &config);
        assert_eq!(run(&mut exec, &ctx), ints(&[1, 2, 3, 4, 5]));
    }

    #[test]
    fn test_recursive_iteration_limit() {
        let mut arena = QueryArena::new();
        let mut exec = counting(&mut arena, Value::Int64(1_000_000), true);
        let db = Database::new();
        let config = EngineConfig::default().with_max_recursive_iterations(3);
        let ctx = ExecContext::new(&db, &arena, &config);
        // base row plus three iterations
        assert_eq!(run(&mut exec, &ctx), ints(&[1, 2, 3, 4]));
    }

    #[test]
    fn test_non_recursive_cte() {
        let db = Database::new();
        let arena = QueryArena::new();
        let config = EngineConfig::default();
        let ctx = ExecContext::new(&db, &arena, &config);
        let mut exec = CteMaterializeExecutor::new(
            Box::new(CteScanExecutor::new(2)),
            Box::new(ValuesExecutor::new(ints(&[7, 8]), vec![DataType::Int64])),
            None,
            2,
            String::from("pair"),
            false,
            schema(),
        );
        assert_eq!(run(&mut exec, &ctx), ints(&[7, 8]));
        assert_eq!(ctx.cte_table(2).unwrap().len(), 2);
    }

    #[test]
    fn test_union_stops_on_repeats() {
        // n -> n % 3 + 1 cycles 1, 2, 3; UNION discards repeats so iteration ends
        let mut arena = QueryArena::new();
        let col = arena.phys_exprs.push(PhysExpr::Column(0)).unwrap();
        let three = arena.phys_exprs.push(PhysExpr::Literal(Value::Int64(3))).unwrap();
        let one = arena.phys_exprs.push(PhysExpr::Literal(Value::Int64(1))).unwrap();
        let modulo = arena
            .phys_exprs
            .push(PhysExpr::Binary {
                op: BinaryOp::Mod,
                left: col,
                right: three,
            })
            .unwrap();
        let next = arena
            .phys_exprs
            .push(PhysExpr::Binary {
                op: BinaryOp::Add,
                left: modulo,
                right: one,
            })
            .unwrap();
        let step = ExprProjectExecutor::new(Box::new(CteScanExecutor::new(0)), vec![next], vec![DataType::Int64]);
        let mut exec = CteMaterializeExecutor::new(
            Box::new(CteScanExecutor::new(0)),
            Box::new(ValuesExecutor::new(ints(&[1]), vec![DataType::Int64])),
            Some(Box::new(step)),
            0,
            String::from("cycle"),
            false,
            schema(),
        );
        let db = Database::new();
        let config = EngineConfig::default();
        let ctx = ExecContext::new(&db, &arena, &config);
        assert_eq!(run(&mut exec, &ctx), ints(&[1, 2, 3]));
    }
}
