//! Projection executors.

use super::{eval_columns, BlockOperator, ExecContext};
use crate::planner::PhysExprId;
use alloc::boxed::Box;
use alloc::vec::Vec;
use strata_core::block::RowBlock;
use strata_core::{DataType, Result};

/// Keeps a subset of input columns. Column data and selection are shared.
pub struct ProjectExecutor {
    input: Box<dyn BlockOperator>,
    columns: Vec<usize>,
}

impl ProjectExecutor {
    pub fn new(input: Box<dyn BlockOperator>, columns: Vec<usize>) -> Self {
        Self { input, columns }
    }
}

impl BlockOperator for ProjectExecutor {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        self.input.open(ctx)
    }

    fn next(&mut self, ctx: &ExecContext<'_>) -> Result<Option<RowBlock>> {
        Ok(self.input.next(ctx)?.map(|b| b.project(&self.columns)))
    }

    fn close(&mut self) {
        self.input.close();
    }
}

/// Computes one output column per expression over the visible input rows.
pub struct ExprProjectExecutor {
    input: Box<dyn BlockOperator>,
    exprs: Vec<PhysExprId>,
    types: Vec<DataType>,
}

impl ExprProjectExecutor {
    pub fn new(input: Box<dyn BlockOperator>, exprs: Vec<PhysExprId>, types: Vec<DataType>) -> Self {
        Self { input, exprs, types }
    }
}

impl BlockOperator for ExprProjectExecutor {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        self.input.open(ctx)
    }

    fn next(&mut self, ctx: &ExecContext<'_>) -> Result<Option<RowBlock>> {
        let Some(block) = self.input.next(ctx)? else {
            return Ok(None);
        };
        let columns = eval_columns(ctx, &self.exprs, &self.types, &block)?;
        Ok(Some(RowBlock::new(columns, block.row_count())))
    }

    fn close(&mut self) {
        self.input.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::QueryArena;
    use crate::ast::BinaryOp;
    use crate::config::EngineConfig;
    use crate::executor::test_util::{run, text, BlocksSource};
    use crate::planner::PhysExpr;
    use alloc::vec;
    use strata_core::block::SelectionVector;
    use strata_core::{FlatColumns, Value};
    use strata_storage::Database;

    fn source() -> BlocksSource {
        let mut flat = FlatColumns::new(&[DataType::Int32, DataType::Text]);
        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            flat.append_values(&[Value::Int32(i as i32), text(name)]).unwrap();
        }
        let block = flat
            .slice_block(0, 3)
            .with_selection(SelectionVector::from_sorted(vec![0, 2]));
        BlocksSource::new(vec![block])
    }

    #[test]
    fn test_project_shares_selection() {
        let db = Database::new();
        let arena = QueryArena::new();
        let config = EngineConfig::default();
        let ctx = ExecContext::new(&db, &arena, &config);
        let mut project = ProjectExecutor::new(Box::new(source()), vec![1]);
        assert_eq!(run(&mut project, &ctx), vec![vec![text("a")], vec![text("c")]]);
    }

    #[test]
    fn test_expr_project() {
        let mut arena = QueryArena::new();
        let col = arena.phys_exprs.push(PhysExpr::Column(0)).unwrap();
        let ten = arena.phys_exprs.push(PhysExpr::Literal(Value::Int32(10))).unwrap();
        let mul = arena
            .phys_exprs
            .push(PhysExpr::Binary {
                op: BinaryOp::Mul,
                left: col,
                right: ten,
            })
            .unwrap();
        let name = arena.phys_exprs.push(PhysExpr::Column(1)).unwrap();
        let db = Database::new();
        let config = EngineConfig::default();
        let ctx = ExecContext::new(&db, &arena, &config);
        let mut project = ExprProjectExecutor::new(
            Box::new(source()),
            vec![name, mul],
            vec![DataType::Text, DataType::Int64],
        );
        let rows = run(&mut project, &ctx);
        assert_eq!(
            rows,
            vec![vec![text("a"), Value::Int64(0)], vec![text("c"), Value::Int64(20)]]
        );
    }
}
