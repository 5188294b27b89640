//! Filter executor.
//!
//! A filter never copies column data: it narrows the selection vector of each
//! input block. Comparisons of a column against a constant run column-wise;
//! AND narrows the candidates left to right, OR unions what each side keeps.
//! Everything else is evaluated row by row.

use super::{BlockOperator, ExecContext};
use crate::arena::check_scratch;
use crate::ast::CompareOp;
use crate::eval::{self, BlockRow};
use crate::planner::{PhysExpr, PhysExprId};
use alloc::boxed::Box;
use bumpalo::Bump;
use core::cmp::Ordering;
use strata_core::block::{ColumnBlock, ColumnData, RowBlock, SelectionVector};
use strata_core::{Result, Value};

/// Keeps the rows for which the predicate is true.
pub struct FilterExecutor {
    input: Box<dyn BlockOperator>,
    predicate: PhysExprId,
    scratch: Bump,
}

impl FilterExecutor {
    pub fn new(input: Box<dyn BlockOperator>, predicate: PhysExprId) -> Self {
        Self {
            input,
            predicate,
            scratch: Bump::new(),
        }
    }
}

impl BlockOperator for FilterExecutor {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        self.input.open(ctx)
    }

    fn next(&mut self, ctx: &ExecContext<'_>) -> Result<Option<RowBlock>> {
        let Some(block) = self.input.next(ctx)? else {
            return Ok(None);
        };
        let candidates = match block.selection() {
            Some(sel) => sel.clone(),
            None => SelectionVector::all(block.physical_len()),
        };
        self.scratch.reset();
        let selection = select(ctx, &self.scratch, self.predicate, &block, &candidates)?;
        check_scratch(&self.scratch, ctx.config.scratch_limit_bytes)?;
        Ok(Some(block.with_selection(selection)))
    }

    fn close(&mut self) {
        self.input.close();
        self.scratch.reset();
    }
}

/// Positions of `candidates` for which `predicate` is true.
pub(crate) fn select(
    ctx: &ExecContext<'_>,
    scratch: &Bump,
    predicate: PhysExprId,
    block: &RowBlock,
    candidates: &SelectionVector,
) -> Result<SelectionVector> {
    if candidates.is_empty() {
        return Ok(SelectionVector::new());
    }
    let phys = &ctx.arena.phys_exprs;
    match &phys[predicate] {
        PhysExpr::Compare { op, left, right } => match (&phys[*left], &phys[*right]) {
            (PhysExpr::Column(c), PhysExpr::Literal(v)) => {
                return Ok(select_compare(block.column(*c), candidates, *op, v))
            }
            (PhysExpr::Literal(v), PhysExpr::Column(c)) => {
                return Ok(select_compare(block.column(*c), candidates, op.flip(), v))
            }
            _ => {}
        },
        PhysExpr::And(a, b) => {
            let kept = select(ctx, scratch, *a, block, candidates)?;
            return select(ctx, scratch, *b, block, &kept);
        }
        PhysExpr::Or(a, b) => {
            let left = select(ctx, scratch, *a, block, candidates)?;
            let rest = candidates.difference(&left);
            let right = select(ctx, scratch, *b, block, &rest)?;
            return Ok(left.union(&right));
        }
        PhysExpr::IsNull { expr, negated } => {
            if let PhysExpr::Column(c) = phys[*expr] {
                let column = block.column(c);
                let mut out = SelectionVector::with_capacity(candidates.len());
                for pos in candidates.iter() {
                    if column.is_null(pos) != *negated {
                        out.push(pos as u32);
                    }
                }
                return Ok(out);
            }
        }
        _ => {}
    }
    let mut hits = bumpalo::collections::Vec::with_capacity_in(candidates.len(), scratch);
    for pos in candidates.iter() {
        if eval::eval_predicate(ctx, predicate, &BlockRow { block, pos })? == Some(true) {
            hits.push(pos as u32);
        }
    }
    Ok(SelectionVector::from_sorted(hits.as_slice().to_vec()))
}

/// Column-wise `column <op> literal` over `candidates`. Nulls never qualify.
pub(crate) fn select_compare(
    column: &ColumnBlock,
    candidates: &SelectionVector,
    op: CompareOp,
    literal: &Value,
) -> SelectionVector {
    let mut out = SelectionVector::with_capacity(candidates.len());
    if literal.is_null() {
        return out;
    }
    macro_rules! scan {
        ($data:expr, $lit:expr) => {{
            let lit = $lit;
            for pos in candidates.iter() {
                if !column.is_null(pos) && op.matches($data[pos].cmp(&lit)) {
                    out.push(pos as u32);
                }
            }
        }};
    }
    match (column.data(), literal) {
        (ColumnData::Int64(d), Value::Int64(v)) => scan!(d, *v),
        (ColumnData::Int64(d), Value::Int32(v)) => scan!(d, *v as i64),
        (ColumnData::Int32(d), Value::Int32(v)) => scan!(d, *v),
        (ColumnData::Int32(d), Value::Int64(v)) if i32::try_from(*v).is_ok() => scan!(d, *v as i32),
        (ColumnData::Date(d), Value::Date(v)) => scan!(d, *v),
        (ColumnData::Timestamp(d), Value::Timestamp(v)) => scan!(d, *v),
        (ColumnData::Text(d), Value::Text(v)) => {
            for pos in candidates.iter() {
                if !column.is_null(pos) && op.matches(d.get(pos).cmp(v.as_str())) {
                    out.push(pos as u32);
                }
            }
        }
        _ => {
            for pos in candidates.iter() {
                let hit = column
                    .value(pos)
                    .sql_cmp(literal)
                    .is_some_and(|o: Ordering| op.matches(o));
                if hit {
                    out.push(pos as u32);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::QueryArena;
    use crate::config::EngineConfig;
    use crate::executor::test_util::{run, BlocksSource};
    use alloc::vec;
    use alloc::vec::Vec;
    use strata_core::DataType;
    use strata_storage::Database;

    fn values(v: &[Option<i64>]) -> Vec<Vec<Value>> {
        v.iter().map(|x| vec![Value::from(*x)]).collect()
    }

    #[test]
    fn test_select_compare_typed() {
        let col = ColumnBlock::from_values(
            DataType::Int32,
            &[Value::Int32(5), Value::Null, Value::Int32(15), Value::Int32(25)],
        )
        .unwrap();
        let all = SelectionVector::all(4);
        let out = select_compare(&col, &all, CompareOp::Gt, &Value::Int64(10));
        assert_eq!(out.as_slice(), &[2, 3]);
        let out = select_compare(&col, &all, CompareOp::Ne, &Value::Float64(15.0));
        assert_eq!(out.as_slice(), &[0, 3]);
        assert!(select_compare(&col, &all, CompareOp::Eq, &Value::Null).is_empty());
    }

    #[test]
    fn test_filter_and_or() {
        let mut arena = QueryArena::new();
        let col = arena.phys_exprs.push(PhysExpr::Column(0)).unwrap();
        let ten = arena.phys_exprs.push(PhysExpr::Literal(Value::Int64(10))).unwrap();
        let thirty = arena.phys_exprs.push(PhysExpr::Literal(Value::Int64(30))).unwrap();
        let gt = arena
            .phys_exprs
            .push(PhysExpr::Compare {
                op: CompareOp::Gt,
                left: col,
                right: ten,
            })
            .unwrap();
        let lt = arena
            .phys_exprs
            .push(PhysExpr::Compare {
                op: CompareOp::Lt,
                left: col,
                right: thirty,
            })
            .unwrap();
        let is_null = arena
            .phys_exprs
            .push(PhysExpr::IsNull {
                expr: col,
                negated: false,
            })
            .unwrap();
        let both = arena.phys_exprs.push(PhysExpr::And(gt, lt)).unwrap();
        let either = arena.phys_exprs.push(PhysExpr::Or(both, is_null)).unwrap();

        let db = Database::new();
        let config = EngineConfig::default();
        let ctx = ExecContext::new(&db, &arena, &config);
        let input = values(&[Some(5), Some(20), None, Some(40), Some(25)]);
        let source = BlocksSource::rows(&[DataType::Int64], &input);
        let mut filter = FilterExecutor::new(Box::new(source), either);
        let rows = run(&mut filter, &ctx);
        assert_eq!(rows, values(&[Some(20), None, Some(25)]));
    }

    #[test]
    fn test_filter_generic_predicate() {
        let mut arena = QueryArena::new();
        let col = arena.phys_exprs.push(PhysExpr::Column(0)).unwrap();
        let two = arena.phys_exprs.push(PhysExpr::Literal(Value::Int64(2))).unwrap();
        let modulo = arena
            .phys_exprs
            .push(PhysExpr::Binary {
                op: crate::ast::BinaryOp::Mod,
                left: col,
                right: two,
            })
            .unwrap();
        let zero = arena.phys_exprs.push(PhysExpr::Literal(Value::Int64(0))).unwrap();
        let even = arena
            .phys_exprs
            .push(PhysExpr::Compare {
                op: CompareOp::Eq,
                left: modulo,
                right: zero,
            })
            .unwrap();
        let db = Database::new();
        let config = EngineConfig::default();
        let ctx = ExecContext::new(&db, &arena, &config);
        let input = values(&[Some(1), Some(2), Some(3), Some(4), None]);
        let source = BlocksSource::rows(&[DataType::Int64], &input);
        let mut filter = FilterExecutor::new(Box::new(source), even);
        assert_eq!(run(&mut filter, &ctx), values(&[Some(2), Some(4)]));
    }

    #[test]
    fn test_filter_scratch_limit() {
        let mut arena = QueryArena::new();
        let col = arena.phys_exprs.push(PhysExpr::Column(0)).unwrap();
        let not_null = arena
            .phys_exprs
            .push(PhysExpr::IsNull {
                expr: col,
                negated: true,
            })
            .unwrap();
        let neg = arena.phys_exprs.push(PhysExpr::Not(not_null)).unwrap();
        let db = Database::new();
        let config = EngineConfig::default().with_scratch_limit_bytes(1);
        let ctx = ExecContext::new(&db, &arena, &config);
        let input = values(&[Some(1), Some(2)]);
        let source = BlocksSource::rows(&[DataType::Int64], &input);
        let mut filter = FilterExecutor::new(Box::new(source), neg);
        filter.open(&ctx).unwrap();
        assert_eq!(filter.next(&ctx).unwrap_err().sqlstate(), "53200");
    }
}
