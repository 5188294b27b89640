//! Row sources that read no table: constant rows and `generate_series`.

use super::{eval_const, BlockOperator, BufferCursor, ExecContext};
use crate::planner::PhysExprId;
use alloc::vec::Vec;
use strata_core::block::{ColumnBlock, FlatColumns, RowBlock};
use strata_core::{DataType, Error, Result, Value, BLOCK_CAPACITY};

/// Emits a fixed list of rows.
pub struct ValuesExecutor {
    rows: Vec<Vec<Value>>,
    types: Vec<DataType>,
    cursor: BufferCursor,
}

impl ValuesExecutor {
    pub fn new(rows: Vec<Vec<Value>>, types: Vec<DataType>) -> Self {
        Self {
            rows,
            types,
            cursor: BufferCursor::default(),
        }
    }
}

impl BlockOperator for ValuesExecutor {
    fn open(&mut self, _ctx: &ExecContext<'_>) -> Result<()> {
        let mut flat = FlatColumns::new(&self.types);
        for row in &self.rows {
            flat.append_values(row)?;
        }
        self.cursor = BufferCursor::new(flat, None);
        Ok(())
    }

    fn next(&mut self, _ctx: &ExecContext<'_>) -> Result<Option<RowBlock>> {
        Ok(self.cursor.next_block())
    }

    fn close(&mut self) {
        self.cursor.clear();
    }
}

/// `generate_series(start, stop[, step])` over 64-bit integers, both ends inclusive.
pub struct GenerateSeriesExecutor {
    start: PhysExprId,
    stop: PhysExprId,
    step: Option<PhysExprId>,
    state: Option<(i64, i64, i64)>,
}

impl GenerateSeriesExecutor {
    pub fn new(start: PhysExprId, stop: PhysExprId, step: Option<PhysExprId>) -> Self {
        Self {
            start,
            stop,
            step,
            state: None,
        }
    }
}

fn series_arg(v: Value) -> Result<Option<i64>> {
    match v {
        Value::Null => Ok(None),
        Value::Float64(f) if libm::trunc(f) == f => Ok(Some(f as i64)),
        other => other
            .as_i64()
            .map(Some)
            .ok_or_else(|| Error::type_mismatch(DataType::Int64, other.data_type().unwrap_or(DataType::Int64))),
    }
}

impl BlockOperator for GenerateSeriesExecutor {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        let start = series_arg(eval_const(ctx, self.start)?)?;
        let stop = series_arg(eval_const(ctx, self.stop)?)?;
        let step = match self.step {
            Some(s) => series_arg(eval_const(ctx, s)?)?,
            None => Some(1),
        };
        if step == Some(0) {
            return Err(Error::invalid_parameter("step size cannot equal zero"));
        }
        self.state = match (start, stop, step) {
            (Some(a), Some(b), Some(s)) => Some((a, b, s)),
            _ => None,
        };
        Ok(())
    }

    fn next(&mut self, _ctx: &ExecContext<'_>) -> Result<Option<RowBlock>> {
        let Some((current, stop, step)) = self.state else {
            return Ok(None);
        };
        let mut column = ColumnBlock::with_capacity(DataType::Int64, BLOCK_CAPACITY);
        let mut value = Some(current);
        while let Some(v) = value {
            if (step > 0 && v > stop) || (step < 0 && v < stop) || column.len() == BLOCK_CAPACITY {
                break;
            }
            column.push(&Value::Int64(v))?;
            value = v.checked_add(step);
        }
        self.state = match value {
            Some(v) if column.len() == BLOCK_CAPACITY => Some((v, stop, step)),
            _ => None,
        };
        if column.is_empty() {
            return Ok(None);
        }
        let len = column.len();
        Ok(Some(RowBlock::from_columns(alloc::vec![column], len)))
    }

    fn close(&mut self) {
        self.state = None;
    }
}
