//! Hash aggregate executor.
//!
//! Groups are found through a [`BlockHashTable`] over the evaluated key
//! columns, with NULL keys grouping together. Each group owns one
//! accumulator per aggregate; `DISTINCT` aggregates also keep the set of
//! values already folded.

use super::{BlockOperator, BufferCursor, ExecContext};
use crate::ast::AggFunc;
use crate::eval::{self, key_value};
use crate::hash_table::{keys_same, BlockHashTable, KeyHasher};
use crate::planner::AggSpec;
use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cmp::Ordering;
use hashbrown::HashSet;
use strata_core::block::{ColumnBlock, FlatColumns, RowBlock};
use strata_core::{DataType, Error, Result, Value};
use tracing::debug;

/// Running state of one aggregate within one group.
#[derive(Clone, Debug)]
pub(crate) enum Accumulator {
    Count(i64),
    SumInt(Option<i64>),
    SumFloat(Option<f64>),
    Avg { sum: f64, count: i64 },
    Min(Option<Value>),
    Max(Option<Value>),
    /// Welford's running mean and sum of squared deviations.
    Moments { count: i64, mean: f64, m2: f64, stddev: bool },
    BoolAnd(Option<bool>),
    BoolOr(Option<bool>),
    StringAgg(Option<String>),
}

impl Accumulator {
    pub(crate) fn new(func: AggFunc, output_type: DataType) -> Self {
        match func {
            AggFunc::CountStar | AggFunc::Count => Accumulator::Count(0),
            AggFunc::Sum if output_type.is_integer() => Accumulator::SumInt(None),
            AggFunc::Sum => Accumulator::SumFloat(None),
            AggFunc::Avg => Accumulator::Avg { sum: 0.0, count: 0 },
            AggFunc::Min => Accumulator::Min(None),
            AggFunc::Max => Accumulator::Max(None),
            AggFunc::StdDev | AggFunc::Variance => Accumulator::Moments {
                count: 0,
                mean: 0.0,
                m2: 0.0,
                stddev: func == AggFunc::StdDev,
            },
            AggFunc::BoolAnd => Accumulator::BoolAnd(None),
            AggFunc::BoolOr => Accumulator::BoolOr(None),
            AggFunc::StringAgg => Accumulator::StringAgg(None),
        }
    }

    /// Folds one input row. `COUNT(*)` receives a non-null placeholder.
    pub(crate) fn update(&mut self, value: &Value, separator: &Value) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }
        match self {
            Accumulator::Count(n) => *n += 1,
            Accumulator::SumInt(sum) => {
                let v = value
                    .as_i64()
                    .ok_or_else(|| Error::type_mismatch(DataType::Int64, value.data_type().unwrap_or(DataType::Int64)))?;
                *sum = Some(
                    sum.unwrap_or(0)
                        .checked_add(v)
                        .ok_or_else(|| Error::overflow("bigint"))?,
                );
            }
            Accumulator::SumFloat(sum) => {
                let v = numeric(value)?;
                *sum = Some(sum.unwrap_or(0.0) + v);
            }
            Accumulator::Avg { sum, count } => {
                *sum += numeric(value)?;
                *count += 1;
            }
            Accumulator::Min(current) => {
                if current
                    .as_ref()
                    .map_or(true, |c| value.sql_cmp(c) == Some(Ordering::Less))
                {
                    *current = Some(value.clone());
                }
            }
            Accumulator::Max(current) => {
                if current
                    .as_ref()
                    .map_or(true, |c| value.sql_cmp(c) == Some(Ordering::Greater))
                {
                    *current = Some(value.clone());
                }
            }
            Accumulator::Moments { count, mean, m2, .. } => {
                let x = numeric(value)?;
                *count += 1;
                let delta = x - *mean;
                *mean += delta / *count as f64;
                *m2 += delta * (x - *mean);
            }
            Accumulator::BoolAnd(acc) => {
                let b = eval::truth(value)?.unwrap_or(true);
                *acc = Some(acc.unwrap_or(true) && b);
            }
            Accumulator::BoolOr(acc) => {
                let b = eval::truth(value)?.unwrap_or(false);
                *acc = Some(acc.unwrap_or(false) || b);
            }
            Accumulator::StringAgg(acc) => {
                let text = value.cast_to(DataType::Text)?;
                let text = text.as_str().unwrap_or_default();
                match acc {
                    Some(s) => {
                        if let Some(sep) = separator.as_str() {
                            s.push_str(sep);
                        }
                        s.push_str(text);
                    }
                    None => *acc = Some(String::from(text)),
                }
            }
        }
        Ok(())
    }

    pub(crate) fn finish(&self) -> Value {
        match self {
            Accumulator::Count(n) => Value::Int64(*n),
            Accumulator::SumInt(sum) => sum.map_or(Value::Null, Value::Int64),
            Accumulator::SumFloat(sum) => sum.map_or(Value::Null, Value::Float64),
            Accumulator::Avg { sum, count } => {
                if *count == 0 {
                    Value::Null
                } else {
                    Value::Float64(*sum / *count as f64)
                }
            }
            Accumulator::Min(v) | Accumulator::Max(v) => v.clone().unwrap_or(Value::Null),
            Accumulator::Moments { count, m2, stddev, .. } => {
                if *count < 2 {
                    return Value::Null;
                }
                let variance = *m2 / (*count - 1) as f64;
                if *stddev {
                    Value::Float64(libm::sqrt(variance))
                } else {
                    Value::Float64(variance)
                }
            }
            Accumulator::BoolAnd(b) | Accumulator::BoolOr(b) => b.map_or(Value::Null, Value::Boolean),
            Accumulator::StringAgg(s) => s.clone().map_or(Value::Null, Value::Text),
        }
    }
}

fn numeric(value: &Value) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| Error::type_mismatch(DataType::Float64, value.data_type().unwrap_or(DataType::Float64)))
}

/// Accumulator plus the dedup set of a `DISTINCT` aggregate.
#[derive(Clone, Debug)]
pub(crate) struct AggState {
    acc: Accumulator,
    seen: Option<HashSet<Value>>,
}

impl AggState {
    pub(crate) fn new(spec: &AggSpec) -> Self {
        Self {
            acc: Accumulator::new(spec.func, spec.output_type),
            seen: spec.distinct.then(HashSet::new),
        }
    }

    pub(crate) fn update(&mut self, value: &Value, separator: &Value) -> Result<()> {
        if let Some(seen) = &mut self.seen {
            if value.is_null() || !seen.insert(key_value(value.clone())) {
                return Ok(());
            }
        }
        self.acc.update(value, separator)
    }

    pub(crate) fn finish(&self) -> Value {
        self.acc.finish()
    }
}

/// Evaluated argument and separator columns of every aggregate for one block.
struct BlockArgs {
    args: Vec<Option<Rc<ColumnBlock>>>,
    separators: Vec<Option<Rc<ColumnBlock>>>,
}

impl BlockArgs {
    fn evaluate(ctx: &ExecContext<'_>, aggregates: &[AggSpec], block: &RowBlock) -> Result<Self> {
        let mut args = Vec::with_capacity(aggregates.len());
        let mut separators = Vec::with_capacity(aggregates.len());
        for spec in aggregates {
            args.push(match spec.arg {
                Some(arg) => Some(eval::eval_column(ctx, arg, spec.input_type, block)?),
                None => None,
            });
            separators.push(match spec.separator {
                Some(sep) => Some(eval::eval_column(ctx, sep, DataType::Text, block)?),
                None => None,
            });
        }
        Ok(Self { args, separators })
    }

    fn fold(&self, states: &mut [AggState], row: usize) -> Result<()> {
        for (i, state) in states.iter_mut().enumerate() {
            let value = match &self.args[i] {
                Some(col) => col.value(row),
                None => Value::Boolean(true),
            };
            let separator = match &self.separators[i] {
                Some(col) => col.value(row),
                None => Value::Null,
            };
            state.update(&value, &separator)?;
        }
        Ok(())
    }
}

/// GROUP BY / aggregate node; emits one row per group at end of input.
pub struct AggregateExecutor {
    input: Box<dyn BlockOperator>,
    group_by: Vec<crate::planner::PhysExprId>,
    active: Vec<bool>,
    aggregates: Vec<AggSpec>,
    types: Vec<DataType>,
    cursor: BufferCursor,
}

impl AggregateExecutor {
    pub fn new(
        input: Box<dyn BlockOperator>,
        group_by: Vec<crate::planner::PhysExprId>,
        active: Vec<bool>,
        aggregates: Vec<AggSpec>,
        types: Vec<DataType>,
    ) -> Self {
        Self {
            input,
            group_by,
            active,
            aggregates,
            types,
            cursor: BufferCursor::default(),
        }
    }

    fn is_active(&self, key: usize) -> bool {
        self.active.get(key).copied().unwrap_or(true)
    }

    fn aggregate(&mut self, ctx: &ExecContext<'_>) -> Result<FlatColumns> {
        let key_positions: Vec<usize> = (0..self.group_by.len()).filter(|&k| self.is_active(k)).collect();
        let key_types: Vec<DataType> = key_positions.iter().map(|&k| self.types[k]).collect();
        let key_exprs: Vec<_> = key_positions.iter().map(|&k| self.group_by[k]).collect();

        let hasher = KeyHasher::new();
        let mut table = BlockHashTable::with_capacity(64);
        let mut keys = FlatColumns::new(&key_types);
        let mut groups: Vec<Vec<AggState>> = Vec::new();
        let fresh = |aggregates: &[AggSpec]| aggregates.iter().map(AggState::new).collect::<Vec<_>>();
        if key_positions.is_empty() {
            groups.push(fresh(&self.aggregates));
        }

        while let Some(block) = self.input.next(ctx)? {
            if block.is_empty() {
                continue;
            }
            let args = BlockArgs::evaluate(ctx, &self.aggregates, &block)?;
            if key_positions.is_empty() {
                for row in 0..block.row_count() {
                    args.fold(&mut groups[0], row)?;
                }
                continue;
            }
            let key_columns = super::eval_columns(ctx, &key_exprs, &key_types, &block)?;
            let key_refs: Vec<&ColumnBlock> = key_columns.iter().map(|c| c.as_ref()).collect();
            let count = block.row_count();
            let key_block = RowBlock::new(key_columns.clone(), count);
            for row in 0..count {
                let h = hasher.hash_row(key_refs.iter().copied(), row);
                let group = match table.find(h, |g| keys_same(&key_refs, row, &keys, g)) {
                    Some(g) => g as usize,
                    None => {
                        let g = table.insert(h) as usize;
                        keys.append_position(&key_block, row)?;
                        groups.push(fresh(&self.aggregates));
                        g
                    }
                };
                args.fold(&mut groups[group], row)?;
            }
        }
        table.seal();
        debug!(groups = groups.len(), keys = key_positions.len(), "aggregated");

        let mut out = FlatColumns::new(&self.types);
        let mut row = Vec::with_capacity(self.types.len());
        for (g, states) in groups.iter().enumerate() {
            row.clear();
            let mut active_col = 0;
            for k in 0..self.group_by.len() {
                if self.is_active(k) {
                    row.push(keys.value(active_col, g));
                    active_col += 1;
                } else {
                    row.push(Value::Null);
                }
            }
            row.extend(states.iter().map(AggState::finish));
            out.append_values(&row)?;
        }
        Ok(out)
    }
}

impl BlockOperator for AggregateExecutor {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        self.input.open(ctx)?;
        let rows = self.aggregate(ctx)?;
        self.input.close();
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::QueryArena;
    use crate::config::EngineConfig;
    use crate::executor::test_util::{run, text, BlocksSource};
    use crate::planner::{PhysExpr, PhysExprId};
    use alloc::vec;
    use strata_storage::Database;

    fn spec(func: AggFunc, arg: Option<PhysExprId>, input: DataType, output: DataType) -> AggSpec {
        AggSpec {
            func,
            arg,
            distinct: false,
            separator: None,
            input_type: input,
            output_type: output,
        }
    }

    fn input() -> Vec<Vec<Value>> {
        vec![
            vec![Value::Int32(10), Value::Int32(1)],
            vec![Value::Int32(20), Value::Int32(5)],
            vec![Value::Int32(10), Value::Int32(3)],
            vec![Value::Null, Value::Int32(7)],
            vec![Value::Null, Value::Null],
        ]
    }

    fn aggregate(
        arena: &QueryArena,
        rows: &[Vec<Value>],
        group_by: Vec<PhysExprId>,
        active: Vec<bool>,
        aggs: Vec<AggSpec>,
        types: Vec<DataType>,
    ) -> Result<Vec<Vec<Value>>> {
        let db = Database::new();
        let config = EngineConfig::default();
        let ctx = ExecContext::new(&db, arena, &config);
        let source = BlocksSource::rows(&[DataType::Int32, DataType::Int32], rows);
        let mut exec = AggregateExecutor::new(Box::new(source), group_by, active, aggs, types);
        exec.open(&ctx)?;
        let mut out = Vec::new();
        while let Some(block) = exec.next(&ctx)? {
            out.extend(block.positions().map(|p| block.row_values(p)));
        }
        exec.close();
        Ok(out)
    }

    #[test]
    fn test_group_by_with_null_group() {
        let mut arena = QueryArena::new();
        let k = arena.phys_exprs.push(PhysExpr::Column(0)).unwrap();
        let v = arena.phys_exprs.push(PhysExpr::Column(1)).unwrap();
        let aggs = vec![
            spec(AggFunc::CountStar, None, DataType::Int64, DataType::Int64),
            spec(AggFunc::Sum, Some(v), DataType::Int32, DataType::Int64),
        ];
        let types = vec![DataType::Int32, DataType::Int64, DataType::Int64];
        let mut rows = aggregate(&arena, &input(), vec![k], vec![true], aggs, types).unwrap();
        rows.sort();
        assert_eq!(
            rows,
            vec![
                vec![Value::Null, Value::Int64(2), Value::Int64(7)],
                vec![Value::Int32(10), Value::Int64(2), Value::Int64(4)],
                vec![Value::Int32(20), Value::Int64(1), Value::Int64(5)],
            ]
        );
    }

    #[test]
    fn test_empty_input_without_keys() {
        let mut arena = QueryArena::new();
        let v = arena.phys_exprs.push(PhysExpr::Column(1)).unwrap();
        let aggs = vec![
            spec(AggFunc::Count, Some(v), DataType::Int32, DataType::Int64),
            spec(AggFunc::Sum, Some(v), DataType::Int32, DataType::Int64),
            spec(AggFunc::Max, Some(v), DataType::Int32, DataType::Int32),
        ];
        let types = vec![DataType::Int64, DataType::Int64, DataType::Int32];
        let rows = aggregate(&arena, &[], vec![], vec![], aggs, types).unwrap();
        assert_eq!(rows, vec![vec![Value::Int64(0), Value::Null, Value::Null]]);
    }

    #[test]
    fn test_empty_input_with_keys() {
        let mut arena = QueryArena::new();
        let k = arena.phys_exprs.push(PhysExpr::Column(0)).unwrap();
        let aggs = vec![spec(AggFunc::CountStar, None, DataType::Int64, DataType::Int64)];
        let rows = aggregate(
            &arena,
            &[],
            vec![k],
            vec![true],
            aggs,
            vec![DataType::Int32, DataType::Int64],
        )
        .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_inactive_key_is_null() {
        let mut arena = QueryArena::new();
        let k = arena.phys_exprs.push(PhysExpr::Column(0)).unwrap();
        let aggs = vec![spec(AggFunc::CountStar, None, DataType::Int64, DataType::Int64)];
        let rows = aggregate(
            &arena,
            &input(),
            vec![k],
            vec![false],
            aggs,
            vec![DataType::Int32, DataType::Int64],
        )
        .unwrap();
        assert_eq!(rows, vec![vec![Value::Null, Value::Int64(5)]]);
    }

    #[test]
    fn test_distinct_and_statistics() {
        let mut arena = QueryArena::new();
        let k = arena.phys_exprs.push(PhysExpr::Column(0)).unwrap();
        let v = arena.phys_exprs.push(PhysExpr::Column(1)).unwrap();
        let mut distinct_count = spec(AggFunc::Count, Some(k), DataType::Int32, DataType::Int64);
        distinct_count.distinct = true;
        let aggs = vec![
            distinct_count,
            spec(AggFunc::Avg, Some(v), DataType::Int32, DataType::Float64),
            spec(AggFunc::Variance, Some(v), DataType::Int32, DataType::Float64),
            spec(AggFunc::StdDev, Some(v), DataType::Int32, DataType::Float64),
            spec(AggFunc::Min, Some(v), DataType::Int32, DataType::Int32),
        ];
        let types = vec![
            DataType::Int64,
            DataType::Float64,
            DataType::Float64,
            DataType::Float64,
            DataType::Int32,
        ];
        let rows = aggregate(&arena, &input(), vec![], vec![], aggs, types).unwrap();
        // values 1, 5, 3, 7: mean 4, sample variance 20/3
        assert_eq!(rows[0][0], Value::Int64(2));
        assert_eq!(rows[0][1], Value::Float64(4.0));
        let variance = rows[0][2].as_f64().unwrap();
        assert!((variance - 20.0 / 3.0).abs() < 1e-9);
        let stddev = rows[0][3].as_f64().unwrap();
        assert!((stddev * stddev - variance).abs() < 1e-9);
        assert_eq!(rows[0][4], Value::Int32(1));
    }

    #[test]
    fn test_sum_overflow() {
        let mut arena = QueryArena::new();
        let v = arena.phys_exprs.push(PhysExpr::Column(0)).unwrap();
        let aggs = vec![spec(AggFunc::Sum, Some(v), DataType::Int64, DataType::Int64)];
        let db = Database::new();
        let config = EngineConfig::default();
        let ctx = ExecContext::new(&db, &arena, &config);
        let source = BlocksSource::rows(
            &[DataType::Int64],
            &[vec![Value::Int64(i64::MAX)], vec![Value::Int64(1)]],
        );
        let mut exec = AggregateExecutor::new(Box::new(source), vec![], vec![], aggs, vec![DataType::Int64]);
        assert_eq!(exec.open(&ctx).unwrap_err().sqlstate(), "22003");
    }

    #[test]
    fn test_string_agg_and_bool_aggs() {
        let mut arena = QueryArena::new();
        let v = arena.phys_exprs.push(PhysExpr::Column(0)).unwrap();
        let sep = arena.phys_exprs.push(PhysExpr::Literal(text(", "))).unwrap();
        let flag = arena.phys_exprs.push(PhysExpr::Column(1)).unwrap();
        let mut string_agg = spec(AggFunc::StringAgg, Some(v), DataType::Text, DataType::Text);
        string_agg.separator = Some(sep);
        let aggs = vec![
            string_agg,
            spec(AggFunc::BoolAnd, Some(flag), DataType::Boolean, DataType::Boolean),
            spec(AggFunc::BoolOr, Some(flag), DataType::Boolean, DataType::Boolean),
        ];
        let db = Database::new();
        let config = EngineConfig::default();
        let ctx = ExecContext::new(&db, &arena, &config);
        let source = BlocksSource::rows(
            &[DataType::Text, DataType::Boolean],
            &[
                vec![text("a"), Value::Boolean(true)],
                vec![Value::Null, Value::Null],
                vec![text("b"), Value::Boolean(false)],
            ],
        );
        let mut exec = AggregateExecutor::new(
            Box::new(source),
            vec![],
            vec![],
            aggs,
            vec![DataType::Text, DataType::Boolean, DataType::Boolean],
        );
        assert_eq!(
            run(&mut exec, &ctx),
            vec![vec![text("a, b"), Value::Boolean(false), Value::Boolean(true)]]
        );
    }
}
