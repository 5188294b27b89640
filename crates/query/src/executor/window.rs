//! Window executor.
//!
//! Materializes its input, then for each window function sorts row ids by
//! partition and order keys, walks the partitions computing frame bounds and
//! peer groups, and writes one result per input row. Output rows keep input
//! order, with one extra column per function.

use super::aggregate::Accumulator;
use super::{drain, BlockOperator, BufferCursor, ExecContext};
use crate::ast::{FrameBound, FrameMode, WindowFrame, WindowFunc};
use crate::eval::{self, FlatRow};
use crate::planner::{PhysExprId, WindowOrder, WindowSpec};
use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::cmp::Ordering;
use strata_core::block::{FlatColumns, RowBlock};
use strata_core::{DataType, Error, Result, Value};
use tracing::trace;

/// Computes window functions over the whole input.
pub struct WindowExecutor {
    input: Box<dyn BlockOperator>,
    functions: Vec<WindowSpec>,
    input_types: Vec<DataType>,
    types: Vec<DataType>,
    cursor: BufferCursor,
}

impl WindowExecutor {
    pub fn new(
        input: Box<dyn BlockOperator>,
        functions: Vec<WindowSpec>,
        input_types: Vec<DataType>,
        types: Vec<DataType>,
    ) -> Self {
        Self {
            input,
            functions,
            input_types,
            types,
            cursor: BufferCursor::default(),
        }
    }
}

impl BlockOperator for WindowExecutor {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        self.input.open(ctx)?;
        let rows = drain(self.input.as_mut(), ctx, &self.input_types)?;
        self.input.close();
        let mut results = Vec::with_capacity(self.functions.len());
        for spec in &self.functions {
            results.push(compute(ctx, &rows, spec)?);
        }
        let mut out = FlatColumns::new(&self.types);
        let mut row = Vec::with_capacity(self.types.len());
        for r in 0..rows.len() {
            row.clear();
            row.extend(rows.row_values(r));
            row.extend(results.iter().map(|col| col[r].clone()));
            out.append_values(&row)?;
        }
        trace!(rows = rows.len(), functions = self.functions.len(), "window computed");
        self.cursor = BufferCursor::new(out, None);
        Ok(())
    }

    fn next(&mut self, _ctx: &ExecContext<'_>) -> Result<Option<RowBlock>> {
        Ok(self.cursor.next_block())
    }

    fn close(&mut self) {
        self.cursor.clear();
    }
}

fn eval_all(ctx: &ExecContext<'_>, rows: &FlatColumns, exprs: &[PhysExprId], row: usize) -> Result<Vec<Value>> {
    let view = FlatRow { rows, row };
    exprs.iter().map(|&e| eval::eval(ctx, e, &view)).collect()
}

fn compare_order(order: &[WindowOrder], a: &[Value], b: &[Value]) -> Ordering {
    for (key, (x, y)) in order.iter().zip(a.iter().zip(b)) {
        let ord = match (x.is_null(), y.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) if key.nulls_first => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, true) if key.nulls_first => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ord = x.sql_cmp(y).unwrap_or(Ordering::Equal);
                if key.descending {
                    ord.reverse()
                } else {
                    ord
                }
            }
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// One sorted partition: row ids plus their order keys.
struct Partition<'a> {
    ids: &'a [u32],
    order: &'a [Vec<Value>],
    spec: &'a WindowSpec,
}

impl Partition<'_> {
    fn len(&self) -> usize {
        self.ids.len()
    }

    fn peers(&self, a: usize, b: usize) -> bool {
        let (x, y) = (&self.order[self.ids[a] as usize], &self.order[self.ids[b] as usize]);
        compare_order(&self.spec.order_by, x, y) == Ordering::Equal
    }

    /// `[start, end)` of the peer group of every position.
    fn peer_groups(&self) -> Vec<(usize, usize)> {
        let n = self.len();
        let mut groups = vec![(0, 0); n];
        let mut start = 0;
        while start < n {
            let mut end = start + 1;
            while end < n && self.peers(start, end) {
                end += 1;
            }
            for g in groups.iter_mut().take(end).skip(start) {
                *g = (start, end);
            }
            start = end;
        }
        groups
    }

    /// Frame of position `i` as a half-open range of positions.
    fn frame(&self, frame: &WindowFrame, i: usize, peers: (usize, usize)) -> Result<(usize, usize)> {
        let n = self.len();
        let start = match (frame.mode, frame.start) {
            (_, FrameBound::UnboundedPreceding) => 0,
            (_, FrameBound::UnboundedFollowing) => n,
            (FrameMode::Rows, FrameBound::CurrentRow) => i,
            (FrameMode::Range, FrameBound::CurrentRow) => peers.0,
            (FrameMode::Rows, FrameBound::Preceding(k)) => i.saturating_sub(k as usize),
            (FrameMode::Rows, FrameBound::Following(k)) => i.saturating_add(k as usize).min(n),
            (FrameMode::Range, _) => return Err(Error::not_supported("RANGE frame with an offset")),
        };
        let end = match (frame.mode, frame.end) {
            (_, FrameBound::UnboundedPreceding) => 0,
            (_, FrameBound::UnboundedFollowing) => n,
            (FrameMode::Rows, FrameBound::CurrentRow) => i + 1,
            (FrameMode::Range, FrameBound::CurrentRow) => peers.1,
            (FrameMode::Rows, FrameBound::Preceding(k)) => (i + 1).saturating_sub(k as usize),
            (FrameMode::Rows, FrameBound::Following(k)) => i.saturating_add(k as usize).saturating_add(1).min(n),
            (FrameMode::Range, _) => return Err(Error::not_supported("RANGE frame with an offset")),
        };
        Ok((start, end.max(start)))
    }
}

fn int_arg(value: &Value, what: &str) -> Result<Option<i64>> {
    match value {
        Value::Null => Ok(None),
        v => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| Error::invalid_parameter(alloc::format!("{what} must be an integer"))),
    }
}

/// Results of one window function, indexed by input row.
fn compute(ctx: &ExecContext<'_>, rows: &FlatColumns, spec: &WindowSpec) -> Result<Vec<Value>> {
    let n = rows.len();
    let order_exprs: Vec<PhysExprId> = spec.order_by.iter().map(|o| o.expr).collect();
    let mut partition_keys = Vec::with_capacity(n);
    let mut order_keys = Vec::with_capacity(n);
    let mut args = Vec::with_capacity(n);
    for r in 0..n {
        partition_keys.push(eval_all(ctx, rows, &spec.partition_by, r)?);
        order_keys.push(eval_all(ctx, rows, &order_exprs, r)?);
        args.push(eval_all(ctx, rows, &spec.args, r)?);
    }
    let mut ids: Vec<u32> = (0..n as u32).collect();
    ids.sort_by(|&a, &b| {
        let (a, b) = (a as usize, b as usize);
        partition_keys[a]
            .cmp(&partition_keys[b])
            .then_with(|| compare_order(&spec.order_by, &order_keys[a], &order_keys[b]))
    });

    let mut out = vec![Value::Null; n];
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && partition_keys[ids[end] as usize] == partition_keys[ids[start] as usize] {
            end += 1;
        }
        let part = Partition {
            ids: &ids[start..end],
            order: &order_keys,
            spec,
        };
        compute_partition(&part, &args, &mut out)?;
        start = end;
    }
    Ok(out)
}

fn compute_partition(part: &Partition<'_>, args: &[Vec<Value>], out: &mut [Value]) -> Result<()> {
    let n = part.len();
    let peers = part.peer_groups();
    let arg = |i: usize, a: usize| -> Value {
        args[part.ids[i] as usize].get(a).cloned().unwrap_or(Value::Null)
    };
    let mut dense = 0i64;
    let mut running: Option<((usize, usize), Accumulator)> = None;
    for i in 0..n {
        let row = part.ids[i] as usize;
        if peers[i].0 == i {
            dense += 1;
        }
        out[row] = match part.spec.func {
            WindowFunc::RowNumber => Value::Int64(i as i64 + 1),
            WindowFunc::Rank => Value::Int64(peers[i].0 as i64 + 1),
            WindowFunc::DenseRank => Value::Int64(dense),
            WindowFunc::PercentRank => {
                if n <= 1 {
                    Value::Float64(0.0)
                } else {
                    Value::Float64(peers[i].0 as f64 / (n - 1) as f64)
                }
            }
            WindowFunc::CumeDist => Value::Float64(peers[i].1 as f64 / n as f64),
            WindowFunc::Ntile => match int_arg(&arg(i, 0), "ntile bucket count")? {
                None => Value::Null,
                Some(k) if k <= 0 => {
                    return Err(Error::invalid_parameter("argument of ntile must be greater than zero"))
                }
                Some(k) => Value::Int64(ntile(i, n, k as usize)),
            },
            WindowFunc::Lag | WindowFunc::Lead => {
                let offset = if args[row].len() > 1 {
                    int_arg(&arg(i, 1), "lag/lead offset")?
                } else {
                    Some(1)
                };
                match offset {
                    None => Value::Null,
                    Some(k) => {
                        let target = if part.spec.func == WindowFunc::Lag {
                            (i as i64).checked_sub(k)
                        } else {
                            (i as i64).checked_add(k)
                        };
                        // an offset past either end of i64 is outside the partition too
                        match target.and_then(|t| usize::try_from(t).ok()).filter(|t| *t < n) {
                            Some(t) => arg(t, 0),
                            None => arg(i, 2),
                        }
                    }
                }
            }
            WindowFunc::FirstValue | WindowFunc::LastValue | WindowFunc::NthValue => {
                let (fs, fe) = part.frame(&part.spec.frame, i, peers[i])?;
                let pos = match part.spec.func {
                    WindowFunc::FirstValue => Some(fs),
                    WindowFunc::LastValue => fe.checked_sub(1),
                    _ => match int_arg(&arg(i, 1), "nth_value position")? {
                        Some(k) if k <= 0 => {
                            return Err(Error::invalid_parameter("argument of nth_value must be greater than zero"))
                        }
                        Some(k) => fs.checked_add(k as usize - 1),
                        None => None,
                    },
                };
                match pos {
                    Some(p) if p >= fs && p < fe => arg(p, 0),
                    _ => Value::Null,
                }
            }
            WindowFunc::Aggregate(func) => {
                let star = part.spec.args.is_empty();
                let frame = part.frame(&part.spec.frame, i, peers[i])?;
                let state = match running.take() {
                    // frames that only grow at the end extend the previous state
                    Some(((ps, pe), mut acc)) if ps == frame.0 && pe <= frame.1 => {
                        for p in pe..frame.1 {
                            fold(&mut acc, &arg, star, p)?;
                        }
                        (frame, acc)
                    }
                    _ => {
                        let mut acc = Accumulator::new(func, part.spec.output_type);
                        for p in frame.0..frame.1 {
                            fold(&mut acc, &arg, star, p)?;
                        }
                        (frame, acc)
                    }
                };
                let value = state.1.finish();
                running = Some(state);
                value
            }
        };
    }
    Ok(())
}

fn fold(acc: &mut Accumulator, arg: &dyn Fn(usize, usize) -> Value, star: bool, p: usize) -> Result<()> {
    let value = if star { Value::Boolean(true) } else { arg(p, 0) };
    acc.update(&value, &arg(p, 1))
}

/// 1-based bucket of position `i` when `n` rows are split into `k` buckets
/// whose sizes differ by at most one, larger buckets first.
fn ntile(i: usize, n: usize, k: usize) -> i64 {
    let k = k.min(n.max(1));
    let size = n / k;
    let extra = n % k;
    let big = extra * (size + 1);
    let bucket = if i < big {
        i / (size + 1)
    } else {
        extra + (i - big) / size.max(1)
    };
    bucket as i64 + 1
}
