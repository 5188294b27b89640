//! Expression evaluation.
//!
//! Bound expressions ([`PhysExpr`]) are evaluated one row at a time against a
//! [`RowView`]. Boolean expressions follow SQL three-valued logic: unknown is
//! represented as `Value::Null`. Arithmetic is checked; integer overflow
//! raises `22003` and division by zero `22012`.

mod functions;

pub use functions::{function_type, scalar_function};

use crate::ast::{BinaryOp, CompareOp};
use crate::executor::ExecContext;
use crate::planner::{PhysExpr, PhysExprId};
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cmp::Ordering;
use strata_core::block::{ColumnBlock, FlatColumns, RowBlock};
use strata_core::pattern_match;
use strata_core::{DataType, Error, Result, Value};

/// Random access to the columns of one input row.
pub trait RowView {
    /// Value of column `column`.
    fn get(&self, column: usize) -> Value;

    /// Number of columns.
    fn width(&self) -> usize;

    /// All values of the row.
    fn values(&self) -> Vec<Value> {
        (0..self.width()).map(|c| self.get(c)).collect()
    }
}

/// A row of a row block, addressed by physical position.
pub struct BlockRow<'a> {
    pub block: &'a RowBlock,
    pub pos: usize,
}

impl RowView for BlockRow<'_> {
    #[inline]
    fn get(&self, column: usize) -> Value {
        self.block.value(column, self.pos)
    }

    #[inline]
    fn width(&self) -> usize {
        self.block.width()
    }
}

/// A row of a materialized buffer.
pub struct FlatRow<'a> {
    pub rows: &'a FlatColumns,
    pub row: usize,
}

impl RowView for FlatRow<'_> {
    #[inline]
    fn get(&self, column: usize) -> Value {
        self.rows.value(column, self.row)
    }

    #[inline]
    fn width(&self) -> usize {
        self.rows.width()
    }
}

impl RowView for &[Value] {
    #[inline]
    fn get(&self, column: usize) -> Value {
        <[Value]>::get(self, column).cloned().unwrap_or(Value::Null)
    }

    #[inline]
    fn width(&self) -> usize {
        self.len()
    }
}

impl RowView for Vec<Value> {
    #[inline]
    fn get(&self, column: usize) -> Value {
        <[Value]>::get(self, column).cloned().unwrap_or(Value::Null)
    }

    #[inline]
    fn width(&self) -> usize {
        self.len()
    }
}

/// Left and right halves of a join candidate, seen as one row.
pub struct JoinedRow<'a> {
    pub left: &'a dyn RowView,
    pub right: &'a dyn RowView,
}

impl RowView for JoinedRow<'_> {
    fn get(&self, column: usize) -> Value {
        let split = self.left.width();
        if column < split {
            self.left.get(column)
        } else {
            self.right.get(column - split)
        }
    }

    fn width(&self) -> usize {
        self.left.width() + self.right.width()
    }
}

/// All-null row of a given width (the padded side of an outer join).
pub struct NullRow(pub usize);

impl RowView for NullRow {
    fn get(&self, _column: usize) -> Value {
        Value::Null
    }

    fn width(&self) -> usize {
        self.0
    }
}

/// Row with no columns, for constant expressions.
pub struct EmptyRow;

impl RowView for EmptyRow {
    fn get(&self, _column: usize) -> Value {
        Value::Null
    }

    fn width(&self) -> usize {
        0
    }
}

/// Normalizes a value for use as a hash key: integers widen to `Int64` and
/// integral floats become `Int64`, so keys that compare equal hash equal.
pub fn key_value(value: Value) -> Value {
    match value {
        Value::Int32(v) => Value::Int64(v as i64),
        Value::Float64(f) => {
            let t = libm::trunc(f);
            if t == f && t >= i64::MIN as f64 && t < i64::MAX as f64 {
                Value::Int64(t as i64)
            } else {
                Value::Float64(f)
            }
        }
        other => other,
    }
}

/// Converts a predicate result to a truth value; `None` is unknown.
pub fn truth(value: &Value) -> Result<Option<bool>> {
    match value {
        Value::Null => Ok(None),
        Value::Boolean(b) => Ok(Some(*b)),
        other => Err(Error::type_mismatch(
            DataType::Boolean,
            other.data_type().unwrap_or(DataType::Boolean),
        )),
    }
}

fn bool_value(b: Option<bool>) -> Value {
    b.map_or(Value::Null, Value::Boolean)
}

/// Evaluates `expr` against `row`.
pub fn eval(ctx: &ExecContext<'_>, expr: PhysExprId, row: &dyn RowView) -> Result<Value> {
    let arena = ctx.arena;
    match &arena.phys_exprs[expr] {
        PhysExpr::Column(c) => Ok(row.get(*c)),
        PhysExpr::Outer { depth, column } => ctx.outer_value(*depth, *column),
        PhysExpr::Literal(v) => Ok(v.clone()),
        PhysExpr::Binary { op, left, right } => {
            let l = eval(ctx, *left, row)?;
            let r = eval(ctx, *right, row)?;
            binary(*op, &l, &r)
        }
        PhysExpr::Negate(inner) => negate(eval(ctx, *inner, row)?),
        PhysExpr::Function { func, args } => {
            let mut values = Vec::with_capacity(args.len());
            for &arg in arena.phys_lists.slice(*args) {
                values.push(eval(ctx, arg, row)?);
            }
            scalar_function(*func, &values)
        }
        PhysExpr::Case {
            operand,
            branches,
            otherwise,
        } => {
            let operand = operand.map(|o| eval(ctx, o, row)).transpose()?;
            for pair in arena.phys_lists.slice(*branches).chunks(2) {
                let when = eval(ctx, pair[0], row)?;
                let hit = match &operand {
                    Some(v) => v.sql_eq(&when) == Some(true),
                    None => truth(&when)? == Some(true),
                };
                if hit {
                    return eval(ctx, pair[1], row);
                }
            }
            match otherwise {
                Some(e) => eval(ctx, *e, row),
                None => Ok(Value::Null),
            }
        }
        PhysExpr::Cast { expr, to } => eval(ctx, *expr, row)?.cast_to(*to),
        PhysExpr::Compare { op, left, right } => {
            let l = eval(ctx, *left, row)?;
            let r = eval(ctx, *right, row)?;
            Ok(compare(*op, &l, &r))
        }
        PhysExpr::And(a, b) => {
            let l = truth(&eval(ctx, *a, row)?)?;
            if l == Some(false) {
                return Ok(Value::Boolean(false));
            }
            let r = truth(&eval(ctx, *b, row)?)?;
            Ok(bool_value(match (l, r) {
                (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            }))
        }
        PhysExpr::Or(a, b) => {
            let l = truth(&eval(ctx, *a, row)?)?;
            if l == Some(true) {
                return Ok(Value::Boolean(true));
            }
            let r = truth(&eval(ctx, *b, row)?)?;
            Ok(bool_value(match (l, r) {
                (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            }))
        }
        PhysExpr::Not(inner) => Ok(bool_value(truth(&eval(ctx, *inner, row)?)?.map(|b| !b))),
        PhysExpr::IsNull { expr, negated } => {
            Ok(Value::Boolean(eval(ctx, *expr, row)?.is_null() != *negated))
        }
        PhysExpr::Between {
            expr,
            low,
            high,
            negated,
        } => {
            let v = eval(ctx, *expr, row)?;
            let lo = eval(ctx, *low, row)?;
            let hi = eval(ctx, *high, row)?;
            let ge = v.sql_cmp(&lo).map(|o| o != Ordering::Less);
            let le = v.sql_cmp(&hi).map(|o| o != Ordering::Greater);
            let inside = match (ge, le) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            };
            Ok(bool_value(inside.map(|b| b != *negated)))
        }
        PhysExpr::InList { expr, list, negated } => {
            let v = eval(ctx, *expr, row)?;
            if v.is_null() {
                return Ok(Value::Null);
            }
            let mut saw_null = false;
            for &item in arena.phys_lists.slice(*list) {
                match v.sql_eq(&eval(ctx, item, row)?) {
                    Some(true) => return Ok(Value::Boolean(!*negated)),
                    Some(false) => {}
                    None => saw_null = true,
                }
            }
            Ok(if saw_null {
                Value::Null
            } else {
                Value::Boolean(*negated)
            })
        }
        PhysExpr::InSubquery {
            expr,
            plan,
            negated,
            correlated,
        } => {
            let v = eval(ctx, *expr, row)?;
            let result = ctx.subquery(*plan, *correlated, row)?;
            Ok(bool_value(result.contains(&v).map(|b| b != *negated)))
        }
        PhysExpr::Exists {
            plan,
            negated,
            correlated,
        } => {
            let result = ctx.subquery(*plan, *correlated, row)?;
            Ok(Value::Boolean((result.row_count > 0) != *negated))
        }
        PhysExpr::ScalarSubquery { plan, correlated } => {
            let result = ctx.subquery(*plan, *correlated, row)?;
            match result.row_count {
                0 => Ok(Value::Null),
                1 => Ok(result.values.first().cloned().unwrap_or(Value::Null)),
                _ => Err(Error::cardinality(
                    "more than one row returned by a subquery used as an expression",
                )),
            }
        }
        PhysExpr::Like {
            expr,
            pattern,
            case_insensitive,
            negated,
        } => {
            let v = eval(ctx, *expr, row)?;
            let p = eval(ctx, *pattern, row)?;
            let (Some(s), Some(p)) = (text_of(&v), text_of(&p)) else {
                return Ok(Value::Null);
            };
            let hit = if *case_insensitive {
                pattern_match::ilike(&s, &p)
            } else {
                pattern_match::like(&s, &p)
            };
            Ok(Value::Boolean(hit != *negated))
        }
    }
}

fn text_of(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::Text(s) => Some(s.clone()),
        other => Some(alloc::string::ToString::to_string(other)),
    }
}

/// Evaluates a predicate; `None` is unknown.
pub fn eval_predicate(ctx: &ExecContext<'_>, expr: PhysExprId, row: &dyn RowView) -> Result<Option<bool>> {
    truth(&eval(ctx, expr, row)?)
}

/// Evaluates `expr` over every visible row of `block` into a dense column of type `ty`.
///
/// A bare column reference over a block without selection shares the input column.
pub fn eval_column(ctx: &ExecContext<'_>, expr: PhysExprId, ty: DataType, block: &RowBlock) -> Result<Rc<ColumnBlock>> {
    if let PhysExpr::Column(c) = ctx.arena.phys_exprs[expr] {
        if block.selection().is_none() && block.column(c).data_type() == ty {
            return Ok(block.column_rc(c));
        }
        let mut out = ColumnBlock::with_capacity(ty, block.row_count());
        out.extend_from(block.column(c), block.positions())?;
        return Ok(Rc::new(out));
    }
    let mut out = ColumnBlock::with_capacity(ty, block.row_count());
    for pos in block.positions() {
        let v = eval(ctx, expr, &BlockRow { block, pos })?;
        out.push(&v)?;
    }
    Ok(Rc::new(out))
}

/// SQL comparison producing a boolean or unknown.
pub fn compare(op: CompareOp, l: &Value, r: &Value) -> Value {
    bool_value(l.sql_cmp(r).map(|o| op.matches(o)))
}

/// Arithmetic negation.
pub fn negate(v: Value) -> Result<Value> {
    match v {
        Value::Null => Ok(Value::Null),
        Value::Int32(i) => i.checked_neg().map(Value::Int32).ok_or_else(|| Error::overflow("integer")),
        Value::Int64(i) => i.checked_neg().map(Value::Int64).ok_or_else(|| Error::overflow("bigint")),
        Value::Float64(f) => Ok(Value::Float64(-f)),
        other => Err(Error::type_mismatch(
            DataType::Float64,
            other.data_type().unwrap_or(DataType::Float64),
        )),
    }
}

/// Binary arithmetic and concatenation. Any NULL operand yields NULL.
pub fn binary(op: BinaryOp, l: &Value, r: &Value) -> Result<Value> {
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    if op == BinaryOp::Concat {
        let mut s = text_of(l).unwrap_or_default();
        s.push_str(&text_of(r).unwrap_or_default());
        return Ok(Value::Text(s));
    }
    match (l, r) {
        (Value::Int32(a), Value::Int32(b)) => int32_op(op, *a, *b),
        (Value::Date(d), Value::Int32(_) | Value::Int64(_)) if matches!(op, BinaryOp::Add | BinaryOp::Sub) => {
            let days = r.as_i64().unwrap_or(0);
            let delta = if op == BinaryOp::Add { days } else { -days };
            (*d as i64)
                .checked_add(delta)
                .and_then(|v| i32::try_from(v).ok())
                .map(Value::Date)
                .ok_or_else(|| Error::overflow("date"))
        }
        (Value::Int32(_) | Value::Int64(_), Value::Date(_)) if op == BinaryOp::Add => binary(op, r, l),
        (Value::Date(a), Value::Date(b)) if op == BinaryOp::Sub => Ok(Value::Int32(a - b)),
        (Value::Timestamp(a), Value::Timestamp(b)) if op == BinaryOp::Sub => a
            .checked_sub(*b)
            .map(Value::Int64)
            .ok_or_else(|| Error::overflow("bigint")),
        _ => match (l.as_i64(), r.as_i64()) {
            (Some(a), Some(b)) => int64_op(op, a, b),
            _ => match (l.as_f64(), r.as_f64()) {
                (Some(a), Some(b)) => float_op(op, a, b),
                _ => Err(Error::type_mismatch(
                    l.data_type().unwrap_or(DataType::Float64),
                    r.data_type().unwrap_or(DataType::Float64),
                )),
            },
        },
    }
}

fn int32_op(op: BinaryOp, a: i32, b: i32) -> Result<Value> {
    let out = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div | BinaryOp::Mod if b == 0 => return Err(Error::DivisionByZero),
        BinaryOp::Div => a.checked_div(b),
        BinaryOp::Mod => a.checked_rem(b),
        BinaryOp::Concat => return Err(Error::internal("concatenation reached integer arithmetic")),
    };
    out.map(Value::Int32).ok_or_else(|| Error::overflow("integer"))
}

fn int64_op(op: BinaryOp, a: i64, b: i64) -> Result<Value> {
    let out = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div | BinaryOp::Mod if b == 0 => return Err(Error::DivisionByZero),
        BinaryOp::Div => a.checked_div(b),
        BinaryOp::Mod => a.checked_rem(b),
        BinaryOp::Concat => return Err(Error::internal("concatenation reached integer arithmetic")),
    };
    out.map(Value::Int64).ok_or_else(|| Error::overflow("bigint"))
}

fn float_op(op: BinaryOp, a: f64, b: f64) -> Result<Value> {
    let out = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::Mod if b == 0.0 => return Err(Error::DivisionByZero),
        BinaryOp::Div => a / b,
        BinaryOp::Mod => libm::fmod(a, b),
        BinaryOp::Concat => return Err(Error::internal("concatenation reached float arithmetic")),
    };
    if out.is_infinite() && a.is_finite() && b.is_finite() {
        return Err(Error::overflow("double precision"));
    }
    Ok(Value::Float64(out))
}

/// Result type of `left op right`; `None` operands are untyped NULLs.
pub fn binary_type(op: BinaryOp, left: Option<DataType>, right: Option<DataType>) -> Result<Option<DataType>> {
    if op == BinaryOp::Concat {
        return Ok(Some(DataType::Text));
    }
    let (l, r) = match (left, right) {
        (None, None) => return Ok(None),
        (Some(t), None) | (None, Some(t)) => (t, t),
        (Some(l), Some(r)) => (l, r),
    };
    let add_sub = matches!(op, BinaryOp::Add | BinaryOp::Sub);
    let ty = match (l, r) {
        (DataType::Date, DataType::Date) if op == BinaryOp::Sub => DataType::Int32,
        (DataType::Timestamp, DataType::Timestamp) if op == BinaryOp::Sub => DataType::Int64,
        (DataType::Date, t) if add_sub && t.is_integer() => DataType::Date,
        (t, DataType::Date) if op == BinaryOp::Add && t.is_integer() => DataType::Date,
        (l, r) if l.is_numeric() && r.is_numeric() => l.unify(r).unwrap_or(DataType::Float64),
        (l, r) => {
            let (expected, got) = if l.is_numeric() { (l, r) } else { (DataType::Float64, l) };
            return Err(Error::type_mismatch(expected, got));
        }
    };
    Ok(Some(ty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::QueryArena;
    use crate::config::EngineConfig;
    use alloc::vec;
    use strata_storage::Database;

    fn with_ctx<F: FnOnce(&ExecContext<'_>)>(arena: &QueryArena, f: F) {
        let db = Database::new();
        let config = EngineConfig::default();
        let ctx = ExecContext::new(&db, arena, &config);
        f(&ctx);
    }

    #[test]
    fn test_checked_arithmetic() {
        assert_eq!(
            binary(BinaryOp::Add, &Value::Int32(i32::MAX), &Value::Int32(1)).unwrap_err().sqlstate(),
            "22003"
        );
        assert_eq!(
            binary(BinaryOp::Div, &Value::Int64(1), &Value::Int32(0)).unwrap_err().sqlstate(),
            "22012"
        );
        assert_eq!(
            binary(BinaryOp::Div, &Value::Int32(7), &Value::Int32(2)).unwrap(),
            Value::Int32(3)
        );
        assert_eq!(
            binary(BinaryOp::Mul, &Value::Int32(2), &Value::Float64(1.5)).unwrap(),
            Value::Float64(3.0)
        );
        assert_eq!(binary(BinaryOp::Add, &Value::Null, &Value::Int32(1)).unwrap(), Value::Null);
    }

    #[test]
    fn test_date_arithmetic() {
        assert_eq!(binary(BinaryOp::Add, &Value::Date(10), &Value::Int32(5)).unwrap(), Value::Date(15));
        assert_eq!(binary(BinaryOp::Sub, &Value::Date(10), &Value::Date(3)).unwrap(), Value::Int32(7));
        assert_eq!(
            binary_type(BinaryOp::Sub, Some(DataType::Date), Some(DataType::Int32)).unwrap(),
            Some(DataType::Date)
        );
    }

    #[test]
    fn test_binary_type() {
        assert_eq!(
            binary_type(BinaryOp::Add, Some(DataType::Int32), Some(DataType::Int64)).unwrap(),
            Some(DataType::Int64)
        );
        assert_eq!(binary_type(BinaryOp::Add, Some(DataType::Int32), None).unwrap(), Some(DataType::Int32));
        assert_eq!(
            binary_type(BinaryOp::Add, Some(DataType::Text), Some(DataType::Int32))
                .unwrap_err()
                .sqlstate(),
            "42804"
        );
    }

    #[test]
    fn test_three_valued_logic() {
        let mut arena = QueryArena::new();
        let t = arena.phys_exprs.push(PhysExpr::Literal(Value::Boolean(true))).unwrap();
        let f = arena.phys_exprs.push(PhysExpr::Literal(Value::Boolean(false))).unwrap();
        let n = arena.phys_exprs.push(PhysExpr::Literal(Value::Null)).unwrap();
        let and_fn = arena.phys_exprs.push(PhysExpr::And(f, n)).unwrap();
        let and_tn = arena.phys_exprs.push(PhysExpr::And(t, n)).unwrap();
        let or_tn = arena.phys_exprs.push(PhysExpr::Or(n, t)).unwrap();
        let not_n = arena.phys_exprs.push(PhysExpr::Not(n)).unwrap();
        with_ctx(&arena, |ctx| {
            assert_eq!(eval(ctx, and_fn, &EmptyRow).unwrap(), Value::Boolean(false));
            assert_eq!(eval(ctx, and_tn, &EmptyRow).unwrap(), Value::Null);
            assert_eq!(eval(ctx, or_tn, &EmptyRow).unwrap(), Value::Boolean(true));
            assert_eq!(eval(ctx, not_n, &EmptyRow).unwrap(), Value::Null);
        });
    }

    #[test]
    fn test_in_list_with_null() {
        let mut arena = QueryArena::new();
        let col = arena.phys_exprs.push(PhysExpr::Column(0)).unwrap();
        let one = arena.phys_exprs.push(PhysExpr::Literal(Value::Int64(1))).unwrap();
        let null = arena.phys_exprs.push(PhysExpr::Literal(Value::Null)).unwrap();
        let list = arena.phys_lists.extend([one, null]).unwrap();
        let not_in = arena
            .phys_exprs
            .push(PhysExpr::InList {
                expr: col,
                list,
                negated: true,
            })
            .unwrap();
        with_ctx(&arena, |ctx| {
            let hit: &[Value] = &[Value::Int32(1)];
            let miss: &[Value] = &[Value::Int32(2)];
            assert_eq!(eval(ctx, not_in, &hit).unwrap(), Value::Boolean(false));
            // 2 NOT IN (1, NULL) is unknown
            assert_eq!(eval(ctx, not_in, &miss).unwrap(), Value::Null);
        });
    }

    #[test]
    fn test_case_and_like() {
        let mut arena = QueryArena::new();
        let col = arena.phys_exprs.push(PhysExpr::Column(0)).unwrap();
        let pat = arena.phys_exprs.push(PhysExpr::Literal(Value::from("ab%"))).unwrap();
        let like = arena
            .phys_exprs
            .push(PhysExpr::Like {
                expr: col,
                pattern: pat,
                case_insensitive: true,
                negated: false,
            })
            .unwrap();
        let yes = arena.phys_exprs.push(PhysExpr::Literal(Value::from("yes"))).unwrap();
        let branches = arena.phys_lists.extend([like, yes]).unwrap();
        let case = arena
            .phys_exprs
            .push(PhysExpr::Case {
                operand: None,
                branches,
                otherwise: None,
            })
            .unwrap();
        with_ctx(&arena, |ctx| {
            let row: &[Value] = &[Value::from("ABC")];
            assert_eq!(eval(ctx, case, &row).unwrap(), Value::from("yes"));
            let row: &[Value] = &[Value::from("xyz")];
            assert_eq!(eval(ctx, case, &row).unwrap(), Value::Null);
        });
    }

    #[test]
    fn test_joined_row() {
        let left = vec![Value::Int32(1)];
        let right = NullRow(2);
        let row = JoinedRow {
            left: &left,
            right: &right,
        };
        assert_eq!(row.width(), 3);
        assert_eq!(row.get(0), Value::Int32(1));
        assert_eq!(row.get(2), Value::Null);
        assert_eq!(row.values(), vec![Value::Int32(1), Value::Null, Value::Null]);
    }

    #[test]
    fn test_key_value() {
        assert_eq!(key_value(Value::Int32(3)), Value::Int64(3));
        assert_eq!(key_value(Value::Float64(3.0)), Value::Int64(3));
        assert_eq!(key_value(Value::Float64(3.5)), Value::Float64(3.5));
    }
}
