//! Expression AST definitions.

use super::{AggId, CellId, ExprId, PredId, QueryId, WindowId};
use crate::arena::{IdxRange, StrRef};
use strata_core::temporal::DatePart;
use strata_core::DataType;

/// Arithmetic and string operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// String concatenation (`||`).
    Concat,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Concat => "||",
        }
    }
}

/// Built-in scalar functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarFunc {
    Upper,
    Lower,
    Length,
    Substring,
    Trim,
    Replace,
    Position,
    Concat,
    Coalesce,
    NullIf,
    Greatest,
    Least,
    Abs,
    Round,
    Ceil,
    Floor,
    Sqrt,
    Power,
    Extract(DatePart),
    DateTrunc(DatePart),
}

impl ScalarFunc {
    /// Function name as written in SQL.
    pub fn name(self) -> &'static str {
        match self {
            ScalarFunc::Upper => "upper",
            ScalarFunc::Lower => "lower",
            ScalarFunc::Length => "length",
            ScalarFunc::Substring => "substring",
            ScalarFunc::Trim => "trim",
            ScalarFunc::Replace => "replace",
            ScalarFunc::Position => "position",
            ScalarFunc::Concat => "concat",
            ScalarFunc::Coalesce => "coalesce",
            ScalarFunc::NullIf => "nullif",
            ScalarFunc::Greatest => "greatest",
            ScalarFunc::Least => "least",
            ScalarFunc::Abs => "abs",
            ScalarFunc::Round => "round",
            ScalarFunc::Ceil => "ceil",
            ScalarFunc::Floor => "floor",
            ScalarFunc::Sqrt => "sqrt",
            ScalarFunc::Power => "power",
            ScalarFunc::Extract(_) => "extract",
            ScalarFunc::DateTrunc(_) => "date_trunc",
        }
    }

    /// Accepted argument counts (inclusive).
    pub fn arity(self) -> (usize, usize) {
        match self {
            ScalarFunc::Substring => (2, 3),
            ScalarFunc::Round => (1, 2),
            ScalarFunc::Replace => (3, 3),
            ScalarFunc::Position | ScalarFunc::NullIf | ScalarFunc::Power => (2, 2),
            ScalarFunc::Concat | ScalarFunc::Coalesce | ScalarFunc::Greatest | ScalarFunc::Least => {
                (1, usize::MAX)
            }
            _ => (1, 1),
        }
    }
}

/// Aggregate functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggFunc {
    /// `COUNT(*)`; takes no argument.
    CountStar,
    Count,
    Sum,
    Avg,
    Min,
    Max,
    StdDev,
    Variance,
    BoolAnd,
    BoolOr,
    StringAgg,
}

impl AggFunc {
    pub fn name(self) -> &'static str {
        match self {
            AggFunc::CountStar | AggFunc::Count => "count",
            AggFunc::Sum => "sum",
            AggFunc::Avg => "avg",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::StdDev => "stddev",
            AggFunc::Variance => "variance",
            AggFunc::BoolAnd => "bool_and",
            AggFunc::BoolOr => "bool_or",
            AggFunc::StringAgg => "string_agg",
        }
    }
}

/// An aggregate call, e.g. `SUM(DISTINCT x)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AggregateCall {
    pub func: AggFunc,
    pub arg: Option<ExprId>,
    pub distinct: bool,
    /// Separator of `STRING_AGG`.
    pub separator: Option<ExprId>,
}

/// Window functions. Aggregates may also run over a window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WindowFunc {
    RowNumber,
    Rank,
    DenseRank,
    Ntile,
    PercentRank,
    CumeDist,
    Lag,
    Lead,
    FirstValue,
    LastValue,
    NthValue,
    Aggregate(AggFunc),
}

impl WindowFunc {
    pub fn name(self) -> &'static str {
        match self {
            WindowFunc::RowNumber => "row_number",
            WindowFunc::Rank => "rank",
            WindowFunc::DenseRank => "dense_rank",
            WindowFunc::Ntile => "ntile",
            WindowFunc::PercentRank => "percent_rank",
            WindowFunc::CumeDist => "cume_dist",
            WindowFunc::Lag => "lag",
            WindowFunc::Lead => "lead",
            WindowFunc::FirstValue => "first_value",
            WindowFunc::LastValue => "last_value",
            WindowFunc::NthValue => "nth_value",
            WindowFunc::Aggregate(f) => f.name(),
        }
    }
}

/// `ROWS` or `RANGE` framing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameMode {
    Rows,
    Range,
}

/// One end of a window frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameBound {
    UnboundedPreceding,
    Preceding(u64),
    CurrentRow,
    Following(u64),
    UnboundedFollowing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WindowFrame {
    pub mode: FrameMode,
    pub start: FrameBound,
    pub end: FrameBound,
}

impl WindowFrame {
    /// `ROWS BETWEEN start AND end`.
    pub fn rows(start: FrameBound, end: FrameBound) -> Self {
        Self {
            mode: FrameMode::Rows,
            start,
            end,
        }
    }

    /// `RANGE BETWEEN start AND end`.
    pub fn range(start: FrameBound, end: FrameBound) -> Self {
        Self {
            mode: FrameMode::Range,
            start,
            end,
        }
    }
}

/// `func(args) OVER (PARTITION BY .. ORDER BY .. frame)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowCall {
    pub func: WindowFunc,
    pub args: IdxRange<ExprId>,
    pub distinct: bool,
    pub partition_by: IdxRange<ExprId>,
    pub order_by: IdxRange<OrderItem>,
    pub frame: Option<WindowFrame>,
}

/// A sort key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderItem {
    pub expr: ExprId,
    pub descending: bool,
    /// Explicit NULLS FIRST / NULLS LAST; `None` picks the default for the direction.
    pub nulls_first: Option<bool>,
}

/// Scalar expression node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Expr {
    /// Column reference, optionally qualified by a table name or alias.
    Column { table: Option<StrRef>, name: StrRef },
    /// Literal value stored in the cell pool.
    Literal(CellId),
    Binary {
        op: BinaryOp,
        left: ExprId,
        right: ExprId,
    },
    Negate(ExprId),
    Function {
        func: ScalarFunc,
        args: IdxRange<ExprId>,
    },
    /// `CASE [operand] WHEN .. THEN .. [ELSE ..] END`.
    ///
    /// `branches` holds (when, then) pairs flattened. With an operand each
    /// `when` is compared to it; without one each `when` is a boolean.
    Case {
        operand: Option<ExprId>,
        branches: IdxRange<ExprId>,
        otherwise: Option<ExprId>,
    },
    Cast { expr: ExprId, to: DataType },
    /// A boolean-valued predicate used as an expression.
    Predicate(PredId),
    Aggregate(AggId),
    Window(WindowId),
    /// Scalar subquery.
    Subquery(QueryId),
}
