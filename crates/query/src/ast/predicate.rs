//! Predicate definitions for query filtering.

use super::{ExprId, PredId, QueryId};
use crate::arena::IdxRange;
use core::cmp::Ordering;

/// Comparison operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Tests an ordering against the operator.
    #[inline]
    pub fn matches(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        }
    }

    /// The operator with its operands swapped (`a < b` is `b > a`).
    pub fn flip(self) -> Self {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
            op => op,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Boolean predicate node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Predicate {
    Compare {
        left: ExprId,
        op: CompareOp,
        right: ExprId,
    },
    And(PredId, PredId),
    Or(PredId, PredId),
    Not(PredId),
    IsNull {
        expr: ExprId,
        negated: bool,
    },
    Between {
        expr: ExprId,
        low: ExprId,
        high: ExprId,
        negated: bool,
    },
    InList {
        expr: ExprId,
        list: IdxRange<ExprId>,
        negated: bool,
    },
    InSubquery {
        expr: ExprId,
        query: QueryId,
        negated: bool,
    },
    Exists {
        query: QueryId,
        negated: bool,
    },
    Like {
        expr: ExprId,
        pattern: ExprId,
        case_insensitive: bool,
        negated: bool,
    },
    /// A boolean expression (column, literal, CASE ..) used as a predicate.
    Expr(ExprId),
}
