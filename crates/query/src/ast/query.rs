//! Query structure: SELECT blocks, sources, joins, set operations and CTEs.

use super::{ExprId, OrderItem, PredId, QueryId};
use crate::arena::{IdxRange, StrRef};

/// One entry of the select list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectItem {
    Expr { expr: ExprId, alias: Option<StrRef> },
    /// `*` or `t.*`.
    Wildcard { table: Option<StrRef> },
}

/// A relation in FROM or JOIN.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableSource {
    /// A stored table or a CTE.
    Named { name: StrRef, alias: Option<StrRef> },
    /// A derived table.
    Subquery { query: QueryId, alias: StrRef },
    /// `generate_series(start, stop [, step])`.
    GenerateSeries {
        start: ExprId,
        stop: ExprId,
        step: Option<ExprId>,
        alias: Option<StrRef>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    pub fn name(self) -> &'static str {
        match self {
            JoinKind::Inner => "inner",
            JoinKind::Left => "left",
            JoinKind::Right => "right",
            JoinKind::Full => "full",
            JoinKind::Cross => "cross",
        }
    }

    /// Unmatched left rows are emitted padded with NULLs.
    pub fn preserves_left(self) -> bool {
        matches!(self, JoinKind::Left | JoinKind::Full)
    }

    /// Unmatched right rows are emitted padded with NULLs.
    pub fn preserves_right(self) -> bool {
        matches!(self, JoinKind::Right | JoinKind::Full)
    }
}

/// `<kind> JOIN source [ON predicate]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub source: TableSource,
    pub on: Option<PredId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SetOpKind {
    Union,
    Intersect,
    Except,
}

impl SetOpKind {
    pub fn name(self) -> &'static str {
        match self {
            SetOpKind::Union => "union",
            SetOpKind::Intersect => "intersect",
            SetOpKind::Except => "except",
        }
    }
}

/// How the GROUP BY list expands into grouping sets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum GroupingKind {
    #[default]
    Plain,
    Rollup,
    Cube,
}

/// A SELECT block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Select {
    pub distinct: bool,
    pub items: IdxRange<SelectItem>,
    pub from: Option<TableSource>,
    pub joins: IdxRange<JoinClause>,
    pub filter: Option<PredId>,
    pub group_by: IdxRange<ExprId>,
    pub grouping: GroupingKind,
    pub having: Option<PredId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryBody {
    Select(Select),
    SetOp {
        op: SetOpKind,
        all: bool,
        left: QueryId,
        right: QueryId,
    },
}

/// `name AS (query)` in a WITH clause.
///
/// A recursive definition's query must be a UNION [ALL] whose left side does
/// not reference `name`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CteDef {
    pub name: StrRef,
    pub query: QueryId,
    pub recursive: bool,
}

/// A complete query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Query {
    pub ctes: IdxRange<CteDef>,
    pub body: QueryBody,
    pub order_by: IdxRange<OrderItem>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}
