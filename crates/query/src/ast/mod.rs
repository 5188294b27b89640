//! Logical query representation.
//!
//! This is the tree an external SQL parser hands to the planner. Every node
//! lives in a [`QueryArena`](crate::arena::QueryArena) pool and refers to its
//! children by index.

mod builder;
mod expr;
mod fingerprint;
mod predicate;
mod query;

use crate::arena::Idx;
use strata_core::Value;

pub use builder::{SelectBuilder, Source};
pub use expr::{
    AggFunc, AggregateCall, BinaryOp, Expr, FrameBound, FrameMode, OrderItem, ScalarFunc,
    WindowCall, WindowFrame, WindowFunc,
};
pub use fingerprint::{fingerprint, FnvHasher};
pub use predicate::{CompareOp, Predicate};
pub use query::{
    CteDef, GroupingKind, JoinClause, JoinKind, Query, QueryBody, Select, SelectItem, SetOpKind,
    TableSource,
};

pub type ExprId = Idx<Expr>;
pub type PredId = Idx<Predicate>;
pub type QueryId = Idx<Query>;
pub type AggId = Idx<AggregateCall>;
pub type WindowId = Idx<WindowCall>;
pub type CellId = Idx<Value>;
