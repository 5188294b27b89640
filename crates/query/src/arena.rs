//! Per-query arena.
//!
//! Every AST and plan node of one query lives in a flat typed [`Pool`] and is
//! addressed by a typed [`Idx`]. Nodes never own each other; an absent child
//! is `Option<Idx<T>>`, which costs nothing extra because index storage is
//! offset by one and the zero pattern is the niche. Strings live in one
//! shared region addressed by [`StrRef`].
//!
//! [`QueryArena::reset`] zeroes every pool and rewinds the scratch region so
//! the backing allocations can be reused by the next query.

use crate::ast::{
    AggregateCall, CteDef, Expr, ExprId, JoinClause, OrderItem, Predicate, Query, SelectItem,
    WindowCall,
};
use crate::config::EngineConfig;
use crate::planner::{PhysExpr, PhysExprId, PlanNode};
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use bumpalo::Bump;
use core::cell::OnceCell;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::num::NonZeroU32;
use core::ops::Index;
use strata_core::{Error, Result, Value};

/// Typed index into a [`Pool`].
pub struct Idx<T> {
    raw: NonZeroU32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Idx<T> {
    #[inline]
    fn from_index(index: u32) -> Self {
        // index < u32::MAX is guaranteed by the pool limit
        let raw = NonZeroU32::new(index.wrapping_add(1)).unwrap_or(NonZeroU32::MIN);
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Position in the owning pool.
    #[inline]
    pub fn index(self) -> usize {
        (self.raw.get() - 1) as usize
    }
}

impl<T> Clone for Idx<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Idx<T> {}

impl<T> PartialEq for Idx<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for Idx<T> {}

impl<T> Hash for Idx<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T> fmt::Debug for Idx<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index())
    }
}

/// Contiguous run of indexes into a [`Pool`].
pub struct IdxRange<T> {
    start: u32,
    len: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> IdxRange<T> {
    /// The empty range.
    pub const EMPTY: Self = Self {
        start: 0,
        len: 0,
        _marker: PhantomData,
    };

    #[inline]
    pub fn len(self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.len == 0
    }

    /// Iterates the indexes in the range.
    pub fn iter(self) -> impl Iterator<Item = Idx<T>> {
        (self.start..self.start + self.len).map(Idx::from_index)
    }
}

impl<T> Default for IdxRange<T> {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl<T> Clone for IdxRange<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for IdxRange<T> {}

impl<T> PartialEq for IdxRange<T> {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.len == other.len
    }
}

impl<T> Eq for IdxRange<T> {}

impl<T> fmt::Debug for IdxRange<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}..#{}", self.start, self.start + self.len)
    }
}

/// A growable vector of one node kind.
pub struct Pool<T> {
    items: Vec<T>,
    limit: u32,
    kind: &'static str,
}

impl<T> Pool<T> {
    pub fn new(kind: &'static str, limit: u32) -> Self {
        Self {
            items: Vec::new(),
            limit: limit.min(u32::MAX - 1),
            kind,
        }
    }

    fn exhausted(&self) -> Error {
        Error::resource_exhausted(format!(
            "arena pool `{}` exceeded {} nodes",
            self.kind, self.limit
        ))
    }

    /// Appends a node and returns its index.
    pub fn push(&mut self, item: T) -> Result<Idx<T>> {
        let index = self.items.len();
        if index >= self.limit as usize {
            return Err(self.exhausted());
        }
        self.items.push(item);
        Ok(Idx::from_index(index as u32))
    }

    /// Appends a run of nodes that can later be read back with [`Pool::slice`].
    pub fn extend<I>(&mut self, items: I) -> Result<IdxRange<T>>
    where
        I: IntoIterator<Item = T>,
    {
        let start = self.items.len();
        for item in items {
            if self.items.len() >= self.limit as usize {
                self.items.truncate(start);
                return Err(self.exhausted());
            }
            self.items.push(item);
        }
        Ok(IdxRange {
            start: start as u32,
            len: (self.items.len() - start) as u32,
            _marker: PhantomData,
        })
    }

    #[inline]
    pub fn get(&self, id: Idx<T>) -> Option<&T> {
        self.items.get(id.index())
    }

    #[inline]
    pub fn get_mut(&mut self, id: Idx<T>) -> Option<&mut T> {
        self.items.get_mut(id.index())
    }

    /// Returns the nodes of `range`, or an empty slice for a stale range.
    pub fn slice(&self, range: IdxRange<T>) -> &[T] {
        let start = range.start as usize;
        self.items
            .get(start..start + range.len as usize)
            .unwrap_or(&[])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drops every node at or after `len`.
    pub fn truncate(&mut self, len: usize) {
        self.items.truncate(len);
    }

    /// Removes all nodes, keeping the allocation.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T> Index<Idx<T>> for Pool<T> {
    type Output = T;

    #[inline]
    fn index(&self, id: Idx<T>) -> &T {
        &self.items[id.index()]
    }
}

impl<T: fmt::Debug> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("kind", &self.kind)
            .field("len", &self.items.len())
            .finish()
    }
}

/// Reference to a string stored in the arena string region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StrRef {
    start: u32,
    len: u32,
}

/// Marker for rolling back plan construction.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PlanMark {
    plan_nodes: usize,
    phys_exprs: usize,
    phys_lists: usize,
}

/// All memory used while building and executing one query.
pub struct QueryArena {
    pub exprs: Pool<Expr>,
    pub predicates: Pool<Predicate>,
    pub joins: Pool<JoinClause>,
    pub select_items: Pool<SelectItem>,
    pub aggregates: Pool<AggregateCall>,
    pub windows: Pool<WindowCall>,
    pub order_items: Pool<OrderItem>,
    pub ctes: Pool<CteDef>,
    pub queries: Pool<Query>,
    /// Argument and operand lists of logical expressions.
    pub expr_lists: Pool<ExprId>,
    /// Literal values.
    pub cells: Pool<Value>,
    pub plan_nodes: Pool<PlanNode>,
    pub phys_exprs: Pool<PhysExpr>,
    /// Operand lists of bound expressions.
    pub phys_lists: Pool<PhysExprId>,
    strings: String,
    scratch: Bump,
    scratch_limit: usize,
    error: OnceCell<Error>,
}

impl Default for QueryArena {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryArena {
    /// Creates an arena with the default limits.
    pub fn new() -> Self {
        Self::with_config(&EngineConfig::default())
    }

    /// Creates an arena bounded by `config`.
    pub fn with_config(config: &EngineConfig) -> Self {
        let n = config.max_arena_nodes;
        Self {
            exprs: Pool::new("expr", n),
            predicates: Pool::new("predicate", n),
            joins: Pool::new("join", n),
            select_items: Pool::new("select item", n),
            aggregates: Pool::new("aggregate", n),
            windows: Pool::new("window", n),
            order_items: Pool::new("order item", n),
            ctes: Pool::new("cte", n),
            queries: Pool::new("query", n),
            expr_lists: Pool::new("expr list", n),
            cells: Pool::new("cell", n),
            plan_nodes: Pool::new("plan node", n),
            phys_exprs: Pool::new("bound expr", n),
            phys_lists: Pool::new("bound expr list", n),
            strings: String::new(),
            scratch: Bump::new(),
            scratch_limit: config.scratch_limit_bytes,
            error: OnceCell::new(),
        }
    }

    /// Copies `s` into the string region.
    pub fn intern(&mut self, s: &str) -> Result<StrRef> {
        let start = self.strings.len();
        if start + s.len() > u32::MAX as usize {
            return Err(Error::resource_exhausted("arena string region is full"));
        }
        self.strings.push_str(s);
        Ok(StrRef {
            start: start as u32,
            len: s.len() as u32,
        })
    }

    /// Resolves a string reference; stale references read as empty.
    pub fn str(&self, r: StrRef) -> &str {
        let start = r.start as usize;
        self.strings
            .get(start..start + r.len as usize)
            .unwrap_or("")
    }

    /// Bump region for transient buffers.
    pub fn scratch(&self) -> &Bump {
        &self.scratch
    }

    /// Fails with `53200` once scratch usage passes the configured limit.
    pub fn check_scratch(&self) -> Result<()> {
        check_scratch(&self.scratch, self.scratch_limit)
    }

    /// Stores `error` unless an earlier one is already recorded.
    ///
    /// Returns true if this call recorded it.
    pub fn record_error(&self, error: Error) -> bool {
        self.error.set(error).is_ok()
    }

    /// The first error recorded for this query.
    pub fn error(&self) -> Option<&Error> {
        self.error.get()
    }

    pub fn take_error(&mut self) -> Option<Error> {
        self.error.take()
    }

    /// Total number of nodes across all pools.
    pub fn node_count(&self) -> usize {
        self.exprs.len()
            + self.predicates.len()
            + self.joins.len()
            + self.select_items.len()
            + self.aggregates.len()
            + self.windows.len()
            + self.order_items.len()
            + self.ctes.len()
            + self.queries.len()
            + self.expr_lists.len()
            + self.cells.len()
            + self.plan_nodes.len()
            + self.phys_exprs.len()
            + self.phys_lists.len()
    }

    /// Empties every pool and rewinds the scratch region.
    pub fn reset(&mut self) {
        self.exprs.clear();
        self.predicates.clear();
        self.joins.clear();
        self.select_items.clear();
        self.aggregates.clear();
        self.windows.clear();
        self.order_items.clear();
        self.ctes.clear();
        self.queries.clear();
        self.expr_lists.clear();
        self.cells.clear();
        self.plan_nodes.clear();
        self.phys_exprs.clear();
        self.phys_lists.clear();
        self.strings.clear();
        self.scratch.reset();
        self.error = OnceCell::new();
    }

    pub(crate) fn plan_mark(&self) -> PlanMark {
        PlanMark {
            plan_nodes: self.plan_nodes.len(),
            phys_exprs: self.phys_exprs.len(),
            phys_lists: self.phys_lists.len(),
        }
    }

    /// Discards plan nodes built after `mark`.
    pub(crate) fn rollback_plan(&mut self, mark: PlanMark) {
        self.plan_nodes.truncate(mark.plan_nodes);
        self.phys_exprs.truncate(mark.phys_exprs);
        self.phys_lists.truncate(mark.phys_lists);
    }
}

impl fmt::Debug for QueryArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryArena")
            .field("nodes", &self.node_count())
            .field("strings", &self.strings.len())
            .field("scratch", &self.scratch.allocated_bytes())
            .field("error", &self.error.get())
            .finish()
    }
}

/// Fails with `53200` when `bump` has grown past `limit` bytes.
pub fn check_scratch(bump: &Bump, limit: usize) -> Result<()> {
    if bump.allocated_bytes() > limit {
        return Err(Error::resource_exhausted(format!(
            "scratch memory exceeded {} bytes",
            limit
        )));
    }
    Ok(())
}
