//! Block executors.
//!
//! Every plan node kind has one executor implementing [`BlockOperator`]. The
//! executors compose into the same tree shape as the plan and are driven by
//! pulling row blocks from the root ([`QueryExecution`]).

mod aggregate;
mod cte;
mod filter;
pub mod join;
mod limit;
mod project;
mod scan;
mod set_op;
mod sort;
mod source;
mod window;

pub use aggregate::AggregateExecutor;
pub use cte::CteMaterializeExecutor;
pub use filter::FilterExecutor;
pub use join::{HashJoinExecutor, HashJoinSpec, HashSemiJoinExecutor, NestedLoopJoinExecutor};
pub use limit::LimitExecutor;
pub use project::{ExprProjectExecutor, ProjectExecutor};
pub use scan::{CteScanExecutor, IndexScanExecutor, SeqScanExecutor};
pub use set_op::{DistinctExecutor, SetOpExecutor};
pub use sort::{SortExecutor, TopNExecutor};
pub use source::{GenerateSeriesExecutor, ValuesExecutor};
pub use window::WindowExecutor;

use crate::arena::QueryArena;
use crate::config::EngineConfig;
use crate::eval::{self, EmptyRow, RowView};
use crate::planner::{PhysExprId, PlanId, PlanOp, Schema};
use alloc::boxed::Box;
use alloc::format;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use hashbrown::{HashMap, HashSet};
use strata_core::block::{ColumnBlock, FlatColumns, RowBlock};
use strata_core::{DataType, Error, Result, Value};
use strata_storage::{Database, Table};

/// A pull-based block iterator.
///
/// `open` allocates runtime state, `next` yields one block of up to
/// [`BLOCK_CAPACITY`](strata_core::BLOCK_CAPACITY) visible rows or `None` at
/// end of stream, `close` releases runtime state. Blocks may be empty.
pub trait BlockOperator {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()>;
    fn next(&mut self, ctx: &ExecContext<'_>) -> Result<Option<RowBlock>>;
    fn close(&mut self);
}

/// Rows produced by a subquery (first column only).
#[derive(Debug, Default)]
pub struct SubqueryResult {
    pub row_count: usize,
    pub values: Vec<Value>,
    keys: HashSet<Value>,
    has_null: bool,
}

impl SubqueryResult {
    fn new(row_count: usize, values: Vec<Value>) -> Self {
        let mut keys = HashSet::with_capacity(values.len());
        let mut has_null = false;
        for v in &values {
            if v.is_null() {
                has_null = true;
            } else {
                keys.insert(eval::key_value(v.clone()));
            }
        }
        Self {
            row_count,
            values,
            keys,
            has_null,
        }
    }

    /// SQL `value IN (subquery)`: `None` for unknown.
    pub fn contains(&self, value: &Value) -> Option<bool> {
        if self.row_count == 0 {
            return Some(false);
        }
        if value.is_null() {
            return None;
        }
        if self.keys.contains(&eval::key_value(value.clone())) {
            Some(true)
        } else if self.has_null {
            None
        } else {
            Some(false)
        }
    }
}

/// Shared state of one query execution.
pub struct ExecContext<'a> {
    pub db: &'a Database,
    pub arena: &'a QueryArena,
    pub config: &'a EngineConfig,
    cte_tables: RefCell<Vec<Option<Rc<Table>>>>,
    outer_rows: RefCell<Vec<Vec<Value>>>,
    subqueries: RefCell<HashMap<PlanId, Rc<SubqueryResult>>>,
}

impl<'a> ExecContext<'a> {
    pub fn new(db: &'a Database, arena: &'a QueryArena, config: &'a EngineConfig) -> Self {
        Self {
            db,
            arena,
            config,
            cte_tables: RefCell::new(Vec::new()),
            outer_rows: RefCell::new(Vec::new()),
            subqueries: RefCell::new(HashMap::new()),
        }
    }

    /// The materialized table of CTE `slot`.
    pub fn cte_table(&self, slot: usize) -> Result<Rc<Table>> {
        self.cte_tables
            .borrow()
            .get(slot)
            .and_then(|t| t.clone())
            .ok_or_else(|| Error::internal(format!("common table expression {} is not materialized", slot)))
    }

    pub fn set_cte_table(&self, slot: usize, table: Rc<Table>) {
        let mut tables = self.cte_tables.borrow_mut();
        if tables.len() <= slot {
            tables.resize(slot + 1, None);
        }
        tables[slot] = Some(table);
    }

    /// Removes the table of CTE `slot` so it can be reloaded in place.
    pub(crate) fn take_cte_table(&self, slot: usize) -> Option<Rc<Table>> {
        self.cte_tables.borrow_mut().get_mut(slot).and_then(Option::take)
    }

    /// Column `column` of the outer row `depth` levels up.
    pub fn outer_value(&self, depth: usize, column: usize) -> Result<Value> {
        let rows = self.outer_rows.borrow();
        let row: Option<&[Value]> = rows.len().checked_sub(depth).and_then(|i| rows.get(i)).map(Vec::as_slice);
        row.and_then(|r| <[Value]>::get(r, column))
            .cloned()
            .ok_or_else(|| Error::internal("outer column reference out of scope"))
    }

    /// Runs `plan` to completion and returns its rows.
    pub fn run_plan(&self, plan: PlanId) -> Result<FlatColumns> {
        let types = self.arena.plan_nodes[plan].schema.types();
        let mut op = build_operator(self.arena, plan)?;
        op.open(self)?;
        let out = drain(op.as_mut(), self, &types);
        op.close();
        out
    }

    /// Result of a subquery; correlated ones are re-run with `row` as the outer row.
    pub fn subquery(&self, plan: PlanId, correlated: bool, row: &dyn RowView) -> Result<Rc<SubqueryResult>> {
        if !correlated {
            if let Some(hit) = self.subqueries.borrow().get(&plan) {
                return Ok(Rc::clone(hit));
            }
        } else {
            self.outer_rows.borrow_mut().push(row.values());
        }
        let result = self.run_plan(plan);
        if correlated {
            self.outer_rows.borrow_mut().pop();
        }
        let rows = result?;
        let values = if rows.width() > 0 {
            (0..rows.len()).map(|r| rows.value(0, r)).collect()
        } else {
            Vec::new()
        };
        let result = Rc::new(SubqueryResult::new(rows.len(), values));
        if !correlated {
            self.subqueries.borrow_mut().insert(plan, Rc::clone(&result));
        }
        Ok(result)
    }
}

/// Pulls every remaining block of `op` into one buffer.
pub(crate) fn drain(op: &mut dyn BlockOperator, ctx: &ExecContext<'_>, types: &[DataType]) -> Result<FlatColumns> {
    let mut out = FlatColumns::new(types);
    while let Some(block) = op.next(ctx)? {
        out.append_block(&block)?;
    }
    Ok(out)
}

/// Evaluates `exprs` over the visible rows of `block`, producing dense columns.
///
/// Plain column references reuse the input column when the block has no
/// selection.
pub(crate) fn eval_columns(
    ctx: &ExecContext<'_>,
    exprs: &[PhysExprId],
    types: &[DataType],
    block: &RowBlock,
) -> Result<Vec<Rc<ColumnBlock>>> {
    let mut out = Vec::with_capacity(exprs.len());
    for (&expr, &ty) in exprs.iter().zip(types) {
        out.push(eval::eval_column(ctx, expr, ty, block)?);
    }
    Ok(out)
}

/// Evaluates constant expressions (no input row).
pub(crate) fn eval_const(ctx: &ExecContext<'_>, expr: PhysExprId) -> Result<Value> {
    eval::eval(ctx, expr, &EmptyRow)
}

/// Builds the executor tree for `plan`.
pub fn build_operator(arena: &QueryArena, plan: PlanId) -> Result<Box<dyn BlockOperator>> {
    let node = arena
        .plan_nodes
        .get(plan)
        .ok_or_else(|| Error::internal("dangling plan node"))?;
    let child = |id: Option<PlanId>| -> Result<Box<dyn BlockOperator>> {
        let id = id.ok_or_else(|| Error::internal(format!("{} is missing an input", node.op.name())))?;
        build_operator(arena, id)
    };
    let types = node.schema.types();
    let op: Box<dyn BlockOperator> = match &node.op {
        PlanOp::SeqScan { table, leaf_filters } => {
            Box::new(SeqScanExecutor::new(table.clone(), leaf_filters.clone()))
        }
        PlanOp::IndexScan { table, column, key } => {
            Box::new(IndexScanExecutor::new(table.clone(), *column, key.clone()))
        }
        PlanOp::CteScan { slot, .. } => Box::new(CteScanExecutor::new(*slot)),
        PlanOp::Values { rows } => Box::new(ValuesExecutor::new(rows.clone(), types)),
        PlanOp::TableFunction { start, stop, step } => {
            Box::new(GenerateSeriesExecutor::new(*start, *stop, *step))
        }
        PlanOp::Filter { predicate } => Box::new(FilterExecutor::new(child(node.left)?, *predicate)),
        PlanOp::Project { columns } => Box::new(ProjectExecutor::new(child(node.left)?, columns.clone())),
        PlanOp::ExprProject { exprs } => {
            Box::new(ExprProjectExecutor::new(child(node.left)?, exprs.clone(), types))
        }
        PlanOp::Sort { keys } => Box::new(SortExecutor::new(child(node.left)?, keys.clone(), types)),
        PlanOp::TopN { keys, limit, offset } => Box::new(TopNExecutor::new(
            child(node.left)?,
            keys.clone(),
            *limit,
            *offset,
            types,
        )),
        PlanOp::Limit { limit, offset } => Box::new(LimitExecutor::new(child(node.left)?, *limit, *offset)),
        PlanOp::HashJoin {
            kind,
            left_keys,
            right_keys,
            key_types,
            residual,
            build_left,
        } => {
            let left_types = child_types(arena, node.left)?;
            let right_types = child_types(arena, node.right)?;
            let spec = HashJoinSpec {
                kind: *kind,
                left_keys: left_keys.clone(),
                right_keys: right_keys.clone(),
                key_types: key_types.clone(),
                residual: *residual,
                build_left: *build_left,
                left_types,
                right_types,
            };
            Box::new(HashJoinExecutor::new(child(node.left)?, child(node.right)?, spec))
        }
        PlanOp::NestedLoopJoin { kind, condition } => {
            let left_types = child_types(arena, node.left)?;
            let right_types = child_types(arena, node.right)?;
            Box::new(NestedLoopJoinExecutor::new(
                child(node.left)?,
                child(node.right)?,
                *kind,
                *condition,
                left_types,
                right_types,
            ))
        }
        PlanOp::HashSemiJoin {
            probe_key,
            key_type,
            anti,
        } => {
            let right_types = child_types(arena, node.right)?;
            Box::new(HashSemiJoinExecutor::new(
                child(node.left)?,
                child(node.right)?,
                *probe_key,
                *key_type,
                *anti,
                right_types,
            ))
        }
        PlanOp::Aggregate {
            group_by,
            active,
            aggregates,
        } => Box::new(AggregateExecutor::new(
            child(node.left)?,
            group_by.clone(),
            active.clone(),
            aggregates.clone(),
            types,
        )),
        PlanOp::Window { functions } => {
            let input_types = child_types(arena, node.left)?;
            Box::new(WindowExecutor::new(child(node.left)?, functions.clone(), input_types, types))
        }
        PlanOp::SetOp { op, all } => Box::new(SetOpExecutor::new(
            child(node.left)?,
            child(node.right)?,
            *op,
            *all,
            types,
        )),
        PlanOp::Distinct => Box::new(DistinctExecutor::new(child(node.left)?, types)),
        PlanOp::CteMaterialize {
            slot,
            name,
            step,
            union_all,
        } => {
            let cte_schema = arena
                .plan_nodes
                .get(node.right.ok_or_else(|| Error::internal("CTE without definition"))?)
                .map(|n| n.schema.clone())
                .ok_or_else(|| Error::internal("dangling plan node"))?;
            Box::new(CteMaterializeExecutor::new(
                child(node.left)?,
                child(node.right)?,
                step.map(|s| build_operator(arena, s)).transpose()?,
                *slot,
                name.clone(),
                *union_all,
                cte_schema,
            ))
        }
    };
    Ok(op)
}

fn child_types(arena: &QueryArena, id: Option<PlanId>) -> Result<Vec<DataType>> {
    id.and_then(|id| arena.plan_nodes.get(id))
        .map(|n| n.schema.types())
        .ok_or_else(|| Error::internal("dangling plan node"))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ExecState {
    Pending,
    Open,
    Finished,
    Failed,
}

/// Pull driver over the root of a plan.
///
/// The output schema is known before the first block is pulled. Any error
/// ends the stream; the first one is kept in the arena and returned from
/// every later call.
pub struct QueryExecution<'a> {
    ctx: ExecContext<'a>,
    root: Box<dyn BlockOperator>,
    schema: Schema,
    state: ExecState,
}

impl<'a> QueryExecution<'a> {
    pub fn new(db: &'a Database, arena: &'a QueryArena, config: &'a EngineConfig, plan: PlanId) -> Result<Self> {
        let schema = arena
            .plan_nodes
            .get(plan)
            .map(|n| n.schema.clone())
            .ok_or_else(|| Error::internal("dangling plan node"))?;
        let root = build_operator(arena, plan)?;
        Ok(Self {
            ctx: ExecContext::new(db, arena, config),
            root,
            schema,
            state: ExecState::Pending,
        })
    }

    /// Output columns.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The first error recorded for this query.
    pub fn error(&self) -> Option<&Error> {
        self.ctx.arena.error()
    }

    fn fail(&mut self, error: Error) -> Error {
        self.ctx.arena.record_error(error.clone());
        if self.state == ExecState::Open {
            self.root.close();
        }
        self.state = ExecState::Failed;
        self.ctx.arena.error().cloned().unwrap_or(error)
    }

    /// Pulls the next block; `None` at end of stream.
    pub fn next_block(&mut self) -> Result<Option<RowBlock>> {
        match self.state {
            ExecState::Finished => return Ok(None),
            ExecState::Failed => {
                return Err(self
                    .ctx
                    .arena
                    .error()
                    .cloned()
                    .unwrap_or_else(|| Error::internal("query failed")))
            }
            ExecState::Pending => {
                if let Err(e) = self.root.open(&self.ctx) {
                    return Err(self.fail(e));
                }
                self.state = ExecState::Open;
            }
            ExecState::Open => {}
        }
        match self.root.next(&self.ctx) {
            Ok(Some(block)) => Ok(Some(block)),
            Ok(None) => {
                self.root.close();
                self.state = ExecState::Finished;
                Ok(None)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Pulls every remaining row.
    pub fn collect_rows(&mut self) -> Result<Vec<Vec<Value>>> {
        let mut rows = Vec::new();
        while let Some(block) = self.next_block()? {
            rows.extend(block.positions().map(|p| block.row_values(p)));
        }
        Ok(rows)
    }

    /// Stops pulling and releases operator state.
    pub fn close(&mut self) {
        if self.state == ExecState::Open {
            self.root.close();
        }
        self.state = ExecState::Finished;
    }
}

impl Drop for QueryExecution<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Splits `rows` into chunks of at most `BLOCK_CAPACITY` for emission.
pub(crate) fn chunk_ranges(len: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..len)
        .step_by(strata_core::BLOCK_CAPACITY)
        .map(move |start| (start, (len - start).min(strata_core::BLOCK_CAPACITY)))
}

/// Empty block with the given column types.
pub(crate) fn empty_block(types: &[DataType]) -> RowBlock {
    RowBlock::from_columns(types.iter().map(|&t| ColumnBlock::new(t)).collect(), 0)
}

/// Cursor emitting a materialized buffer in block-sized slices.
#[derive(Debug, Default)]
pub(crate) struct BufferCursor {
    rows: Option<FlatColumns>,
    order: Option<Vec<u32>>,
    next: usize,
}

impl BufferCursor {
    pub(crate) fn new(rows: FlatColumns, order: Option<Vec<u32>>) -> Self {
        Self {
            rows: Some(rows),
            order,
            next: 0,
        }
    }

    pub(crate) fn next_block(&mut self) -> Option<RowBlock> {
        let rows = self.rows.as_ref()?;
        let total = self.order.as_ref().map_or(rows.len(), |o| o.len());
        if self.next >= total {
            return None;
        }
        let len = (total - self.next).min(strata_core::BLOCK_CAPACITY);
        let block = match &self.order {
            Some(order) => rows.gather_block(&order[self.next..self.next + len]),
            None => rows.slice_block(self.next, len),
        };
        self.next += len;
        Some(block)
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Casts columns whose type differs from `types`, compacting if needed.
pub(crate) fn conform(block: RowBlock, types: &[DataType]) -> Result<RowBlock> {
    if block
        .columns()
        .iter()
        .zip(types)
        .all(|(c, t)| c.data_type() == *t)
    {
        return Ok(block);
    }
    let selection = block.selection_rc();
    let mut columns = Vec::with_capacity(types.len());
    for (c, &t) in block.columns().iter().zip(types) {
        if c.data_type() == t {
            columns.push(Rc::clone(c));
        } else {
            columns.push(Rc::new(c.cast(t)?));
        }
    }
    Ok(RowBlock::new(columns, block.physical_len()).with_selection_opt(selection))
}

#[cfg(test)]
pub(crate) mod test_util {
    //! Helpers shared by executor tests.

    use super::*;
    use alloc::string::String;
    use alloc::vec;

    /// Operator yielding fixed blocks.
    pub struct BlocksSource {
        blocks: Vec<RowBlock>,
        next: usize,
    }

    impl BlocksSource {
        pub fn new(blocks: Vec<RowBlock>) -> Self {
            Self { blocks, next: 0 }
        }

        /// One block built from rows of values.
        pub fn rows(types: &[DataType], rows: &[Vec<Value>]) -> Self {
            let mut flat = FlatColumns::new(types);
            for row in rows {
                flat.append_values(row).unwrap();
            }
            Self::new(vec![flat.slice_block(0, flat.len())])
        }
    }

    impl BlockOperator for BlocksSource {
        fn open(&mut self, _ctx: &ExecContext<'_>) -> Result<()> {
            self.next = 0;
            Ok(())
        }

        fn next(&mut self, _ctx: &ExecContext<'_>) -> Result<Option<RowBlock>> {
            let block = self.blocks.get(self.next).cloned();
            self.next += 1;
            Ok(block)
        }

        fn close(&mut self) {}
    }

    /// Runs `op` to completion and returns its visible rows.
    pub fn run(op: &mut dyn BlockOperator, ctx: &ExecContext<'_>) -> Vec<Vec<Value>> {
        op.open(ctx).unwrap();
        let mut rows = Vec::new();
        while let Some(block) = op.next(ctx).unwrap() {
            rows.extend(block.positions().map(|p| block.row_values(p)));
        }
        op.close();
        rows
    }

    pub fn ints(values: &[i64]) -> Vec<Vec<Value>> {
        values.iter().map(|&v| vec![Value::Int64(v)]).collect()
    }

    pub fn text(s: &str) -> Value {
        Value::Text(String::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;
    use alloc::vec;

    #[test]
    fn test_outer_value_depth() {
        let db = Database::new();
        let arena = QueryArena::new();
        let config = EngineConfig::default();
        let ctx = ExecContext::new(&db, &arena, &config);
        ctx.outer_rows.borrow_mut().push(vec![Value::Int64(1), Value::Int64(2)]);
        ctx.outer_rows.borrow_mut().push(vec![Value::Int64(3)]);
        assert_eq!(ctx.outer_value(1, 0).unwrap(), Value::Int64(3));
        assert_eq!(ctx.outer_value(2, 1).unwrap(), Value::Int64(2));
        assert_eq!(ctx.outer_value(1, 1).unwrap_err().sqlstate(), "XX000");
        assert!(ctx.outer_value(3, 0).is_err());
    }

    #[test]
    fn test_chunk_ranges() {
        let chunks: Vec<_> = chunk_ranges(2100).collect();
        assert_eq!(chunks, vec![(0, 1024), (1024, 1024), (2048, 52)]);
        assert_eq!(chunk_ranges(0).count(), 0);
    }

    #[test]
    fn test_buffer_cursor_order() {
        let mut flat = FlatColumns::new(&[DataType::Int64]);
        for v in 0..3 {
            flat.append_values(&[Value::Int64(v)]).unwrap();
        }
        let mut cursor = BufferCursor::new(flat, Some(vec![2, 0, 1]));
        let block = cursor.next_block().unwrap();
        assert_eq!(block.value(0, 0), Value::Int64(2));
        assert!(cursor.next_block().is_none());
    }

    #[test]
    fn test_subquery_membership() {
        let result = SubqueryResult::new(2, vec![Value::Int32(1), Value::Null]);
        assert_eq!(result.contains(&Value::Int64(1)), Some(true));
        assert_eq!(result.contains(&Value::Int64(2)), None);
        let empty = SubqueryResult::new(0, vec![]);
        assert_eq!(empty.contains(&Value::Null), Some(false));
    }

    #[test]
    fn test_conform_casts() {
        let db = Database::new();
        let arena = QueryArena::new();
        let config = EngineConfig::default();
        let ctx = ExecContext::new(&db, &arena, &config);
        let mut src = BlocksSource::rows(&[DataType::Int32], &[vec![Value::Int32(7)]]);
        src.open(&ctx).unwrap();
        let block = src.next(&ctx).unwrap().unwrap();
        let block = conform(block, &[DataType::Int64]).unwrap();
        assert_eq!(block.column(0).data_type(), DataType::Int64);
        assert_eq!(block.value(0, 0), Value::Int64(7));
    }
}
