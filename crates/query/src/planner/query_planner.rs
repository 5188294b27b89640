//! Physical planning of a logical query.
//!
//! Planning walks each SELECT block bottom-up in one pass:
//!
//! 1. **Sources** - stored tables, CTEs, derived tables and
//!    `generate_series`, joined left-deep. Equality conjuncts of an ON clause
//!    that compare the two sides become hash join keys (build on the smaller
//!    estimate); joins without such keys run as nested loops.
//! 2. **Access path** - on a single-table scan, `col = literal` over an
//!    indexed column becomes an index lookup; other `col <op> literal`
//!    conjuncts become leaf filters evaluated inside the scan.
//! 3. **WHERE** - uncorrelated `[NOT] IN (subquery)` conjuncts become hash
//!    semi/anti joins, the remaining conjuncts one filter.
//! 4. **Grouping** - one aggregate node per grouping set (ROLLUP prefixes,
//!    CUBE powerset), combined with UNION ALL; HAVING filters the result.
//! 5. **Windows**, the select list, DISTINCT, ORDER BY (fused with LIMIT into
//!    top-N when both are present) and LIMIT/OFFSET.
//!
//! Constructs the block engine cannot run surface as
//! [`PlanOutcome::NotImplemented`], and every node built for the query is
//! discarded.

use super::binder::{
    aggregate_type, conjuncts, resolve, same_expr, walk_expr, walk_predicate, Bound, GroupKey, Grouping, Scope,
};
use super::physical::{
    AggSpec, Field, LeafFilter, PhysExpr, PhysExprId, PlanId, PlanNode, PlanOp, PlanOutcome, Schema, SortKey,
    WindowOrder, WindowSpec,
};
use crate::arena::{IdxRange, QueryArena};
use crate::ast::{
    AggFunc, AggId, CompareOp, CteDef, Expr, ExprId, FrameBound, FrameMode, GroupingKind, JoinClause, JoinKind,
    OrderItem, PredId, Predicate, QueryBody, QueryId, Select, SelectItem, SetOpKind, TableSource, WindowFrame,
    WindowFunc, WindowId,
};
use crate::catalog::Catalog;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use strata_core::{DataType, Error, Result, Value};
use tracing::debug;

/// CUBE over more keys than this is rejected.
const MAX_CUBE_KEYS: usize = 12;

/// Fallback estimate for sources without statistics.
const UNKNOWN_ROWS: f64 = 1000.0;

/// A CTE name visible while planning.
#[derive(Clone, Debug)]
struct CteBinding {
    name: String,
    slot: usize,
    schema: Schema,
    rows: f64,
}

/// A planned CTE waiting to be wrapped around its consumer.
struct Materialize {
    slot: usize,
    name: String,
    base: PlanId,
    step: Option<PlanId>,
    union_all: bool,
}

/// Output columns of a SELECT block under construction.
#[derive(Default)]
struct Projection {
    exprs: Vec<PhysExprId>,
    fields: Vec<Field>,
    /// Select-list expression each column came from.
    sources: Vec<Option<ExprId>>,
}

impl Projection {
    fn push(&mut self, expr: PhysExprId, field: Field, source: Option<ExprId>) {
        self.exprs.push(expr);
        self.fields.push(field);
        self.sources.push(source);
    }
}

/// Which join input an expression reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Neither,
    Left,
    Right,
    Both,
}

impl Side {
    fn merge(self, other: Side) -> Side {
        match (self, other) {
            (Side::Neither, s) | (s, Side::Neither) => s,
            (a, b) if a == b => a,
            _ => Side::Both,
        }
    }
}

/// Bound UPDATE/DELETE expressions, evaluated against stored rows.
#[derive(Clone, Debug, PartialEq)]
pub struct DmlBinding {
    pub filter: Option<PhysExprId>,
    /// Column position and value expression per assignment.
    pub assignments: Vec<(usize, PhysExprId)>,
}

/// Builds physical plans into a [`QueryArena`].
///
/// A planner is used for one query: construct it, then call [`plan`](Self::plan).
pub struct QueryPlanner<'a, C: Catalog + ?Sized> {
    pub(super) catalog: &'a C,
    pub(super) arena: &'a mut QueryArena,
    /// Scopes of the queries enclosing the subquery being planned, innermost last.
    pub(super) outer: Vec<Scope>,
    /// One flag per `outer` level: set when the subquery planned at that
    /// level references an enclosing scope.
    pub(super) correlated: Vec<bool>,
    ctes: Vec<CteBinding>,
    next_slot: usize,
}

impl<'a, C: Catalog + ?Sized> QueryPlanner<'a, C> {
    pub fn new(catalog: &'a C, arena: &'a mut QueryArena) -> Self {
        Self {
            catalog,
            arena,
            outer: Vec::new(),
            correlated: Vec::new(),
            ctes: Vec::new(),
            next_slot: 0,
        }
    }

    /// Plans `query`.
    ///
    /// Errors are reserved for invalid queries (unknown names, type errors);
    /// valid queries the block engine cannot run return
    /// [`PlanOutcome::NotImplemented`].
    pub fn plan(mut self, query: QueryId) -> Result<PlanOutcome> {
        let mark = self.arena.plan_mark();
        match self.plan_query(query) {
            Ok(root) => {
                debug!(nodes = self.arena.plan_nodes.len(), "query planned");
                Ok(PlanOutcome::Planned(root))
            }
            Err(e) => {
                self.arena.rollback_plan(mark);
                if e.is_fallback() {
                    debug!(reason = %e, "query not supported by the block engine");
                    Ok(PlanOutcome::NotImplemented { reason: e.to_string() })
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Binds the filter and assignments of an UPDATE or DELETE over the
    /// columns of stored table `table`. Assigned values are cast to the
    /// column type.
    pub fn bind_dml(
        mut self,
        table: &str,
        filter: Option<PredId>,
        assignments: &[(&str, ExprId)],
    ) -> Result<DmlBinding> {
        let catalog = self.catalog;
        let schema = catalog.schema(table).ok_or_else(|| Error::table_not_found(table))?;
        let scope = Scope::new(Schema::new(
            schema
                .columns()
                .iter()
                .map(|c| Field::new(Some(schema.name()), c.name(), c.data_type()))
                .collect(),
        ));
        let filter = filter.map(|f| self.bind_predicate(&scope, f)).transpose()?;
        let mut bound = Vec::with_capacity(assignments.len());
        for (name, expr) in assignments {
            let column = schema.column_index(name).ok_or_else(|| Error::column_not_found(*name))?;
            if bound.iter().any(|(c, _)| *c == column) {
                return Err(Error::invalid_query(format!("column \"{}\" assigned more than once", name)));
            }
            let ty = schema.columns()[column].data_type();
            let value = self.bind_expr(&scope, *expr)?;
            let value = self.coerce_literal(value, Some(ty))?;
            if let Some(t) = value.ty {
                if t != ty && t.unify(ty).is_none() && t != DataType::Text {
                    return Err(Error::type_mismatch(ty, t));
                }
            }
            bound.push((column, self.cast_to(value, ty)?));
        }
        debug!(table, assignments = bound.len(), filtered = filter.is_some(), "DML bound");
        Ok(DmlBinding {
            filter,
            assignments: bound,
        })
    }

    // ---- nodes ----

    fn node(
        &mut self,
        op: PlanOp,
        left: Option<PlanId>,
        right: Option<PlanId>,
        schema: Schema,
        estimated_rows: f64,
    ) -> Result<PlanId> {
        self.arena.plan_nodes.push(PlanNode {
            op,
            left,
            right,
            schema,
            estimated_rows,
        })
    }

    fn schema_of(&self, plan: PlanId) -> Schema {
        self.arena.plan_nodes[plan].schema.clone()
    }

    fn rows_of(&self, plan: PlanId) -> f64 {
        self.arena.plan_nodes[plan].estimated_rows
    }

    fn filter(&mut self, input: PlanId, predicate: PhysExprId, selectivity: f64) -> Result<PlanId> {
        let schema = self.schema_of(input);
        let rows = self.rows_of(input) * selectivity;
        self.node(PlanOp::Filter { predicate }, Some(input), None, schema, rows)
    }

    fn and_all(&mut self, preds: Vec<PhysExprId>) -> Result<Option<PhysExprId>> {
        let mut acc: Option<PhysExprId> = None;
        for p in preds {
            acc = Some(match acc {
                None => p,
                Some(a) => self.phys(PhysExpr::And(a, p))?,
            });
        }
        Ok(acc)
    }

    fn cast_to(&mut self, b: Bound, ty: DataType) -> Result<PhysExprId> {
        match b.ty {
            Some(t) if t != ty => self.phys(PhysExpr::Cast { expr: b.id, to: ty }),
            _ => Ok(b.id),
        }
    }

    // ---- queries ----

    pub(crate) fn plan_query(&mut self, query: QueryId) -> Result<PlanId> {
        let q = self.arena.queries[query];
        let scoped = self.ctes.len();
        let mut materialized = Vec::with_capacity(q.ctes.len());
        let mut body = Ok(None);
        for def in q.ctes.iter() {
            let def = self.arena.ctes[def];
            match self.plan_cte(def) {
                Ok(m) => materialized.push(m),
                Err(e) => {
                    body = Err(e);
                    break;
                }
            }
        }
        if body.is_ok() {
            body = match q.body {
                QueryBody::Select(select) => self.plan_select(&select, q.order_by, q.limit, q.offset),
                QueryBody::SetOp { op, all, left, right } => self.plan_set_op(op, all, left, right).and_then(|plan| {
                    let keys = self.output_order(plan, q.order_by)?;
                    self.order_and_limit(plan, keys, q.limit, q.offset)
                }),
            }
            .map(Some);
        }
        self.ctes.truncate(scoped);
        let mut root = body?.ok_or_else(|| Error::internal("query produced no plan"))?;
        for m in materialized.into_iter().rev() {
            let schema = self.schema_of(root);
            let rows = self.rows_of(root);
            root = self.node(
                PlanOp::CteMaterialize {
                    slot: m.slot,
                    name: m.name,
                    step: m.step,
                    union_all: m.union_all,
                },
                Some(root),
                Some(m.base),
                schema,
                rows,
            )?;
        }
        Ok(root)
    }

    fn plan_cte(&mut self, def: CteDef) -> Result<Materialize> {
        let name = String::from(self.arena.str(def.name));
        let slot = self.next_slot;
        self.next_slot += 1;
        let query = self.arena.queries[def.query];
        let recursive = match query.body {
            QueryBody::SetOp {
                op: SetOpKind::Union,
                all,
                left,
                right,
            } if def.recursive => Some((all, left, right)),
            _ => None,
        };
        let (base, step, union_all) = match recursive {
            Some((all, left, right)) => {
                if !query.order_by.is_empty() || query.limit.is_some() || query.offset.is_some() || !query.ctes.is_empty() {
                    return Err(Error::not_supported("WITH, ORDER BY or LIMIT on a recursive query"));
                }
                let base = self.plan_query(left)?;
                let schema = self.schema_of(base).requalify(&name);
                let rows = self.rows_of(base);
                self.ctes.push(CteBinding {
                    name: name.clone(),
                    slot,
                    schema: schema.clone(),
                    rows,
                });
                let step = self.plan_query(right)?;
                let step = self.conform(step, &schema)?;
                (base, Some(step), all)
            }
            None => {
                let base = self.plan_query(def.query)?;
                let schema = self.schema_of(base).requalify(&name);
                let rows = self.rows_of(base);
                self.ctes.push(CteBinding {
                    name: name.clone(),
                    slot,
                    schema,
                    rows,
                });
                (base, None, true)
            }
        };
        debug!(cte = %name, slot, recursive = step.is_some(), "CTE planned");
        Ok(Materialize {
            slot,
            name,
            base,
            step,
            union_all,
        })
    }

    /// Casts the output of `plan` to the types of `schema`.
    fn conform(&mut self, plan: PlanId, schema: &Schema) -> Result<PlanId> {
        let current = self.schema_of(plan);
        if current.len() != schema.len() {
            return Err(Error::invalid_query(format!(
                "recursive query has {} columns in its base and {} in its step",
                schema.len(),
                current.len()
            )));
        }
        if current.types() == schema.types() {
            return Ok(plan);
        }
        let mut exprs = Vec::with_capacity(schema.len());
        for (i, (from, to)) in current.fields().iter().zip(schema.fields()).enumerate() {
            if from.data_type.unify(to.data_type).is_none() && from.data_type != DataType::Text {
                return Err(Error::type_mismatch(to.data_type, from.data_type));
            }
            let column = self.phys(PhysExpr::Column(i))?;
            exprs.push(self.cast_to(
                Bound {
                    id: column,
                    ty: Some(from.data_type),
                },
                to.data_type,
            )?);
        }
        let rows = self.rows_of(plan);
        self.node(PlanOp::ExprProject { exprs }, Some(plan), None, schema.clone(), rows)
    }

    fn plan_set_op(&mut self, op: SetOpKind, all: bool, left: QueryId, right: QueryId) -> Result<PlanId> {
        let l = self.plan_query(left)?;
        let r = self.plan_query(right)?;
        let (ls, rs) = (self.schema_of(l), self.schema_of(r));
        if ls.len() != rs.len() {
            return Err(Error::invalid_query(format!(
                "each {} query must have the same number of columns",
                op.name().to_uppercase()
            )));
        }
        let mut fields = Vec::with_capacity(ls.len());
        for (a, b) in ls.fields().iter().zip(rs.fields()) {
            let ty = a
                .data_type
                .unify(b.data_type)
                .ok_or_else(|| Error::type_mismatch(a.data_type, b.data_type))?;
            fields.push(Field::new(None, &a.name, ty));
        }
        let (lr, rr) = (self.rows_of(l), self.rows_of(r));
        let rows = match op {
            SetOpKind::Union => lr + rr,
            SetOpKind::Intersect => lr.min(rr),
            SetOpKind::Except => lr,
        };
        self.node(PlanOp::SetOp { op, all }, Some(l), Some(r), Schema::new(fields), rows)
    }

    /// ORDER BY over a set operation: output names and positions only.
    fn output_order(&mut self, plan: PlanId, order_by: IdxRange<OrderItem>) -> Result<Vec<SortKey>> {
        let schema = self.schema_of(plan);
        let items = self.arena.order_items.slice(order_by).to_vec();
        let mut keys = Vec::with_capacity(items.len());
        for item in items {
            let column = match self.order_position(item.expr, schema.len())? {
                Some(c) => c,
                None => match self.arena.exprs[item.expr] {
                    Expr::Column { table: None, name } => {
                        let name = self.arena.str(name);
                        schema
                            .fields()
                            .iter()
                            .position(|f| f.name.eq_ignore_ascii_case(name))
                            .ok_or_else(|| Error::column_not_found(name))?
                    }
                    _ => {
                        return Err(Error::invalid_query(
                            "ORDER BY on a set operation must name an output column",
                        ))
                    }
                },
            };
            keys.push(sort_key(column, item));
        }
        Ok(keys)
    }

    /// 1-based output position written as an integer literal.
    fn order_position(&self, expr: ExprId, width: usize) -> Result<Option<usize>> {
        let Expr::Literal(cell) = self.arena.exprs[expr] else {
            return Ok(None);
        };
        let n = match self.arena.cells[cell] {
            Value::Int32(n) => n as i64,
            Value::Int64(n) => n,
            _ => return Ok(None),
        };
        if n < 1 || n as usize > width {
            return Err(Error::invalid_query(format!("ORDER BY position {} is not in select list", n)));
        }
        Ok(Some(n as usize - 1))
    }

    fn order_and_limit(
        &mut self,
        plan: PlanId,
        keys: Vec<SortKey>,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<PlanId> {
        let schema = self.schema_of(plan);
        let rows = self.rows_of(plan);
        let offset = offset.unwrap_or(0);
        let limited = |n: f64| match limit {
            Some(l) => n.min(l.saturating_add(offset) as f64),
            None => n,
        };
        if keys.is_empty() {
            if limit.is_none() && offset == 0 {
                return Ok(plan);
            }
            return self.node(PlanOp::Limit { limit, offset }, Some(plan), None, schema, limited(rows));
        }
        if let Some(limit) = limit {
            debug!(limit, offset, "sort fused with limit");
            return self.node(
                PlanOp::TopN { keys, limit, offset },
                Some(plan),
                None,
                schema,
                limited(rows),
            );
        }
        let sorted = self.node(PlanOp::Sort { keys }, Some(plan), None, schema.clone(), rows)?;
        if offset == 0 {
            return Ok(sorted);
        }
        self.node(PlanOp::Limit { limit: None, offset }, Some(sorted), None, schema, rows)
    }

    // ---- SELECT ----

    fn plan_select(
        &mut self,
        select: &Select,
        order_by: IdxRange<OrderItem>,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<PlanId> {
        let mut plan = self.plan_from(select)?;
        let mut scope = Scope::new(self.schema_of(plan));
        if let Some(filter) = select.filter {
            plan = self.plan_where(plan, &scope, filter)?;
        }

        let aggregates = self.collect_aggregates(select, order_by);
        if !select.group_by.is_empty() || !aggregates.is_empty() || select.having.is_some() {
            (plan, scope) = self.plan_aggregate(plan, scope, select, aggregates)?;
            if let Some(having) = select.having {
                let pred = self.bind_predicate(&scope, having)?;
                plan = self.filter(plan, pred, 0.5)?;
            }
        }

        let windows = self.collect_windows(select, order_by);
        if !windows.is_empty() {
            (plan, scope) = self.plan_windows(plan, scope, &windows)?;
        }

        let mut projection = self.bind_select_list(&scope, select)?;
        let visible = projection.exprs.len();
        let items = self.arena.order_items.slice(order_by).to_vec();
        let mut keys = Vec::with_capacity(items.len());
        for item in items {
            let column = self.order_column(&scope, &mut projection, visible, item.expr)?;
            keys.push(sort_key(column, item));
        }
        let hidden = projection.exprs.len() > visible;
        if select.distinct && hidden {
            return Err(Error::not_supported(
                "SELECT DISTINCT with ORDER BY expressions not in the select list",
            ));
        }

        plan = self.project(plan, projection.exprs, projection.fields)?;
        if select.distinct {
            let schema = self.schema_of(plan);
            let rows = self.rows_of(plan);
            plan = self.node(PlanOp::Distinct, Some(plan), None, schema, rows)?;
        }
        plan = self.order_and_limit(plan, keys, limit, offset)?;
        if hidden {
            let schema = Schema::new(self.schema_of(plan).fields()[..visible].to_vec());
            let rows = self.rows_of(plan);
            plan = self.node(
                PlanOp::Project {
                    columns: (0..visible).collect(),
                },
                Some(plan),
                None,
                schema,
                rows,
            )?;
        }
        Ok(plan)
    }

    fn project(&mut self, input: PlanId, exprs: Vec<PhysExprId>, fields: Vec<Field>) -> Result<PlanId> {
        let input_schema = self.schema_of(input);
        let rows = self.rows_of(input);
        let mut columns = Vec::with_capacity(exprs.len());
        for (e, f) in exprs.iter().zip(&fields) {
            match self.arena.phys_exprs[*e] {
                PhysExpr::Column(c) if input_schema.field(c).is_some_and(|i| i.data_type == f.data_type) => {
                    columns.push(c)
                }
                _ => break,
            }
        }
        let schema = Schema::new(fields);
        if columns.len() == exprs.len() {
            if schema == input_schema && columns.iter().enumerate().all(|(i, c)| i == *c) {
                return Ok(input);
            }
            return self.node(PlanOp::Project { columns }, Some(input), None, schema, rows);
        }
        self.node(PlanOp::ExprProject { exprs }, Some(input), None, schema, rows)
    }

    fn plan_from(&mut self, select: &Select) -> Result<PlanId> {
        let Some(source) = select.from else {
            if !select.joins.is_empty() {
                return Err(Error::invalid_query("JOIN requires a FROM clause"));
            }
            return self.node(
                PlanOp::Values { rows: vec![Vec::new()] },
                None,
                None,
                Schema::default(),
                1.0,
            );
        };
        let mut plan = self.plan_source(source)?;
        for join in select.joins.iter() {
            let clause = self.arena.joins[join];
            plan = self.plan_join(plan, clause)?;
        }
        Ok(plan)
    }

    fn plan_source(&mut self, source: TableSource) -> Result<PlanId> {
        match source {
            TableSource::Named { name, alias } => {
                let name = String::from(self.arena.str(name));
                let alias = alias.map(|a| String::from(self.arena.str(a)));
                let qualifier = alias.as_deref().unwrap_or(&name);
                if let Some(cte) = self.ctes.iter().rev().find(|c| c.name.eq_ignore_ascii_case(&name)) {
                    let schema = cte.schema.requalify(qualifier);
                    let op = PlanOp::CteScan {
                        slot: cte.slot,
                        name: cte.name.clone(),
                    };
                    let rows = cte.rows;
                    return self.node(op, None, None, schema, rows);
                }
                let catalog = self.catalog;
                let table = catalog.schema(&name).ok_or_else(|| Error::table_not_found(&name))?;
                let schema = Schema::new(
                    table
                        .columns()
                        .iter()
                        .map(|c| Field::new(Some(qualifier), c.name(), c.data_type()))
                        .collect(),
                );
                let rows = catalog.row_count(table.name()) as f64;
                self.node(
                    PlanOp::SeqScan {
                        table: String::from(table.name()),
                        leaf_filters: Vec::new(),
                    },
                    None,
                    None,
                    schema,
                    rows,
                )
            }
            TableSource::Subquery { query, alias } => {
                let plan = self.plan_query(query)?;
                let alias = String::from(self.arena.str(alias));
                if let Some(node) = self.arena.plan_nodes.get_mut(plan) {
                    node.schema = node.schema.requalify(&alias);
                }
                Ok(plan)
            }
            TableSource::GenerateSeries {
                start,
                stop,
                step,
                alias,
            } => {
                let scope = Scope::default();
                let start = self.series_arg(&scope, start)?;
                let stop = self.series_arg(&scope, stop)?;
                let step = step.map(|s| self.series_arg(&scope, s)).transpose()?;
                let name = alias.map_or_else(|| String::from("generate_series"), |a| String::from(self.arena.str(a)));
                let rows = match (self.literal_i64(start), self.literal_i64(stop), step.map(|s| self.literal_i64(s))) {
                    (Some(a), Some(b), None) => (b.saturating_sub(a) as f64 + 1.0).max(0.0),
                    (Some(a), Some(b), Some(Some(s))) if s != 0 => (b.saturating_sub(a) as f64 / s as f64 + 1.0).max(0.0),
                    _ => UNKNOWN_ROWS,
                };
                let schema = Schema::new(vec![Field::new(Some(&name), &name, DataType::Int64)]);
                self.node(PlanOp::TableFunction { start, stop, step }, None, None, schema, rows)
            }
        }
    }

    fn series_arg(&mut self, scope: &Scope, expr: ExprId) -> Result<PhysExprId> {
        let b = self.bind_expr(scope, expr)?;
        match b.ty {
            Some(t) if !t.is_integer() => Err(Error::type_mismatch(DataType::Int64, t)),
            _ => Ok(b.id),
        }
    }

    fn literal_i64(&self, expr: PhysExprId) -> Option<i64> {
        match &self.arena.phys_exprs[expr] {
            PhysExpr::Literal(v) => v.as_i64(),
            _ => None,
        }
    }

    // ---- joins ----

    fn plan_join(&mut self, left: PlanId, clause: JoinClause) -> Result<PlanId> {
        let right = self.plan_source(clause.source)?;
        let (ls, rs) = (self.schema_of(left), self.schema_of(right));
        let (lrows, rrows) = (self.rows_of(left), self.rows_of(right));
        let joined = ls.join(&rs);
        let on = match clause.kind {
            JoinKind::Cross => None,
            _ => clause.on,
        };
        let Some(on) = on else {
            debug!(kind = clause.kind.name(), "nested loop join without condition");
            return self.node(
                PlanOp::NestedLoopJoin {
                    kind: clause.kind,
                    condition: None,
                },
                Some(left),
                Some(right),
                joined,
                lrows * rrows,
            );
        };

        let mut preds = Vec::new();
        conjuncts(&*self.arena, on, &mut preds);
        let (left_scope, right_scope) = (Scope::new(ls.clone()), Scope::new(rs.clone()));
        let mut left_keys = Vec::new();
        let mut right_keys = Vec::new();
        let mut key_types = Vec::new();
        let mut rest = Vec::new();
        for p in preds {
            if let Predicate::Compare {
                left: a,
                op: CompareOp::Eq,
                right: b,
            } = self.arena.predicates[p]
            {
                let pair = match (self.side_of(a, &ls, &rs), self.side_of(b, &ls, &rs)) {
                    (Side::Left, Side::Right) => Some((a, b)),
                    (Side::Right, Side::Left) => Some((b, a)),
                    _ => None,
                };
                if let Some((l, r)) = pair {
                    let lb = self.bind_expr(&left_scope, l)?;
                    let rb = self.bind_expr(&right_scope, r)?;
                    let (lb, rb) = self.comparable(lb, rb)?;
                    let ty = match (lb.ty, rb.ty) {
                        (Some(x), Some(y)) => x.unify(y).unwrap_or(x),
                        (x, y) => x.or(y).unwrap_or(DataType::Text),
                    };
                    left_keys.push(self.cast_to(lb, ty)?);
                    right_keys.push(self.cast_to(rb, ty)?);
                    key_types.push(ty);
                    continue;
                }
            }
            rest.push(p);
        }

        let scope = Scope::new(joined.clone());
        if left_keys.is_empty() {
            let condition = self.bind_predicate(&scope, on)?;
            debug!(kind = clause.kind.name(), "nested loop join, no equality keys");
            return self.node(
                PlanOp::NestedLoopJoin {
                    kind: clause.kind,
                    condition: Some(condition),
                },
                Some(left),
                Some(right),
                joined,
                (lrows * rrows / 3.0).max(1.0),
            );
        }
        let mut residual = Vec::with_capacity(rest.len());
        for p in rest {
            residual.push(self.bind_predicate(&scope, p)?);
        }
        let residual = self.and_all(residual)?;
        let build_left = lrows < rrows;
        debug!(
            kind = clause.kind.name(),
            keys = left_keys.len(),
            build = if build_left { "left" } else { "right" },
            residual = residual.is_some(),
            "hash join"
        );
        self.node(
            PlanOp::HashJoin {
                kind: clause.kind,
                left_keys,
                right_keys,
                key_types,
                residual,
                build_left,
            },
            Some(left),
            Some(right),
            joined,
            lrows.max(rrows),
        )
    }

    fn side_of(&self, expr: ExprId, left: &Schema, right: &Schema) -> Side {
        let arena = &*self.arena;
        let mut side = Side::Neither;
        walk_expr(arena, expr, &mut |node| {
            let here = match node {
                Expr::Column { table, name } => {
                    let (t, n) = (table.map(|t| arena.str(t)), arena.str(*name));
                    match (resolve(left, t, n), resolve(right, t, n)) {
                        (Ok(Some(_)), Ok(None)) => Side::Left,
                        (Ok(None), Ok(Some(_))) => Side::Right,
                        // enclosing query column, constant for the join
                        (Ok(None), Ok(None)) => Side::Neither,
                        _ => Side::Both,
                    }
                }
                Expr::Subquery(_) | Expr::Predicate(_) | Expr::Aggregate(_) | Expr::Window(_) => Side::Both,
                _ => Side::Neither,
            };
            side = side.merge(here);
            true
        });
        side
    }

    // ---- WHERE ----

    fn plan_where(&mut self, plan: PlanId, scope: &Scope, filter: PredId) -> Result<PlanId> {
        let mut preds = Vec::new();
        conjuncts(&*self.arena, filter, &mut preds);
        let mut plan = self.access_path(plan, scope, &mut preds)?;
        let mut residual = Vec::new();
        for p in preds {
            if let Predicate::InSubquery { expr, query, negated } = self.arena.predicates[p] {
                let probe = self.bind_expr(scope, expr)?;
                let (sub, correlated) = self.plan_subquery(scope, query)?;
                let key_type = self.check_membership(probe, sub)?;
                if correlated {
                    residual.push(self.phys(PhysExpr::InSubquery {
                        expr: probe.id,
                        plan: sub,
                        negated,
                        correlated,
                    })?);
                } else {
                    debug!(anti = negated, "IN subquery planned as a semi join");
                    let schema = self.schema_of(plan);
                    let rows = self.rows_of(plan) * 0.5;
                    plan = self.node(
                        PlanOp::HashSemiJoin {
                            probe_key: probe.id,
                            key_type: key_type.unwrap_or(DataType::Text),
                            anti: negated,
                        },
                        Some(plan),
                        Some(sub),
                        schema,
                        rows,
                    )?;
                }
                continue;
            }
            residual.push(self.bind_predicate(scope, p)?);
        }
        match self.and_all(residual)? {
            Some(pred) => self.filter(plan, pred, 0.5),
            None => Ok(plan),
        }
    }

    /// Chooses between index lookup, leaf filters and a plain scan for a
    /// single-table source. Conjuncts absorbed by the scan are removed from
    /// `preds`.
    fn access_path(&mut self, plan: PlanId, scope: &Scope, preds: &mut Vec<PredId>) -> Result<PlanId> {
        let node = &self.arena.plan_nodes[plan];
        let PlanOp::SeqScan { table, leaf_filters } = &node.op else {
            return Ok(plan);
        };
        if !leaf_filters.is_empty() {
            return Ok(plan);
        }
        let table = table.clone();
        let mut rows = node.estimated_rows;

        let mut leaves = Vec::new();
        let mut kept = Vec::new();
        for p in preds.drain(..) {
            match self.leaf_comparison(scope, p)? {
                Some(leaf) => leaves.push((p, leaf)),
                None => kept.push(p),
            }
        }
        let lookup = leaves
            .iter()
            .position(|(_, leaf)| leaf.op == CompareOp::Eq && self.catalog.has_index(&table, leaf.column));
        if let Some(i) = lookup {
            let (_, leaf) = leaves.remove(i);
            // the remaining comparisons filter the looked-up rows
            kept.extend(leaves.into_iter().map(|(p, _)| p));
            *preds = kept;
            debug!(table = %table, column = leaf.column, "index lookup selected");
            if let Some(node) = self.arena.plan_nodes.get_mut(plan) {
                node.op = PlanOp::IndexScan {
                    table,
                    column: leaf.column,
                    key: leaf.value,
                };
                node.estimated_rows = 1.0;
            }
            return Ok(plan);
        }
        *preds = kept;
        if leaves.is_empty() {
            return Ok(plan);
        }
        for (_, leaf) in &leaves {
            rows *= if leaf.op == CompareOp::Eq { 0.1 } else { 0.33 };
        }
        debug!(table = %table, filters = leaves.len(), "leaf filters pushed into scan");
        if let Some(node) = self.arena.plan_nodes.get_mut(plan) {
            node.op = PlanOp::SeqScan {
                table,
                leaf_filters: leaves.into_iter().map(|(_, leaf)| leaf).collect(),
            };
            node.estimated_rows = rows;
        }
        Ok(plan)
    }

    /// `column <op> literal` (either way round) over a typed scan column.
    fn leaf_comparison(&self, scope: &Scope, pred: PredId) -> Result<Option<LeafFilter>> {
        let Predicate::Compare { left, op, right } = self.arena.predicates[pred] else {
            return Ok(None);
        };
        let (column, op, cell) = match (self.arena.exprs[left], self.arena.exprs[right]) {
            (Expr::Column { table, name }, Expr::Literal(cell)) => ((table, name), op, cell),
            (Expr::Literal(cell), Expr::Column { table, name }) => ((table, name), op.flip(), cell),
            _ => return Ok(None),
        };
        let (table, name) = column;
        let Some(column) = resolve(&scope.schema, table.map(|t| self.arena.str(t)), self.arena.str(name))? else {
            return Ok(None);
        };
        let field_type = scope.schema.fields()[column].data_type;
        let value = self.arena.cells[cell].clone();
        let value = match value.data_type() {
            None => return Ok(None),
            Some(t) if t == field_type => value,
            Some(DataType::Text) => value.cast_to(field_type)?,
            Some(t) if t.is_integer() && field_type.is_integer() => match value.cast_to(field_type) {
                Ok(v) => v,
                Err(_) => return Ok(None),
            },
            Some(_) => return Ok(None),
        };
        Ok(Some(LeafFilter { column, op, value }))
    }

    // ---- grouping ----

    fn collect_aggregates(&self, select: &Select, order_by: IdxRange<OrderItem>) -> Vec<AggId> {
        let arena = &*self.arena;
        let mut found: Vec<AggId> = Vec::new();
        let mut visit = |node: &Expr| match node {
            Expr::Aggregate(id) => {
                if !found.contains(id) {
                    found.push(*id);
                }
                false
            }
            _ => true,
        };
        for e in select_exprs(arena, select) {
            walk_expr(arena, e, &mut visit);
        }
        if let Some(having) = select.having {
            walk_predicate(arena, having, &mut visit);
        }
        for item in arena.order_items.slice(order_by) {
            walk_expr(arena, item.expr, &mut visit);
        }
        found
    }

    fn plan_aggregate(
        &mut self,
        input: PlanId,
        scope: Scope,
        select: &Select,
        aggregates: Vec<AggId>,
    ) -> Result<(PlanId, Scope)> {
        let group_exprs = self.arena.expr_lists.slice(select.group_by).to_vec();
        let mut keys = Vec::with_capacity(group_exprs.len());
        let mut key_exprs = Vec::with_capacity(group_exprs.len());
        let mut fields = Vec::with_capacity(group_exprs.len() + aggregates.len());
        for e in group_exprs {
            let b = self.bind_expr(&scope, e)?;
            let column = match self.arena.phys_exprs[b.id] {
                PhysExpr::Column(c) => Some(c),
                _ => None,
            };
            fields.push(match column {
                Some(c) => scope.schema.fields()[c].clone(),
                None => Field::new(None, &self.expr_name(e), b.ty.unwrap_or(DataType::Text)),
            });
            keys.push(GroupKey { expr: e, column });
            key_exprs.push(b.id);
        }

        let mut specs = Vec::with_capacity(aggregates.len());
        for id in &aggregates {
            let call = self.arena.aggregates[*id];
            let arg = call.arg.map(|a| self.bind_expr(&scope, a)).transpose()?;
            if arg.is_none() && call.func != AggFunc::CountStar {
                return Err(Error::invalid_query(format!("{} requires an argument", call.func.name())));
            }
            let separator = call.separator.map(|s| self.bind_expr(&scope, s)).transpose()?;
            let output_type = aggregate_type(call.func, arg.and_then(|a| a.ty))?;
            let input_type = match call.func {
                AggFunc::CountStar => DataType::Int64,
                AggFunc::Count => arg.and_then(|a| a.ty).unwrap_or(DataType::Text),
                _ => arg.and_then(|a| a.ty).unwrap_or(output_type),
            };
            specs.push(AggSpec {
                func: call.func,
                arg: arg.map(|a| a.id),
                distinct: call.distinct,
                separator: separator.map(|s| s.id),
                input_type,
                output_type,
            });
            fields.push(Field::new(None, call.func.name(), output_type));
        }

        let n = keys.len();
        let sets: Vec<Vec<bool>> = match select.grouping {
            GroupingKind::Plain => vec![vec![true; n]],
            GroupingKind::Rollup => (0..=n).rev().map(|k| (0..n).map(|i| i < k).collect()).collect(),
            GroupingKind::Cube => {
                if n > MAX_CUBE_KEYS {
                    return Err(Error::limit_exceeded(format!(
                        "CUBE is limited to {} expressions",
                        MAX_CUBE_KEYS
                    )));
                }
                (0..1usize << n)
                    .rev()
                    .map(|m| (0..n).map(|i| m & (1 << (n - 1 - i)) != 0).collect())
                    .collect()
            }
        };
        debug!(
            keys = n,
            sets = sets.len(),
            aggregates = specs.len(),
            grouping = ?select.grouping,
            "aggregate planned"
        );

        let schema = Schema::new(fields);
        let input_rows = self.rows_of(input);
        let mut root: Option<PlanId> = None;
        for active in sets {
            let rows = if active.iter().any(|a| *a) {
                (input_rows / 10.0).max(1.0)
            } else {
                1.0
            };
            let agg = self.node(
                PlanOp::Aggregate {
                    group_by: key_exprs.clone(),
                    active,
                    aggregates: specs.clone(),
                },
                Some(input),
                None,
                schema.clone(),
                rows,
            )?;
            root = Some(match root {
                None => agg,
                Some(prev) => {
                    let rows = self.rows_of(prev) + rows;
                    self.node(
                        PlanOp::SetOp {
                            op: SetOpKind::Union,
                            all: true,
                        },
                        Some(prev),
                        Some(agg),
                        schema.clone(),
                        rows,
                    )?
                }
            });
        }
        let plan = root.ok_or_else(|| Error::internal("no grouping set"))?;
        let visible = schema.len();
        let grouped = Scope {
            schema,
            grouping: Some(Grouping {
                input: scope.schema,
                keys,
                aggregates,
            }),
            windows: Vec::new(),
            visible,
        };
        Ok((plan, grouped))
    }

    // ---- windows ----

    fn collect_windows(&self, select: &Select, order_by: IdxRange<OrderItem>) -> Vec<WindowId> {
        let arena = &*self.arena;
        let mut found: Vec<WindowId> = Vec::new();
        let mut visit = |node: &Expr| match node {
            Expr::Window(id) => {
                if !found.contains(id) {
                    found.push(*id);
                }
                false
            }
            _ => true,
        };
        for e in select_exprs(arena, select) {
            walk_expr(arena, e, &mut visit);
        }
        for item in arena.order_items.slice(order_by) {
            walk_expr(arena, item.expr, &mut visit);
        }
        found
    }

    fn plan_windows(&mut self, input: PlanId, mut scope: Scope, windows: &[WindowId]) -> Result<(PlanId, Scope)> {
        let mut schema = scope.schema.clone();
        let mut specs = Vec::with_capacity(windows.len());
        for id in windows {
            let call = self.arena.windows[*id];
            if call.distinct {
                return Err(Error::not_supported("DISTINCT in window functions"));
            }
            let (min, max) = window_arity(call.func);
            if call.args.len() < min || call.args.len() > max {
                return Err(Error::invalid_query(format!(
                    "window function {} takes {} to {} arguments, got {}",
                    call.func.name(),
                    min,
                    max,
                    call.args.len()
                )));
            }
            let frame = effective_frame(call.frame, !call.order_by.is_empty())?;
            let args = self.bind_list(&scope, call.args)?;
            let partition_by = self.bind_list(&scope, call.partition_by)?;
            let orders = self.arena.order_items.slice(call.order_by).to_vec();
            let mut order_by = Vec::with_capacity(orders.len());
            for o in orders {
                let b = self.bind_expr(&scope, o.expr)?;
                order_by.push(WindowOrder {
                    expr: b.id,
                    descending: o.descending,
                    nulls_first: o.nulls_first.unwrap_or(o.descending),
                });
            }
            let first = args.first().and_then(|a| a.ty);
            let output_type = match call.func {
                WindowFunc::RowNumber | WindowFunc::Rank | WindowFunc::DenseRank | WindowFunc::Ntile => DataType::Int64,
                WindowFunc::PercentRank | WindowFunc::CumeDist => DataType::Float64,
                WindowFunc::Lag
                | WindowFunc::Lead
                | WindowFunc::FirstValue
                | WindowFunc::LastValue
                | WindowFunc::NthValue => first.unwrap_or(DataType::Text),
                WindowFunc::Aggregate(f) => aggregate_type(f, first)?,
            };
            specs.push(WindowSpec {
                func: call.func,
                args: args.iter().map(|a| a.id).collect(),
                partition_by: partition_by.iter().map(|p| p.id).collect(),
                order_by,
                frame,
                output_type,
            });
            scope.windows.push((*id, schema.len()));
            schema.push(Field::new(None, call.func.name(), output_type));
        }
        debug!(functions = specs.len(), "window planned");
        let rows = self.rows_of(input);
        let plan = self.node(
            PlanOp::Window { functions: specs },
            Some(input),
            None,
            schema.clone(),
            rows,
        )?;
        scope.schema = schema;
        Ok((plan, scope))
    }

    // ---- select list and ORDER BY ----

    fn bind_select_list(&mut self, scope: &Scope, select: &Select) -> Result<Projection> {
        let items = self.arena.select_items.slice(select.items).to_vec();
        let mut out = Projection::default();
        for item in items {
            match item {
                SelectItem::Expr { expr, alias } => {
                    let b = self.bind_expr(scope, expr)?;
                    let ty = b.ty.unwrap_or(DataType::Text);
                    let field = match (alias, &self.arena.phys_exprs[b.id]) {
                        (Some(alias), _) => Field::new(None, self.arena.str(alias), ty),
                        (None, PhysExpr::Column(c)) if scope.grouping.is_none() => scope.schema.fields()[*c].clone(),
                        (None, _) => Field::new(None, &self.expr_name(expr), ty),
                    };
                    out.push(b.id, field, Some(expr));
                }
                SelectItem::Wildcard { table } => {
                    let table = table.map(|t| String::from(self.arena.str(t)));
                    self.expand_wildcard(scope, table.as_deref(), &mut out)?;
                }
            }
        }
        Ok(out)
    }

    fn expand_wildcard(&mut self, scope: &Scope, table: Option<&str>, out: &mut Projection) -> Result<()> {
        let source = match &scope.grouping {
            Some(g) => g.input.clone(),
            None => Schema::new(scope.schema.fields()[..scope.visible].to_vec()),
        };
        let mut matched = false;
        for (i, field) in source.fields().iter().enumerate() {
            if let Some(t) = table {
                if !field.qualifier.as_deref().is_some_and(|q| q.eq_ignore_ascii_case(t)) {
                    continue;
                }
            }
            matched = true;
            let column = match &scope.grouping {
                None => i,
                Some(g) => g.keys.iter().position(|k| k.column == Some(i)).ok_or_else(|| {
                    Error::grouping(format!(
                        "column \"{}\" must appear in the GROUP BY clause or be used in an aggregate function",
                        field.name
                    ))
                })?,
            };
            let id = self.phys(PhysExpr::Column(column))?;
            out.push(id, scope.schema.fields()[column].clone(), None);
        }
        match table {
            Some(t) if !matched => Err(Error::table_not_found(t)),
            _ => Ok(()),
        }
    }

    /// Output column an ORDER BY expression sorts on, adding a hidden column
    /// when it is not in the select list.
    fn order_column(&mut self, scope: &Scope, projection: &mut Projection, visible: usize, expr: ExprId) -> Result<usize> {
        if let Some(column) = self.order_position(expr, visible)? {
            return Ok(column);
        }
        if let Expr::Column { table: None, name } = self.arena.exprs[expr] {
            let name = self.arena.str(name);
            if let Some(i) = projection.fields[..visible]
                .iter()
                .position(|f| f.name.eq_ignore_ascii_case(name))
            {
                return Ok(i);
            }
        }
        let columns = scope.grouping.as_ref().map_or(&scope.schema, |g| &g.input);
        if let Some(i) = projection.sources[..visible]
            .iter()
            .position(|s| s.is_some_and(|s| same_expr(&*self.arena, columns, s, expr)))
        {
            return Ok(i);
        }
        let b = self.bind_expr(scope, expr)?;
        let bound = self.arena.phys_exprs[b.id].clone();
        if matches!(bound, PhysExpr::Column(_)) {
            if let Some(i) = projection.exprs.iter().position(|e| self.arena.phys_exprs[*e] == bound) {
                return Ok(i);
            }
        }
        let field = Field::new(None, &self.expr_name(expr), b.ty.unwrap_or(DataType::Text));
        projection.push(b.id, field, Some(expr));
        Ok(projection.exprs.len() - 1)
    }

    /// Output column name of an unaliased select item.
    fn expr_name(&self, expr: ExprId) -> String {
        let name = match self.arena.exprs[expr] {
            Expr::Column { name, .. } => self.arena.str(name),
            Expr::Aggregate(id) => self.arena.aggregates[id].func.name(),
            Expr::Window(id) => self.arena.windows[id].func.name(),
            Expr::Function { func, .. } => func.name(),
            Expr::Cast { expr, .. } => return self.expr_name(expr),
            Expr::Case { .. } => "case",
            _ => "?column?",
        };
        String::from(name)
    }
}

fn sort_key(column: usize, item: OrderItem) -> SortKey {
    SortKey {
        column,
        descending: item.descending,
        nulls_first: item.nulls_first.unwrap_or(item.descending),
    }
}

/// Expressions of the select list.
fn select_exprs(arena: &QueryArena, select: &Select) -> Vec<ExprId> {
    arena
        .select_items
        .slice(select.items)
        .iter()
        .filter_map(|item| match item {
            SelectItem::Expr { expr, .. } => Some(*expr),
            SelectItem::Wildcard { .. } => None,
        })
        .collect()
}

fn window_arity(func: WindowFunc) -> (usize, usize) {
    match func {
        WindowFunc::RowNumber
        | WindowFunc::Rank
        | WindowFunc::DenseRank
        | WindowFunc::PercentRank
        | WindowFunc::CumeDist
        | WindowFunc::Aggregate(AggFunc::CountStar) => (0, 0),
        WindowFunc::Ntile | WindowFunc::FirstValue | WindowFunc::LastValue => (1, 1),
        WindowFunc::Lag | WindowFunc::Lead => (1, 3),
        WindowFunc::NthValue => (2, 2),
        WindowFunc::Aggregate(AggFunc::StringAgg) => (1, 2),
        WindowFunc::Aggregate(_) => (1, 1),
    }
}

/// The frame a window runs with: the whole partition without ORDER BY,
/// `RANGE UNBOUNDED PRECEDING AND CURRENT ROW` with it.
fn effective_frame(frame: Option<WindowFrame>, ordered: bool) -> Result<WindowFrame> {
    let frame = match frame {
        Some(f) => f,
        None if ordered => WindowFrame::range(FrameBound::UnboundedPreceding, FrameBound::CurrentRow),
        None => WindowFrame::rows(FrameBound::UnboundedPreceding, FrameBound::UnboundedFollowing),
    };
    if frame.start == FrameBound::UnboundedFollowing || frame.end == FrameBound::UnboundedPreceding {
        return Err(Error::invalid_query("invalid window frame bounds"));
    }
    let offset = |b: FrameBound| matches!(b, FrameBound::Preceding(_) | FrameBound::Following(_));
    if frame.mode == FrameMode::Range && (offset(frame.start) || offset(frame.end)) {
        return Err(Error::not_supported("RANGE frame with an offset"));
    }
    Ok(frame)
}
