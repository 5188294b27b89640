//! Name resolution and expression binding.
//!
//! Binding turns AST expressions into [`PhysExpr`]s over the column positions
//! of one plan node's output. Column names resolve against the current
//! [`Scope`] first, then against enclosing queries' scopes, which makes the
//! subquery being planned correlated.
//!
//! After aggregation the scope is *grouped*: GROUP BY expressions and
//! aggregate calls map to columns of the aggregate output, and any other
//! column reference is a grouping error.

use super::physical::{PhysExpr, PhysExprId, PlanId, Schema};
use super::query_planner::QueryPlanner;
use crate::arena::{IdxRange, QueryArena};
use crate::ast::{AggFunc, AggId, Expr, ExprId, Predicate, PredId, QueryId, WindowId};
use crate::catalog::Catalog;
use crate::eval::{binary_type, function_type};
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use strata_core::{DataType, Error, Result};

/// A bound expression and its type; `None` is an untyped NULL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Bound {
    pub id: PhysExprId,
    pub ty: Option<DataType>,
}

/// A GROUP BY expression.
#[derive(Clone, Copy, Debug)]
pub(crate) struct GroupKey {
    pub expr: ExprId,
    /// Input column when the key is a plain column reference.
    pub column: Option<usize>,
}

/// Mapping from pre-aggregation expressions to aggregate output columns.
#[derive(Clone, Debug)]
pub(crate) struct Grouping {
    /// Schema the keys and aggregate arguments were bound against.
    pub input: Schema,
    pub keys: Vec<GroupKey>,
    /// Aggregate calls, output after the keys.
    pub aggregates: Vec<AggId>,
}

/// Columns visible to expressions at one query level.
#[derive(Clone, Debug, Default)]
pub(crate) struct Scope {
    pub schema: Schema,
    pub grouping: Option<Grouping>,
    /// Window calls already computed, with their output column.
    pub windows: Vec<(WindowId, usize)>,
    /// Leading columns expanded by `*`.
    pub visible: usize,
}

impl Scope {
    pub(crate) fn new(schema: Schema) -> Self {
        let visible = schema.len();
        Self {
            schema,
            grouping: None,
            windows: Vec::new(),
            visible,
        }
    }

    /// Position and type of the column `table.name` in this scope's output.
    fn lookup(&self, table: Option<&str>, name: &str) -> Result<Option<(usize, DataType)>> {
        let Some(grouping) = &self.grouping else {
            return Ok(resolve(&self.schema, table, name)?.map(|i| (i, self.schema.fields()[i].data_type)));
        };
        let Some(input) = resolve(&grouping.input, table, name)? else {
            return Ok(None);
        };
        match grouping.keys.iter().position(|k| k.column == Some(input)) {
            Some(k) => Ok(Some((k, self.schema.fields()[k].data_type))),
            None => Err(Error::grouping(format!(
                "column \"{}\" must appear in the GROUP BY clause or be used in an aggregate function",
                qualified(table, name)
            ))),
        }
    }
}

/// Position of `table.name` in `schema`, case-insensitively.
pub(crate) fn resolve(schema: &Schema, table: Option<&str>, name: &str) -> Result<Option<usize>> {
    let mut found = None;
    for (i, field) in schema.fields().iter().enumerate() {
        if !field.name.eq_ignore_ascii_case(name) {
            continue;
        }
        if let Some(t) = table {
            if !field.qualifier.as_deref().is_some_and(|q| q.eq_ignore_ascii_case(t)) {
                continue;
            }
        }
        if found.is_some() {
            return Err(Error::ambiguous_column(qualified(table, name)));
        }
        found = Some(i);
    }
    Ok(found)
}

fn qualified(table: Option<&str>, name: &str) -> String {
    match table {
        Some(t) => format!("{}.{}", t, name),
        None => String::from(name),
    }
}

/// Flattens nested ANDs.
pub(crate) fn conjuncts(arena: &QueryArena, pred: PredId, out: &mut Vec<PredId>) {
    match arena.predicates[pred] {
        Predicate::And(a, b) => {
            conjuncts(arena, a, out);
            conjuncts(arena, b, out);
        }
        _ => out.push(pred),
    }
}

/// Calls `visit` on `expr` and its sub-expressions. Subqueries are not
/// entered; the children of a node are skipped when `visit` returns false.
pub(crate) fn walk_expr(arena: &QueryArena, expr: ExprId, visit: &mut dyn FnMut(&Expr) -> bool) {
    let node = arena.exprs[expr];
    if !visit(&node) {
        return;
    }
    let list = |r: IdxRange<ExprId>| arena.expr_lists.slice(r).to_vec();
    match node {
        Expr::Column { .. } | Expr::Literal(_) | Expr::Subquery(_) => {}
        Expr::Binary { left, right, .. } => {
            walk_expr(arena, left, visit);
            walk_expr(arena, right, visit);
        }
        Expr::Negate(e) | Expr::Cast { expr: e, .. } => walk_expr(arena, e, visit),
        Expr::Function { args, .. } => {
            for a in list(args) {
                walk_expr(arena, a, visit);
            }
        }
        Expr::Case {
            operand,
            branches,
            otherwise,
        } => {
            for e in operand.into_iter().chain(list(branches)).chain(otherwise) {
                walk_expr(arena, e, visit);
            }
        }
        Expr::Predicate(p) => walk_predicate(arena, p, visit),
        Expr::Aggregate(id) => {
            let call = arena.aggregates[id];
            for e in call.arg.into_iter().chain(call.separator) {
                walk_expr(arena, e, visit);
            }
        }
        Expr::Window(id) => {
            let call = arena.windows[id];
            let orders: Vec<ExprId> = arena.order_items.slice(call.order_by).iter().map(|o| o.expr).collect();
            for e in list(call.args).into_iter().chain(list(call.partition_by)).chain(orders) {
                walk_expr(arena, e, visit);
            }
        }
    }
}

pub(crate) fn walk_predicate(arena: &QueryArena, pred: PredId, visit: &mut dyn FnMut(&Expr) -> bool) {
    match arena.predicates[pred] {
        Predicate::Compare { left, right, .. } => {
            walk_expr(arena, left, visit);
            walk_expr(arena, right, visit);
        }
        Predicate::And(a, b) | Predicate::Or(a, b) => {
            walk_predicate(arena, a, visit);
            walk_predicate(arena, b, visit);
        }
        Predicate::Not(p) => walk_predicate(arena, p, visit),
        Predicate::IsNull { expr, .. } | Predicate::InSubquery { expr, .. } | Predicate::Expr(expr) => {
            walk_expr(arena, expr, visit)
        }
        Predicate::Between { expr, low, high, .. } => {
            for e in [expr, low, high] {
                walk_expr(arena, e, visit);
            }
        }
        Predicate::InList { expr, list, .. } => {
            walk_expr(arena, expr, visit);
            for e in arena.expr_lists.slice(list).to_vec() {
                walk_expr(arena, e, visit);
            }
        }
        Predicate::Exists { .. } => {}
        Predicate::Like { expr, pattern, .. } => {
            walk_expr(arena, expr, visit);
            walk_expr(arena, pattern, visit);
        }
    }
}

/// Output type of an aggregate over an argument of type `input`.
pub(crate) fn aggregate_type(func: AggFunc, input: Option<DataType>) -> Result<DataType> {
    let numeric = |fallback: DataType| match input {
        None => Ok(fallback),
        Some(t) if t.is_numeric() => Ok(t),
        Some(t) => Err(Error::type_mismatch(DataType::Float64, t)),
    };
    Ok(match func {
        AggFunc::CountStar | AggFunc::Count => DataType::Int64,
        AggFunc::Sum => match numeric(DataType::Int64)? {
            t if t.is_integer() => DataType::Int64,
            _ => DataType::Float64,
        },
        AggFunc::Avg | AggFunc::StdDev | AggFunc::Variance => {
            numeric(DataType::Float64)?;
            DataType::Float64
        }
        AggFunc::Min | AggFunc::Max => input.unwrap_or(DataType::Text),
        AggFunc::BoolAnd | AggFunc::BoolOr => match input {
            None | Some(DataType::Boolean) => DataType::Boolean,
            Some(t) => return Err(Error::type_mismatch(DataType::Boolean, t)),
        },
        AggFunc::StringAgg => DataType::Text,
    })
}

impl<C: Catalog + ?Sized> QueryPlanner<'_, C> {
    pub(super) fn phys(&mut self, expr: PhysExpr) -> Result<PhysExprId> {
        self.arena.phys_exprs.push(expr)
    }

    fn bound(&mut self, expr: PhysExpr, ty: Option<DataType>) -> Result<Bound> {
        Ok(Bound {
            id: self.phys(expr)?,
            ty,
        })
    }

    pub(super) fn bind_list(&mut self, scope: &Scope, list: IdxRange<ExprId>) -> Result<Vec<Bound>> {
        let items = self.arena.expr_lists.slice(list).to_vec();
        items.into_iter().map(|e| self.bind_expr(scope, e)).collect()
    }

    fn push_list(&mut self, items: &[Bound]) -> Result<IdxRange<PhysExprId>> {
        self.arena.phys_lists.extend(items.iter().map(|b| b.id))
    }

    /// Binds `expr` against `scope`.
    pub(crate) fn bind_expr(&mut self, scope: &Scope, expr: ExprId) -> Result<Bound> {
        if let Some(column) = self.replacement(scope, expr) {
            let ty = scope.schema.fields()[column].data_type;
            return self.bound(PhysExpr::Column(column), Some(ty));
        }
        match self.arena.exprs[expr] {
            Expr::Column { table, name } => {
                let table = table.map(|t| String::from(self.arena.str(t)));
                let name = String::from(self.arena.str(name));
                self.bind_column(scope, table.as_deref(), &name)
            }
            Expr::Literal(cell) => {
                let value = self.arena.cells[cell].clone();
                let ty = value.data_type();
                self.bound(PhysExpr::Literal(value), ty)
            }
            Expr::Binary { op, left, right } => {
                let l = self.bind_expr(scope, left)?;
                let r = self.bind_expr(scope, right)?;
                let ty = binary_type(op, l.ty, r.ty)?;
                self.bound(
                    PhysExpr::Binary {
                        op,
                        left: l.id,
                        right: r.id,
                    },
                    ty,
                )
            }
            Expr::Negate(inner) => {
                let b = self.bind_expr(scope, inner)?;
                if let Some(t) = b.ty.filter(|t| !t.is_numeric()) {
                    return Err(Error::type_mismatch(DataType::Float64, t));
                }
                self.bound(PhysExpr::Negate(b.id), b.ty)
            }
            Expr::Function { func, args } => {
                let (min, max) = func.arity();
                if args.len() < min || args.len() > max {
                    return Err(Error::invalid_query(format!(
                        "function {} takes {} to {} arguments, got {}",
                        func.name(),
                        min,
                        max,
                        args.len()
                    )));
                }
                let bound = self.bind_list(scope, args)?;
                let types: Vec<Option<DataType>> = bound.iter().map(|b| b.ty).collect();
                let ty = function_type(func, &types)?;
                let args = self.push_list(&bound)?;
                self.bound(PhysExpr::Function { func, args }, ty)
            }
            Expr::Case {
                operand,
                branches,
                otherwise,
            } => self.bind_case(scope, operand, branches, otherwise),
            Expr::Cast { expr, to } => {
                let b = self.bind_expr(scope, expr)?;
                self.bound(PhysExpr::Cast { expr: b.id, to }, Some(to))
            }
            Expr::Predicate(pred) => {
                let id = self.bind_predicate(scope, pred)?;
                Ok(Bound {
                    id,
                    ty: Some(DataType::Boolean),
                })
            }
            Expr::Aggregate(_) => Err(Error::grouping("aggregate functions are not allowed here")),
            Expr::Window(_) => Err(Error::invalid_query("window functions are not allowed here")),
            Expr::Subquery(query) => {
                let (plan, correlated) = self.plan_subquery(scope, query)?;
                let ty = self.single_column(plan)?;
                self.bound(PhysExpr::ScalarSubquery { plan, correlated }, ty)
            }
        }
    }

    /// Output column standing for `expr` in a grouped or windowed scope.
    fn replacement(&self, scope: &Scope, expr: ExprId) -> Option<usize> {
        let node = self.arena.exprs[expr];
        if let Expr::Window(id) = node {
            return scope.windows.iter().find(|(w, _)| *w == id).map(|(_, c)| *c);
        }
        let grouping = scope.grouping.as_ref()?;
        if let Expr::Aggregate(id) = node {
            let pos = grouping.aggregates.iter().position(|a| *a == id)?;
            return Some(grouping.keys.len() + pos);
        }
        if matches!(node, Expr::Column { .. }) {
            return None;
        }
        grouping
            .keys
            .iter()
            .position(|k| same_expr(&*self.arena, &grouping.input, k.expr, expr))
    }

    fn bind_column(&mut self, scope: &Scope, table: Option<&str>, name: &str) -> Result<Bound> {
        if let Some((column, ty)) = scope.lookup(table, name)? {
            return self.bound(PhysExpr::Column(column), Some(ty));
        }
        let mut found = None;
        for (depth, outer) in self.outer.iter().rev().enumerate() {
            if let Some(hit) = outer.lookup(table, name)? {
                found = Some((depth + 1, hit));
                break;
            }
        }
        let Some((depth, (column, ty))) = found else {
            return Err(Error::column_not_found(qualified(table, name)));
        };
        // every subquery between the reference and its scope re-runs per outer row
        let levels = self.correlated.len();
        for flag in &mut self.correlated[levels.saturating_sub(depth)..] {
            *flag = true;
        }
        self.bound(PhysExpr::Outer { depth, column }, Some(ty))
    }

    fn bind_case(
        &mut self,
        scope: &Scope,
        operand: Option<ExprId>,
        branches: IdxRange<ExprId>,
        otherwise: Option<ExprId>,
    ) -> Result<Bound> {
        let operand = operand.map(|o| self.bind_expr(scope, o)).transpose()?;
        let items = self.arena.expr_lists.slice(branches).to_vec();
        let mut bound = Vec::with_capacity(items.len());
        let mut ty: Option<DataType> = None;
        for (i, e) in items.into_iter().enumerate() {
            let b = self.bind_expr(scope, e)?;
            if i % 2 == 0 {
                match operand {
                    Some(op) => {
                        let (_, when) = self.comparable(op, b)?;
                        bound.push(when);
                        continue;
                    }
                    None => check_boolean(b.ty)?,
                }
            } else {
                ty = unify_result(ty, b.ty)?;
            }
            bound.push(b);
        }
        let otherwise = otherwise.map(|e| self.bind_expr(scope, e)).transpose()?;
        if let Some(o) = otherwise {
            ty = unify_result(ty, o.ty)?;
        }
        let branches = self.push_list(&bound)?;
        self.bound(
            PhysExpr::Case {
                operand: operand.map(|o| o.id),
                branches,
                otherwise: otherwise.map(|o| o.id),
            },
            ty,
        )
    }

    /// Binds a predicate; the result is a boolean expression.
    pub(crate) fn bind_predicate(&mut self, scope: &Scope, pred: PredId) -> Result<PhysExprId> {
        match self.arena.predicates[pred] {
            Predicate::Compare { left, op, right } => {
                let l = self.bind_expr(scope, left)?;
                let r = self.bind_expr(scope, right)?;
                let (l, r) = self.comparable(l, r)?;
                self.phys(PhysExpr::Compare {
                    op,
                    left: l.id,
                    right: r.id,
                })
            }
            Predicate::And(a, b) => {
                let a = self.bind_predicate(scope, a)?;
                let b = self.bind_predicate(scope, b)?;
                self.phys(PhysExpr::And(a, b))
            }
            Predicate::Or(a, b) => {
                let a = self.bind_predicate(scope, a)?;
                let b = self.bind_predicate(scope, b)?;
                self.phys(PhysExpr::Or(a, b))
            }
            Predicate::Not(p) => {
                let p = self.bind_predicate(scope, p)?;
                self.phys(PhysExpr::Not(p))
            }
            Predicate::IsNull { expr, negated } => {
                let b = self.bind_expr(scope, expr)?;
                self.phys(PhysExpr::IsNull { expr: b.id, negated })
            }
            Predicate::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let e = self.bind_expr(scope, expr)?;
                let lo = self.bind_expr(scope, low)?;
                let hi = self.bind_expr(scope, high)?;
                let (_, lo) = self.comparable(e, lo)?;
                let (_, hi) = self.comparable(e, hi)?;
                self.phys(PhysExpr::Between {
                    expr: e.id,
                    low: lo.id,
                    high: hi.id,
                    negated,
                })
            }
            Predicate::InList { expr, list, negated } => {
                let e = self.bind_expr(scope, expr)?;
                let mut items = Vec::with_capacity(list.len());
                for item in self.bind_list(scope, list)? {
                    items.push(self.comparable(e, item)?.1);
                }
                let list = self.push_list(&items)?;
                self.phys(PhysExpr::InList {
                    expr: e.id,
                    list,
                    negated,
                })
            }
            Predicate::InSubquery { expr, query, negated } => {
                let e = self.bind_expr(scope, expr)?;
                let (plan, correlated) = self.plan_subquery(scope, query)?;
                self.check_membership(e, plan)?;
                self.phys(PhysExpr::InSubquery {
                    expr: e.id,
                    plan,
                    negated,
                    correlated,
                })
            }
            Predicate::Exists { query, negated } => {
                let (plan, correlated) = self.plan_subquery(scope, query)?;
                self.phys(PhysExpr::Exists {
                    plan,
                    negated,
                    correlated,
                })
            }
            Predicate::Like {
                expr,
                pattern,
                case_insensitive,
                negated,
            } => {
                let e = self.bind_expr(scope, expr)?;
                let p = self.bind_expr(scope, pattern)?;
                self.phys(PhysExpr::Like {
                    expr: e.id,
                    pattern: p.id,
                    case_insensitive,
                    negated,
                })
            }
            Predicate::Expr(expr) => {
                let b = self.bind_expr(scope, expr)?;
                check_boolean(b.ty)?;
                Ok(b.id)
            }
        }
    }

    /// Plans `query` with `scope` as its nearest enclosing scope; returns the
    /// plan and whether it references any enclosing scope.
    pub(crate) fn plan_subquery(&mut self, scope: &Scope, query: QueryId) -> Result<(PlanId, bool)> {
        self.outer.push(scope.clone());
        self.correlated.push(false);
        let planned = self.plan_query(query);
        self.outer.pop();
        let correlated = self.correlated.pop().unwrap_or(false);
        Ok((planned?, correlated))
    }

    /// Type of the only column of `plan`.
    pub(crate) fn single_column(&self, plan: PlanId) -> Result<Option<DataType>> {
        let schema = &self.arena.plan_nodes[plan].schema;
        if schema.len() != 1 {
            return Err(Error::invalid_query("subquery must return only one column"));
        }
        Ok(schema.field(0).map(|f| f.data_type))
    }

    /// Checks that `probe` can be compared with the single column of `plan`.
    pub(crate) fn check_membership(&self, probe: Bound, plan: PlanId) -> Result<Option<DataType>> {
        let ty = self.single_column(plan)?;
        match (probe.ty, ty) {
            (Some(a), Some(b)) => a.unify(b).map(Some).ok_or_else(|| Error::type_mismatch(a, b)),
            (a, b) => Ok(a.or(b)),
        }
    }

    /// Coerces text literals to the other side's type, then checks that the
    /// two sides can be compared.
    pub(crate) fn comparable(&mut self, l: Bound, r: Bound) -> Result<(Bound, Bound)> {
        let l = self.coerce_literal(l, r.ty)?;
        let r = self.coerce_literal(r, l.ty)?;
        match (l.ty, r.ty) {
            (Some(a), Some(b)) if a.unify(b).is_none() => Err(Error::type_mismatch(a, b)),
            _ => Ok((l, r)),
        }
    }

    pub(super) fn coerce_literal(&mut self, b: Bound, target: Option<DataType>) -> Result<Bound> {
        let Some(target) = target.filter(|t| *t != DataType::Text) else {
            return Ok(b);
        };
        if b.ty != Some(DataType::Text) {
            return Ok(b);
        }
        let PhysExpr::Literal(value) = &self.arena.phys_exprs[b.id] else {
            return Ok(b);
        };
        let value = value.cast_to(target)?;
        self.bound(PhysExpr::Literal(value), Some(target))
    }
}

fn check_boolean(ty: Option<DataType>) -> Result<()> {
    match ty {
        None | Some(DataType::Boolean) => Ok(()),
        Some(t) => Err(Error::type_mismatch(DataType::Boolean, t)),
    }
}

fn unify_result(acc: Option<DataType>, next: Option<DataType>) -> Result<Option<DataType>> {
    match (acc, next) {
        (Some(a), Some(b)) => a.unify(b).map(Some).ok_or_else(|| Error::type_mismatch(a, b)),
        (a, b) => Ok(a.or(b)),
    }
}

/// Structural equality of two expressions; column references are equal when
/// they resolve to the same column of `schema`.
pub(crate) fn same_expr(arena: &QueryArena, schema: &Schema, a: ExprId, b: ExprId) -> bool {
    if a == b {
        return true;
    }
    let same = |x: ExprId, y: ExprId| same_expr(arena, schema, x, y);
    let same_lists = |x: IdxRange<ExprId>, y: IdxRange<ExprId>| {
        let (x, y) = (arena.expr_lists.slice(x), arena.expr_lists.slice(y));
        x.len() == y.len() && x.iter().zip(y).all(|(p, q)| same(*p, *q))
    };
    match (arena.exprs[a], arena.exprs[b]) {
        (Expr::Column { table: ta, name: na }, Expr::Column { table: tb, name: nb }) => {
            let pa = resolve(schema, ta.map(|t| arena.str(t)), arena.str(na));
            let pb = resolve(schema, tb.map(|t| arena.str(t)), arena.str(nb));
            matches!((pa, pb), (Ok(Some(x)), Ok(Some(y))) if x == y)
        }
        (Expr::Literal(x), Expr::Literal(y)) => arena.cells[x] == arena.cells[y],
        (
            Expr::Binary {
                op: oa,
                left: la,
                right: ra,
            },
            Expr::Binary {
                op: ob,
                left: lb,
                right: rb,
            },
        ) => oa == ob && same(la, lb) && same(ra, rb),
        (Expr::Negate(x), Expr::Negate(y)) => same(x, y),
        (Expr::Function { func: fa, args: aa }, Expr::Function { func: fb, args: ab }) => {
            fa == fb && same_lists(aa, ab)
        }
        (Expr::Cast { expr: x, to: ta }, Expr::Cast { expr: y, to: tb }) => ta == tb && same(x, y),
        (
            Expr::Case {
                operand: oa,
                branches: ba,
                otherwise: ea,
            },
            Expr::Case {
                operand: ob,
                branches: bb,
                otherwise: eb,
            },
        ) => {
            let same_opt = |x: Option<ExprId>, y: Option<ExprId>| match (x, y) {
                (Some(x), Some(y)) => same(x, y),
                (None, None) => true,
                _ => false,
            };
            same_opt(oa, ob) && same_lists(ba, bb) && same_opt(ea, eb)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::Field;
    use alloc::vec;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new(Some("a"), "id", DataType::Int64),
            Field::new(Some("b"), "id", DataType::Int64),
            Field::new(Some("b"), "name", DataType::Text),
        ])
    }

    #[test]
    fn test_resolve_qualified_and_ambiguous() {
        let s = schema();
        assert_eq!(resolve(&s, Some("b"), "ID").unwrap(), Some(1));
        assert_eq!(resolve(&s, None, "name").unwrap(), Some(2));
        assert_eq!(resolve(&s, None, "missing").unwrap(), None);
        assert_eq!(resolve(&s, None, "id").unwrap_err().sqlstate(), "42702");
    }

    #[test]
    fn test_grouped_lookup() {
        let mut arena = QueryArena::new();
        let key = arena.col("name").unwrap();
        let input = schema();
        let scope = Scope {
            schema: Schema::new(vec![input.fields()[2].clone(), Field::new(None, "count", DataType::Int64)]),
            grouping: Some(Grouping {
                input,
                keys: vec![GroupKey {
                    expr: key,
                    column: Some(2),
                }],
                aggregates: Vec::new(),
            }),
            windows: Vec::new(),
            visible: 2,
        };
        assert_eq!(scope.lookup(None, "name").unwrap(), Some((0, DataType::Text)));
        assert_eq!(scope.lookup(Some("a"), "id").unwrap_err().sqlstate(), "42803");
        assert_eq!(scope.lookup(None, "other").unwrap(), None);
    }

    #[test]
    fn test_aggregate_types() {
        assert_eq!(aggregate_type(AggFunc::Sum, Some(DataType::Int32)).unwrap(), DataType::Int64);
        assert_eq!(aggregate_type(AggFunc::Sum, Some(DataType::Float64)).unwrap(), DataType::Float64);
        assert_eq!(aggregate_type(AggFunc::Max, Some(DataType::Date)).unwrap(), DataType::Date);
        assert_eq!(aggregate_type(AggFunc::Avg, Some(DataType::Text)).unwrap_err().sqlstate(), "42804");
        assert_eq!(aggregate_type(AggFunc::CountStar, None).unwrap(), DataType::Int64);
    }
}
