//! Construction helpers.
//!
//! The parser (or a test) builds queries bottom-up: leaf expressions first,
//! then predicates, then the SELECT block through [`SelectBuilder`].

use super::{
    AggFunc, AggregateCall, BinaryOp, CompareOp, CteDef, Expr, ExprId, GroupingKind, JoinClause,
    JoinKind, OrderItem, PredId, Predicate, Query, QueryBody, QueryId, ScalarFunc, Select,
    SelectItem, SetOpKind, TableSource, WindowCall, WindowFrame, WindowFunc,
};
use crate::arena::{IdxRange, QueryArena};
use alloc::string::String;
use alloc::vec::Vec;
use strata_core::{DataType, Result, Value};

impl OrderItem {
    /// Ascending, nulls last.
    pub fn asc(expr: ExprId) -> Self {
        Self {
            expr,
            descending: false,
            nulls_first: None,
        }
    }

    /// Descending, nulls first.
    pub fn desc(expr: ExprId) -> Self {
        Self {
            expr,
            descending: true,
            nulls_first: None,
        }
    }

    pub fn nulls_first(mut self, first: bool) -> Self {
        self.nulls_first = Some(first);
        self
    }
}

impl QueryArena {
    fn expr(&mut self, expr: Expr) -> Result<ExprId> {
        self.exprs.push(expr)
    }

    fn pred(&mut self, pred: Predicate) -> Result<PredId> {
        self.predicates.push(pred)
    }

    /// Unqualified column reference.
    pub fn col(&mut self, name: &str) -> Result<ExprId> {
        let name = self.intern(name)?;
        self.expr(Expr::Column { table: None, name })
    }

    /// Qualified column reference `table.name`.
    pub fn qcol(&mut self, table: &str, name: &str) -> Result<ExprId> {
        let table = Some(self.intern(table)?);
        let name = self.intern(name)?;
        self.expr(Expr::Column { table, name })
    }

    pub fn lit(&mut self, value: impl Into<Value>) -> Result<ExprId> {
        let cell = self.cells.push(value.into())?;
        self.expr(Expr::Literal(cell))
    }

    pub fn null(&mut self) -> Result<ExprId> {
        self.lit(Value::Null)
    }

    pub fn binary(&mut self, op: BinaryOp, left: ExprId, right: ExprId) -> Result<ExprId> {
        self.expr(Expr::Binary { op, left, right })
    }

    pub fn negate(&mut self, expr: ExprId) -> Result<ExprId> {
        self.expr(Expr::Negate(expr))
    }

    pub fn func(&mut self, func: ScalarFunc, args: &[ExprId]) -> Result<ExprId> {
        let args = self.expr_lists.extend(args.iter().copied())?;
        self.expr(Expr::Function { func, args })
    }

    pub fn cast(&mut self, expr: ExprId, to: DataType) -> Result<ExprId> {
        self.expr(Expr::Cast { expr, to })
    }

    /// `CASE [operand] WHEN w THEN t .. [ELSE e] END`.
    pub fn case(
        &mut self,
        operand: Option<ExprId>,
        branches: &[(ExprId, ExprId)],
        otherwise: Option<ExprId>,
    ) -> Result<ExprId> {
        let branches = self
            .expr_lists
            .extend(branches.iter().flat_map(|&(w, t)| [w, t]))?;
        self.expr(Expr::Case {
            operand,
            branches,
            otherwise,
        })
    }

    pub fn agg(&mut self, func: AggFunc, arg: Option<ExprId>, distinct: bool) -> Result<ExprId> {
        let id = self.aggregates.push(AggregateCall {
            func,
            arg,
            distinct,
            separator: None,
        })?;
        self.expr(Expr::Aggregate(id))
    }

    pub fn count_star(&mut self) -> Result<ExprId> {
        self.agg(AggFunc::CountStar, None, false)
    }

    pub fn string_agg(&mut self, arg: ExprId, separator: ExprId, distinct: bool) -> Result<ExprId> {
        let id = self.aggregates.push(AggregateCall {
            func: AggFunc::StringAgg,
            arg: Some(arg),
            distinct,
            separator: Some(separator),
        })?;
        self.expr(Expr::Aggregate(id))
    }

    /// `func(args) OVER (PARTITION BY partition_by ORDER BY order_by frame)`.
    pub fn window(
        &mut self,
        func: WindowFunc,
        args: &[ExprId],
        partition_by: &[ExprId],
        order_by: &[OrderItem],
        frame: Option<WindowFrame>,
    ) -> Result<ExprId> {
        let args = self.expr_lists.extend(args.iter().copied())?;
        let partition_by = self.expr_lists.extend(partition_by.iter().copied())?;
        let order_by = self.order_items.extend(order_by.iter().copied())?;
        let id = self.windows.push(WindowCall {
            func,
            args,
            distinct: false,
            partition_by,
            order_by,
            frame,
        })?;
        self.expr(Expr::Window(id))
    }

    /// Scalar subquery.
    pub fn subquery(&mut self, query: QueryId) -> Result<ExprId> {
        self.expr(Expr::Subquery(query))
    }

    /// Wraps a predicate as a boolean expression.
    pub fn predicate(&mut self, pred: PredId) -> Result<ExprId> {
        self.expr(Expr::Predicate(pred))
    }

    pub fn compare(&mut self, left: ExprId, op: CompareOp, right: ExprId) -> Result<PredId> {
        self.pred(Predicate::Compare { left, op, right })
    }

    pub fn eq(&mut self, left: ExprId, right: ExprId) -> Result<PredId> {
        self.compare(left, CompareOp::Eq, right)
    }

    pub fn and(&mut self, left: PredId, right: PredId) -> Result<PredId> {
        self.pred(Predicate::And(left, right))
    }

    pub fn or(&mut self, left: PredId, right: PredId) -> Result<PredId> {
        self.pred(Predicate::Or(left, right))
    }

    pub fn not(&mut self, pred: PredId) -> Result<PredId> {
        self.pred(Predicate::Not(pred))
    }

    pub fn is_null(&mut self, expr: ExprId, negated: bool) -> Result<PredId> {
        self.pred(Predicate::IsNull { expr, negated })
    }

    pub fn between(&mut self, expr: ExprId, low: ExprId, high: ExprId, negated: bool) -> Result<PredId> {
        self.pred(Predicate::Between {
            expr,
            low,
            high,
            negated,
        })
    }

    pub fn in_list(&mut self, expr: ExprId, list: &[ExprId], negated: bool) -> Result<PredId> {
        let list = self.expr_lists.extend(list.iter().copied())?;
        self.pred(Predicate::InList { expr, list, negated })
    }

    pub fn in_subquery(&mut self, expr: ExprId, query: QueryId, negated: bool) -> Result<PredId> {
        self.pred(Predicate::InSubquery {
            expr,
            query,
            negated,
        })
    }

    pub fn exists(&mut self, query: QueryId, negated: bool) -> Result<PredId> {
        self.pred(Predicate::Exists { query, negated })
    }

    pub fn like(
        &mut self,
        expr: ExprId,
        pattern: ExprId,
        case_insensitive: bool,
        negated: bool,
    ) -> Result<PredId> {
        self.pred(Predicate::Like {
            expr,
            pattern,
            case_insensitive,
            negated,
        })
    }

    /// A boolean expression used as a predicate.
    pub fn pred_expr(&mut self, expr: ExprId) -> Result<PredId> {
        self.pred(Predicate::Expr(expr))
    }

    /// `left <op> [ALL] right`.
    pub fn set_op(&mut self, op: SetOpKind, all: bool, left: QueryId, right: QueryId) -> Result<QueryId> {
        self.queries.push(Query {
            ctes: IdxRange::EMPTY,
            body: QueryBody::SetOp {
                op,
                all,
                left,
                right,
            },
            order_by: IdxRange::EMPTY,
            limit: None,
            offset: None,
        })
    }

    /// Sets ORDER BY / LIMIT / OFFSET of an existing query.
    pub fn order_query(
        &mut self,
        query: QueryId,
        order_by: &[OrderItem],
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<()> {
        let order_by = self.order_items.extend(order_by.iter().copied())?;
        if let Some(q) = self.queries.get_mut(query) {
            q.order_by = order_by;
            q.limit = limit;
            q.offset = offset;
        }
        Ok(())
    }

    /// Attaches a WITH clause to an existing query.
    pub fn with_ctes(&mut self, query: QueryId, ctes: &[(&str, QueryId, bool)]) -> Result<()> {
        let mut defs = Vec::with_capacity(ctes.len());
        for &(name, q, recursive) in ctes {
            defs.push(CteDef {
                name: self.intern(name)?,
                query: q,
                recursive,
            });
        }
        let range = self.ctes.extend(defs)?;
        if let Some(q) = self.queries.get_mut(query) {
            q.ctes = range;
        }
        Ok(())
    }
}

/// A FROM / JOIN source before interning.
#[derive(Clone, Debug)]
pub enum Source {
    Table { name: String, alias: Option<String> },
    Subquery { query: QueryId, alias: String },
    Series {
        start: ExprId,
        stop: ExprId,
        step: Option<ExprId>,
        alias: Option<String>,
    },
}

impl Source {
    pub fn table(name: &str) -> Self {
        Source::Table {
            name: String::from(name),
            alias: None,
        }
    }

    pub fn aliased(name: &str, alias: &str) -> Self {
        Source::Table {
            name: String::from(name),
            alias: Some(String::from(alias)),
        }
    }

    fn intern(self, arena: &mut QueryArena) -> Result<TableSource> {
        Ok(match self {
            Source::Table { name, alias } => TableSource::Named {
                name: arena.intern(&name)?,
                alias: alias.map(|a| arena.intern(&a)).transpose()?,
            },
            Source::Subquery { query, alias } => TableSource::Subquery {
                query,
                alias: arena.intern(&alias)?,
            },
            Source::Series {
                start,
                stop,
                step,
                alias,
            } => TableSource::GenerateSeries {
                start,
                stop,
                step,
                alias: alias.map(|a| arena.intern(&a)).transpose()?,
            },
        })
    }
}

#[derive(Clone, Debug)]
enum Item {
    Expr(ExprId, Option<String>),
    Wildcard(Option<String>),
}

/// Fluent builder for a SELECT query.
#[derive(Clone, Debug, Default)]
pub struct SelectBuilder {
    distinct: bool,
    items: Vec<Item>,
    from: Option<Source>,
    joins: Vec<(JoinKind, Source, Option<PredId>)>,
    filter: Option<PredId>,
    group_by: Vec<ExprId>,
    grouping: GroupingKind,
    having: Option<PredId>,
    order_by: Vec<OrderItem>,
    limit: Option<u64>,
    offset: Option<u64>,
    ctes: Vec<(String, QueryId, bool)>,
}

impl SelectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn item(mut self, expr: ExprId) -> Self {
        self.items.push(Item::Expr(expr, None));
        self
    }

    pub fn item_as(mut self, expr: ExprId, alias: &str) -> Self {
        self.items.push(Item::Expr(expr, Some(String::from(alias))));
        self
    }

    pub fn items(mut self, exprs: &[ExprId]) -> Self {
        self.items.extend(exprs.iter().map(|&e| Item::Expr(e, None)));
        self
    }

    /// `*`
    pub fn wildcard(mut self) -> Self {
        self.items.push(Item::Wildcard(None));
        self
    }

    /// `table.*`
    pub fn table_wildcard(mut self, table: &str) -> Self {
        self.items.push(Item::Wildcard(Some(String::from(table))));
        self
    }

    pub fn from(mut self, table: &str) -> Self {
        self.from = Some(Source::table(table));
        self
    }

    pub fn from_as(mut self, table: &str, alias: &str) -> Self {
        self.from = Some(Source::aliased(table, alias));
        self
    }

    pub fn from_source(mut self, source: Source) -> Self {
        self.from = Some(source);
        self
    }

    pub fn join(mut self, kind: JoinKind, source: Source, on: Option<PredId>) -> Self {
        self.joins.push((kind, source, on));
        self
    }

    pub fn filter(mut self, pred: PredId) -> Self {
        self.filter = Some(pred);
        self
    }

    pub fn group_by(mut self, exprs: &[ExprId]) -> Self {
        self.group_by.extend_from_slice(exprs);
        self
    }

    pub fn rollup(mut self, exprs: &[ExprId]) -> Self {
        self.group_by.extend_from_slice(exprs);
        self.grouping = GroupingKind::Rollup;
        self
    }

    pub fn cube(mut self, exprs: &[ExprId]) -> Self {
        self.group_by.extend_from_slice(exprs);
        self.grouping = GroupingKind::Cube;
        self
    }

    pub fn having(mut self, pred: PredId) -> Self {
        self.having = Some(pred);
        self
    }

    pub fn order_by(mut self, item: OrderItem) -> Self {
        self.order_by.push(item);
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Adds a WITH definition.
    pub fn with(mut self, name: &str, query: QueryId) -> Self {
        self.ctes.push((String::from(name), query, false));
        self
    }

    /// Adds a WITH RECURSIVE definition.
    pub fn with_recursive(mut self, name: &str, query: QueryId) -> Self {
        self.ctes.push((String::from(name), query, true));
        self
    }

    /// Interns everything into `arena` and returns the query.
    pub fn build(self, arena: &mut QueryArena) -> Result<QueryId> {
        let mut items = Vec::with_capacity(self.items.len());
        for item in self.items {
            items.push(match item {
                Item::Expr(expr, alias) => SelectItem::Expr {
                    expr,
                    alias: alias.map(|a| arena.intern(&a)).transpose()?,
                },
                Item::Wildcard(table) => SelectItem::Wildcard {
                    table: table.map(|t| arena.intern(&t)).transpose()?,
                },
            });
        }
        let items = arena.select_items.extend(items)?;

        let from = self.from.map(|s| s.intern(arena)).transpose()?;
        let mut joins = Vec::with_capacity(self.joins.len());
        for (kind, source, on) in self.joins {
            joins.push(JoinClause {
                kind,
                source: source.intern(arena)?,
                on,
            });
        }
        let joins = arena.joins.extend(joins)?;
        let group_by = arena.expr_lists.extend(self.group_by)?;
        let order_by = arena.order_items.extend(self.order_by)?;

        let mut ctes = Vec::with_capacity(self.ctes.len());
        for (name, query, recursive) in self.ctes {
            ctes.push(CteDef {
                name: arena.intern(&name)?,
                query,
                recursive,
            });
        }
        let ctes = arena.ctes.extend(ctes)?;

        arena.queries.push(Query {
            ctes,
            body: QueryBody::Select(Select {
                distinct: self.distinct,
                items,
                from,
                joins,
                filter: self.filter,
                group_by,
                grouping: self.grouping,
                having: self.having,
            }),
            order_by,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_select() {
        let mut arena = QueryArena::new();
        let v = arena.col("v").unwrap();
        let count = arena.count_star().unwrap();
        let q = SelectBuilder::new()
            .item(v)
            .item_as(count, "n")
            .from("t")
            .group_by(&[v])
            .build(&mut arena)
            .unwrap();
        let QueryBody::Select(select) = arena.queries[q].body else {
            panic!("expected select");
        };
        assert_eq!(select.items.len(), 2);
        assert_eq!(arena.expr_lists.slice(select.group_by), &[v]);
        match arena.select_items.slice(select.items)[1] {
            SelectItem::Expr { alias: Some(a), .. } => assert_eq!(arena.str(a), "n"),
            ref other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_case_branches_flattened() {
        let mut arena = QueryArena::new();
        let (a, b, c, d) = (
            arena.lit(1).unwrap(),
            arena.lit(2).unwrap(),
            arena.lit(3).unwrap(),
            arena.lit(4).unwrap(),
        );
        let e = arena.case(None, &[(a, b), (c, d)], None).unwrap();
        let Expr::Case { branches, .. } = arena.exprs[e] else {
            panic!("expected case");
        };
        assert_eq!(arena.expr_lists.slice(branches), &[a, b, c, d]);
    }

    #[test]
    fn test_order_query() {
        let mut arena = QueryArena::new();
        let one = arena.lit(1).unwrap();
        let l = SelectBuilder::new().item(one).build(&mut arena).unwrap();
        let r = SelectBuilder::new().item(one).build(&mut arena).unwrap();
        let u = arena.set_op(SetOpKind::Union, true, l, r).unwrap();
        arena.order_query(u, &[OrderItem::desc(one)], Some(1), None).unwrap();
        assert_eq!(arena.queries[u].limit, Some(1));
        assert_eq!(arena.queries[u].order_by.len(), 1);
    }
}
