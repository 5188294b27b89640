//! Structural fingerprints of logical queries.
//!
//! Two queries built from the same tree shape, names (case-insensitively)
//! and literals have the same fingerprint regardless of where their nodes
//! sit in the arena. The engine keys its result cache on it.

use super::{
    Expr, ExprId, FrameBound, JoinClause, OrderItem, PredId, Predicate, QueryBody, QueryId,
    SelectItem, TableSource, WindowFrame,
};
use crate::arena::{IdxRange, QueryArena, StrRef};
use core::hash::{Hash, Hasher};
use core::mem;

/// FNV-1a, which is fast and distributes short keys well.
#[derive(Clone, Copy, Debug)]
pub struct FnvHasher {
    state: u64,
}

impl FnvHasher {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self {
            state: Self::FNV_OFFSET,
        }
    }
}

impl Default for FnvHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for FnvHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.state ^= *byte as u64;
            self.state = self.state.wrapping_mul(Self::FNV_PRIME);
        }
    }
}

/// Computes the fingerprint of `query`.
pub fn fingerprint(arena: &QueryArena, query: QueryId) -> u64 {
    let mut walker = Walker {
        arena,
        h: FnvHasher::new(),
    };
    walker.query(query);
    walker.h.finish()
}

struct Walker<'a> {
    arena: &'a QueryArena,
    h: FnvHasher,
}

impl Walker<'_> {
    fn tag(&mut self, tag: &[u8]) {
        self.h.write(tag);
    }

    fn name(&mut self, s: StrRef) {
        for b in self.arena.str(s).bytes() {
            self.h.write_u8(b.to_ascii_lowercase());
        }
        self.h.write_u8(0xff);
    }

    fn opt_name(&mut self, s: Option<StrRef>) {
        match s {
            Some(s) => self.name(s),
            None => self.h.write_u8(0),
        }
    }

    fn query(&mut self, id: QueryId) {
        let q = self.arena.queries[id];
        self.tag(b"query");
        for cte in self.arena.ctes.slice(q.ctes) {
            self.tag(b"cte");
            self.name(cte.name);
            self.h.write_u8(cte.recursive as u8);
            self.query(cte.query);
        }
        match q.body {
            QueryBody::Select(s) => {
                self.tag(b"select");
                self.h.write_u8(s.distinct as u8);
                for item in self.arena.select_items.slice(s.items) {
                    match *item {
                        SelectItem::Expr { expr, alias } => {
                            self.expr(expr);
                            self.opt_name(alias);
                        }
                        SelectItem::Wildcard { table } => {
                            self.tag(b"*");
                            self.opt_name(table);
                        }
                    }
                }
                if let Some(from) = s.from {
                    self.source(from);
                }
                for join in self.arena.joins.slice(s.joins) {
                    let JoinClause { kind, source, on } = *join;
                    self.tag(b"join");
                    kind.hash(&mut self.h);
                    self.source(source);
                    self.opt_pred(on);
                }
                self.opt_pred(s.filter);
                self.tag(b"group");
                s.grouping.hash(&mut self.h);
                self.exprs(s.group_by);
                self.opt_pred(s.having);
            }
            QueryBody::SetOp {
                op,
                all,
                left,
                right,
            } => {
                self.tag(b"setop");
                op.hash(&mut self.h);
                self.h.write_u8(all as u8);
                self.query(left);
                self.query(right);
            }
        }
        self.orders(q.order_by);
        q.limit.hash(&mut self.h);
        q.offset.hash(&mut self.h);
    }

    fn source(&mut self, source: TableSource) {
        match source {
            TableSource::Named { name, alias } => {
                self.tag(b"table");
                self.name(name);
                self.opt_name(alias);
            }
            TableSource::Subquery { query, alias } => {
                self.tag(b"derived");
                self.query(query);
                self.name(alias);
            }
            TableSource::GenerateSeries {
                start,
                stop,
                step,
                alias,
            } => {
                self.tag(b"series");
                self.expr(start);
                self.expr(stop);
                self.opt_expr(step);
                self.opt_name(alias);
            }
        }
    }

    fn exprs(&mut self, list: IdxRange<ExprId>) {
        self.h.write_usize(list.len());
        for &e in self.arena.expr_lists.slice(list) {
            self.expr(e);
        }
    }

    fn orders(&mut self, list: IdxRange<OrderItem>) {
        self.h.write_usize(list.len());
        for item in self.arena.order_items.slice(list) {
            self.expr(item.expr);
            self.h.write_u8(item.descending as u8);
            item.nulls_first.hash(&mut self.h);
        }
    }

    fn opt_expr(&mut self, e: Option<ExprId>) {
        match e {
            Some(e) => self.expr(e),
            None => self.h.write_u8(0),
        }
    }

    fn opt_pred(&mut self, p: Option<PredId>) {
        match p {
            Some(p) => self.pred(p),
            None => self.h.write_u8(0),
        }
    }

    fn expr(&mut self, id: ExprId) {
        let expr = self.arena.exprs[id];
        mem::discriminant(&expr).hash(&mut self.h);
        match expr {
            Expr::Column { table, name } => {
                self.opt_name(table);
                self.name(name);
            }
            Expr::Literal(cell) => {
                let value = &self.arena.cells[cell];
                mem::discriminant(value).hash(&mut self.h);
                value.hash(&mut self.h);
            }
            Expr::Binary { op, left, right } => {
                op.hash(&mut self.h);
                self.expr(left);
                self.expr(right);
            }
            Expr::Negate(e) => self.expr(e),
            Expr::Function { func, args } => {
                func.hash(&mut self.h);
                self.exprs(args);
            }
            Expr::Case {
                operand,
                branches,
                otherwise,
            } => {
                self.opt_expr(operand);
                self.exprs(branches);
                self.opt_expr(otherwise);
            }
            Expr::Cast { expr, to } => {
                self.expr(expr);
                to.hash(&mut self.h);
            }
            Expr::Predicate(p) => self.pred(p),
            Expr::Aggregate(a) => {
                let call = self.arena.aggregates[a];
                call.func.hash(&mut self.h);
                self.h.write_u8(call.distinct as u8);
                self.opt_expr(call.arg);
                self.opt_expr(call.separator);
            }
            Expr::Window(w) => {
                let call = self.arena.windows[w];
                call.func.hash(&mut self.h);
                self.h.write_u8(call.distinct as u8);
                self.exprs(call.args);
                self.exprs(call.partition_by);
                self.orders(call.order_by);
                match call.frame {
                    Some(WindowFrame { mode, start, end }) => {
                        mode.hash(&mut self.h);
                        self.bound(start);
                        self.bound(end);
                    }
                    None => self.h.write_u8(0),
                }
            }
            Expr::Subquery(q) => self.query(q),
        }
    }

    fn bound(&mut self, bound: FrameBound) {
        bound.hash(&mut self.h);
    }

    fn pred(&mut self, id: PredId) {
        let pred = self.arena.predicates[id];
        mem::discriminant(&pred).hash(&mut self.h);
        match pred {
            Predicate::Compare { left, op, right } => {
                op.hash(&mut self.h);
                self.expr(left);
                self.expr(right);
            }
            Predicate::And(a, b) | Predicate::Or(a, b) => {
                self.pred(a);
                self.pred(b);
            }
            Predicate::Not(p) => self.pred(p),
            Predicate::IsNull { expr, negated } => {
                self.expr(expr);
                self.h.write_u8(negated as u8);
            }
            Predicate::Between {
                expr,
                low,
                high,
                negated,
            } => {
                self.expr(expr);
                self.expr(low);
                self.expr(high);
                self.h.write_u8(negated as u8);
            }
            Predicate::InList {
                expr,
                list,
                negated,
            } => {
                self.expr(expr);
                self.exprs(list);
                self.h.write_u8(negated as u8);
            }
            Predicate::InSubquery {
                expr,
                query,
                negated,
            } => {
                self.expr(expr);
                self.query(query);
                self.h.write_u8(negated as u8);
            }
            Predicate::Exists { query, negated } => {
                self.query(query);
                self.h.write_u8(negated as u8);
            }
            Predicate::Like {
                expr,
                pattern,
                case_insensitive,
                negated,
            } => {
                self.expr(expr);
                self.expr(pattern);
                self.h.write_u8(case_insensitive as u8);
                self.h.write_u8(negated as u8);
            }
            Predicate::Expr(e) => self.expr(e),
        }
    }
}
