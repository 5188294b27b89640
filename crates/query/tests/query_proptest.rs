//! Property-based tests comparing planned queries against simple models.

use proptest::prelude::*;
use std::collections::BTreeMap;
use strata_core::schema::TableBuilder;
use strata_core::{DataType, Value};
use strata_query::ast::{CompareOp, JoinKind, QueryId, SelectBuilder, SetOpKind, Source};
use strata_query::planner::PlanOp;
use strata_query::{EngineConfig, QueryArena, QueryExecution, QueryPlanner};
use strata_storage::Database;

/// Key values; NULL is represented as `None`.
fn key_strategy() -> impl Strategy<Value = Option<i64>> {
    prop_oneof![
        9 => (0i64..12).prop_map(Some),
        1 => Just(None),
    ]
}

fn column_strategy(max_rows: usize) -> impl Strategy<Value = Vec<Option<i64>>> {
    prop::collection::vec(key_strategy(), 0..max_rows)
}

fn to_value(v: Option<i64>) -> Value {
    v.map_or(Value::Null, Value::Int64)
}

fn from_value(v: &Value) -> Option<i64> {
    v.as_i64()
}

fn database(tables: &[(&str, &[Option<i64>])]) -> Database {
    let mut db = Database::new();
    for (name, values) in tables {
        let schema = TableBuilder::new(*name)
            .unwrap()
            .add_column("k", DataType::Int64)
            .unwrap()
            .build()
            .unwrap();
        db.create_table(schema).unwrap();
        db.insert(name, values.iter().map(|v| vec![to_value(*v)]).collect())
            .unwrap();
    }
    db
}

/// Runs `query`, returning its rows sorted.
fn sorted_rows(db: &Database, arena: &mut QueryArena, query: QueryId) -> Vec<Vec<Option<i64>>> {
    let plan = QueryPlanner::new(db, arena).plan(query).unwrap().plan().unwrap();
    let config = EngineConfig::default();
    let mut rows: Vec<Vec<Option<i64>>> = QueryExecution::new(db, arena, &config, plan)
        .unwrap()
        .collect_rows()
        .unwrap()
        .iter()
        .map(|r| r.iter().map(from_value).collect())
        .collect();
    rows.sort();
    rows
}

fn root_op(db: &Database, arena: &mut QueryArena, query: QueryId) -> &'static str {
    let plan = QueryPlanner::new(db, arena).plan(query).unwrap().plan().unwrap();
    arena.plan_nodes[plan].op.name()
}

fn multiset(values: &[Option<i64>]) -> BTreeMap<Option<i64>, usize> {
    let mut counts = BTreeMap::new();
    for v in values {
        *counts.entry(*v).or_insert(0) += 1;
    }
    counts
}

fn expand(counts: BTreeMap<Option<i64>, usize>) -> Vec<Vec<Option<i64>>> {
    counts
        .into_iter()
        .flat_map(|(v, n)| std::iter::repeat(vec![v]).take(n))
        .collect()
}

/// Multiset model of `left <op> [ALL] right` with NULLs equal to each other.
fn set_op_model(op: SetOpKind, all: bool, left: &[Option<i64>], right: &[Option<i64>]) -> Vec<Vec<Option<i64>>> {
    let (l, r) = (multiset(left), multiset(right));
    let mut out = BTreeMap::new();
    match op {
        SetOpKind::Union => {
            for (v, n) in l.iter().chain(r.iter()) {
                *out.entry(*v).or_insert(0) += n;
            }
        }
        SetOpKind::Intersect => {
            for (v, n) in &l {
                let m = r.get(v).copied().unwrap_or(0).min(*n);
                if m > 0 {
                    out.insert(*v, m);
                }
            }
        }
        SetOpKind::Except => {
            for (v, n) in &l {
                let m = n.saturating_sub(r.get(v).copied().unwrap_or(0));
                if m > 0 {
                    out.insert(*v, m);
                }
            }
            if !all {
                // distinct EXCEPT drops every value present on the right
                out.retain(|v, _| !r.contains_key(v));
            }
        }
    }
    if !all {
        for n in out.values_mut() {
            *n = 1;
        }
    }
    expand(out)
}

fn join_query(arena: &mut QueryArena, equi: bool) -> QueryId {
    let ak = arena.qcol("a", "k").unwrap();
    let bk = arena.qcol("b", "k").unwrap();
    let on = if equi {
        arena.eq(ak, bk).unwrap()
    } else {
        // same condition written so no hash key can be extracted
        let le = arena.compare(ak, CompareOp::Le, bk).unwrap();
        let ge = arena.compare(ak, CompareOp::Ge, bk).unwrap();
        arena.and(le, ge).unwrap()
    };
    SelectBuilder::new()
        .item(ak)
        .item(bk)
        .from("a")
        .join(JoinKind::Inner, Source::table("b"), Some(on))
        .build(arena)
        .unwrap()
}

proptest! {
    /// Hash join and nested loop join agree on inner equi-joins.
    #[test]
    fn hash_join_matches_nested_loop(left in column_strategy(60), right in column_strategy(60)) {
        let db = database(&[("a", left.as_slice()), ("b", right.as_slice())]);

        let mut arena = QueryArena::new();
        let q = join_query(&mut arena, true);
        let hashed = sorted_rows(&db, &mut arena, q);

        let mut arena = QueryArena::new();
        let q = join_query(&mut arena, false);
        let looped = sorted_rows(&db, &mut arena, q);

        let mut expected = Vec::new();
        for l in left.iter().flatten() {
            for r in right.iter().flatten() {
                if l == r {
                    expected.push(vec![Some(*l), Some(*r)]);
                }
            }
        }
        expected.sort();
        prop_assert_eq!(&hashed, &expected);
        prop_assert_eq!(&looped, &expected);
    }

    /// The equi-join above plans as a hash join (a nested loop otherwise).
    #[test]
    fn equality_keys_select_hash_join(left in column_strategy(5), right in column_strategy(5)) {
        let db = database(&[("a", left.as_slice()), ("b", right.as_slice())]);
        let mut arena = QueryArena::new();
        let q = join_query(&mut arena, true);
        let root = QueryPlanner::new(&db, &mut arena).plan(q).unwrap().plan().unwrap();
        let is_hash_join = matches!(arena.plan_nodes[root].op, PlanOp::HashJoin { .. });
        prop_assert!(is_hash_join);
        let mut arena = QueryArena::new();
        let q = join_query(&mut arena, false);
        prop_assert_eq!(root_op(&db, &mut arena, q), "NestedLoopJoin");
    }

    /// DISTINCT over DISTINCT output changes nothing.
    #[test]
    fn distinct_is_idempotent(values in column_strategy(80)) {
        let db = database(&[("a", values.as_slice())]);

        let mut arena = QueryArena::new();
        let k = arena.col("k").unwrap();
        let once = SelectBuilder::new().distinct().item(k).from("a").build(&mut arena).unwrap();
        let first = sorted_rows(&db, &mut arena, once);

        let mut arena = QueryArena::new();
        let k = arena.col("k").unwrap();
        let inner = SelectBuilder::new().distinct().item(k).from("a").build(&mut arena).unwrap();
        let outer_k = arena.col("k").unwrap();
        let twice = SelectBuilder::new()
            .distinct()
            .item(outer_k)
            .from_source(Source::Subquery { query: inner, alias: String::from("d") })
            .build(&mut arena)
            .unwrap();
        let second = sorted_rows(&db, &mut arena, twice);

        prop_assert_eq!(&first, &second);
        let model: Vec<Vec<Option<i64>>> = multiset(&values).into_keys().map(|v| vec![v]).collect();
        prop_assert_eq!(first, model);
    }

    /// Set operations follow multiset semantics.
    #[test]
    fn set_ops_match_multiset_model(
        left in column_strategy(40),
        right in column_strategy(40),
        op in prop_oneof![Just(SetOpKind::Union), Just(SetOpKind::Intersect), Just(SetOpKind::Except)],
        all in any::<bool>(),
    ) {
        let db = database(&[("a", left.as_slice()), ("b", right.as_slice())]);
        let mut arena = QueryArena::new();
        let ak = arena.col("k").unwrap();
        let l = SelectBuilder::new().item(ak).from("a").build(&mut arena).unwrap();
        let bk = arena.col("k").unwrap();
        let r = SelectBuilder::new().item(bk).from("b").build(&mut arena).unwrap();
        let q = arena.set_op(op, all, l, r).unwrap();
        prop_assert_eq!(sorted_rows(&db, &mut arena, q), set_op_model(op, all, &left, &right));
    }
}
