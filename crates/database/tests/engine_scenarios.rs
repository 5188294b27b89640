//! End-to-end scenarios through the `Engine` facade.

use strata_core::schema::TableBuilder;
use strata_core::{DataType, Value};
use strata_database::Engine;
use strata_query::ast::{AggFunc, BinaryOp, CompareOp, OrderItem, QueryId, SelectBuilder};
use strata_query::{EngineConfig, QueryArena};

fn accounts() -> Engine {
    let mut engine = Engine::new();
    let schema = TableBuilder::new("accounts")
        .unwrap()
        .add_column("id", DataType::Int64)
        .unwrap()
        .add_column("owner", DataType::Text)
        .unwrap()
        .add_column("balance", DataType::Int64)
        .unwrap()
        .primary_key("id")
        .unwrap()
        .build()
        .unwrap();
    engine.create_table(schema).unwrap();
    engine
        .insert(
            "accounts",
            vec![
                vec![Value::Int64(1), Value::from("ann"), Value::Int64(10)],
                vec![Value::Int64(2), Value::from("bob"), Value::Int64(50)],
                vec![Value::Int64(3), Value::from("ann"), Value::Int64(5)],
            ],
        )
        .unwrap();
    engine
}

fn balances_query(arena: &mut QueryArena) -> QueryId {
    let id = arena.col("id").unwrap();
    let balance = arena.col("balance").unwrap();
    SelectBuilder::new()
        .item(id)
        .item(balance)
        .from("accounts")
        .order_by(OrderItem::asc(id))
        .build(arena)
        .unwrap()
}

fn balances(engine: &mut Engine) -> Vec<(i64, i64)> {
    let mut arena = QueryArena::new();
    let q = balances_query(&mut arena);
    engine
        .query(&mut arena, q)
        .unwrap()
        .rows()
        .iter()
        .map(|r| (r[0].as_i64().unwrap(), r[1].as_i64().unwrap()))
        .collect()
}

/// `UPDATE accounts SET balance = balance + delta WHERE id = target`
fn deposit(engine: &mut Engine, target: i64, delta: i64) -> usize {
    let mut arena = QueryArena::new();
    let id = arena.col("id").unwrap();
    let key = arena.lit(target).unwrap();
    let filter = arena.compare(id, CompareOp::Eq, key).unwrap();
    let balance = arena.col("balance").unwrap();
    let amount = arena.lit(delta).unwrap();
    let sum = arena.binary(BinaryOp::Add, balance, amount).unwrap();
    engine.update(&mut arena, "accounts", &[("balance", sum)], Some(filter)).unwrap()
}

#[test]
fn test_begin_update_rollback() {
    let mut engine = accounts();
    engine.begin();
    assert_eq!(deposit(&mut engine, 1, 90), 1);
    assert_eq!(balances(&mut engine)[0], (1, 100));
    engine.rollback().unwrap();
    assert_eq!(balances(&mut engine), vec![(1, 10), (2, 50), (3, 5)]);
    assert!(!engine.in_transaction());
}

#[test]
fn test_nested_transactions() {
    let mut engine = accounts();
    engine.begin();
    deposit(&mut engine, 1, 1);
    engine.begin();
    assert_eq!(engine.transaction_depth(), 2);
    deposit(&mut engine, 2, 1);
    engine.rollback().unwrap();
    // the inner rollback keeps the outer transaction's change
    assert_eq!(balances(&mut engine), vec![(1, 11), (2, 50), (3, 5)]);
    engine.begin();
    deposit(&mut engine, 3, 1);
    engine.commit().unwrap();
    engine.rollback().unwrap();
    assert_eq!(balances(&mut engine), vec![(1, 10), (2, 50), (3, 5)]);
}

#[test]
fn test_committed_changes_survive() {
    let mut engine = accounts();
    engine.begin();
    deposit(&mut engine, 2, -20);
    engine.commit().unwrap();
    assert_eq!(balances(&mut engine)[1], (2, 30));
    assert_eq!(engine.commit().unwrap_err().sqlstate(), "25P01");
}

#[test]
fn test_delete_and_aggregate() {
    let mut engine = accounts();
    let mut arena = QueryArena::new();
    let owner = arena.col("owner").unwrap();
    let bob = arena.lit("bob").unwrap();
    let filter = arena.compare(owner, CompareOp::Eq, bob).unwrap();
    assert_eq!(engine.delete(&mut arena, "accounts", Some(filter)).unwrap(), 1);

    let mut arena = QueryArena::new();
    let owner = arena.col("owner").unwrap();
    let balance = arena.col("balance").unwrap();
    let total = arena.agg(AggFunc::Sum, Some(balance), false).unwrap();
    let q = SelectBuilder::new()
        .item(owner)
        .item_as(total, "total")
        .from("accounts")
        .group_by(&[owner])
        .build(&mut arena)
        .unwrap();
    let result = engine.query(&mut arena, q).unwrap();
    assert_eq!(result.column_names(), vec!["owner", "total"]);
    assert_eq!(result.rows(), &[vec![Value::from("ann"), Value::Int64(15)]]);
}

#[test]
fn test_delete_without_filter_removes_everything() {
    let mut engine = accounts();
    let mut arena = QueryArena::new();
    assert_eq!(engine.delete(&mut arena, "accounts", None).unwrap(), 3);
    assert!(balances(&mut engine).is_empty());
}

#[test]
fn test_update_null_filter_matches_nothing() {
    let mut engine = accounts();
    let mut arena = QueryArena::new();
    let id = arena.col("id").unwrap();
    let null = arena.lit(Value::Null).unwrap();
    let filter = arena.compare(id, CompareOp::Eq, null).unwrap();
    let zero = arena.lit(0i64).unwrap();
    let count = engine
        .update(&mut arena, "accounts", &[("balance", zero)], Some(filter))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn test_duplicate_assignment_is_rejected() {
    let mut engine = accounts();
    let mut arena = QueryArena::new();
    let one = arena.lit(1i64).unwrap();
    let two = arena.lit(2i64).unwrap();
    let err = engine
        .update(&mut arena, "accounts", &[("balance", one), ("balance", two)], None)
        .unwrap_err();
    assert_eq!(err.sqlstate(), "42601");
}

#[test]
fn test_unknown_targets() {
    let mut engine = accounts();
    let mut arena = QueryArena::new();
    let one = arena.lit(1i64).unwrap();
    assert_eq!(
        engine.update(&mut arena, "missing", &[("balance", one)], None).unwrap_err().sqlstate(),
        "42P01"
    );
    assert_eq!(
        engine.update(&mut arena, "accounts", &[("nope", one)], None).unwrap_err().sqlstate(),
        "42703"
    );
}

#[test]
fn test_result_cache_follows_generations() {
    let mut engine = accounts();
    balances(&mut engine);
    balances(&mut engine);
    assert_eq!(engine.result_cache().hits(), 1);

    engine.begin();
    deposit(&mut engine, 1, 5);
    assert_eq!(balances(&mut engine)[0], (1, 15));
    engine.rollback().unwrap();
    // the rollback bumps generations, so the cached in-transaction result is not served
    assert_eq!(balances(&mut engine)[0], (1, 10));
    assert_eq!(engine.result_cache().hits(), 1);
}

#[test]
fn test_distinct_queries_get_distinct_cache_entries() {
    let mut engine = accounts();
    let lookup = |engine: &mut Engine, key: i64| {
        let mut arena = QueryArena::new();
        let id = arena.col("id").unwrap();
        let owner = arena.col("owner").unwrap();
        let lit = arena.lit(key).unwrap();
        let pred = arena.compare(id, CompareOp::Eq, lit).unwrap();
        let q = SelectBuilder::new().item(owner).from("accounts").filter(pred).build(&mut arena).unwrap();
        engine.query(&mut arena, q).unwrap().rows().to_vec()
    };
    assert_eq!(lookup(&mut engine, 1), vec![vec![Value::from("ann")]]);
    assert_eq!(lookup(&mut engine, 2), vec![vec![Value::from("bob")]]);
    assert_eq!(engine.result_cache().len(), 2);
    assert_eq!(engine.result_cache().hits(), 0);
}

#[test]
fn test_fallback_surfaces_as_feature_not_supported() {
    let mut engine = accounts();
    let mut arena = QueryArena::new();
    let owner = arena.col("owner").unwrap();
    let balance = arena.col("balance").unwrap();
    let q = SelectBuilder::new()
        .distinct()
        .item(owner)
        .from("accounts")
        .order_by(OrderItem::asc(balance))
        .build(&mut arena)
        .unwrap();
    let err = engine.query(&mut arena, q).unwrap_err();
    assert!(err.is_fallback());
    assert_eq!(err.sqlstate(), "0A000");
}

#[test]
fn test_join_row_limit_from_config() {
    let mut engine = Engine::from_database(
        accounts().into_database(),
        EngineConfig::default().with_max_join_rows(4),
    );
    let mut arena = QueryArena::new();
    let a = arena.qcol("a", "id").unwrap();
    let b = arena.qcol("b", "id").unwrap();
    let q = SelectBuilder::new()
        .item(a)
        .item(b)
        .from_as("accounts", "a")
        .join(
            strata_query::ast::JoinKind::Cross,
            strata_query::ast::Source::aliased("accounts", "b"),
            None,
        )
        .build(&mut arena)
        .unwrap();
    assert_eq!(engine.query(&mut arena, q).unwrap_err().sqlstate(), "54000");
}

#[test]
fn test_ddl_passthrough() {
    let mut engine = accounts();
    engine.create_index("accounts", "owner", false).unwrap();
    engine.rename_table("accounts", "ledger").unwrap();
    engine.alter_column_type("ledger", "balance", DataType::Float64).unwrap();

    let mut arena = QueryArena::new();
    let balance = arena.col("balance").unwrap();
    let owner = arena.col("owner").unwrap();
    let bob = arena.lit("bob").unwrap();
    let pred = arena.compare(owner, CompareOp::Eq, bob).unwrap();
    let q = SelectBuilder::new().item(balance).from("ledger").filter(pred).build(&mut arena).unwrap();
    assert!(engine.explain(&mut arena, q).unwrap().contains("IndexScan on ledger"));
    assert_eq!(engine.query(&mut arena, q).unwrap().rows(), &[vec![Value::Float64(50.0)]]);

    assert_eq!(engine.truncate("ledger").unwrap(), 3);
    engine.drop_table("ledger").unwrap();
    assert!(engine.database().table("ledger").is_none());
}

#[test]
fn test_bulk_load() {
    let mut engine = accounts();
    let before = engine.database().total_generation();
    let rows = (10..1010).map(|i| vec![Value::Int64(i), Value::from("bulk"), Value::Int64(1)]);
    assert_eq!(engine.bulk_load("accounts", rows).unwrap(), 1000);
    assert_eq!(engine.database().total_generation(), before + 1);
    assert_eq!(balances(&mut engine).len(), 1003);
}
