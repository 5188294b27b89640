//! Benchmarks for planned query execution.
//!
//! Each benchmark plans once and measures execution only: the query tree and
//! plan are rebuilt in `iter_batched` setup so arena growth is not timed.
//! Data is shuffled so sorts and hash builds see unordered input.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use strata_core::schema::TableBuilder;
use strata_core::{DataType, Value};
use strata_query::ast::{AggFunc, CompareOp, JoinKind, OrderItem, QueryId, SelectBuilder, Source};
use strata_query::planner::PlanId;
use strata_query::{EngineConfig, QueryArena, QueryExecution, QueryPlanner};
use strata_storage::Database;

// ============================================================================
// Data Generation Utilities
// ============================================================================

/// Simple LCG for reproducible pseudo-random shuffling
fn shuffle_indices(count: usize, seed: u64) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..count).collect();
    let mut s = seed;
    for i in (1..count).rev() {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        let j = (s as usize) % (i + 1);
        indices.swap(i, j);
    }
    indices
}

/// `facts(id, grp, amount, name)` with `count` shuffled rows and
/// `dims(id, label)` with one row per group.
fn create_database(count: usize) -> Database {
    let mut db = Database::new();
    let facts = TableBuilder::new("facts")
        .unwrap()
        .add_column("id", DataType::Int64)
        .unwrap()
        .add_column("grp", DataType::Int64)
        .unwrap()
        .add_column("amount", DataType::Int64)
        .unwrap()
        .add_column("name", DataType::Text)
        .unwrap()
        .build()
        .unwrap();
    db.create_table(facts).unwrap();
    let rows = shuffle_indices(count, 12345)
        .into_iter()
        .map(|i| {
            vec![
                Value::Int64(i as i64),
                Value::Int64((i % 100) as i64),
                Value::Int64((i * 7 % 1000) as i64),
                Value::from(format!("name_{}", i)),
            ]
        })
        .collect();
    db.insert("facts", rows).unwrap();

    let dims = TableBuilder::new("dims")
        .unwrap()
        .add_column("id", DataType::Int64)
        .unwrap()
        .add_column("label", DataType::Text)
        .unwrap()
        .build()
        .unwrap();
    db.create_table(dims).unwrap();
    let rows = (0..100)
        .map(|i| vec![Value::Int64(i), Value::from(format!("label_{}", i))])
        .collect();
    db.insert("dims", rows).unwrap();
    db
}

fn plan(db: &Database, arena: &mut QueryArena, query: QueryId) -> PlanId {
    QueryPlanner::new(db, arena).plan(query).unwrap().plan().unwrap()
}

fn execute(db: &Database, arena: &QueryArena, plan: PlanId) -> usize {
    let config = EngineConfig::default();
    let mut execution = QueryExecution::new(db, arena, &config, plan).unwrap();
    let mut rows = 0;
    while let Some(block) = execution.next_block().unwrap() {
        rows += block.row_count();
    }
    rows
}

fn bench_query<F>(c: &mut Criterion, group_name: &str, sizes: &[usize], build: F)
where
    F: Fn(&mut QueryArena) -> QueryId,
{
    let mut group = c.benchmark_group(group_name);
    for &size in sizes {
        let db = create_database(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter_batched(
                || {
                    let mut arena = QueryArena::new();
                    let query = build(&mut arena);
                    let root = plan(&db, &mut arena, query);
                    (arena, root)
                },
                |(arena, root)| black_box(execute(&db, &arena, root)),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_filter(c: &mut Criterion) {
    bench_query(c, "filter_scan", &[10_000, 100_000], |arena| {
        let amount = arena.col("amount").unwrap();
        let limit = arena.lit(500i64).unwrap();
        let pred = arena.compare(amount, CompareOp::Lt, limit).unwrap();
        let id = arena.col("id").unwrap();
        SelectBuilder::new().item(id).from("facts").filter(pred).build(arena).unwrap()
    });
}

fn bench_aggregate(c: &mut Criterion) {
    bench_query(c, "group_by_sum", &[10_000, 100_000], |arena| {
        let grp = arena.col("grp").unwrap();
        let amount = arena.col("amount").unwrap();
        let sum = arena.agg(AggFunc::Sum, Some(amount), false).unwrap();
        let count = arena.count_star().unwrap();
        SelectBuilder::new()
            .item(grp)
            .item(sum)
            .item(count)
            .from("facts")
            .group_by(&[grp])
            .build(arena)
            .unwrap()
    });
}

fn bench_hash_join(c: &mut Criterion) {
    bench_query(c, "hash_join", &[10_000, 100_000], |arena| {
        let grp = arena.qcol("f", "grp").unwrap();
        let id = arena.qcol("d", "id").unwrap();
        let on = arena.eq(grp, id).unwrap();
        let label = arena.qcol("d", "label").unwrap();
        let amount = arena.qcol("f", "amount").unwrap();
        SelectBuilder::new()
            .item(label)
            .item(amount)
            .from_as("facts", "f")
            .join(JoinKind::Inner, Source::aliased("dims", "d"), Some(on))
            .build(arena)
            .unwrap()
    });
}

fn bench_top_n(c: &mut Criterion) {
    bench_query(c, "order_by_limit", &[10_000, 100_000], |arena| {
        let amount = arena.col("amount").unwrap();
        let name = arena.col("name").unwrap();
        SelectBuilder::new()
            .item(name)
            .item(amount)
            .from("facts")
            .order_by(OrderItem::desc(amount))
            .limit(100)
            .build(arena)
            .unwrap()
    });
}

criterion_group!(benches, bench_filter, bench_aggregate, bench_hash_join, bench_top_n);
criterion_main!(benches);
