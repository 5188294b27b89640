//! Benchmarks for table mutation and scan cache rebuilds.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use strata_core::schema::TableBuilder;
use strata_core::{DataType, Value};
use strata_storage::Database;

fn database_with_rows(count: i64) -> Database {
    let mut db = Database::new();
    let schema = TableBuilder::new("quotes")
        .unwrap()
        .add_column("id", DataType::Int64)
        .unwrap()
        .add_column("price", DataType::Float64)
        .unwrap()
        .add_column("symbol", DataType::Text)
        .unwrap()
        .primary_key("id")
        .unwrap()
        .build()
        .unwrap();
    db.create_table(schema).unwrap();
    db.bulk_load(
        "quotes",
        (0..count).map(|i| {
            vec![
                Value::Int64(i),
                Value::Float64(100.0 + i as f64 * 0.1),
                Value::Text(format!("SYM{}", i % 500)),
            ]
        }),
    )
    .unwrap();
    db
}

/// Benchmark: building the columnar scan cache from rows.
fn scan_cache_build_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan_cache_build");
    for rows in [1_000i64, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |b, &rows| {
            b.iter_batched(
                || database_with_rows(rows),
                |db| black_box(db.get_table("quotes").unwrap().scan_cache().unwrap()),
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

/// Benchmark: copy-on-write cost of the first mutation inside a transaction.
fn transaction_first_write_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("transaction_first_write");
    for rows in [1_000i64, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |b, &rows| {
            b.iter_batched(
                || database_with_rows(rows),
                |mut db| {
                    db.begin();
                    db.delete("quotes", |r| Ok(r.get(0) == Some(&Value::Int64(0))))
                        .unwrap();
                    db.rollback().unwrap();
                    black_box(db)
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, scan_cache_build_benchmark, transaction_first_write_benchmark);
criterion_main!(benches);
