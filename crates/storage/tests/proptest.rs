//! Property-based tests for strata-storage using proptest.

use proptest::prelude::*;
use strata_core::schema::TableBuilder;
use strata_core::{DataType, Value};
use strata_storage::Database;

#[derive(Clone, Debug)]
enum Mutation {
    Insert(i64, i64),
    SetValue { id_mod: i64, value: i64 },
    DeleteWhereValueBelow(i64),
    Truncate,
    AlterToFloat,
}

fn mutation_strategy() -> impl Strategy<Value = Mutation> {
    prop_oneof![
        4 => (0i64..1000, -50i64..50).prop_map(|(id, v)| Mutation::Insert(id, v)),
        3 => (1i64..5, -50i64..50).prop_map(|(id_mod, value)| Mutation::SetValue { id_mod, value }),
        2 => (-50i64..50).prop_map(Mutation::DeleteWhereValueBelow),
        1 => Just(Mutation::Truncate),
        1 => Just(Mutation::AlterToFloat),
    ]
}

fn seeded(rows: &[(i64, i64)]) -> Database {
    let mut db = Database::new();
    let schema = TableBuilder::new("t")
        .unwrap()
        .add_column("id", DataType::Int64)
        .unwrap()
        .add_column("v", DataType::Int64)
        .unwrap()
        .build()
        .unwrap();
    db.create_table(schema).unwrap();
    db.insert(
        "t",
        rows.iter()
            .map(|&(id, v)| vec![Value::Int64(id), Value::Int64(v)])
            .collect(),
    )
    .unwrap();
    db
}

fn apply(db: &mut Database, m: &Mutation) {
    // failed mutations are fine here; they must leave no trace either
    let _ = match m {
        Mutation::Insert(id, v) => db.insert("t", vec![vec![Value::Int64(*id), Value::Int64(*v)]]),
        Mutation::SetValue { id_mod, value } => db.update("t", |r| {
            let id = r.get(0).and_then(Value::as_i64).unwrap_or(0);
            Ok((id % id_mod == 0).then(|| vec![r.values()[0].clone(), Value::Int64(*value)]))
        }),
        Mutation::DeleteWhereValueBelow(bound) => db.delete("t", |r| {
            Ok(r.get(1).and_then(Value::as_f64).is_some_and(|v| v < *bound as f64))
        }),
        Mutation::Truncate => db.truncate("t"),
        Mutation::AlterToFloat => db.alter_column_type("t", "v", DataType::Float64).map(|_| 0),
    };
}

fn contents(db: &Database) -> Vec<Vec<Value>> {
    db.get_table("t")
        .unwrap()
        .rows()
        .iter()
        .map(|r| r.values().to_vec())
        .collect()
}

proptest! {
    /// Rollback after any mutation sequence restores the exact pre-transaction content.
    #[test]
    fn rollback_restores_content(
        rows in prop::collection::vec((0i64..100, -50i64..50), 0..40),
        mutations in prop::collection::vec(mutation_strategy(), 1..20),
    ) {
        let mut db = seeded(&rows);
        let before = contents(&db);
        let schema_before = db.get_table("t").unwrap().schema().data_types();
        let generation_before = db.generation("t").unwrap();

        db.begin();
        for m in &mutations {
            apply(&mut db, m);
        }
        db.rollback().unwrap();

        prop_assert_eq!(contents(&db), before);
        prop_assert_eq!(db.get_table("t").unwrap().schema().data_types(), schema_before);
        prop_assert!(db.generation("t").unwrap() > generation_before);
    }

    /// Commit keeps the transaction's changes and drops the snapshot.
    #[test]
    fn commit_keeps_changes(
        rows in prop::collection::vec((0i64..100, -50i64..50), 0..40),
        mutations in prop::collection::vec(mutation_strategy(), 1..20),
    ) {
        let mut expected = seeded(&rows);
        for m in &mutations {
            apply(&mut expected, m);
        }

        let mut db = seeded(&rows);
        db.begin();
        for m in &mutations {
            apply(&mut db, m);
        }
        db.commit().unwrap();

        prop_assert!(!db.in_transaction());
        prop_assert_eq!(contents(&db), contents(&expected));
    }

    /// A valid scan cache reads exactly what a fresh scan of the rows reads.
    #[test]
    fn scan_cache_matches_fresh_scan(
        rows in prop::collection::vec((0i64..100, -50i64..50), 0..3000),
        mutations in prop::collection::vec(mutation_strategy(), 0..5),
    ) {
        let mut db = seeded(&rows);
        let warm = db.get_table("t").unwrap().scan_cache().unwrap();
        let warm_generation = warm.generation();
        for m in &mutations {
            apply(&mut db, m);
        }
        let table = db.get_table("t").unwrap();
        let cache = table.scan_cache().unwrap();
        prop_assert_eq!(cache.generation(), table.generation());
        if table.generation() == warm_generation {
            prop_assert!(std::rc::Rc::ptr_eq(&warm, &cache));
        }

        let mut start = 0;
        let mut scanned = Vec::new();
        while start < table.len() {
            let block = table.scan_cache_read(start, 1024).unwrap();
            for pos in block.positions() {
                scanned.push(block.row_values(pos));
            }
            start += block.row_count();
        }
        prop_assert_eq!(scanned, contents(&db));
    }
}
