//! Property-based tests for strata-core using proptest.

use std::cmp::Ordering;

use proptest::prelude::*;
use strata_core::{ColumnBlock, DataType, FlatColumns, Value};

// Numeric magnitudes stay small so every integer is exact as an f64.
fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Boolean),
        (-1000i32..1000).prop_map(Value::Int32),
        (-1000i64..1000).prop_map(Value::Int64),
        (-2000i32..2000).prop_map(|h| Value::Float64(h as f64 / 2.0)),
        Just(Value::Float64(f64::NAN)),
        "[a-c]{0,3}".prop_map(Value::Text),
        (-30i32..30).prop_map(Value::Date),
        (-30i64..30).prop_map(|d| Value::Timestamp(d * 86_400_000_000 + 1)),
    ]
}

fn int_or_null() -> impl Strategy<Value = Value> {
    prop_oneof![
        1 => Just(Value::Null),
        4 => any::<i64>().prop_map(Value::Int64),
    ]
}

proptest! {
    #[test]
    fn ordering_is_antisymmetric(a in value_strategy(), b in value_strategy()) {
        prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
    }

    #[test]
    fn ordering_is_transitive(
        a in value_strategy(),
        b in value_strategy(),
        c in value_strategy(),
    ) {
        let mut v = [a, b, c];
        v.sort();
        prop_assert_ne!(v[0].cmp(&v[1]), Ordering::Greater);
        prop_assert_ne!(v[1].cmp(&v[2]), Ordering::Greater);
        prop_assert_ne!(v[0].cmp(&v[2]), Ordering::Greater);
    }

    #[test]
    fn null_sorts_before_everything(values in prop::collection::vec(value_strategy(), 0..40)) {
        let nulls = values.iter().filter(|v| v.is_null()).count();
        let mut sorted = values;
        sorted.sort();
        prop_assert!(sorted[..nulls].iter().all(Value::is_null));
        prop_assert!(sorted[nulls..].iter().all(|v| !v.is_null()));
    }

    #[test]
    fn null_never_compares_in_sql(v in value_strategy()) {
        prop_assert_eq!(Value::Null.sql_cmp(&v), None);
        prop_assert_eq!(v.sql_cmp(&Value::Null), None);
    }

    #[test]
    fn integer_widths_compare_by_magnitude(a in any::<i32>(), b in any::<i64>()) {
        prop_assert_eq!(Value::Int32(a).cmp(&Value::Int64(b)), (a as i64).cmp(&b));
        prop_assert_eq!(Value::Int64(a as i64).cmp(&Value::Int32(a)), Ordering::Equal);
    }

    #[test]
    fn column_block_keeps_values(
        values in prop::collection::vec(int_or_null(), 0..300),
        start in 0usize..320,
        len in 0usize..320,
    ) {
        let block = ColumnBlock::from_values(DataType::Int64, &values).unwrap();
        prop_assert_eq!(block.len(), values.len());
        prop_assert_eq!(block.null_count(), values.iter().filter(|v| v.is_null()).count());
        for (i, v) in values.iter().enumerate() {
            prop_assert_eq!(&block.value(i), v);
        }

        let slice = block.slice(start, len);
        let expected: Vec<Value> = values.iter().skip(start).take(len).cloned().collect();
        prop_assert_eq!(slice.len(), expected.len());
        prop_assert_eq!(slice.data_type(), DataType::Int64);
        for (i, v) in expected.iter().enumerate() {
            prop_assert_eq!(&slice.value(i), v);
        }
    }

    #[test]
    fn flat_columns_slices_match_appended_rows(
        rows in prop::collection::vec((int_or_null(), "[a-z]{0,4}"), 0..200),
        start in 0usize..220,
        len in 0usize..220,
    ) {
        let mut flat = FlatColumns::new(&[DataType::Int64, DataType::Text]);
        for (id, name) in &rows {
            flat.append_values(&[id.clone(), Value::from(name.as_str())]).unwrap();
        }
        prop_assert_eq!(flat.len(), rows.len());
        prop_assert_eq!(flat.width(), 2);

        let block = flat.slice_block(start, len);
        let expected: Vec<_> = rows.iter().skip(start).take(len).collect();
        prop_assert_eq!(block.width(), 2);
        prop_assert_eq!(block.row_count(), expected.len());
        for (pos, (id, name)) in expected.into_iter().enumerate() {
            prop_assert_eq!(block.row_values(pos), vec![id.clone(), Value::from(name.as_str())]);
        }
    }

    #[test]
    fn flat_columns_reject_wrong_width(values in prop::collection::vec(int_or_null(), 0..5)) {
        prop_assume!(values.len() != 1);
        let mut flat = FlatColumns::new(&[DataType::Int64]);
        prop_assert!(flat.append_values(&values).is_err());
        prop_assert_eq!(flat.len(), 0);
    }
}
