//! The table store.
//!
//! `Database` owns every table, the database-wide generation counter and the
//! transaction manager. All mutation primitives funnel through one private
//! path, [`Database::mutate`], which copy-on-write protects the target table
//! when a transaction is active, applies the validated change, and bumps the
//! table, column and total generations together. A cache tagged with the
//! total generation is therefore valid iff the tag still equals
//! [`Database::total_generation`].

use crate::constraint::{ConstraintChecker, ReferentialEffect};
use crate::table::{Table, TableId};
use crate::transaction::{TransactionId, TransactionManager, TransactionState};
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use strata_core::schema::{ForeignKey, TableSchema};
use strata_core::{DataType, Error, Result, Row, Value};
use tracing::debug;

/// Map key for a table name; names are case-insensitive.
pub(crate) fn table_key(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// In-memory table store with generation tracking and transactions.
#[derive(Debug)]
pub struct Database {
    tables: BTreeMap<String, Table>,
    total_generation: u64,
    next_table_id: TableId,
    transactions: TransactionManager,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    /// Creates an empty database.
    pub fn new() -> Self {
        Self {
            tables: BTreeMap::new(),
            total_generation: 0,
            next_table_id: 1,
            transactions: TransactionManager::new(),
        }
    }

    /// Gets a table by name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(&table_key(name))
    }

    /// Gets a table by name or fails with `42P01`.
    pub fn get_table(&self, name: &str) -> Result<&Table> {
        self.table(name).ok_or_else(|| Error::table_not_found(name))
    }

    /// Checks if a table exists.
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(&table_key(name))
    }

    /// Returns all table names in key order.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.values().map(|t| t.name()).collect()
    }

    /// Returns the number of tables.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Database-wide generation, incremented with every table mutation.
    pub fn total_generation(&self) -> u64 {
        self.total_generation
    }

    /// Current generation of a table.
    pub fn generation(&self, name: &str) -> Option<u64> {
        self.table(name).map(|t| t.generation())
    }

    /// Tables holding a foreign key that references `parent`, with that key.
    pub fn referencing(&self, parent: &str) -> Vec<(&Table, &ForeignKey)> {
        self.tables
            .values()
            .flat_map(|t| {
                t.schema()
                    .foreign_keys()
                    .iter()
                    .filter(|fk| fk.parent_table.eq_ignore_ascii_case(parent))
                    .map(move |fk| (t, fk))
            })
            .collect()
    }

    /// Transaction state.
    pub fn transaction_state(&self) -> TransactionState {
        self.transactions.state()
    }

    /// Returns true inside a transaction.
    pub fn in_transaction(&self) -> bool {
        self.transactions.is_active()
    }

    /// Transaction nesting depth.
    pub fn transaction_depth(&self) -> usize {
        self.transactions.depth()
    }

    /// The transaction manager.
    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    // ---- DDL ----

    /// Creates a table.
    pub fn create_table(&mut self, schema: TableSchema) -> Result<TableId> {
        if self.has_table(schema.name()) {
            return Err(Error::table_exists(schema.name()));
        }
        for fk in schema.foreign_keys() {
            let parent_schema = if fk.parent_table.eq_ignore_ascii_case(schema.name()) {
                &schema
            } else {
                self.get_table(&fk.parent_table)?.schema()
            };
            if parent_schema.column_index(&fk.parent_column).is_none() {
                return Err(Error::column_not_found(fk.parent_column.as_str()));
            }
        }
        let id = self.next_table_id;
        self.next_table_id += 1;
        let table = Table::new(id, schema);
        debug!(table = table.name(), id, "create table");
        self.tables.insert(table_key(table.name()), table);
        self.total_generation += 1;
        Ok(id)
    }

    /// Drops a table. Fails while another table references it.
    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        let key = table_key(name);
        let table = self.tables.get(&key).ok_or_else(|| Error::table_not_found(name))?;
        if let Some((child, fk)) = self
            .referencing(name)
            .into_iter()
            .find(|(child, _)| child.id() != table.id())
        {
            return Err(Error::foreign_key(
                fk.name.as_str(),
                format!("table \"{}\" is referenced by \"{}\"", name, child.name()),
            ));
        }
        self.transactions.protect(table);
        self.tables.remove(&key);
        self.total_generation += 1;
        Ok(())
    }

    /// Creates an index on one column.
    pub fn create_index(&mut self, table: &str, column: &str, unique: bool) -> Result<()> {
        let col = self.column_position(table, column)?;
        self.mutate(table, Some(&[]), |t| t.add_index(col, unique))
    }

    /// Renames a table, retargeting foreign keys that reference it.
    pub fn rename_table(&mut self, old: &str, new: &str) -> Result<()> {
        if self.has_table(new) {
            return Err(Error::table_exists(new));
        }
        let children: Vec<String> = self
            .referencing(old)
            .into_iter()
            .map(|(c, _)| String::from(c.name()))
            .collect();
        let new_name = String::from(new);
        self.mutate(old, Some(&[]), |t| {
            t.rename(&new_name);
            Ok(())
        })?;
        if let Some(table) = self.tables.remove(&table_key(old)) {
            self.tables.insert(table_key(new), table);
        }
        for child in children {
            let child = if child.eq_ignore_ascii_case(old) { new_name.clone() } else { child };
            self.mutate(&child, Some(&[]), |t| {
                t.schema_mut().retarget_foreign_keys(old, new);
                Ok(())
            })?;
        }
        Ok(())
    }

    /// Changes a column's type, converting every stored value.
    pub fn alter_column_type(&mut self, table: &str, column: &str, data_type: DataType) -> Result<()> {
        let col = self.column_position(table, column)?;
        self.mutate(table, Some(&[col]), |t| t.alter_column_type(col, data_type))
    }

    // ---- DML ----

    /// Inserts full-width rows. All rows are validated before any is stored.
    pub fn insert(&mut self, table: &str, rows: Vec<Vec<Value>>) -> Result<usize> {
        let prepared = self.prepare_rows(table, rows)?;
        self.mutate(table, None, |t| t.insert_rows(prepared))
    }

    /// Loads a batch of rows with a single generation bump.
    pub fn bulk_load<I>(&mut self, table: &str, rows: I) -> Result<usize>
    where
        I: IntoIterator<Item = Vec<Value>>,
    {
        let rows: Vec<Vec<Value>> = rows.into_iter().collect();
        let count = rows.len();
        let prepared = self.prepare_rows(table, rows)?;
        debug!(table, rows = count, "bulk load");
        self.mutate(table, None, |t| t.insert_rows(prepared))
    }

    /// Updates rows. `f` returns the new full row for rows to change, `None` to skip.
    pub fn update<F>(&mut self, table: &str, mut f: F) -> Result<usize>
    where
        F: FnMut(&Row) -> Result<Option<Vec<Value>>>,
    {
        let target = self.get_table(table)?;
        let mut updates = Vec::new();
        let mut touched = alloc::vec![false; target.schema().width()];
        for (pos, row) in target.rows().iter().enumerate() {
            if let Some(values) = f(row)? {
                let new_row = target.coerce_row(values)?;
                for (c, flag) in touched.iter_mut().enumerate() {
                    *flag |= row.get(c) != new_row.get(c);
                }
                updates.push((pos, new_row));
            }
        }
        ConstraintChecker::check_foreign_keys_for_update(self, target, &updates)?;
        let columns: Vec<usize> = touched
            .iter()
            .enumerate()
            .filter(|(_, t)| **t)
            .map(|(c, _)| c)
            .collect();
        self.mutate(table, Some(&columns), |t| t.replace_rows(updates))
    }

    /// Deletes rows matching `f`, applying referential actions.
    pub fn delete<F>(&mut self, table: &str, mut f: F) -> Result<usize>
    where
        F: FnMut(&Row) -> Result<bool>,
    {
        let target = self.get_table(table)?;
        let mut positions = Vec::new();
        for (pos, row) in target.rows().iter().enumerate() {
            if f(row)? {
                positions.push(pos);
            }
        }
        let count = positions.len();
        let effects = ConstraintChecker::plan_delete(self, table, &positions)?;
        for effect in effects {
            self.apply_effect(effect)?;
        }
        Ok(count)
    }

    /// Removes all rows of a table.
    pub fn truncate(&mut self, table: &str) -> Result<usize> {
        let target = self.get_table(table)?;
        for (child, fk) in self.referencing(table) {
            if child.id() == target.id() {
                continue;
            }
            let col = child
                .schema()
                .column_index(&fk.child_column)
                .ok_or_else(|| Error::column_not_found(fk.child_column.as_str()))?;
            if child.rows().iter().any(|r| r.get(col).is_some_and(|v| !v.is_null())) {
                return Err(Error::foreign_key(
                    fk.name.as_str(),
                    format!("table \"{}\" references \"{}\"", child.name(), table),
                ));
            }
        }
        self.mutate(table, None, |t| Ok(t.truncate()))
    }

    // ---- transactions ----

    /// Begins a (possibly nested) transaction.
    pub fn begin(&mut self) -> TransactionId {
        self.transactions.begin(self.tables.values())
    }

    /// Commits the innermost transaction.
    pub fn commit(&mut self) -> Result<()> {
        self.transactions.commit().map(|_| ())
    }

    /// Rolls back the innermost transaction.
    pub fn rollback(&mut self) -> Result<()> {
        let snapshot = self.transactions.rollback()?;
        let tables = core::mem::take(&mut self.tables);
        self.tables = snapshot.restore(tables);
        self.total_generation += 1;
        Ok(())
    }

    // ---- internals ----

    /// The single mutation path: protect, apply, bump generations.
    fn mutate<R>(
        &mut self,
        name: &str,
        columns: Option<&[usize]>,
        f: impl FnOnce(&mut Table) -> Result<R>,
    ) -> Result<R> {
        let table = self
            .tables
            .get_mut(&table_key(name))
            .ok_or_else(|| Error::table_not_found(name))?;
        self.transactions.protect(table);
        let out = f(table)?;
        table.bump_generation(columns);
        self.total_generation += 1;
        Ok(out)
    }

    fn apply_effect(&mut self, effect: ReferentialEffect) -> Result<()> {
        match effect {
            ReferentialEffect::Delete { table, positions } => {
                if positions.is_empty() {
                    return Ok(());
                }
                let positions: Vec<usize> = positions.into_iter().collect();
                self.mutate(&table, None, |t| Ok(t.delete_positions(&positions)))?;
            }
            ReferentialEffect::SetNull {
                table,
                column,
                positions,
            } => {
                let target = self.get_table(&table)?;
                let updates: Vec<(usize, Row)> = positions
                    .into_iter()
                    .map(|p| {
                        let mut row = target.rows()[p].clone();
                        row.values_mut()[column] = Value::Null;
                        (p, row)
                    })
                    .collect();
                self.mutate(&table, Some(&[column]), |t| t.replace_rows(updates))?;
            }
        }
        Ok(())
    }

    fn prepare_rows(&self, table: &str, rows: Vec<Vec<Value>>) -> Result<Vec<Row>> {
        let target = self.get_table(table)?;
        let rows = rows
            .into_iter()
            .map(|values| target.coerce_row(values))
            .collect::<Result<Vec<_>>>()?;
        ConstraintChecker::check_foreign_keys_for_insert(self, target.schema(), &rows)?;
        Ok(rows)
    }

    fn column_position(&self, table: &str, column: &str) -> Result<usize> {
        self.get_table(table)?
            .schema()
            .column_index(column)
            .ok_or_else(|| Error::column_not_found(column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use strata_core::schema::{ReferentialAction, TableBuilder};

    fn db_with_t() -> Database {
        let mut db = Database::new();
        let schema = TableBuilder::new("t")
            .unwrap()
            .add_column("id", DataType::Int64)
            .unwrap()
            .add_column("v", DataType::Int64)
            .unwrap()
            .primary_key("id")
            .unwrap()
            .build()
            .unwrap();
        db.create_table(schema).unwrap();
        db.insert(
            "t",
            vec![
                vec![Value::Int64(1), Value::Int64(10)],
                vec![Value::Int64(2), Value::Int64(20)],
                vec![Value::Int64(3), Value::Int64(10)],
            ],
        )
        .unwrap();
        db
    }

    fn values(db: &Database, table: &str) -> Vec<Vec<Value>> {
        db.get_table(table)
            .unwrap()
            .rows()
            .iter()
            .map(|r| r.values().to_vec())
            .collect()
    }

    #[test]
    fn test_create_and_duplicate() {
        let mut db = db_with_t();
        let schema = TableSchema::from_columns("T", [("x", DataType::Int32)]);
        assert_eq!(db.create_table(schema).unwrap_err().sqlstate(), "42P07");
        assert!(db.has_table("T"));
    }

    #[test]
    fn test_generations_bump_together() {
        let mut db = db_with_t();
        let total = db.total_generation();
        let gen = db.generation("t").unwrap();
        db.update("t", |r| {
            Ok((r.get(0) == Some(&Value::Int64(1))).then(|| vec![Value::Int64(1), Value::Int64(11)]))
        })
        .unwrap();
        assert_eq!(db.generation("t"), Some(gen + 1));
        assert_eq!(db.total_generation(), total + 1);
        let t = db.get_table("t").unwrap();
        assert_eq!(t.column_generation(1), Some(gen + 1));
        assert!(t.column_generation(0).unwrap() < gen + 1);
    }

    #[test]
    fn test_rollback_restores_update() {
        let mut db = db_with_t();
        let before = values(&db, "t");
        let gen = db.generation("t").unwrap();
        db.begin();
        db.update("t", |r| {
            let mut v = r.values().to_vec();
            v[1] = Value::Int64(99);
            Ok(Some(v))
        })
        .unwrap();
        db.rollback().unwrap();
        assert_eq!(values(&db, "t"), before);
        assert!(db.generation("t").unwrap() > gen + 1);
        assert_eq!(db.transaction_state(), TransactionState::RolledBack);
    }

    #[test]
    fn test_rollback_create_and_drop() {
        let mut db = db_with_t();
        db.begin();
        db.create_table(TableSchema::from_columns("tmp", [("x", DataType::Int32)]))
            .unwrap();
        db.drop_table("t").unwrap();
        assert!(!db.has_table("t"));
        db.rollback().unwrap();
        assert!(db.has_table("t"));
        assert!(!db.has_table("tmp"));
        assert_eq!(db.get_table("t").unwrap().len(), 3);
    }

    #[test]
    fn test_nested_rollback_only_undoes_child() {
        let mut db = db_with_t();
        db.begin();
        db.delete("t", |r| Ok(r.get(0) == Some(&Value::Int64(1)))).unwrap();
        db.begin();
        db.delete("t", |_| Ok(true)).unwrap();
        assert_eq!(db.get_table("t").unwrap().len(), 0);
        db.rollback().unwrap();
        assert_eq!(db.get_table("t").unwrap().len(), 2);
        db.rollback().unwrap();
        assert_eq!(db.get_table("t").unwrap().len(), 3);
    }

    #[test]
    fn test_nested_commit_then_outer_rollback() {
        let mut db = db_with_t();
        db.begin();
        db.begin();
        db.truncate("t").unwrap();
        db.commit().unwrap();
        assert!(db.in_transaction());
        db.rollback().unwrap();
        assert_eq!(db.get_table("t").unwrap().len(), 3);
    }

    #[test]
    fn test_commit_without_transaction() {
        let mut db = Database::new();
        assert_eq!(db.commit().unwrap_err().sqlstate(), "25P01");
        assert_eq!(db.rollback().unwrap_err().sqlstate(), "25P01");
    }

    #[test]
    fn test_rename_rollback() {
        let mut db = db_with_t();
        db.begin();
        db.rename_table("t", "u").unwrap();
        assert!(db.has_table("u"));
        db.rollback().unwrap();
        assert!(db.has_table("t"));
        assert!(!db.has_table("u"));
    }

    fn db_with_orders(action: ReferentialAction) -> Database {
        let mut db = db_with_t();
        let orders = TableBuilder::new("orders")
            .unwrap()
            .add_column("oid", DataType::Int64)
            .unwrap()
            .add_column("tid", DataType::Int64)
            .unwrap()
            .foreign_key(ForeignKey::new("fk_t", "tid", "t", "id").on_delete(action))
            .unwrap()
            .build()
            .unwrap();
        db.create_table(orders).unwrap();
        db.insert(
            "orders",
            vec![
                vec![Value::Int64(100), Value::Int64(1)],
                vec![Value::Int64(101), Value::Int64(2)],
            ],
        )
        .unwrap();
        db
    }

    #[test]
    fn test_foreign_key_insert_check() {
        let mut db = db_with_orders(ReferentialAction::Restrict);
        let err = db
            .insert("orders", vec![vec![Value::Int64(102), Value::Int64(42)]])
            .unwrap_err();
        assert_eq!(err.sqlstate(), "23503");
        assert_eq!(db.get_table("orders").unwrap().len(), 2);
    }

    #[test]
    fn test_delete_restrict() {
        let mut db = db_with_orders(ReferentialAction::Restrict);
        let err = db.delete("t", |r| Ok(r.get(0) == Some(&Value::Int64(1)))).unwrap_err();
        assert_eq!(err.sqlstate(), "23503");
        assert_eq!(db.get_table("t").unwrap().len(), 3);
        assert_eq!(db.delete("t", |r| Ok(r.get(0) == Some(&Value::Int64(3)))).unwrap(), 1);
    }

    #[test]
    fn test_delete_cascade() {
        let mut db = db_with_orders(ReferentialAction::Cascade);
        db.delete("t", |r| Ok(r.get(0) == Some(&Value::Int64(1)))).unwrap();
        assert_eq!(values(&db, "orders"), vec![vec![Value::Int64(101), Value::Int64(2)]]);
    }

    #[test]
    fn test_delete_set_null() {
        let mut db = db_with_orders(ReferentialAction::SetNull);
        db.delete("t", |r| Ok(r.get(0) == Some(&Value::Int64(2)))).unwrap();
        assert_eq!(
            values(&db, "orders"),
            vec![
                vec![Value::Int64(100), Value::Int64(1)],
                vec![Value::Int64(101), Value::Null],
            ]
        );
    }

    #[test]
    fn test_drop_referenced_table_fails() {
        let mut db = db_with_orders(ReferentialAction::Restrict);
        assert!(db.drop_table("t").is_err());
        db.drop_table("orders").unwrap();
        db.drop_table("t").unwrap();
    }

    #[test]
    fn test_alter_column_type() {
        let mut db = db_with_t();
        db.alter_column_type("t", "v", DataType::Float64).unwrap();
        assert_eq!(values(&db, "t")[0][1], Value::Float64(10.0));
        let err = db.alter_column_type("t", "missing", DataType::Text).unwrap_err();
        assert_eq!(err.sqlstate(), "42703");
    }

    #[test]
    fn test_create_index_and_bulk_load() {
        let mut db = db_with_t();
        db.create_index("t", "v", false).unwrap();
        assert!(db.create_index("t", "v", false).is_err());
        let gen = db.generation("t").unwrap();
        let n = db
            .bulk_load("t", (4..100).map(|i| vec![Value::Int64(i), Value::Int64(i % 7)]))
            .unwrap();
        assert_eq!(n, 96);
        assert_eq!(db.generation("t"), Some(gen + 1));
        assert_eq!(db.get_table("t").unwrap().lookup(1, &Value::Int64(10)), vec![0, 2]);
    }
}
