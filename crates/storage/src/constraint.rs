//! Constraint checking.
//!
//! NOT NULL, UNIQUE / PRIMARY KEY and FOREIGN KEY validation, plus planning
//! of referential actions for deletes. Every check runs before the mutation
//! it guards, so a violation never leaves a partial change behind.

use crate::database::Database;
use crate::index::ColumnIndex;
use crate::table::Table;
use alloc::collections::BTreeSet;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::HashSet;
use strata_core::schema::{ReferentialAction, TableSchema};
use strata_core::{Error, Result, Row, Value};

/// Constraint checker for validating table constraints.
pub struct ConstraintChecker;

/// A change to child rows implied by deleting parent rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReferentialEffect {
    /// Delete these row positions of the named table.
    Delete { table: String, positions: BTreeSet<usize> },
    /// Set `column` to NULL at these positions of the named table.
    SetNull {
        table: String,
        column: usize,
        positions: BTreeSet<usize>,
    },
}

impl ConstraintChecker {
    /// Checks the not-null constraint for a row.
    pub fn check_not_null(schema: &TableSchema, row: &Row) -> Result<()> {
        for (column, value) in schema.columns().iter().zip(row.values()) {
            if !column.is_nullable() && value.is_null() {
                return Err(Error::null_constraint(column.name()));
            }
        }
        Ok(())
    }

    /// Checks that a sequence of values has no duplicate non-null entry.
    pub fn check_unique_column<'a, I>(column: &str, values: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let mut seen = HashSet::new();
        for value in values {
            if !value.is_null() && !seen.insert(value) {
                return Err(Error::unique_constraint(column));
            }
        }
        Ok(())
    }

    /// Checks unique indexes for rows about to be appended.
    pub fn check_unique_insert(schema: &TableSchema, indexes: &[ColumnIndex], rows: &[Row]) -> Result<()> {
        for index in indexes.iter().filter(|i| i.is_unique()) {
            let name = column_name(schema, index.column());
            let mut batch = HashSet::new();
            for row in rows {
                let Some(key) = row.get(index.column()) else {
                    continue;
                };
                if key.is_null() {
                    continue;
                }
                if index.contains_key(key) || !batch.insert(key) {
                    return Err(Error::unique_constraint(name));
                }
            }
        }
        Ok(())
    }

    /// Checks unique indexes for in-place replacement of rows.
    pub fn check_unique_update(
        schema: &TableSchema,
        indexes: &[ColumnIndex],
        rows: &[Row],
        updates: &[(usize, Row)],
    ) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let replaced: HashSet<usize> = updates.iter().map(|(p, _)| *p).collect();
        for index in indexes.iter().filter(|i| i.is_unique()) {
            let c = index.column();
            let untouched = rows
                .iter()
                .enumerate()
                .filter(|(p, _)| !replaced.contains(p))
                .filter_map(|(_, r)| r.get(c));
            let fresh = updates.iter().filter_map(|(_, r)| r.get(c));
            Self::check_unique_column(column_name(schema, c), untouched.chain(fresh))?;
        }
        Ok(())
    }

    /// Checks that every non-null foreign key value of `rows` exists in its parent.
    pub fn check_foreign_keys_for_insert(db: &Database, schema: &TableSchema, rows: &[Row]) -> Result<()> {
        for fk in schema.foreign_keys() {
            let child_col = schema
                .column_index(&fk.child_column)
                .ok_or_else(|| Error::column_not_found(fk.child_column.as_str()))?;
            let parent = if fk.parent_table.eq_ignore_ascii_case(schema.name()) {
                None
            } else {
                Some(db.get_table(&fk.parent_table)?)
            };
            for row in rows {
                let Some(value) = row.get(child_col) else {
                    continue;
                };
                if value.is_null() {
                    continue;
                }
                let found = match parent {
                    Some(parent) => {
                        let parent_col = parent_column(parent, &fk.parent_column)?;
                        !parent.lookup(parent_col, value).is_empty()
                    }
                    // self reference: the key may come from the same batch
                    None => {
                        let parent_col = schema
                            .column_index(&fk.parent_column)
                            .ok_or_else(|| Error::column_not_found(fk.parent_column.as_str()))?;
                        db.table(schema.name())
                            .is_some_and(|t| !t.lookup(parent_col, value).is_empty())
                            || rows.iter().any(|r| r.get(parent_col) == Some(value))
                    }
                };
                if !found {
                    return Err(Error::foreign_key(
                        fk.name.as_str(),
                        format!(
                            "key ({})=({}) is not present in table \"{}\"",
                            fk.child_column, value, fk.parent_table
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Checks that changing referenced parent keys leaves no orphaned child rows.
    pub fn check_foreign_keys_for_update(db: &Database, table: &Table, updates: &[(usize, Row)]) -> Result<()> {
        for (child, fk) in db.referencing(table.name()) {
            let parent_col = parent_column(table, &fk.parent_column)?;
            let child_col = parent_column(child, &fk.child_column)?;
            for (pos, new_row) in updates {
                let old = table.rows()[*pos].get(parent_col);
                let new = new_row.get(parent_col);
                let Some(old) = old else { continue };
                if old.is_null() || Some(old) == new {
                    continue;
                }
                if !child.lookup(child_col, old).is_empty() {
                    return Err(Error::foreign_key(
                        fk.name.as_str(),
                        format!(
                            "key ({})=({}) is still referenced from table \"{}\"",
                            fk.parent_column,
                            old,
                            child.name()
                        ),
                    ));
                }
            }
        }
        let rows: Vec<Row> = updates.iter().map(|(_, r)| r.clone()).collect();
        Self::check_foreign_keys_for_insert(db, table.schema(), &rows)
    }

    /// Computes the referential effects of deleting `positions` from `table`,
    /// following cascades transitively. Fails on the first RESTRICT hit.
    pub fn plan_delete(db: &Database, table: &str, positions: &[usize]) -> Result<Vec<ReferentialEffect>> {
        let mut effects = Vec::new();
        let mut pending: Vec<(String, Vec<usize>)> = alloc::vec![(String::from(table), positions.to_vec())];
        let mut deleted: Vec<(String, BTreeSet<usize>)> = Vec::new();

        while let Some((name, positions)) = pending.pop() {
            let parent = db.get_table(&name)?;
            let slot = match deleted.iter().position(|(n, _)| n.eq_ignore_ascii_case(&name)) {
                Some(i) => i,
                None => {
                    deleted.push((name.clone(), BTreeSet::new()));
                    deleted.len() - 1
                }
            };
            let already = &mut deleted[slot].1;
            let fresh: Vec<usize> = positions.into_iter().filter(|p| already.insert(*p)).collect();
            if fresh.is_empty() {
                continue;
            }

            for (child, fk) in db.referencing(&name) {
                let parent_col = parent_column(parent, &fk.parent_column)?;
                let child_col = parent_column(child, &fk.child_column)?;
                let mut hits = BTreeSet::new();
                for &p in &fresh {
                    if let Some(key) = parent.rows()[p].get(parent_col) {
                        hits.extend(child.lookup(child_col, key).into_iter().map(|i| i as usize));
                    }
                }
                if hits.is_empty() {
                    continue;
                }
                match fk.on_delete {
                    ReferentialAction::Restrict => {
                        return Err(Error::foreign_key(
                            fk.name.as_str(),
                            format!(
                                "rows of \"{}\" are still referenced from table \"{}\"",
                                name,
                                child.name()
                            ),
                        ));
                    }
                    ReferentialAction::Cascade => {
                        pending.push((String::from(child.name()), hits.into_iter().collect()));
                    }
                    ReferentialAction::SetNull => {
                        if !child.schema().columns()[child_col].is_nullable() {
                            return Err(Error::null_constraint(fk.child_column.as_str()));
                        }
                        effects.push(ReferentialEffect::SetNull {
                            table: String::from(child.name()),
                            column: child_col,
                            positions: hits,
                        });
                    }
                }
            }
        }

        for (table, positions) in deleted {
            effects.push(ReferentialEffect::Delete { table, positions });
        }
        Ok(effects)
    }
}

fn column_name(schema: &TableSchema, column: usize) -> &str {
    schema.column(column).map(|c| c.name()).unwrap_or("?")
}

fn parent_column(table: &Table, name: &str) -> Result<usize> {
    table
        .schema()
        .column_index(name)
        .ok_or_else(|| Error::column_not_found(name))
}
