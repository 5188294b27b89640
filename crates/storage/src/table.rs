//! Row storage for a single table.
//!
//! A `Table` owns its rows, its column indexes and a lazily built
//! [`ScanCache`]. Every content or structural change increments the table
//! generation (and the generation of each touched column); caches compare
//! their tag against it before use.
//!
//! Mutation primitives here validate the whole change before touching any row,
//! so a failed statement leaves the table unchanged. They are only reachable
//! through [`Database`](crate::Database), which handles copy-on-write
//! protection and generation bookkeeping.

use crate::constraint::ConstraintChecker;
use crate::index::ColumnIndex;
use crate::scan_cache::ScanCache;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use strata_core::schema::TableSchema;
use strata_core::{DataType, Error, Result, Row, Value};
use tracing::debug;

/// Stable identity of a table, preserved across renames and snapshots.
pub type TableId = u64;

/// Row storage for one table.
#[derive(Clone, Debug)]
pub struct Table {
    id: TableId,
    schema: TableSchema,
    rows: Vec<Row>,
    indexes: Vec<ColumnIndex>,
    generation: u64,
    column_generations: Vec<u64>,
    scan_cache: RefCell<Option<Rc<ScanCache>>>,
}

impl Table {
    /// Creates an empty table. UNIQUE and PRIMARY KEY columns get a unique index.
    pub fn new(id: TableId, schema: TableSchema) -> Self {
        let indexes = schema
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_unique())
            .map(|(i, c)| ColumnIndex::new(i, c.data_type(), true))
            .collect();
        let width = schema.width();
        Self {
            id,
            schema,
            rows: Vec::new(),
            indexes,
            generation: 1,
            column_generations: alloc::vec![1; width],
            scan_cache: RefCell::new(None),
        }
    }

    #[inline]
    pub fn id(&self) -> TableId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.schema.name()
    }

    #[inline]
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// All rows in storage order.
    #[inline]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Row at `position`.
    #[inline]
    pub fn row(&self, position: usize) -> Option<&Row> {
        self.rows.get(position)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Current table generation.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Generation of column `index`: the table generation at its last change.
    pub fn column_generation(&self, index: usize) -> Option<u64> {
        self.column_generations.get(index).copied()
    }

    /// Returns the index on `column`, if any.
    pub fn index_on(&self, column: usize) -> Option<&ColumnIndex> {
        self.indexes.iter().find(|i| i.column() == column)
    }

    /// Returns true if `column` is indexed.
    pub fn has_index(&self, column: usize) -> bool {
        self.index_on(column).is_some()
    }

    /// Positions of rows whose `column` equals `key`, using the index when present.
    pub fn lookup(&self, column: usize, key: &Value) -> Vec<u32> {
        if let Some(index) = self.index_on(column) {
            return index.get(key);
        }
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.get(column).and_then(|v| v.sql_eq(key)) == Some(true))
            .map(|(i, _)| i as u32)
            .collect()
    }

    /// Returns the scan cache for the current generation, rebuilding it if stale.
    pub fn scan_cache(&self) -> Result<Rc<ScanCache>> {
        if let Some(cache) = self.scan_cache.borrow().as_ref() {
            if cache.generation() == self.generation {
                return Ok(Rc::clone(cache));
            }
        }
        debug!(table = self.name(), generation = self.generation, rows = self.rows.len(), "rebuilding scan cache");
        let cache = Rc::new(ScanCache::build(
            &self.rows,
            &self.schema.data_types(),
            self.generation,
        )?);
        *self.scan_cache.borrow_mut() = Some(Rc::clone(&cache));
        Ok(cache)
    }

    /// Reads rows `[start, start + len)` through the scan cache.
    pub fn scan_cache_read(&self, start: usize, len: usize) -> Result<strata_core::RowBlock> {
        self.scan_cache()?.read(start, len)
    }

    /// Returns true if the cached materialization matches the current generation.
    pub fn scan_cache_valid(&self) -> bool {
        self.scan_cache
            .borrow()
            .as_ref()
            .is_some_and(|c| c.generation() == self.generation)
    }

    /// Replaces every row of a query-scoped temporary table and bumps its
    /// generation. Constraints are not checked.
    pub fn load_temporary(&mut self, rows: Vec<Row>) {
        self.rows = rows;
        self.rebuild_indexes();
        self.bump_generation(None);
    }

    // ---- mutation primitives; callers bump generations afterwards ----

    /// Increments the table generation and the generations of `columns`
    /// (every column when `None`).
    pub(crate) fn bump_generation(&mut self, columns: Option<&[usize]>) {
        self.generation += 1;
        match columns {
            Some(cols) => {
                for &c in cols {
                    if let Some(g) = self.column_generations.get_mut(c) {
                        *g = self.generation;
                    }
                }
            }
            None => self.column_generations.iter_mut().for_each(|g| *g = self.generation),
        }
    }

    /// Forces the generation to at least `floor + 1`.
    pub(crate) fn advance_generation_past(&mut self, floor: u64) {
        let next = floor.max(self.generation) + 1;
        self.generation = next;
        self.column_generations.iter_mut().for_each(|g| *g = next);
    }

    /// Converts raw values to a stored row: width check, cast, NOT NULL.
    pub(crate) fn coerce_row(&self, values: Vec<Value>) -> Result<Row> {
        if values.len() != self.schema.width() {
            return Err(Error::invalid_query(alloc::format!(
                "table \"{}\" has {} columns but {} values were supplied",
                self.name(),
                self.schema.width(),
                values.len()
            )));
        }
        let mut out = Vec::with_capacity(values.len());
        for (value, column) in values.into_iter().zip(self.schema.columns()) {
            out.push(column.coerce(value)?);
        }
        let row = Row::new(out);
        ConstraintChecker::check_not_null(&self.schema, &row)?;
        Ok(row)
    }

    /// Appends rows after checking uniqueness against storage and within the batch.
    pub(crate) fn insert_rows(&mut self, rows: Vec<Row>) -> Result<usize> {
        ConstraintChecker::check_unique_insert(&self.schema, &self.indexes, &rows)?;
        let count = rows.len();
        let base = self.rows.len();
        for (offset, row) in rows.into_iter().enumerate() {
            for index in &mut self.indexes {
                if let Some(key) = row.get(index.column()) {
                    index.add(key, (base + offset) as u32);
                }
            }
            self.rows.push(row);
        }
        Ok(count)
    }

    /// Replaces rows at the given positions.
    pub(crate) fn replace_rows(&mut self, updates: Vec<(usize, Row)>) -> Result<usize> {
        ConstraintChecker::check_unique_update(&self.schema, &self.indexes, &self.rows, &updates)?;
        let count = updates.len();
        for (pos, row) in updates {
            self.rows[pos] = row;
        }
        self.rebuild_indexes();
        Ok(count)
    }

    /// Removes rows at the given positions (any order, duplicates ignored).
    pub(crate) fn delete_positions(&mut self, positions: &[usize]) -> usize {
        if positions.is_empty() {
            return 0;
        }
        let mut doomed = alloc::vec![false; self.rows.len()];
        for &p in positions {
            if let Some(d) = doomed.get_mut(p) {
                *d = true;
            }
        }
        let before = self.rows.len();
        let mut i = 0;
        self.rows.retain(|_| {
            let keep = !doomed[i];
            i += 1;
            keep
        });
        self.rebuild_indexes();
        before - self.rows.len()
    }

    /// Removes every row.
    pub(crate) fn truncate(&mut self) -> usize {
        let count = self.rows.len();
        self.rows.clear();
        self.rebuild_indexes();
        count
    }

    /// Adds an index on `column`, validating uniqueness of existing rows first.
    pub(crate) fn add_index(&mut self, column: usize, unique: bool) -> Result<()> {
        let column_def = self
            .schema
            .column(column)
            .ok_or_else(|| Error::internal("index column out of range"))?;
        if self.has_index(column) {
            return Err(Error::IndexExists {
                name: alloc::format!("{}_{}_idx", self.name(), column_def.name()),
            });
        }
        let mut index = ColumnIndex::new(column, column_def.data_type(), unique);
        if unique {
            ConstraintChecker::check_unique_column(column_def.name(), self.rows.iter().filter_map(|r| r.get(column)))?;
        }
        index.rebuild(&self.rows);
        self.indexes.push(index);
        Ok(())
    }

    /// Renames the table.
    pub(crate) fn rename(&mut self, name: &str) {
        self.schema.set_name(name);
    }

    /// Mutable access to the schema for metadata-only changes.
    pub(crate) fn schema_mut(&mut self) -> &mut TableSchema {
        &mut self.schema
    }

    /// Converts every stored value of `column` to `data_type`.
    pub(crate) fn alter_column_type(&mut self, column: usize, data_type: DataType) -> Result<()> {
        let converted = self
            .rows
            .iter()
            .map(|r| {
                r.get(column)
                    .cloned()
                    .unwrap_or(Value::Null)
                    .cast_to(data_type)
            })
            .collect::<Result<Vec<_>>>()?;
        self.schema.set_column_type(column, data_type)?;
        for (row, value) in self.rows.iter_mut().zip(converted) {
            row.values_mut()[column] = value;
        }
        for index in &mut self.indexes {
            if index.column() == column {
                index.set_key_type(data_type);
            }
        }
        self.rebuild_indexes();
        Ok(())
    }

    fn rebuild_indexes(&mut self) {
        for index in &mut self.indexes {
            index.rebuild(&self.rows);
        }
    }
}
