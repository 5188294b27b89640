//! Catalog access for the planner.
//!
//! The planner only needs table schemas, row-count estimates, generation
//! counters and index presence per column. [`Catalog`] exposes exactly that,
//! so planning can run against the live [`Database`] or against a
//! hand-registered [`StaticCatalog`].

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use strata_core::schema::TableSchema;
use strata_storage::Database;

/// Statistics about a table for plan selection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableStats {
    /// Number of rows in the table.
    pub row_count: usize,
    /// Table generation when the stats were taken.
    pub generation: u64,
    /// Available indexes.
    pub indexes: Vec<IndexInfo>,
}

/// Information about a single-column index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexInfo {
    /// Indexed column position.
    pub column: usize,
    pub is_unique: bool,
}

/// Metadata source for the planner.
pub trait Catalog {
    /// Schema of `table`, looked up case-insensitively.
    fn schema(&self, table: &str) -> Option<&TableSchema>;

    /// Statistics of `table`.
    fn stats(&self, table: &str) -> Option<TableStats>;

    /// Row-count estimate (0 for unknown tables).
    fn row_count(&self, table: &str) -> usize {
        self.stats(table).map_or(0, |s| s.row_count)
    }

    /// Returns true if `column` of `table` is indexed.
    fn has_index(&self, table: &str, column: usize) -> bool {
        self.stats(table)
            .is_some_and(|s| s.indexes.iter().any(|i| i.column == column))
    }
}

impl Catalog for Database {
    fn schema(&self, table: &str) -> Option<&TableSchema> {
        self.table(table).map(|t| t.schema())
    }

    fn stats(&self, table: &str) -> Option<TableStats> {
        let t = self.table(table)?;
        Some(TableStats {
            row_count: t.len(),
            generation: t.generation(),
            indexes: (0..t.schema().width())
                .filter_map(|c| {
                    t.index_on(c).map(|i| IndexInfo {
                        column: c,
                        is_unique: i.is_unique(),
                    })
                })
                .collect(),
        })
    }

    fn row_count(&self, table: &str) -> usize {
        self.table(table).map_or(0, |t| t.len())
    }

    fn has_index(&self, table: &str, column: usize) -> bool {
        self.table(table).is_some_and(|t| t.has_index(column))
    }
}

/// Catalog built from registered schemas and statistics.
#[derive(Clone, Debug, Default)]
pub struct StaticCatalog {
    tables: BTreeMap<String, (TableSchema, TableStats)>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table.
    pub fn register_table(&mut self, schema: TableSchema, stats: TableStats) {
        self.tables
            .insert(schema.name().to_ascii_lowercase(), (schema, stats));
    }
}

impl Catalog for StaticCatalog {
    fn schema(&self, table: &str) -> Option<&TableSchema> {
        self.tables
            .get(&table.to_ascii_lowercase())
            .map(|(schema, _)| schema)
    }

    fn stats(&self, table: &str) -> Option<TableStats> {
        self.tables
            .get(&table.to_ascii_lowercase())
            .map(|(_, stats)| stats.clone())
    }
}
