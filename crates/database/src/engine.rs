//! The embedding facade.
//!
//! [`Engine`] owns the table store, the engine configuration and the result
//! cache. Queries are built by the caller in a [`QueryArena`] and handed to
//! the engine by id; every planning and execution step of that query
//! allocates in the same arena, which the caller drops or resets afterwards.
//!
//! UPDATE and DELETE run in two phases: the bound filter and assignments are
//! evaluated over the current rows first, then the collected outcomes are
//! applied through the storage mutation path in the same row order.

use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use strata_core::schema::TableSchema;
use strata_core::{DataType, Error, Result, Value};
use strata_query::ast::{fingerprint, ExprId, PredId, QueryId};
use strata_query::eval;
use strata_query::planner::{DmlBinding, PlanId};
use strata_query::{explain, EngineConfig, ExecContext, PlanOutcome, QueryArena, QueryExecution, QueryPlanner};
use strata_storage::{Database, TableId, TransactionId};
use tracing::{debug, info};

use crate::result::QueryResult;
use crate::result_cache::ResultCache;

/// A database instance together with its execution settings.
pub struct Engine {
    db: Database,
    config: EngineConfig,
    cache: ResultCache,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::from_database(Database::new(), config)
    }

    /// Wraps an existing table store.
    pub fn from_database(db: Database, config: EngineConfig) -> Self {
        let cache = ResultCache::new(config.result_cache_capacity);
        Self { db, config, cache }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn result_cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn into_database(self) -> Database {
        self.db
    }

    // ------------------------------------------------------------------
    // DDL
    // ------------------------------------------------------------------

    pub fn create_table(&mut self, schema: TableSchema) -> Result<TableId> {
        self.db.create_table(schema)
    }

    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        self.db.drop_table(name)
    }

    pub fn create_index(&mut self, table: &str, column: &str, unique: bool) -> Result<()> {
        self.db.create_index(table, column, unique)
    }

    pub fn rename_table(&mut self, old: &str, new: &str) -> Result<()> {
        self.db.rename_table(old, new)
    }

    pub fn alter_column_type(&mut self, table: &str, column: &str, data_type: DataType) -> Result<()> {
        self.db.alter_column_type(table, column, data_type)
    }

    // ------------------------------------------------------------------
    // DML
    // ------------------------------------------------------------------

    pub fn insert(&mut self, table: &str, rows: Vec<Vec<Value>>) -> Result<usize> {
        self.db.insert(table, rows)
    }

    /// Loads many rows with a single generation bump.
    pub fn bulk_load<I>(&mut self, table: &str, rows: I) -> Result<usize>
    where
        I: IntoIterator<Item = Vec<Value>>,
    {
        self.db.bulk_load(table, rows)
    }

    pub fn truncate(&mut self, table: &str) -> Result<usize> {
        self.db.truncate(table)
    }

    /// `UPDATE table SET column = expr, ... [WHERE filter]`.
    ///
    /// Assignment expressions see the row as it was before the statement.
    /// Returns the number of rows updated.
    pub fn update(
        &mut self,
        arena: &mut QueryArena,
        table: &str,
        assignments: &[(&str, ExprId)],
        filter: Option<PredId>,
    ) -> Result<usize> {
        let binding = QueryPlanner::new(&self.db, arena).bind_dml(table, filter, assignments)?;
        let outcomes = self.evaluate_rows(arena, table, &binding, |ctx, values| {
            let mut new_values = values.to_vec();
            for (column, expr) in &binding.assignments {
                new_values[*column] = eval::eval(ctx, *expr, &values)?;
            }
            Ok(new_values)
        })?;
        let mut outcomes = outcomes.into_iter();
        let count = self.db.update(table, |_| Ok(outcomes.next().flatten()))?;
        debug!(table, count, "update applied");
        Ok(count)
    }

    /// `DELETE FROM table [WHERE filter]`. Returns the number of rows removed.
    pub fn delete(&mut self, arena: &mut QueryArena, table: &str, filter: Option<PredId>) -> Result<usize> {
        let binding = QueryPlanner::new(&self.db, arena).bind_dml(table, filter, &[])?;
        let outcomes = self.evaluate_rows(arena, table, &binding, |_, _| Ok(()))?;
        let mut outcomes = outcomes.into_iter();
        let count = self
            .db
            .delete(table, |_| Ok(matches!(outcomes.next(), Some(Some(())))))?;
        debug!(table, count, "delete applied");
        Ok(count)
    }

    /// Evaluates `binding.filter` over every stored row of `table` in storage
    /// order, producing `Some(apply(row))` for matching rows.
    fn evaluate_rows<T, F>(
        &self,
        arena: &QueryArena,
        table: &str,
        binding: &DmlBinding,
        mut apply: F,
    ) -> Result<Vec<Option<T>>>
    where
        F: FnMut(&ExecContext<'_>, &[Value]) -> Result<T>,
    {
        let ctx = ExecContext::new(&self.db, arena, &self.config);
        let target = self.db.get_table(table)?;
        let mut outcomes = Vec::with_capacity(target.len());
        for row in target.rows() {
            let values = row.values();
            let matched = match binding.filter {
                Some(filter) => eval::eval_predicate(&ctx, filter, &values)? == Some(true),
                None => true,
            };
            outcomes.push(if matched { Some(apply(&ctx, values)?) } else { None });
        }
        Ok(outcomes)
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Starts a (possibly nested) transaction.
    pub fn begin(&mut self) -> TransactionId {
        self.db.begin()
    }

    pub fn commit(&mut self) -> Result<()> {
        self.db.commit()
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.db.rollback()
    }

    pub fn in_transaction(&self) -> bool {
        self.db.in_transaction()
    }

    pub fn transaction_depth(&self) -> usize {
        self.db.transaction_depth()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Plans `query`, mapping a plan-time fallback to a `0A000` error.
    fn plan(&self, arena: &mut QueryArena, query: QueryId) -> Result<PlanId> {
        match QueryPlanner::new(&self.db, arena).plan(query)? {
            PlanOutcome::Planned(plan) => Ok(plan),
            PlanOutcome::NotImplemented { reason } => Err(Error::not_supported(reason)),
        }
    }

    /// Runs `query` to completion.
    ///
    /// Results are served from the result cache while the database total
    /// generation is unchanged since they were computed.
    pub fn query(&mut self, arena: &mut QueryArena, query: QueryId) -> Result<Rc<QueryResult>> {
        let key = fingerprint(arena, query);
        let generation = self.db.total_generation();
        if let Some(hit) = self.cache.get(key, generation) {
            return Ok(hit);
        }

        let plan = self.plan(arena, query)?;
        let mut execution = QueryExecution::new(&self.db, arena, &self.config, plan)?;
        let rows = execution.collect_rows()?;
        let result = Rc::new(QueryResult::from_schema(execution.schema(), rows));
        info!(rows = result.row_count(), fingerprint = key, "query executed");

        self.cache.insert(key, generation, result.clone());
        Ok(result)
    }

    /// Plans `query` and returns the pull interface over its output.
    ///
    /// Streaming results bypass the result cache.
    pub fn stream<'a>(&'a self, arena: &'a mut QueryArena, query: QueryId) -> Result<QueryExecution<'a>> {
        let plan = self.plan(arena, query)?;
        let arena: &'a QueryArena = arena;
        QueryExecution::new(&self.db, arena, &self.config, plan)
    }

    /// Renders the physical plan of `query`.
    pub fn explain(&self, arena: &mut QueryArena, query: QueryId) -> Result<String> {
        let plan = self.plan(arena, query)?;
        Ok(explain(arena, plan))
    }

    /// Drops every cached result.
    pub fn clear_result_cache(&mut self) {
        self.cache.clear();
    }
}
