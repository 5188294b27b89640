//! Strata Query - planner and block executors for the Strata engine.
//!
//! A query arrives as a logical tree built in a per-query [`QueryArena`]
//! (see [`ast`]), is bound and planned against a [`Catalog`] into a physical
//! plan in the same arena, and runs as a tree of pull-based executors that
//! exchange blocks of up to 1024 rows.
//!
//! - `arena`: per-query node pools, interned strings and scratch memory
//! - `ast`: logical query tree and builders
//! - `catalog`: what the planner needs to know about tables
//! - `planner`: binding, physical planning and EXPLAIN
//! - `eval`: scalar expression evaluation
//! - `hash_table`: block-oriented hash table behind joins, grouping and sets
//! - `executor`: block operators and [`QueryExecution`]

#![no_std]

extern crate alloc;

pub mod arena;
pub mod ast;
pub mod catalog;
pub mod config;
pub mod eval;
pub mod executor;
pub mod hash_table;
pub mod planner;

pub use arena::QueryArena;
pub use catalog::{Catalog, IndexInfo, StaticCatalog, TableStats};
pub use config::EngineConfig;
pub use executor::{ExecContext, QueryExecution};
pub use planner::{explain, PlanOutcome, QueryPlanner};
