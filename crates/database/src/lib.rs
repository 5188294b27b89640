//! Strata Database - the embedding facade of the Strata query engine.
//!
//! This crate ties storage, planning and execution together behind a single
//! [`Engine`] value:
//!
//! - `Engine`: DDL and DML against the table store, transaction commands,
//!   planning and execution of arena-built queries, `EXPLAIN`
//! - `ResultCache`: LRU of collected results keyed by query fingerprint and
//!   validated against the database total generation
//! - `QueryResult`: a fully collected result with its column schema
//!
//! # Example
//!
//! ```rust
//! use strata_core::schema::TableBuilder;
//! use strata_core::{DataType, Value};
//! use strata_database::Engine;
//! use strata_query::ast::SelectBuilder;
//! use strata_query::QueryArena;
//!
//! let mut engine = Engine::new();
//! let schema = TableBuilder::new("t")
//!     .unwrap()
//!     .add_column("v", DataType::Int64)
//!     .unwrap()
//!     .build()
//!     .unwrap();
//! engine.create_table(schema).unwrap();
//! engine.insert("t", vec![vec![Value::Int64(10)]]).unwrap();
//!
//! let mut arena = QueryArena::new();
//! let v = arena.col("v").unwrap();
//! let q = SelectBuilder::new().item(v).from("t").build(&mut arena).unwrap();
//! let result = engine.query(&mut arena, q).unwrap();
//! assert_eq!(result.rows(), &[vec![Value::Int64(10)]]);
//! ```

#![no_std]

extern crate alloc;

pub mod engine;
pub mod result;
pub mod result_cache;

pub use engine::Engine;
pub use result::{QueryResult, ResultColumn};
pub use result_cache::ResultCache;
