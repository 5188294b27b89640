//! Strata Core - value types, schemas and columnar blocks for the Strata query engine.
//!
//! This crate provides the foundational types shared by storage, planning and
//! execution:
//!
//! - `DataType`: Column types (Boolean, Int32, Int64, Float64, Text, Date, Timestamp)
//! - `Value`: A single, possibly null, typed value
//! - `Row`: A stored row of values
//! - `schema`: Table definitions (Column, TableSchema, foreign keys)
//! - `block`: Columnar blocks, selection vectors and row blocks
//! - `Error`: Engine errors carrying SQLSTATE codes
//!
//! # Example
//!
//! ```rust
//! use strata_core::{DataType, Row, Value};
//! use strata_core::block::ColumnBlock;
//! use strata_core::schema::TableBuilder;
//!
//! let table = TableBuilder::new("users")
//!     .unwrap()
//!     .add_column("id", DataType::Int64)
//!     .unwrap()
//!     .add_column("name", DataType::Text)
//!     .unwrap()
//!     .primary_key("id")
//!     .unwrap()
//!     .build()
//!     .unwrap();
//! assert_eq!(table.width(), 2);
//!
//! let row = Row::new(vec![Value::Int64(1), Value::from("Alice")]);
//! assert_eq!(row.get(1), Some(&Value::from("Alice")));
//!
//! let mut ids = ColumnBlock::new(DataType::Int64);
//! ids.push(&Value::Int32(7)).unwrap();
//! assert_eq!(ids.value(0), Value::Int64(7));
//! ```

#![no_std]

extern crate alloc;

pub mod block;
mod error;
pub mod pattern_match;
mod row;
pub mod schema;
pub mod temporal;
mod types;
mod value;

pub use block::{ColumnBlock, FlatColumns, RowBlock, SelectionVector, BLOCK_CAPACITY};
pub use error::{Error, Result};
pub use row::Row;
pub use types::DataType;
pub use value::{compare_f64, Value};
