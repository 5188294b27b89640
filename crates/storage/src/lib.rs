//! Strata Storage - table store for the Strata query engine.
//!
//! This crate provides the storage layer including:
//!
//! - `Table`: Row storage with generation counters, column indexes and a scan cache
//! - `ScanCache`: Columnar materialization of a table, tagged with its generation
//! - `Database`: The table store; every mutation goes through one generation-bumping path
//! - `TransactionManager`: Copy-on-write snapshots with nested transactions
//! - `ConstraintChecker`: NOT NULL, UNIQUE and FOREIGN KEY validation
//!
//! # Example
//!
//! ```rust
//! use strata_core::schema::TableBuilder;
//! use strata_core::{DataType, Value};
//! use strata_storage::Database;
//!
//! let mut db = Database::new();
//! let schema = TableBuilder::new("users")
//!     .unwrap()
//!     .add_column("id", DataType::Int64)
//!     .unwrap()
//!     .add_column("name", DataType::Text)
//!     .unwrap()
//!     .primary_key("id")
//!     .unwrap()
//!     .build()
//!     .unwrap();
//! db.create_table(schema).unwrap();
//!
//! db.begin();
//! db.insert("users", vec![vec![Value::Int64(1), Value::from("Alice")]]).unwrap();
//! db.rollback().unwrap();
//!
//! assert_eq!(db.get_table("users").unwrap().len(), 0);
//! ```

#![no_std]

extern crate alloc;

pub mod constraint;
pub mod database;
pub mod index;
pub mod scan_cache;
pub mod table;
pub mod transaction;

pub use constraint::{ConstraintChecker, ReferentialEffect};
pub use database::Database;
pub use index::ColumnIndex;
pub use scan_cache::ScanCache;
pub use table::{Table, TableId};
pub use transaction::{Snapshot, TransactionId, TransactionManager, TransactionState};
