//! Table schema definitions.
//!
//! Columns, table definitions with their builder, and foreign key
//! constraints with referential actions.

mod column;
mod constraint;
mod table;

pub use column::Column;
pub use constraint::{ForeignKey, ReferentialAction};
pub use table::{TableBuilder, TableSchema};
