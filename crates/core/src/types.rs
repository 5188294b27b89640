//! Data type definitions for Strata.
//!
//! This module defines the logical column types the engine stores and moves
//! through columnar blocks.

use core::fmt;

/// Supported column data types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    /// Boolean type (true/false)
    Boolean,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 64-bit floating point number
    Float64,
    /// UTF-8 text
    Text,
    /// Calendar date stored as days since 1970-01-01
    Date,
    /// Timestamp stored as microseconds since 1970-01-01 00:00:00
    Timestamp,
}

impl DataType {
    /// Returns whether this type is an integer or floating point type.
    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int32 | DataType::Int64 | DataType::Float64)
    }

    /// Returns whether this type is an integer type.
    #[inline]
    pub fn is_integer(&self) -> bool {
        matches!(self, DataType::Int32 | DataType::Int64)
    }

    /// Returns whether this type is a date or timestamp.
    #[inline]
    pub fn is_temporal(&self) -> bool {
        matches!(self, DataType::Date | DataType::Timestamp)
    }

    /// Returns the common type two numeric operands are promoted to.
    ///
    /// Non-numeric pairs only unify with themselves.
    pub fn unify(self, other: DataType) -> Option<DataType> {
        if self == other {
            return Some(self);
        }
        match (self, other) {
            (DataType::Float64, o) | (o, DataType::Float64) if o.is_numeric() => {
                Some(DataType::Float64)
            }
            (DataType::Int64, DataType::Int32) | (DataType::Int32, DataType::Int64) => {
                Some(DataType::Int64)
            }
            (DataType::Date, DataType::Timestamp) | (DataType::Timestamp, DataType::Date) => {
                Some(DataType::Timestamp)
            }
            _ => None,
        }
    }

    /// SQL spelling of the type, used in error messages and EXPLAIN output.
    pub fn sql_name(&self) -> &'static str {
        match self {
            DataType::Boolean => "boolean",
            DataType::Int32 => "integer",
            DataType::Int64 => "bigint",
            DataType::Float64 => "double precision",
            DataType::Text => "text",
            DataType::Date => "date",
            DataType::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}
