//! Error types for Strata.
//!
//! Every failure the engine can report maps onto one variant here, and every
//! variant maps onto a standardized five-character SQLSTATE code so the wire
//! layer can forward it unchanged.

use crate::types::DataType;
use alloc::string::String;
use thiserror::Error;

/// Result type alias for Strata operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for engine operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Operand types are incompatible for the requested operation.
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: DataType, got: DataType },

    /// Integer or float division by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// Arithmetic or cast result does not fit the target type.
    #[error("{type_name} out of range")]
    NumericOverflow { type_name: &'static str },

    /// Text could not be parsed as the requested type.
    #[error("invalid input syntax for type {target}: \"{input}\"")]
    InvalidCast { target: DataType, input: String },

    /// A function argument is outside its domain.
    #[error("{message}")]
    InvalidParameter { message: String },

    /// Referenced table does not exist.
    #[error("relation \"{name}\" does not exist")]
    TableNotFound { name: String },

    /// A table with the same name already exists.
    #[error("relation \"{name}\" already exists")]
    TableExists { name: String },

    /// Referenced column does not exist.
    #[error("column \"{column}\" does not exist")]
    ColumnNotFound { column: String },

    /// Unqualified column reference matches more than one input column.
    #[error("column reference \"{column}\" is ambiguous")]
    AmbiguousColumn { column: String },

    /// Table definition is malformed.
    #[error("invalid table definition: {message}")]
    InvalidSchema { message: String },

    /// Index with the same name already exists.
    #[error("index \"{name}\" already exists")]
    IndexExists { name: String },

    /// A column appears outside an aggregate without being grouped.
    #[error("{message}")]
    Grouping { message: String },

    /// Query shape is invalid (set-operation arity, bad ORDER BY position, ...).
    #[error("{message}")]
    InvalidQuery { message: String },

    /// NOT NULL constraint violation.
    #[error("null value in column \"{column}\" violates not-null constraint")]
    NullConstraint { column: String },

    /// UNIQUE or PRIMARY KEY constraint violation.
    #[error("duplicate key value violates unique constraint on \"{column}\"")]
    UniqueConstraint { column: String },

    /// FOREIGN KEY constraint violation.
    #[error("foreign key violation ({constraint}): {message}")]
    ForeignKeyViolation { constraint: String, message: String },

    /// COMMIT or ROLLBACK issued with no transaction in progress.
    #[error("there is no transaction in progress")]
    NoActiveTransaction,

    /// Arena, scratch region or node pool exhausted.
    #[error("out of memory: {message}")]
    ResourceExhausted { message: String },

    /// A configured program limit was exceeded.
    #[error("{message}")]
    LimitExceeded { message: String },

    /// A subquery used as a scalar returned more than one row.
    #[error("{message}")]
    CardinalityViolation { message: String },

    /// The planner does not support this construct.
    #[error("feature not supported: {feature}")]
    FeatureNotSupported { feature: String },

    /// Invariant violation inside the engine.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Returns the SQLSTATE code for this error.
    pub fn sqlstate(&self) -> &'static str {
        match self {
            Error::TypeMismatch { .. } => "42804",
            Error::DivisionByZero => "22012",
            Error::NumericOverflow { .. } => "22003",
            Error::InvalidCast { .. } => "22P02",
            Error::InvalidParameter { .. } => "22023",
            Error::TableNotFound { .. } => "42P01",
            Error::TableExists { .. } => "42P07",
            Error::ColumnNotFound { .. } => "42703",
            Error::AmbiguousColumn { .. } => "42702",
            Error::InvalidSchema { .. } => "42P16",
            Error::IndexExists { .. } => "42710",
            Error::Grouping { .. } => "42803",
            Error::InvalidQuery { .. } => "42601",
            Error::NullConstraint { .. } => "23502",
            Error::UniqueConstraint { .. } => "23505",
            Error::ForeignKeyViolation { .. } => "23503",
            Error::NoActiveTransaction => "25P01",
            Error::ResourceExhausted { .. } => "53200",
            Error::LimitExceeded { .. } => "54000",
            Error::CardinalityViolation { .. } => "21000",
            Error::FeatureNotSupported { .. } => "0A000",
            Error::Internal { .. } => "XX000",
        }
    }

    /// Returns true if the caller may retry the statement on a row-at-a-time path.
    pub fn is_fallback(&self) -> bool {
        matches!(self, Error::FeatureNotSupported { .. })
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: DataType, got: DataType) -> Self {
        Error::TypeMismatch { expected, got }
    }

    /// Creates a numeric overflow error for the named type.
    pub fn overflow(type_name: &'static str) -> Self {
        Error::NumericOverflow { type_name }
    }

    /// Creates an invalid cast error.
    pub fn invalid_cast(target: DataType, input: impl Into<String>) -> Self {
        Error::InvalidCast {
            target,
            input: input.into(),
        }
    }

    /// Creates an invalid parameter error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Error::InvalidParameter {
            message: message.into(),
        }
    }

    /// Creates a table not found error.
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Error::TableNotFound { name: name.into() }
    }

    /// Creates a table exists error.
    pub fn table_exists(name: impl Into<String>) -> Self {
        Error::TableExists { name: name.into() }
    }

    /// Creates a column not found error.
    pub fn column_not_found(column: impl Into<String>) -> Self {
        Error::ColumnNotFound {
            column: column.into(),
        }
    }

    /// Creates an ambiguous column error.
    pub fn ambiguous_column(column: impl Into<String>) -> Self {
        Error::AmbiguousColumn {
            column: column.into(),
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Error::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates a grouping error.
    pub fn grouping(message: impl Into<String>) -> Self {
        Error::Grouping {
            message: message.into(),
        }
    }

    /// Creates an invalid query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Error::InvalidQuery {
            message: message.into(),
        }
    }

    /// Creates a null constraint error.
    pub fn null_constraint(column: impl Into<String>) -> Self {
        Error::NullConstraint {
            column: column.into(),
        }
    }

    /// Creates a unique constraint error.
    pub fn unique_constraint(column: impl Into<String>) -> Self {
        Error::UniqueConstraint {
            column: column.into(),
        }
    }

    /// Creates a foreign key violation error.
    pub fn foreign_key(constraint: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ForeignKeyViolation {
            constraint: constraint.into(),
            message: message.into(),
        }
    }

    /// Creates a resource exhaustion error.
    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Error::ResourceExhausted {
            message: message.into(),
        }
    }

    /// Creates a limit exceeded error.
    pub fn limit_exceeded(message: impl Into<String>) -> Self {
        Error::LimitExceeded {
            message: message.into(),
        }
    }

    /// Creates a cardinality violation error.
    pub fn cardinality(message: impl Into<String>) -> Self {
        Error::CardinalityViolation {
            message: message.into(),
        }
    }

    /// Creates a feature not supported error.
    pub fn not_supported(feature: impl Into<String>) -> Self {
        Error::FeatureNotSupported {
            feature: feature.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }
}
