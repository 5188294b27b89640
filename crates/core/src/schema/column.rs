//! Column definitions.

use crate::error::Result;
use crate::types::DataType;
use crate::value::Value;
use alloc::string::String;

/// One column of a table schema.
///
/// Columns are nullable and non-unique unless the table builder marks them
/// otherwise (`NOT NULL`, `UNIQUE`, `PRIMARY KEY`).
#[derive(Clone, Debug)]
pub struct Column {
    name: String,
    data_type: DataType,
    nullable: bool,
    unique: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            unique: false,
        }
    }

    pub fn nullable(self, nullable: bool) -> Self {
        Self { nullable, ..self }
    }

    pub fn unique(self, unique: bool) -> Self {
        Self { unique, ..self }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    #[inline]
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    #[inline]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Converts `value` to the stored representation of this column.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        if value.is_null() || value.data_type() == Some(self.data_type) {
            Ok(value)
        } else {
            value.cast_to(self.data_type)
        }
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn set_data_type(&mut self, data_type: DataType) {
        self.data_type = data_type;
    }
}

/// Columns compare by name and type; constraints are table properties.
impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.data_type == other.data_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_flags() {
        let col = Column::new("id", DataType::Int64).nullable(false).unique(true);
        assert_eq!(col.name(), "id");
        assert!(!col.is_nullable());
        assert!(col.is_unique());
        assert_eq!(col, Column::new("id", DataType::Int64));
    }

    #[test]
    fn test_coerce() {
        let col = Column::new("n", DataType::Int64);
        assert_eq!(col.coerce(Value::Int32(4)).unwrap(), Value::Int64(4));
        assert_eq!(col.coerce(Value::Null).unwrap(), Value::Null);
        assert_eq!(col.coerce(Value::from("12")).unwrap(), Value::Int64(12));
        assert_eq!(col.coerce(Value::from("x")).unwrap_err().sqlstate(), "22P02");
    }
}
