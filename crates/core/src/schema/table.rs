//! Table definition for Strata schemas.

use super::column::Column;
use super::constraint::ForeignKey;
use crate::error::{Error, Result};
use crate::types::DataType;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

/// A table definition: ordered columns plus key constraints.
#[derive(Clone, Debug)]
pub struct TableSchema {
    /// Table name.
    name: String,
    /// Column definitions.
    columns: Vec<Column>,
    /// Position of the primary key column, if any.
    primary_key: Option<usize>,
    /// Foreign keys declared on this (child) table.
    foreign_keys: Vec<ForeignKey>,
}

impl TableSchema {
    /// Returns the table name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the columns.
    #[inline]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns the column at `index`.
    #[inline]
    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Returns the number of columns.
    #[inline]
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Gets a column position by name (ASCII case-insensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name().eq_ignore_ascii_case(name))
    }

    /// Gets a column by name.
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.column_index(name).map(|i| &self.columns[i])
    }

    /// Returns the primary key column position.
    #[inline]
    pub fn primary_key(&self) -> Option<usize> {
        self.primary_key
    }

    /// Returns the foreign keys.
    #[inline]
    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    /// Returns the column data types in order.
    pub fn data_types(&self) -> Vec<DataType> {
        self.columns.iter().map(|c| c.data_type()).collect()
    }

    /// Renames the table.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Renames a column.
    pub fn rename_column(&mut self, index: usize, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if self.column_index(&name).is_some() {
            return Err(Error::invalid_schema(format!("column \"{}\" already exists", name)));
        }
        let column = self
            .columns
            .get_mut(index)
            .ok_or_else(|| Error::internal("column index out of range"))?;
        column.set_name(name);
        Ok(())
    }

    /// Changes the declared type of a column. Stored values are converted by the caller.
    pub fn set_column_type(&mut self, index: usize, data_type: DataType) -> Result<()> {
        let column = self
            .columns
            .get_mut(index)
            .ok_or_else(|| Error::internal("column index out of range"))?;
        column.set_data_type(data_type);
        Ok(())
    }

    /// Points foreign keys that reference `old_parent` at `new_parent`.
    pub fn retarget_foreign_keys(&mut self, old_parent: &str, new_parent: &str) {
        for fk in &mut self.foreign_keys {
            if fk.parent_table.eq_ignore_ascii_case(old_parent) {
                fk.parent_table = String::from(new_parent);
            }
        }
    }
}

/// Builder for creating table definitions.
pub struct TableBuilder {
    name: String,
    columns: Vec<Column>,
    primary_key: Option<String>,
    foreign_keys: Vec<ForeignKey>,
}

impl TableBuilder {
    /// Creates a new table builder.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::check_naming_rules(&name)?;
        Ok(Self {
            name,
            columns: Vec::new(),
            primary_key: None,
            foreign_keys: Vec::new(),
        })
    }

    /// Validates a name follows naming rules.
    fn check_naming_rules(name: &str) -> Result<()> {
        let mut chars = name.chars();
        match chars.next() {
            None => return Err(Error::invalid_schema("name cannot be empty")),
            Some(first) if !first.is_ascii_alphabetic() && first != '_' => {
                return Err(Error::invalid_schema(format!(
                    "name must start with letter or underscore: {}",
                    name
                )));
            }
            _ => {}
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::invalid_schema(format!(
                "name contains invalid characters: {}",
                name
            )));
        }
        Ok(())
    }

    /// Adds a nullable column.
    pub fn add_column(self, name: impl Into<String>, data_type: DataType) -> Result<Self> {
        self.add_column_def(Column::new(name, data_type))
    }

    /// Adds a fully specified column.
    pub fn add_column_def(mut self, column: Column) -> Result<Self> {
        Self::check_naming_rules(column.name())?;
        if self
            .columns
            .iter()
            .any(|c| c.name().eq_ignore_ascii_case(column.name()))
        {
            return Err(Error::invalid_schema(format!(
                "column \"{}\" specified more than once",
                column.name()
            )));
        }
        self.columns.push(column);
        Ok(self)
    }

    /// Marks columns NOT NULL.
    pub fn not_null(mut self, columns: &[&str]) -> Result<Self> {
        for name in columns {
            let col = self.find_mut(name)?;
            *col = col.clone().nullable(false);
        }
        Ok(self)
    }

    /// Marks a column UNIQUE.
    pub fn unique(mut self, column: &str) -> Result<Self> {
        let col = self.find_mut(column)?;
        *col = col.clone().unique(true);
        Ok(self)
    }

    /// Sets the single-column primary key (implies NOT NULL and UNIQUE).
    pub fn primary_key(mut self, column: &str) -> Result<Self> {
        if self.primary_key.is_some() {
            return Err(Error::invalid_schema(format!(
                "multiple primary keys for table \"{}\" are not allowed",
                self.name
            )));
        }
        let col = self.find_mut(column)?;
        *col = col.clone().nullable(false).unique(true);
        self.primary_key = Some(String::from(column));
        Ok(self)
    }

    /// Adds a foreign key constraint.
    pub fn foreign_key(mut self, fk: ForeignKey) -> Result<Self> {
        Self::check_naming_rules(&fk.name)?;
        self.find_mut(&fk.child_column)?;
        self.foreign_keys.push(fk);
        Ok(self)
    }

    fn find_mut(&mut self, name: &str) -> Result<&mut Column> {
        self.columns
            .iter_mut()
            .find(|c| c.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::column_not_found(name))
    }

    /// Builds the table definition.
    pub fn build(self) -> Result<TableSchema> {
        if self.columns.is_empty() {
            return Err(Error::invalid_schema(format!(
                "table \"{}\" has no columns",
                self.name
            )));
        }
        let primary_key = match &self.primary_key {
            Some(pk) => self
                .columns
                .iter()
                .position(|c| c.name().eq_ignore_ascii_case(pk)),
            None => None,
        };
        Ok(TableSchema {
            name: self.name,
            columns: self.columns,
            primary_key,
            foreign_keys: self.foreign_keys,
        })
    }
}

impl TableSchema {
    /// Builds an unconstrained schema from `(name, type)` pairs.
    ///
    /// Used for temporary tables whose column names come from query output and
    /// therefore need not follow identifier rules.
    pub fn from_columns<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = (S, DataType)>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns
                .into_iter()
                .map(|(n, dt)| Column::new(n, dt))
                .collect(),
            primary_key: None,
            foreign_keys: Vec::new(),
        }
    }
}
