//! Foreign key constraints.

use alloc::string::String;

/// Action taken on child rows when a referenced parent row is deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ReferentialAction {
    /// Reject the delete while child rows still reference the parent.
    #[default]
    Restrict,
    /// Delete the referencing child rows as well.
    Cascade,
    /// Set the referencing child column to NULL.
    SetNull,
}

/// Foreign key specification, stored on the child table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForeignKey {
    /// Constraint name.
    pub name: String,
    /// Child column name.
    pub child_column: String,
    /// Parent table name.
    pub parent_table: String,
    /// Parent column name.
    pub parent_column: String,
    /// Action on parent row delete.
    pub on_delete: ReferentialAction,
}

impl ForeignKey {
    /// Creates a new foreign key specification with `RESTRICT` semantics.
    pub fn new(
        name: impl Into<String>,
        child_column: impl Into<String>,
        parent_table: impl Into<String>,
        parent_column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            child_column: child_column.into(),
            parent_table: parent_table.into(),
            parent_column: parent_column.into(),
            on_delete: ReferentialAction::Restrict,
        }
    }

    /// Sets the delete action.
    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }
}
