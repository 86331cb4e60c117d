//! Schema changes the auto-sync step can perform.
//!
//! Sync is additive: it creates missing tables, adds missing columns and
//! creates missing indexes. Renames, drops and type changes are left to
//! explicit migrations.

use serde::{Deserialize, Serialize};

use crate::schema::{ColumnSchema, IndexSchema, TableSchema};

/// A single additive schema change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncOperation {
    /// Create a new table.
    CreateTable {
        /// Table name.
        name: String,
        /// Column definitions.
        columns: Vec<ColumnSchema>,
        /// Primary key column(s).
        primary_key: Vec<String>,
        /// Whether to use IF NOT EXISTS.
        if_not_exists: bool,
    },

    /// Add a column to an existing table.
    AddColumn {
        /// Table name.
        table: String,
        /// Column definition.
        column: ColumnSchema,
    },

    /// Create an index.
    CreateIndex {
        /// Table the index belongs to.
        table: String,
        /// Index definition.
        index: IndexSchema,
        /// Whether to use IF NOT EXISTS.
        if_not_exists: bool,
    },
}

impl SyncOperation {
    /// Creates a CREATE TABLE IF NOT EXISTS operation for a declared table.
    #[must_use]
    pub fn create_table(table: &TableSchema) -> Self {
        Self::CreateTable {
            name: table.name.clone(),
            columns: table.columns.clone(),
            primary_key: table.primary_key.clone(),
            if_not_exists: true,
        }
    }

    /// Creates an ADD COLUMN operation.
    #[must_use]
    pub fn add_column(table: impl Into<String>, column: ColumnSchema) -> Self {
        Self::AddColumn {
            table: table.into(),
            column,
        }
    }

    /// Creates a CREATE INDEX IF NOT EXISTS operation.
    #[must_use]
    pub fn create_index(table: impl Into<String>, index: IndexSchema) -> Self {
        Self::CreateIndex {
            table: table.into(),
            index,
            if_not_exists: true,
        }
    }

    /// Returns the table this operation touches.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::CreateTable { name, .. } => name,
            Self::AddColumn { table, .. } | Self::CreateIndex { table, .. } => table,
        }
    }

    /// Returns a short human-readable description.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::CreateTable { name, .. } => format!("Create table {name}"),
            Self::AddColumn { table, column } => {
                format!("Add column {} to {table}", column.name)
            }
            Self::CreateIndex { table, index, .. } => {
                format!("Create index {} on {table}", index.name)
            }
        }
    }
}
