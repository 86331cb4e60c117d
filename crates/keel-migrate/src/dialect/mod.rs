//! Database dialect implementations.
//!
//! A dialect turns sync operations and the ledger table definition into SQL
//! for one database system.

mod sqlite;

pub use sqlite::SqliteDialect;

use crate::operations::SyncOperation;
use crate::schema::{ColumnSchema, SqlType};

/// Trait for database-specific SQL generation.
pub trait SyncDialect: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Generates the SQL statement for a sync operation.
    fn generate_sql(&self, operation: &SyncOperation) -> String;

    /// Returns the SQL type name for the given type.
    fn type_name(&self, sql_type: &SqlType) -> String;

    /// Returns the auto-increment keyword for this dialect.
    fn auto_increment_keyword(&self) -> &'static str;

    /// Generates column definition SQL.
    fn column_definition(&self, column: &ColumnSchema) -> String {
        let mut parts = vec![
            self.quote_identifier(&column.name),
            self.type_name(&column.sql_type),
        ];

        if column.primary_key {
            parts.push("PRIMARY KEY".to_string());
            if column.auto_increment {
                parts.push(self.auto_increment_keyword().to_string());
            }
        }

        if !column.nullable && !column.primary_key {
            parts.push("NOT NULL".to_string());
        }

        if column.unique && !column.primary_key {
            parts.push("UNIQUE".to_string());
        }

        if let Some(default_sql) = column.default.to_sql() {
            parts.push(format!("DEFAULT {default_sql}"));
        }

        parts.join(" ")
    }

    /// Quotes an identifier (table name, column name, etc.).
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}
