//! Migration ledger.
//!
//! The ledger is a two-column table recording which migration IDs have been
//! applied: a bounded string primary key and a nullable `ts` timestamp. Rows
//! are only ever inserted. A row without a timestamp marks a migration that
//! was stamped during bootstrap rather than executed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

use crate::dialect::{SqliteDialect, SyncDialect};
use crate::error::{MigrateError, Result};
use crate::operations::SyncOperation;
use crate::schema::{ColumnSchema, SqlType};

/// Reserved ledger ID marking a database whose schema was created by
/// auto-sync instead of by running migrations one by one.
pub const BOOTSTRAP_SENTINEL: &str = "SCHEMA_INIT";

/// Name of the timestamp column. Not configurable.
pub const TIMESTAMP_COLUMN: &str = "ts";

/// Naming of the ledger table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Table name.
    pub table_name: String,
    /// Name of the ID column.
    pub column_name: String,
    /// Maximum length of the ID column, in characters.
    ///
    /// SQLite does not enforce `VARCHAR(n)`, so the bound is checked before
    /// anything is inserted.
    pub column_size: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            table_name: "migrations".to_string(),
            column_name: "id".to_string(),
            column_size: 255,
        }
    }
}

impl LedgerConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the table name.
    #[must_use]
    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }

    /// Sets the ID column name.
    #[must_use]
    pub fn column_name(mut self, name: impl Into<String>) -> Self {
        self.column_name = name.into();
        self
    }

    /// Sets the ID column size.
    #[must_use]
    pub fn column_size(mut self, size: usize) -> Self {
        self.column_size = size;
        self
    }

    /// Checks that the configuration describes a usable table.
    pub fn validate(&self) -> Result<()> {
        if self.table_name.is_empty() {
            return Err(MigrateError::InvalidLedgerConfig(
                "table name is empty".to_string(),
            ));
        }
        if self.column_name.is_empty() {
            return Err(MigrateError::InvalidLedgerConfig(
                "column name is empty".to_string(),
            ));
        }
        if self.column_name == TIMESTAMP_COLUMN {
            return Err(MigrateError::InvalidLedgerConfig(format!(
                "column name '{TIMESTAMP_COLUMN}' is reserved for the timestamp"
            )));
        }
        if self.column_size == 0 {
            return Err(MigrateError::InvalidLedgerConfig(
                "column size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Checks that an ID fits the ID column.
    pub fn check_id(&self, id: &str) -> Result<()> {
        if id.chars().count() > self.column_size {
            return Err(MigrateError::MigrationIdTooLong {
                id: id.to_string(),
                max: self.column_size,
            });
        }
        Ok(())
    }

    /// Returns the CREATE TABLE statement for the ledger.
    #[must_use]
    pub fn create_table_sql(&self, dialect: &dyn SyncDialect) -> String {
        dialect.generate_sql(&SyncOperation::CreateTable {
            name: self.table_name.clone(),
            columns: vec![
                ColumnSchema::new(&self.column_name, SqlType::Varchar(self.column_size))
                    .primary_key(),
                ColumnSchema::new(TIMESTAMP_COLUMN, SqlType::Timestamp),
            ],
            primary_key: vec![self.column_name.clone()],
            if_not_exists: true,
        })
    }
}

/// A ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Migration ID, or [`BOOTSTRAP_SENTINEL`].
    pub id: String,
    /// When the entry was applied. `None` for migrations stamped during
    /// bootstrap without running.
    pub applied_at: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    /// Returns true for the bootstrap marker row.
    #[must_use]
    pub fn is_bootstrap(&self) -> bool {
        self.id == BOOTSTRAP_SENTINEL
    }

    /// Returns true if the migration action actually ran.
    #[must_use]
    pub fn was_executed(&self) -> bool {
        !self.is_bootstrap() && self.applied_at.is_some()
    }
}

/// Reads and appends to the ledger table.
pub struct Ledger {
    pool: SqlitePool,
    config: LedgerConfig,
    table: String,
    column: String,
    ts: String,
}

impl Ledger {
    /// Creates a ledger handle with the default table naming.
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_config(pool, LedgerConfig::default())
    }

    /// Creates a ledger handle with custom table naming.
    pub fn with_config(pool: SqlitePool, config: LedgerConfig) -> Self {
        let dialect = SqliteDialect::new();
        Self {
            table: dialect.quote_identifier(&config.table_name),
            column: dialect.quote_identifier(&config.column_name),
            ts: dialect.quote_identifier(TIMESTAMP_COLUMN),
            pool,
            config,
        }
    }

    /// Returns the table naming.
    #[must_use]
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Creates the ledger table if it does not exist.
    pub async fn ensure_table(&self) -> Result<()> {
        self.config.validate()?;
        let sql = self.config.create_table_sql(&SqliteDialect::new());
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    /// Checks if a row with the given ID exists, with or without timestamp.
    pub async fn has_applied(&self, id: &str) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?",
            self.table, self.column
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    /// Inserts a row for the given ID.
    ///
    /// The timestamp is left NULL when `with_timestamp` is false.
    pub async fn record_applied(&self, id: &str, with_timestamp: bool) -> Result<()> {
        self.config.check_id(id)?;
        let sql = format!(
            "INSERT INTO {} ({}, {}) VALUES (?, ?)",
            self.table, self.column, self.ts
        );
        let applied_at = with_timestamp.then(Utc::now);
        sqlx::query(&sql)
            .bind(id)
            .bind(applied_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Counts all rows, including the bootstrap marker and unrelated rows.
    pub async fn count(&self) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table);
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// Returns all rows in insertion order.
    pub async fn entries(&self) -> Result<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {}, {} FROM {} ORDER BY rowid",
            self.column, self.ts, self.table
        );
        let rows: Vec<(String, Option<DateTime<Utc>>)> =
            sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|(id, applied_at)| LedgerEntry { id, applied_at })
            .collect())
    }
}
