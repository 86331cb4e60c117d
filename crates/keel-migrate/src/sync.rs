//! Auto-sync: reconciling declared tables with the live database.
//!
//! The [`Migrator`](crate::migrator::Migrator) only needs something that
//! implements [`AutoSync`]. [`SchemaSync`] is the default implementation: it
//! creates missing tables, adds missing columns and creates missing indexes.
//! It never drops or alters anything that already exists.

use std::collections::HashSet;

use futures::FutureExt;
use futures::future::BoxFuture;
use sqlx::Row;
use sqlx::sqlite::SqlitePool;
use tracing::{debug, info};

use crate::dialect::{SqliteDialect, SyncDialect};
use crate::error::{MigrateError, Result};
use crate::operations::SyncOperation;
use crate::schema::TableSchema;

/// Brings the database structure in line with the declared models.
pub trait AutoSync: Send + Sync {
    /// Runs the sync against the given pool.
    fn sync<'a>(&'a self, pool: &'a SqlitePool) -> BoxFuture<'a, Result<()>>;
}

/// Adapts an async closure into an [`AutoSync`].
///
/// ```rust,ignore
/// use futures::FutureExt;
///
/// let sync = SyncFn::new(|pool| {
///     async move {
///         sqlx::query("CREATE TABLE IF NOT EXISTS t (x INTEGER)")
///             .execute(pool)
///             .await?;
///         Ok(())
///     }
///     .boxed()
/// });
/// ```
pub struct SyncFn<F>(F);

impl<F> SyncFn<F> {
    /// Wraps a closure.
    pub fn new(f: F) -> Self
    where
        F: for<'a> Fn(&'a SqlitePool) -> BoxFuture<'a, Result<()>> + Send + Sync,
    {
        Self(f)
    }
}

impl<F> AutoSync for SyncFn<F>
where
    F: for<'a> Fn(&'a SqlitePool) -> BoxFuture<'a, Result<()>> + Send + Sync,
{
    fn sync<'a>(&'a self, pool: &'a SqlitePool) -> BoxFuture<'a, Result<()>> {
        (self.0)(pool)
    }
}

/// Additive schema sync for a set of declared tables.
#[derive(Debug, Clone, Default)]
pub struct SchemaSync {
    tables: Vec<TableSchema>,
    dialect: SqliteDialect,
}

impl SchemaSync {
    /// Creates a sync with no declared tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a table.
    #[must_use]
    pub fn table(mut self, table: TableSchema) -> Self {
        self.tables.push(table);
        self
    }

    /// Declares several tables.
    #[must_use]
    pub fn tables(mut self, tables: impl IntoIterator<Item = TableSchema>) -> Self {
        self.tables.extend(tables);
        self
    }

    /// Returns the declared tables.
    #[must_use]
    pub fn declared(&self) -> &[TableSchema] {
        &self.tables
    }

    /// Computes the operations needed without changing the database.
    pub async fn plan(&self, pool: &SqlitePool) -> Result<Vec<SyncOperation>> {
        let mut operations = Vec::new();

        for table in &self.tables {
            let existing = existing_columns(pool, &self.dialect, &table.name).await?;

            if existing.is_empty() {
                operations.push(SyncOperation::create_table(table));
                operations.extend(
                    table
                        .indexes
                        .iter()
                        .map(|index| SyncOperation::create_index(&table.name, index.clone())),
                );
                continue;
            }

            for column in &table.columns {
                if existing.contains(&column.name) {
                    continue;
                }
                if !column.can_add_later() {
                    return Err(MigrateError::Sync(format!(
                        "column '{}' cannot be added to existing table '{}'; \
                         add it with a migration",
                        column.name, table.name
                    )));
                }
                operations.push(SyncOperation::add_column(&table.name, column.clone()));
            }

            let indexes = existing_indexes(pool, &table.name).await?;
            operations.extend(
                table
                    .indexes
                    .iter()
                    .filter(|index| !indexes.contains(&index.name))
                    .map(|index| SyncOperation::create_index(&table.name, index.clone())),
            );
        }

        Ok(operations)
    }

    /// Applies the planned operations and returns them.
    pub async fn apply(&self, pool: &SqlitePool) -> Result<Vec<SyncOperation>> {
        let operations = self.plan(pool).await?;

        if operations.is_empty() {
            debug!(tables = self.tables.len(), "Schema already in sync");
            return Ok(operations);
        }

        for operation in &operations {
            let sql = self.dialect.generate_sql(operation);
            info!(table = %operation.table(), "{}", operation.describe());
            debug!(sql = %sql, "Executing SQL");
            sqlx::query(&sql).execute(pool).await?;
        }

        Ok(operations)
    }
}

impl AutoSync for SchemaSync {
    fn sync<'a>(&'a self, pool: &'a SqlitePool) -> BoxFuture<'a, Result<()>> {
        async move { self.apply(pool).await.map(|_| ()) }.boxed()
    }
}

/// Returns the column names of a table; empty if the table does not exist.
async fn existing_columns(
    pool: &SqlitePool,
    dialect: &SqliteDialect,
    table: &str,
) -> Result<HashSet<String>> {
    let sql = format!("PRAGMA table_info({})", dialect.quote_identifier(table));
    let rows = sqlx::query(&sql).fetch_all(pool).await?;

    rows.iter()
        .map(|row| row.try_get::<String, _>("name").map_err(MigrateError::from))
        .collect()
}

async fn existing_indexes(pool: &SqlitePool, table: &str) -> Result<HashSet<String>> {
    let names: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ?")
            .bind(table)
            .fetch_all(pool)
            .await?;
    Ok(names.into_iter().collect())
}
