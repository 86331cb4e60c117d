//! One-call database setup.
//!
//! [`Setup`] connects to a SQLite database, optionally wipes it, runs the
//! migrations around a [`SchemaSync`] built from the declared tables, and
//! seeds the database when it had no migration history.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use log::LevelFilter;
use sqlx::ConnectOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{info, warn};

use crate::dialect::{SqliteDialect, SyncDialect};
use crate::error::{MigrateError, Result};
use crate::ledger::LedgerConfig;
use crate::migration::Migration;
use crate::migrator::{ErrorObserver, Migrator, RunMode};
use crate::schema::TableSchema;
use crate::sync::SchemaSync;

/// Populates a freshly created database.
pub type SeedFn = Box<dyn for<'a> Fn(&'a SqlitePool) -> BoxFuture<'a, Result<()>> + Send + Sync>;

/// Connection, schema and migrations for one database.
pub struct Setup {
    url: String,
    max_connections: u32,
    tables: Vec<TableSchema>,
    migrations: Vec<Migration>,
    ledger: LedgerConfig,
    fresh: bool,
    debug: bool,
    slow_threshold: Option<Duration>,
    seed: Option<SeedFn>,
    observer: Option<ErrorObserver>,
}

impl Setup {
    /// Creates a setup for the given SQLite URL (e.g. `sqlite:app.db`).
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 5,
            tables: Vec::new(),
            migrations: Vec::new(),
            ledger: LedgerConfig::default(),
            fresh: false,
            debug: false,
            slow_threshold: None,
            seed: None,
            observer: None,
        }
    }

    /// Sets the pool size.
    #[must_use]
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Declares a table for auto-sync.
    #[must_use]
    pub fn table(mut self, table: TableSchema) -> Self {
        self.tables.push(table);
        self
    }

    /// Adds a migration.
    #[must_use]
    pub fn migration(mut self, migration: Migration) -> Self {
        self.migrations.push(migration);
        self
    }

    /// Adds several migrations.
    #[must_use]
    pub fn migrations(mut self, migrations: impl IntoIterator<Item = Migration>) -> Self {
        self.migrations.extend(migrations);
        self
    }

    /// Uses a custom ledger table naming.
    #[must_use]
    pub fn ledger_config(mut self, config: LedgerConfig) -> Self {
        self.ledger = config;
        self
    }

    /// Drops every table before migrating. Meant for tests.
    #[must_use]
    pub fn fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    /// Logs every statement at `info` instead of `debug`.
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Logs statements slower than `threshold` at `warn`.
    ///
    /// Slow statement logging is off unless a threshold is set.
    #[must_use]
    pub fn slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = Some(threshold);
        self
    }

    /// Sets the seed hook, run only when the database had no history.
    #[must_use]
    pub fn seed<F>(mut self, seed: F) -> Self
    where
        F: for<'a> Fn(&'a SqlitePool) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        self.seed = Some(Box::new(seed));
        self
    }

    /// Registers a function called with any error that aborts setup.
    #[must_use]
    pub fn error_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&MigrateError) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Connects, migrates and seeds. Returns the connected pool.
    pub async fn run(self) -> Result<SqlitePool> {
        let observer = self.observer.clone();
        let result = self.connect_and_migrate().await;

        if let (Err(err), Some(observer)) = (&result, observer) {
            observer(err);
        }
        result
    }

    fn connect_options(&self) -> Result<SqliteConnectOptions> {
        let statements = if self.debug {
            LevelFilter::Info
        } else {
            LevelFilter::Debug
        };
        let options = SqliteConnectOptions::from_str(&self.url)?
            .create_if_missing(true)
            .log_statements(statements);

        Ok(match self.slow_threshold {
            Some(threshold) => options.log_slow_statements(LevelFilter::Warn, threshold),
            None => options.log_slow_statements(LevelFilter::Off, Duration::ZERO),
        })
    }

    async fn connect_and_migrate(self) -> Result<SqlitePool> {
        let options = self.connect_options()?;
        let pool = SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .connect_with(options)
            .await?;

        if self.fresh {
            drop_all_tables(&pool).await?;
        }

        let sync = SchemaSync::new().tables(self.tables);
        let migrator =
            Migrator::new(pool.clone(), self.migrations).with_ledger_config(self.ledger);
        let report = migrator.migrate(Some(&sync)).await?;

        if report.mode == RunMode::Bootstrap {
            if let Some(seed) = &self.seed {
                info!("Seeding new database");
                seed(&pool).await?;
            }
        }

        Ok(pool)
    }
}

impl fmt::Debug for Setup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setup")
            .field("url", &self.url)
            .field("max_connections", &self.max_connections)
            .field("tables", &self.tables.len())
            .field("migrations", &self.migrations)
            .field("ledger", &self.ledger)
            .field("fresh", &self.fresh)
            .field("debug", &self.debug)
            .field("slow_threshold", &self.slow_threshold)
            .field("seed", &self.seed.is_some())
            .finish_non_exhaustive()
    }
}

/// Drops every user table, including the ledger.
pub async fn drop_all_tables(pool: &SqlitePool) -> Result<()> {
    let dialect = SqliteDialect::new();
    let mut conn = pool.acquire().await?;

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
    )
    .fetch_all(&mut *conn)
    .await?;

    if tables.is_empty() {
        return Ok(());
    }
    warn!(tables = tables.len(), "Dropping all tables");

    sqlx::query("PRAGMA foreign_keys = OFF")
        .execute(&mut *conn)
        .await?;
    for table in &tables {
        let sql = format!("DROP TABLE IF EXISTS {}", dialect.quote_identifier(table));
        sqlx::query(&sql).execute(&mut *conn).await?;
    }
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&mut *conn)
        .await?;

    Ok(())
}
