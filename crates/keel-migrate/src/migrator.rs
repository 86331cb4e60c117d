//! Migration orchestration.
//!
//! A run either bootstraps a database with no history (sync once, then stamp
//! every migration as applied without running it) or applies pending
//! migrations incrementally around a sync step:
//!
//! ```text
//! pre migrations -> auto-sync -> post migrations
//! ```
//!
//! Each migration is recorded in the ledger as soon as it succeeds, so a
//! failed run can be resumed by calling [`Migrator::migrate`] again.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use tracing::{debug, info, warn};

use crate::error::{MigrateError, Result};
use crate::ledger::{BOOTSTRAP_SENTINEL, Ledger, LedgerConfig};
use crate::migration::{Migration, MigrationPhase};
use crate::sync::AutoSync;
use crate::validate::validate;

/// Called with the error that aborts a run, before it is returned.
pub type ErrorObserver = Arc<dyn Fn(&MigrateError) + Send + Sync>;

/// Which path a run took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    /// The ledger was empty: the schema was created by auto-sync and every
    /// migration was stamped without running.
    Bootstrap,
    /// Pending migrations were applied around auto-sync.
    Incremental,
}

/// Progress of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Validation and ledger setup, before the path is chosen.
    Uninitialized,
    /// Syncing a fresh database and stamping migrations.
    Bootstrapping,
    /// Running pre migrations, sync, and post migrations.
    Incremental,
    /// The run succeeded.
    Complete,
    /// The run stopped at its first error.
    Failed,
}

impl RunState {
    /// Returns true for states a run cannot leave.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    fn advance(&mut self, next: RunState) {
        debug!(from = ?*self, to = ?next, "Migration run state changed");
        *self = next;
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Path the run took.
    pub mode: RunMode,
    /// Migrations whose action ran, in execution order.
    pub applied: Vec<String>,
    /// Migrations stamped as applied during bootstrap without running.
    pub stamped: Vec<String>,
    /// Migrations skipped because the ledger already had them.
    pub skipped: Vec<String>,
}

impl MigrationReport {
    fn new(mode: RunMode) -> Self {
        Self {
            mode,
            applied: Vec::new(),
            stamped: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Returns true if the run neither executed nor recorded anything.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty() && self.stamped.is_empty()
    }
}

/// Applies a migration set to one database.
pub struct Migrator {
    pool: SqlitePool,
    migrations: Vec<Migration>,
    ledger: Ledger,
    observer: Option<ErrorObserver>,
}

impl Migrator {
    /// Creates a migrator with the default ledger naming.
    pub fn new(pool: SqlitePool, migrations: Vec<Migration>) -> Self {
        let ledger = Ledger::new(pool.clone());
        Self {
            pool,
            migrations,
            ledger,
            observer: None,
        }
    }

    /// Uses a custom ledger table naming.
    #[must_use]
    pub fn with_ledger_config(mut self, config: LedgerConfig) -> Self {
        self.ledger = Ledger::with_config(self.pool.clone(), config);
        self
    }

    /// Registers a function called with the error that aborts a run.
    #[must_use]
    pub fn with_error_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&MigrateError) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Returns the ledger.
    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Returns the migrations in declaration order.
    #[must_use]
    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Returns true if the next run would take the bootstrap path.
    ///
    /// That is the case when the sentinel is absent and the ledger has no rows
    /// at all. A ledger with rows but no sentinel was written by an older
    /// setup and is treated as an existing database. The ledger table must
    /// already exist.
    pub async fn needs_bootstrap(&self) -> Result<bool> {
        if self.ledger.has_applied(BOOTSTRAP_SENTINEL).await? {
            return Ok(false);
        }
        Ok(self.ledger.count().await? == 0)
    }

    /// Runs the migrations.
    ///
    /// `auto_sync` reconciles the schema with the declared models; passing
    /// `None` is a configuration error reported before any database access.
    /// The first error aborts the run. Nothing is rolled back: the ledger
    /// reflects exactly the migrations that completed.
    pub async fn migrate(&self, auto_sync: Option<&dyn AutoSync>) -> Result<MigrationReport> {
        let mut state = RunState::Uninitialized;
        let result = self.run(auto_sync, &mut state).await;

        match &result {
            Ok(report) => {
                state.advance(RunState::Complete);
                info!(
                    mode = ?report.mode,
                    applied = report.applied.len(),
                    stamped = report.stamped.len(),
                    skipped = report.skipped.len(),
                    "Migrations complete"
                );
            }
            Err(err) => {
                state.advance(RunState::Failed);
                warn!(error = %err, "Migration run failed");
                if let Some(observer) = &self.observer {
                    observer(err);
                }
            }
        }

        result
    }

    async fn run(
        &self,
        auto_sync: Option<&dyn AutoSync>,
        state: &mut RunState,
    ) -> Result<MigrationReport> {
        let auto_sync = auto_sync.ok_or(MigrateError::MissingAutoSync)?;

        validate(&self.migrations)?;
        self.ledger.config().validate()?;
        for migration in &self.migrations {
            self.ledger.config().check_id(&migration.id)?;
        }
        self.ledger.ensure_table().await?;

        if self.needs_bootstrap().await? {
            state.advance(RunState::Bootstrapping);
            return self.bootstrap(auto_sync).await;
        }

        state.advance(RunState::Incremental);
        let mut report = MigrationReport::new(RunMode::Incremental);

        self.run_phase(MigrationPhase::Pre, &mut report).await?;
        debug!("Running auto-sync");
        auto_sync.sync(&self.pool).await?;
        self.run_phase(MigrationPhase::Post, &mut report).await?;

        Ok(report)
    }

    async fn bootstrap(&self, auto_sync: &dyn AutoSync) -> Result<MigrationReport> {
        info!(
            migrations = self.migrations.len(),
            "No migration history, creating schema with auto-sync"
        );
        auto_sync.sync(&self.pool).await?;
        self.ledger.record_applied(BOOTSTRAP_SENTINEL, true).await?;

        let mut report = MigrationReport::new(RunMode::Bootstrap);
        for migration in &self.migrations {
            self.ledger.record_applied(&migration.id, false).await?;
            debug!(id = %migration.id, "Stamped migration as applied");
            report.stamped.push(migration.id.clone());
        }

        Ok(report)
    }

    async fn run_phase(&self, phase: MigrationPhase, report: &mut MigrationReport) -> Result<()> {
        for migration in self.migrations.iter().filter(|m| m.runs_in(phase)) {
            if self.apply_if_needed(migration).await? {
                report.applied.push(migration.id.clone());
            } else {
                report.skipped.push(migration.id.clone());
            }
        }
        Ok(())
    }

    /// Runs a migration unless the ledger already has it.
    ///
    /// Returns whether the action ran. A failed action is not recorded. A
    /// failure to record a successful action is returned as is: the action
    /// is not retried because it may not be safe to run twice.
    async fn apply_if_needed(&self, migration: &Migration) -> Result<bool> {
        if self.ledger.has_applied(&migration.id).await? {
            debug!(id = %migration.id, "Migration already applied, skipping");
            return Ok(false);
        }

        info!(id = %migration.id, phase = %PhaseField(migration.phase), "Applying migration");

        migration
            .run(&self.pool)
            .await
            .map_err(|source| MigrateError::MigrationFailed {
                id: migration.id.clone(),
                source: Box::new(source),
            })?;

        self.ledger.record_applied(&migration.id, true).await?;

        info!(id = %migration.id, "Migration applied successfully");
        Ok(true)
    }
}

impl fmt::Debug for Migrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migrator")
            .field("migrations", &self.migrations)
            .field("ledger", self.ledger.config())
            .field("observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

struct PhaseField(Option<MigrationPhase>);

impl fmt::Display for PhaseField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(phase) => write!(f, "{phase}"),
            None => f.write_str("unset"),
        }
    }
}
