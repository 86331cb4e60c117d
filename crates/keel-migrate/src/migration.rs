//! Migration records.
//!
//! A [`Migration`] pairs a unique ID with the phase it runs in and the action
//! that performs the change. Records are immutable once handed to a
//! [`Migrator`](crate::migrator::Migrator).

use std::fmt;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

use crate::error::Result;

/// When a migration runs relative to the auto-sync step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MigrationPhase {
    /// Runs before the schema is synced with the declared tables.
    ///
    /// Use this for changes sync would get wrong, such as renaming a column
    /// (sync alone would add a second column next to the old one).
    Pre,
    /// Runs after the schema is synced with the declared tables.
    ///
    /// Use this for changes that need the synced columns to exist, such as
    /// backfilling a newly added column.
    Post,
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pre => f.write_str("pre"),
            Self::Post => f.write_str("post"),
        }
    }
}

/// The work a migration performs against the database.
pub type MigrationAction =
    Box<dyn for<'a> Fn(&'a SqlitePool) -> BoxFuture<'a, Result<()>> + Send + Sync>;

/// A single named migration.
pub struct Migration {
    /// Unique ID, also the ledger key.
    pub id: String,
    /// Phase the migration runs in. `None` until [`pre`](Self::pre) or
    /// [`post`](Self::post) is called, and rejected by validation.
    pub phase: Option<MigrationPhase>,
    action: MigrationAction,
}

impl Migration {
    /// Creates a migration with no phase.
    ///
    /// ```rust,ignore
    /// use futures::FutureExt;
    ///
    /// let migration = Migration::new("0002_rename_title", |pool| {
    ///     async move {
    ///         sqlx::query(r#"ALTER TABLE "posts" RENAME COLUMN "title" TO "headline""#)
    ///             .execute(pool)
    ///             .await?;
    ///         Ok(())
    ///     }
    ///     .boxed()
    /// })
    /// .pre();
    /// ```
    #[must_use]
    pub fn new<F>(id: impl Into<String>, action: F) -> Self
    where
        F: for<'a> Fn(&'a SqlitePool) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            phase: None,
            action: Box::new(action),
        }
    }

    /// Creates a migration that runs before auto-sync.
    #[must_use]
    pub fn pre<F>(id: impl Into<String>, action: F) -> Self
    where
        F: for<'a> Fn(&'a SqlitePool) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        Self::new(id, action).phase(MigrationPhase::Pre)
    }

    /// Creates a migration that runs after auto-sync.
    #[must_use]
    pub fn post<F>(id: impl Into<String>, action: F) -> Self
    where
        F: for<'a> Fn(&'a SqlitePool) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        Self::new(id, action).phase(MigrationPhase::Post)
    }

    /// Sets the phase.
    #[must_use]
    pub fn phase(mut self, phase: MigrationPhase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Runs the migration action.
    pub async fn run(&self, pool: &SqlitePool) -> Result<()> {
        (self.action)(pool).await
    }

    /// Returns true if this migration runs in the given phase.
    #[must_use]
    pub fn runs_in(&self, phase: MigrationPhase) -> bool {
        self.phase == Some(phase)
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn noop(_: &SqlitePool) -> BoxFuture<'_, Result<()>> {
        async { Ok(()) }.boxed()
    }

    #[test]
    fn test_migration_builders() {
        let unset = Migration::new("0001_initial", noop);
        assert_eq!(unset.id, "0001_initial");
        assert_eq!(unset.phase, None);

        let pre = Migration::pre("0002_rename", noop);
        assert!(pre.runs_in(MigrationPhase::Pre));
        assert!(!pre.runs_in(MigrationPhase::Post));

        let post = Migration::new("0003_backfill", noop).phase(MigrationPhase::Post);
        assert_eq!(post.phase, Some(MigrationPhase::Post));
    }

    #[test]
    fn test_debug_omits_action() {
        let migration = Migration::post("0003_backfill", noop);
        let debug = format!("{migration:?}");
        assert!(debug.contains("0003_backfill"));
        assert!(debug.contains("Post"));
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(MigrationPhase::Pre.to_string(), "pre");
        assert_eq!(MigrationPhase::Post.to_string(), "post");
    }
}
