//! Error types for the migration system.

/// Errors that can occur while validating or running migrations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// `migrate` was called without an auto-sync step.
    #[error("Missing auto-sync step")]
    MissingAutoSync,

    /// The ledger table configuration cannot produce a usable table.
    #[error("Invalid ledger configuration: {0}")]
    InvalidLedgerConfig(String),

    /// A migration has an empty ID.
    #[error("Missing migration ID at index: {index}")]
    MissingMigrationId {
        /// Zero-based position of the record in the migration list.
        index: usize,
    },

    /// A migration uses the reserved bootstrap ID.
    #[error("Reserved migration ID: {0}")]
    ReservedMigrationId(String),

    /// Two migrations share an ID.
    #[error("Duplicate migration ID: {0}")]
    DuplicateMigrationId(String),

    /// A migration was declared without choosing a phase.
    #[error("Missing migration phase for ID: {0}")]
    MissingMigrationPhase(String),

    /// A migration ID does not fit the ledger's ID column.
    #[error("Migration ID '{id}' is longer than {max} characters")]
    MigrationIdTooLong {
        /// The offending ID.
        id: String,
        /// Configured ledger column size.
        max: usize,
    },

    /// A migration action failed. The migration is not recorded as applied.
    #[error("Migration '{id}' failed: {source}")]
    MigrationFailed {
        /// ID of the failing migration.
        id: String,
        /// The error returned by the action.
        source: Box<MigrateError>,
    },

    /// The auto-sync step failed for a reason other than a database error.
    #[error("Schema sync failed: {0}")]
    Sync(String),

    /// Database error while touching the ledger, the schema, or user data.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl MigrateError {
    /// Returns true for errors raised before any database access.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingMigrationId { .. }
                | Self::ReservedMigrationId(_)
                | Self::DuplicateMigrationId(_)
                | Self::MissingMigrationPhase(_)
        )
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
