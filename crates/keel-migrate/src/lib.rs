//! Run-once schema migrations around an automatic schema sync.
//!
//! `keel-migrate` applies an ordered set of named migrations to a SQLite
//! database exactly once each, and interleaves them with an auto-sync step
//! that brings the live tables in line with the declared models:
//!
//! - **Pre** migrations run before the sync (e.g. renaming a column so the
//!   sync doesn't add a duplicate).
//! - **Post** migrations run after it (e.g. backfilling a column the sync
//!   just added).
//!
//! Applied migration IDs are recorded in a ledger table. A database with an
//! empty ledger is bootstrapped: the sync creates the whole schema and every
//! migration is stamped as applied without running.
//!
//! # Architecture
//!
//! - **Migration** - ID, phase and async action
//! - **Validator** - Rejects empty, reserved, duplicate or phaseless records
//! - **Ledger** - The table of applied migration IDs
//! - **Migrator** - Chooses bootstrap or incremental and runs the phases
//! - **Sync** - The [`AutoSync`](sync::AutoSync) seam and the default
//!   additive [`SchemaSync`](sync::SchemaSync)
//! - **Setup** - Connect, migrate and seed in one call
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::FutureExt;
//! use keel_migrate::prelude::*;
//!
//! let users = TableSchema::new("users")
//!     .column(ColumnSchema::new("id", SqlType::BigInt).primary_key().auto_increment())
//!     .column(ColumnSchema::new("full_name", SqlType::Text))
//!     .column(ColumnSchema::new("is_active", SqlType::Boolean)
//!         .not_null()
//!         .default(DefaultValue::Bool(true)));
//!
//! let migrations = vec![
//!     Migration::pre("0002_rename_name", |pool| {
//!         async move {
//!             sqlx::query(r#"ALTER TABLE "users" RENAME COLUMN "name" TO "full_name""#)
//!                 .execute(pool)
//!                 .await?;
//!             Ok(())
//!         }
//!         .boxed()
//!     }),
//! ];
//!
//! let sync = SchemaSync::new().table(users);
//! Migrator::new(pool, migrations).migrate(Some(&sync)).await?;
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Create the ledger table
//! keel-migrate init
//!
//! # List ledger rows
//! keel-migrate show-migrations
//!
//! # Will the next run bootstrap?
//! keel-migrate status
//! ```

pub mod dialect;
pub mod error;
pub mod ledger;
pub mod migration;
pub mod migrator;
pub mod operations;
pub mod schema;
pub mod setup;
pub mod sync;
pub mod validate;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::dialect::{SqliteDialect, SyncDialect};
    pub use crate::error::{MigrateError, Result};
    pub use crate::ledger::{BOOTSTRAP_SENTINEL, Ledger, LedgerConfig, LedgerEntry};
    pub use crate::migration::{Migration, MigrationAction, MigrationPhase};
    pub use crate::migrator::{ErrorObserver, MigrationReport, Migrator, RunMode, RunState};
    pub use crate::operations::SyncOperation;
    pub use crate::schema::{ColumnSchema, DefaultValue, IndexSchema, SqlType, TableSchema};
    pub use crate::setup::{SeedFn, Setup};
    pub use crate::sync::{AutoSync, SchemaSync, SyncFn};
    pub use crate::validate::validate;
}
