//! Integrity checks run before a migration set touches the database.

use std::collections::HashSet;

use crate::error::{MigrateError, Result};
use crate::ledger::BOOTSTRAP_SENTINEL;
use crate::migration::Migration;

/// Checks a migration set for structural problems.
///
/// The checks run in a fixed order and stop at the first failure:
/// missing ID, reserved ID, duplicate ID, missing phase.
pub fn validate(migrations: &[Migration]) -> Result<()> {
    check_missing_id(migrations)?;
    check_reserved_id(migrations)?;
    check_duplicate_id(migrations)?;
    check_missing_phase(migrations)
}

fn check_missing_id(migrations: &[Migration]) -> Result<()> {
    match migrations.iter().position(|m| m.id.is_empty()) {
        Some(index) => Err(MigrateError::MissingMigrationId { index }),
        None => Ok(()),
    }
}

fn check_reserved_id(migrations: &[Migration]) -> Result<()> {
    match migrations.iter().find(|m| m.id == BOOTSTRAP_SENTINEL) {
        Some(m) => Err(MigrateError::ReservedMigrationId(m.id.clone())),
        None => Ok(()),
    }
}

fn check_duplicate_id(migrations: &[Migration]) -> Result<()> {
    let mut seen = HashSet::with_capacity(migrations.len());
    for migration in migrations {
        if !seen.insert(migration.id.as_str()) {
            return Err(MigrateError::DuplicateMigrationId(migration.id.clone()));
        }
    }
    Ok(())
}

fn check_missing_phase(migrations: &[Migration]) -> Result<()> {
    match migrations.iter().find(|m| m.phase.is_none()) {
        Some(m) => Err(MigrateError::MissingMigrationPhase(m.id.clone())),
        None => Ok(()),
    }
}
