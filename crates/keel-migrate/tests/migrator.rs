//! Integration tests for the migrator.
//!
//! Each test drives `Migrator::migrate` against a single-connection
//! in-memory SQLite database and observes execution order through a shared
//! log that migration actions and the sync step append to.

use std::sync::{Arc, Mutex};

use futures::FutureExt;
use keel_migrate::prelude::*;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

type Log = Arc<Mutex<Vec<String>>>;

async fn create_test_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory SQLite pool")
}

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn take(log: &Log) -> Vec<String> {
    std::mem::take(&mut *log.lock().unwrap())
}

/// A migration that only appends its ID to the log.
fn recording(id: &str, phase: MigrationPhase, log: &Log) -> Migration {
    let log = Arc::clone(log);
    let name = id.to_string();
    Migration::new(id, move |_pool| {
        log.lock().unwrap().push(name.clone());
        async { Ok(()) }.boxed()
    })
    .phase(phase)
}

/// A sync step that only appends "sync" to the log.
fn recording_sync(log: &Log) -> impl AutoSync {
    let log = Arc::clone(log);
    SyncFn::new(move |_pool| {
        log.lock().unwrap().push("sync".to_string());
        async { Ok(()) }.boxed()
    })
}

/// Runs an empty migration set so the ledger holds the bootstrap marker and
/// later runs take the incremental path.
async fn bootstrap_empty(pool: &SqlitePool) {
    let log = new_log();
    let report = Migrator::new(pool.clone(), Vec::new())
        .migrate(Some(&recording_sync(&log)))
        .await
        .unwrap();
    assert_eq!(report.mode, RunMode::Bootstrap);
}

async fn ledger_ids(migrator: &Migrator) -> Vec<String> {
    migrator
        .ledger()
        .entries()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect()
}

// =============================================================================
// Bootstrap
// =============================================================================

#[tokio::test]
async fn fresh_database_is_bootstrapped_without_running_actions() {
    let pool = create_test_pool().await;
    let log = new_log();
    let migrator = Migrator::new(
        pool,
        vec![
            recording("0001_a", MigrationPhase::Pre, &log),
            recording("0002_b", MigrationPhase::Post, &log),
            recording("0003_c", MigrationPhase::Pre, &log),
        ],
    );

    let report = migrator
        .migrate(Some(&recording_sync(&log)))
        .await
        .unwrap();

    assert_eq!(report.mode, RunMode::Bootstrap);
    assert_eq!(take(&log), vec!["sync"]);
    assert_eq!(
        ledger_ids(&migrator).await,
        vec![BOOTSTRAP_SENTINEL, "0001_a", "0002_b", "0003_c"]
    );

    let entries = migrator.ledger().entries().await.unwrap();
    assert!(entries[0].applied_at.is_some());
    assert!(entries[1..].iter().all(|e| e.applied_at.is_none()));
}

#[tokio::test]
async fn legacy_ledger_without_sentinel_runs_incrementally() {
    let pool = create_test_pool().await;
    sqlx::query("CREATE TABLE migrations (id VARCHAR(255) PRIMARY KEY, ts TEXT)")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO migrations (id, ts) VALUES ('0001_legacy', '2020-01-01T00:00:00Z')")
        .execute(&pool)
        .await
        .unwrap();

    let log = new_log();
    let migrator = Migrator::new(
        pool,
        vec![
            recording("0001_legacy", MigrationPhase::Pre, &log),
            recording("0002_new", MigrationPhase::Post, &log),
        ],
    );

    assert!(!migrator.needs_bootstrap().await.unwrap());
    let report = migrator
        .migrate(Some(&recording_sync(&log)))
        .await
        .unwrap();

    assert_eq!(report.mode, RunMode::Incremental);
    assert_eq!(report.skipped, vec!["0001_legacy"]);
    assert_eq!(take(&log), vec!["sync", "0002_new"]);
    // The sentinel is never added after the fact.
    assert_eq!(ledger_ids(&migrator).await, vec!["0001_legacy", "0002_new"]);
}

// =============================================================================
// Incremental runs
// =============================================================================

#[tokio::test]
async fn pre_migrations_run_before_sync_and_post_after() {
    let pool = create_test_pool().await;
    bootstrap_empty(&pool).await;

    let log = new_log();
    let migrator = Migrator::new(
        pool,
        vec![
            recording("A", MigrationPhase::Pre, &log),
            recording("B", MigrationPhase::Post, &log),
            recording("C", MigrationPhase::Pre, &log),
        ],
    );

    let report = migrator
        .migrate(Some(&recording_sync(&log)))
        .await
        .unwrap();

    assert_eq!(report.mode, RunMode::Incremental);
    assert_eq!(take(&log), vec!["A", "C", "sync", "B"]);
    assert_eq!(report.applied, vec!["A", "C", "B"]);
    assert_eq!(
        ledger_ids(&migrator).await,
        vec![BOOTSTRAP_SENTINEL, "A", "C", "B"]
    );
}

#[tokio::test]
async fn second_run_is_a_noop() {
    let pool = create_test_pool().await;
    bootstrap_empty(&pool).await;

    let log = new_log();
    let migrator = Migrator::new(
        pool,
        vec![
            recording("0001", MigrationPhase::Pre, &log),
            recording("0002", MigrationPhase::Post, &log),
        ],
    );
    let sync = recording_sync(&log);

    migrator.migrate(Some(&sync)).await.unwrap();
    assert_eq!(take(&log), vec!["0001", "sync", "0002"]);
    let before = migrator.ledger().entries().await.unwrap();

    let report = migrator.migrate(Some(&sync)).await.unwrap();
    assert!(report.is_noop());
    assert_eq!(report.skipped, vec!["0001", "0002"]);
    // Sync still runs; no action does.
    assert_eq!(take(&log), vec!["sync"]);
    assert_eq!(migrator.ledger().entries().await.unwrap(), before);
}

#[tokio::test]
async fn bootstrapped_migrations_never_run_later() {
    let pool = create_test_pool().await;
    let log = new_log();
    let first = || {
        vec![
            recording("0001", MigrationPhase::Pre, &log),
            recording("0002", MigrationPhase::Post, &log),
        ]
    };
    let sync = recording_sync(&log);

    Migrator::new(pool.clone(), first())
        .migrate(Some(&sync))
        .await
        .unwrap();
    assert_eq!(take(&log), vec!["sync"]);

    let mut second = first();
    second.push(recording("0003", MigrationPhase::Post, &log));
    let report = Migrator::new(pool, second)
        .migrate(Some(&sync))
        .await
        .unwrap();

    assert_eq!(report.applied, vec!["0003"]);
    assert_eq!(take(&log), vec!["sync", "0003"]);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn failed_migration_is_retried_and_earlier_ones_are_not() {
    let pool = create_test_pool().await;
    bootstrap_empty(&pool).await;

    let log = new_log();
    let attempts = Arc::clone(&log);
    let migrations = || {
        let attempts = Arc::clone(&attempts);
        vec![
            recording("A", MigrationPhase::Pre, &log),
            Migration::post("B", move |pool| {
                attempts.lock().unwrap().push("B".to_string());
                async move {
                    sqlx::query("INSERT INTO settings (key) VALUES ('theme')")
                        .execute(pool)
                        .await?;
                    Ok(())
                }
                .boxed()
            }),
        ]
    };
    let sync = recording_sync(&log);

    let migrator = Migrator::new(pool.clone(), migrations());
    match migrator.migrate(Some(&sync)).await {
        Err(MigrateError::MigrationFailed { id, source }) => {
            assert_eq!(id, "B");
            assert!(matches!(*source, MigrateError::Database(_)));
        }
        other => panic!("expected migration failure, got {other:?}"),
    }
    assert_eq!(take(&log), vec!["A", "sync", "B"]);
    assert_eq!(ledger_ids(&migrator).await, vec![BOOTSTRAP_SENTINEL, "A"]);

    sqlx::query("CREATE TABLE settings (key TEXT)")
        .execute(&pool)
        .await
        .unwrap();

    let report = Migrator::new(pool, migrations())
        .migrate(Some(&sync))
        .await
        .unwrap();
    assert_eq!(report.applied, vec!["B"]);
    assert_eq!(report.skipped, vec!["A"]);
    assert_eq!(take(&log), vec!["sync", "B"]);
}

#[tokio::test]
async fn sync_failure_stops_before_post_phase() {
    let pool = create_test_pool().await;
    bootstrap_empty(&pool).await;

    let log = new_log();
    let migrator = Migrator::new(
        pool,
        vec![
            recording("pre", MigrationPhase::Pre, &log),
            recording("post", MigrationPhase::Post, &log),
        ],
    );
    let failing = SyncFn::new(|_pool| async { Err(MigrateError::Sync("boom".into())) }.boxed());

    assert!(matches!(
        migrator.migrate(Some(&failing)).await,
        Err(MigrateError::Sync(_))
    ));
    assert_eq!(take(&log), vec!["pre"]);
    assert_eq!(ledger_ids(&migrator).await, vec![BOOTSTRAP_SENTINEL, "pre"]);
}

#[tokio::test]
async fn recording_failure_is_fatal() {
    let pool = create_test_pool().await;
    bootstrap_empty(&pool).await;

    let log = new_log();
    let migrator = Migrator::new(
        pool,
        vec![
            Migration::pre("0001_drop_ledger", |pool| {
                async move {
                    sqlx::query("DROP TABLE migrations").execute(pool).await?;
                    Ok(())
                }
                .boxed()
            }),
            recording("0002", MigrationPhase::Pre, &log),
        ],
    );

    assert!(matches!(
        migrator.migrate(Some(&recording_sync(&log))).await,
        Err(MigrateError::Database(_))
    ));
    assert!(take(&log).is_empty());
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn duplicate_id_is_reported_before_missing_phase() {
    let pool = create_test_pool().await;
    let log = new_log();
    let migrator = Migrator::new(
        pool,
        vec![
            recording("0001", MigrationPhase::Pre, &log),
            Migration::new("0002", |_pool| async { Ok(()) }.boxed()),
            recording("0001", MigrationPhase::Post, &log),
        ],
    );

    match migrator.migrate(Some(&recording_sync(&log))).await {
        Err(MigrateError::DuplicateMigrationId(id)) => assert_eq!(id, "0001"),
        other => panic!("expected duplicate ID error, got {other:?}"),
    }
    assert!(take(&log).is_empty());
}

#[tokio::test]
async fn reserved_id_is_rejected() {
    let pool = create_test_pool().await;
    let log = new_log();
    let migrator = Migrator::new(
        pool,
        vec![recording(BOOTSTRAP_SENTINEL, MigrationPhase::Pre, &log)],
    );

    assert!(matches!(
        migrator.migrate(Some(&recording_sync(&log))).await,
        Err(MigrateError::ReservedMigrationId(_))
    ));
}

// =============================================================================
// Schema sync
// =============================================================================

#[tokio::test]
async fn schema_sync_with_rename_and_backfill() {
    let pool = create_test_pool().await;

    let v1 = TableSchema::new("people")
        .column(
            ColumnSchema::new("id", SqlType::BigInt)
                .primary_key()
                .auto_increment(),
        )
        .column(ColumnSchema::new("name", SqlType::Text));
    Migrator::new(pool.clone(), Vec::new())
        .migrate(Some(&SchemaSync::new().table(v1)))
        .await
        .unwrap();
    sqlx::query("INSERT INTO people (name) VALUES ('Ada Lovelace')")
        .execute(&pool)
        .await
        .unwrap();

    let v2 = TableSchema::new("people")
        .column(
            ColumnSchema::new("id", SqlType::BigInt)
                .primary_key()
                .auto_increment(),
        )
        .column(ColumnSchema::new("full_name", SqlType::Text))
        .column(ColumnSchema::new("initials", SqlType::Varchar(8)));
    let migrations = vec![
        Migration::pre("0001_rename_name", |pool| {
            async move {
                sqlx::query(r#"ALTER TABLE "people" RENAME COLUMN "name" TO "full_name""#)
                    .execute(pool)
                    .await?;
                Ok(())
            }
            .boxed()
        }),
        Migration::post("0002_backfill_initials", |pool| {
            async move {
                sqlx::query(r#"UPDATE "people" SET "initials" = substr("full_name", 1, 1)"#)
                    .execute(pool)
                    .await?;
                Ok(())
            }
            .boxed()
        }),
    ];

    let report = Migrator::new(pool.clone(), migrations)
        .migrate(Some(&SchemaSync::new().table(v2)))
        .await
        .unwrap();
    assert_eq!(report.applied, vec!["0001_rename_name", "0002_backfill_initials"]);

    let row: (String, String) = sqlx::query_as("SELECT full_name, initials FROM people")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(row, ("Ada Lovelace".to_string(), "A".to_string()));

    let columns: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info('people')")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(columns, 3);
}
