//! Example: Blog Application Migrations
//!
//! Walks a blog database through two releases:
//!
//! 1. Release 1 starts on an empty database. Auto-sync creates the schema and
//!    the (empty) migration list is bootstrapped.
//! 2. Release 2 renames `posts.title` to `posts.headline` and adds a
//!    `posts.slug` column that must be filled from the headline. The rename is
//!    a pre migration (otherwise sync would add an empty `headline` column
//!    next to `title`); the backfill is a post migration (the column only
//!    exists once sync has added it).
//!
//! Run with: cargo run --example blog_migrations -p keel-migrate

use futures::FutureExt;
use keel_migrate::prelude::*;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

// =============================================================================
// Declared tables
// =============================================================================

fn users() -> TableSchema {
    TableSchema::new("users")
        .column(
            ColumnSchema::new("id", SqlType::BigInt)
                .primary_key()
                .auto_increment(),
        )
        .column(ColumnSchema::new("username", SqlType::Varchar(100)).not_null())
        .index(IndexSchema::new("users_username_idx", &["username"]).unique())
}

fn posts_v1() -> TableSchema {
    TableSchema::new("posts")
        .column(
            ColumnSchema::new("id", SqlType::BigInt)
                .primary_key()
                .auto_increment(),
        )
        .column(ColumnSchema::new("author_id", SqlType::BigInt).not_null())
        .column(ColumnSchema::new("title", SqlType::Varchar(255)).not_null())
}

fn posts_v2() -> TableSchema {
    TableSchema::new("posts")
        .column(
            ColumnSchema::new("id", SqlType::BigInt)
                .primary_key()
                .auto_increment(),
        )
        .column(ColumnSchema::new("author_id", SqlType::BigInt).not_null())
        .column(ColumnSchema::new("headline", SqlType::Varchar(255)).not_null())
        .column(
            ColumnSchema::new("slug", SqlType::Varchar(255))
                .not_null()
                .default(DefaultValue::String(String::new())),
        )
        .index(IndexSchema::new("posts_slug_idx", &["slug"]))
}

// =============================================================================
// Migrations
// =============================================================================

fn release_2_migrations() -> Vec<Migration> {
    vec![
        Migration::pre("0001_rename_post_title", |pool| {
            async move {
                sqlx::query(r#"ALTER TABLE "posts" RENAME COLUMN "title" TO "headline""#)
                    .execute(pool)
                    .await?;
                Ok(())
            }
            .boxed()
        }),
        Migration::post("0002_backfill_post_slug", |pool| {
            async move {
                sqlx::query(
                    r#"UPDATE "posts" SET "slug" = lower(replace("headline", ' ', '-'))
                       WHERE "slug" = ''"#,
                )
                .execute(pool)
                .await?;
                Ok(())
            }
            .boxed()
        }),
    ]
}

async fn print_ledger(migrator: &Migrator) -> Result<()> {
    for entry in migrator.ledger().entries().await? {
        let status = match entry.applied_at {
            Some(at) => at.format("%H:%M:%S").to_string(),
            None => "stamped".to_string(),
        };
        println!("  {:<28} {}", entry.id, status);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let pool: SqlitePool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    println!("=== Release 1 ===");
    let sync = SchemaSync::new().table(users()).table(posts_v1());
    let migrator = Migrator::new(pool.clone(), Vec::new());
    let report = migrator.migrate(Some(&sync)).await?;
    println!("mode: {:?}", report.mode);

    sqlx::query("INSERT INTO users (username) VALUES ('alice')")
        .execute(&pool)
        .await?;
    sqlx::query("INSERT INTO posts (author_id, title) VALUES (1, 'Hello World')")
        .execute(&pool)
        .await?;
    print_ledger(&migrator).await?;

    println!("\n=== Release 2 ===");
    let sync = SchemaSync::new().table(users()).table(posts_v2());
    let migrator = Migrator::new(pool.clone(), release_2_migrations());
    let report = migrator.migrate(Some(&sync)).await?;
    println!("mode: {:?}, applied: {:?}", report.mode, report.applied);
    print_ledger(&migrator).await?;

    let (headline, slug): (String, String) =
        sqlx::query_as(r#"SELECT "headline", "slug" FROM "posts""#)
            .fetch_one(&pool)
            .await?;
    println!("\npost: {headline:?} -> {slug:?}");
    println!("pending sync operations: {}", sync.plan(&pool).await?.len());

    println!("\n=== Release 2, restarted ===");
    let report = migrator.migrate(Some(&sync)).await?;
    println!("no-op: {}, skipped: {:?}", report.is_noop(), report.skipped);

    Ok(())
}
