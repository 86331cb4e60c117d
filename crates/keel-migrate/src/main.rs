//! keel-migrate CLI
//!
//! Inspects and initializes the migration ledger of a SQLite database.
//! Migrations themselves are code and run from the application through
//! `Migrator` or `Setup`.

use std::str::FromStr;

use clap::{Parser, Subcommand};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use keel_migrate::prelude::*;

/// Run-once schema migrations for SQLite.
#[derive(Parser)]
#[command(name = "keel-migrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL.
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
    database: String,

    /// Ledger table name.
    #[arg(long, env = "KEEL_LEDGER_TABLE", default_value = "migrations")]
    ledger_table: String,

    /// Ledger ID column name.
    #[arg(long, env = "KEEL_LEDGER_COLUMN", default_value = "id")]
    ledger_column: String,

    /// Ledger ID column size.
    #[arg(long, default_value_t = 255)]
    ledger_column_size: usize,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the ledger table if it does not exist.
    Init,

    /// List the ledger rows.
    ShowMigrations {
        /// Print the rows as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show whether the next run will bootstrap or apply incrementally.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let options = SqliteConnectOptions::from_str(&cli.database)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    let config = LedgerConfig::new()
        .table_name(cli.ledger_table)
        .column_name(cli.ledger_column)
        .column_size(cli.ledger_column_size);
    let migrator = Migrator::new(pool, Vec::new()).with_ledger_config(config);
    let ledger = migrator.ledger();

    match cli.command {
        Commands::Init => {
            info!("Initializing migration ledger...");
            ledger.ensure_table().await?;
            info!(
                table = %ledger.config().table_name,
                "Ledger table ready"
            );
        }

        Commands::ShowMigrations { json } => {
            ledger.ensure_table().await?;
            let entries = ledger.entries().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                info!("No migrations have been applied yet.");
            } else {
                println!("\nLedger {}:", ledger.config().table_name);
                println!("{:-<60}", "");
                for entry in &entries {
                    println!(" {}", describe_entry(entry));
                }
                println!();
            }
        }

        Commands::Status => {
            ledger.ensure_table().await?;
            let rows = ledger.count().await?;
            let next = if migrator.needs_bootstrap().await? {
                "bootstrap (schema will be created by auto-sync)"
            } else {
                "incremental (pending migrations will run around auto-sync)"
            };
            println!("Ledger table: {} ({} rows)", ledger.config().table_name, rows);
            println!("Next run:     {next}");
        }
    }

    Ok(())
}

fn describe_entry(entry: &LedgerEntry) -> String {
    match entry.applied_at {
        Some(at) if entry.is_bootstrap() => {
            format!("[B] {} (bootstrapped {})", entry.id, at.format("%Y-%m-%d %H:%M:%S"))
        }
        Some(at) => format!("[X] {} ({})", entry.id, at.format("%Y-%m-%d %H:%M:%S")),
        None => format!("[S] {} (stamped, not run)", entry.id),
    }
}
