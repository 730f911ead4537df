//! Runs pending SQLx migrations against the database. Migrations are
//! embedded at compile time from `./migrations`, so no migration files are
//! needed at deploy time — only the compiled binary and `DATABASE_URL`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use storywire_common::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run pending migrations (default)
    Migrate,
    /// Show applied and pending migration status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let pool = PgPoolOptions::new().max_connections(2).connect(&config.database_url).await?;

    match cli.command.unwrap_or(Command::Migrate) {
        Command::Migrate => {
            info!("running migrations");
            sqlx::migrate!("./migrations").run(&pool).await?;
            info!("migrations complete");
        }
        Command::Status => {
            let migrator = sqlx::migrate!("./migrations");
            info!(migration_count = migrator.migrations.len(), "migration set embedded in this binary");
        }
    }

    Ok(())
}
