use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod import;
mod schemas;

#[derive(Debug, Parser)]
#[command(name = "specdb-cli")]
#[command(about = "Product specification ingestion command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database operations
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Import product documents from JSON files
    Import {
        /// Files holding one product document or a JSON array of them
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Import into an in-memory store and report what would change
        #[arg(long)]
        dry_run: bool,

        /// Maximum imports in flight (defaults to SPECDB_IMPORT_CONCURRENCY)
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Category schema operations
    Schemas {
        #[command(subcommand)]
        command: SchemaCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Verify the database is reachable
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[derive(Debug, Subcommand)]
enum SchemaCommands {
    /// Load and validate the category schemas file
    Check {
        /// Schemas file to check (defaults to SPECDB_SCHEMAS_PATH)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = specdb_core::load_app_config_from_env()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Db { command }) => run_db(&config, command).await?,
        Some(Commands::Import {
            files,
            dry_run,
            concurrency,
        }) => {
            let concurrency = concurrency.unwrap_or(config.import_concurrency);
            import::run_import(&config, &files, dry_run, concurrency).await?;
        }
        Some(Commands::Schemas {
            command: SchemaCommands::Check { path },
        }) => {
            let path = path.unwrap_or_else(|| config.schemas_path.clone());
            schemas::run_check(&path)?;
        }
        None => println!("specdb-cli ready; see --help"),
    }

    Ok(())
}

async fn run_db(config: &specdb_core::AppConfig, command: DbCommands) -> anyhow::Result<()> {
    let pool = specdb_db::connect_from_config(config).await?;
    match command {
        DbCommands::Ping => {
            specdb_db::ping(&pool).await?;
            println!("database reachable");
        }
        DbCommands::Migrate => {
            let applied = specdb_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
