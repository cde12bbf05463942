//! # mcpforge Main Entry Point
//!
//! This is the main entry point for the mcpforge service.

use clap::{Parser, Subcommand};
use migration::{Migrator, MigratorTrait};

use mcpforge::{config::ConfigLoader, db, server, telemetry};

#[derive(Parser)]
#[command(name = "mcpforge", about = "API-to-MCP-server pipeline", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run migrations and start the API server (default)
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
    /// Print the effective configuration with secrets redacted
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = ConfigLoader::new().load()?;
    telemetry::init_tracing(&config)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            tracing::info!(profile = %config.profile, "Starting mcpforge");
            let pool = db::init_pool(&config).await?;
            server::run_server(config, pool).await
        }
        Command::Migrate => {
            let pool = db::init_pool(&config).await?;
            Migrator::up(&pool, None).await?;
            tracing::info!("Migrations applied");
            Ok(())
        }
        Command::Config => {
            println!("{}", config.redacted_json()?);
            Ok(())
        }
    }
}
