//! # Command Line Interface
//!
//! `serve` runs the API. The remaining commands are one-shot administration
//! tasks against the configured database.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::auth::TokenService;
use crate::config::{AppConfig, DatabaseConfig};
use crate::observability::{init_logging, init_observability};
use crate::storage::{
    applied_migration_versions, create_pool, run_migrations, OwnerDirectory, SqlxUserRepository,
};

#[derive(Debug, Parser)]
#[command(name = "certplane")]
#[command(about = "Certplane TLS certificate lifecycle service")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database URL override
    #[arg(long, global = true)]
    pub database_url: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the API server (the default)
    Serve {
        /// Use a throwaway in-memory database
        #[arg(long)]
        ephemeral: bool,
    },

    /// Apply pending database migrations
    Migrate,

    /// Register a user that can own certificates
    CreateUser {
        #[arg(long)]
        name: String,

        #[arg(long)]
        email: String,
    },

    /// Mint a bearer token for an existing user
    IssueToken {
        #[arg(long)]
        user_id: i64,
    },
}

/// Parse arguments and run the selected command
pub async fn run_cli() -> anyhow::Result<()> {
    run(Cli::parse()).await
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = AppConfig::load(cli.config.as_deref())?;

    if let Some(url) = cli.database_url {
        config.database.url = url;
    }

    match cli.command.unwrap_or(Commands::Serve { ephemeral: false }) {
        Commands::Serve { ephemeral } => {
            if ephemeral {
                config.database = DatabaseConfig::in_memory();
            }
            init_observability(&config.observability)?;
            tracing::info!(ephemeral, "Starting Certplane API server");
            crate::startup::run_server(config).await?;
        }

        Commands::Migrate => {
            init_logging(&config.observability)?;
            config.database.auto_migrate = false;
            let pool = create_pool(&config.database).await?;
            run_migrations(&pool).await?;
            let applied = applied_migration_versions(&pool).await?;
            println!("Applied migrations: {:?}", applied);
        }

        Commands::CreateUser { name, email } => {
            init_logging(&config.observability)?;
            let pool = create_pool(&config.database).await?;
            let owner = SqlxUserRepository::new(pool).create(&name, &email).await?;
            println!("Created user {} ({} <{}>)", owner.id, owner.name, owner.email);
        }

        Commands::IssueToken { user_id } => {
            init_logging(&config.observability)?;
            let pool = create_pool(&config.database).await?;
            let owner = SqlxUserRepository::new(pool)
                .get_owner(user_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("user {} does not exist", user_id))?;

            let token = TokenService::new(&config.auth).issue(owner.id)?;
            println!("{}", token);
        }
    }

    Ok(())
}
