//! Rubuy CLI - Database migrations and operator tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! rubuy-cli migrate
//!
//! # Create a user, or an administrator
//! rubuy-cli user create -n "Anna"
//! rubuy-cli user create -n "Operator" --admin
//!
//! # Import a scraped listing
//! rubuy-cli catalog import listing.json
//!
//! # Run one janitor pass
//! rubuy-cli janitor
//!
//! # Print a user's replayed balance history
//! rubuy-cli history 42
//! ```
//!
//! All commands read the same environment as the market server.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "rubuy-cli")]
#[command(author, version, about = "Rubuy CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Manage the catalog
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
    /// Purge stale temporary listings once
    Janitor {
        /// Override the configured TTL, in seconds
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
    /// Print a user's balance history as JSON
    History {
        /// User id
        user_id: i32,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a new user
    Create {
        /// Display name
        #[arg(short, long)]
        name: String,

        /// Grant administrator rights
        #[arg(long)]
        admin: bool,
    },
}

#[derive(Subcommand)]
enum CatalogAction {
    /// Import a scraped listing from a JSON file
    Import {
        /// Path to the listing JSON
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CliError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::User { action } => match action {
            UserAction::Create { name, admin } => {
                commands::user::create(&name, admin).await?;
            }
        },
        Commands::Catalog { action } => match action {
            CatalogAction::Import { file } => {
                commands::catalog::import(&file).await?;
            }
        },
        Commands::Janitor { ttl_secs } => commands::janitor::run_once(ttl_secs).await?,
        Commands::History { user_id } => commands::history::show(user_id).await?,
    }
    Ok(())
}
