//! CLI subcommands.

pub mod catalog;
pub mod history;
pub mod janitor;
pub mod migrate;
pub mod user;

use rubuy_market::config::{ConfigError, MarketConfig};
use rubuy_market::db::{self, PgStore};
use rubuy_market::error::MarketError;
use rubuy_market::rates::RateError;
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("{0}")]
    Market(#[from] MarketError),

    #[error("Rate client error: {0}")]
    Rates(#[from] RateError),

    #[error("Cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Load configuration and connect to the market database.
async fn connect() -> Result<(MarketConfig, PgStore), CliError> {
    let config = MarketConfig::from_env()?;
    tracing::info!("Connecting to market database...");
    let pool = db::create_pool(&config.database_url).await?;
    Ok((config, PgStore::new(pool)))
}
