//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! rubuy-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `RUBUY_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! # Migration Files
//!
//! `crates/market/migrations/`, embedded at build time.

use super::{CliError, connect};

/// Apply pending market migrations.
///
/// # Errors
///
/// Returns `CliError` if the database is unreachable or a migration fails.
pub async fn run() -> Result<(), CliError> {
    let (_, store) = connect().await?;

    tracing::info!("Running market migrations...");
    sqlx::migrate!("../market/migrations")
        .run(store.pool())
        .await?;

    tracing::info!("Market migrations complete!");
    Ok(())
}
