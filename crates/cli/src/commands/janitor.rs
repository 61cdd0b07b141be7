//! One-off janitor pass.

use std::time::Duration;

use rubuy_market::janitor;

use super::{CliError, connect};

/// Purge stale temporary listings once.
///
/// # Errors
///
/// Returns `CliError` if the database is unreachable or the purge fails.
pub async fn run_once(ttl_secs: Option<u64>) -> Result<(), CliError> {
    let (config, store) = connect().await?;
    let ttl = ttl_secs.map_or(config.janitor.temporary_model_ttl, Duration::from_secs);

    tracing::info!("Purging temporary listings older than {}s...", ttl.as_secs());
    let report = janitor::run_once(&store, ttl).await?;

    tracing::info!(
        "Janitor pass complete: {} models, {} products removed",
        report.models,
        report.products
    );
    Ok(())
}
