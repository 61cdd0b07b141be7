//! User management commands.
//!
//! # Usage
//!
//! ```bash
//! rubuy-cli user create -n "Anna"
//! rubuy-cli user create -n "Operator" --admin
//! ```

use rubuy_core::UserId;
use rubuy_market::ledger::LedgerService;
use rubuy_market::rates::CbrRateClient;

use super::{CliError, connect};

/// Create a user with empty wallets.
///
/// # Returns
///
/// The ID of the created user.
///
/// # Errors
///
/// Returns `CliError` if the name is blank or the database is unreachable.
pub async fn create(name: &str, is_admin: bool) -> Result<UserId, CliError> {
    let (config, store) = connect().await?;
    let ledger = LedgerService::new(store, CbrRateClient::new(&config.rates)?);

    tracing::info!("Creating user: {} (admin: {})", name, is_admin);
    let user = ledger.create_user(name, is_admin).await?;

    tracing::info!("User created successfully! ID: {}, Name: {}", user.id, user.name);
    Ok(user.id)
}
