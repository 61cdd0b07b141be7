//! Balance history dump.

use rubuy_core::{Balances, UserId};
use rubuy_market::ledger::LedgerService;
use rubuy_market::rates::CbrRateClient;

use super::{CliError, connect};

/// Log a user's replayed history as pretty JSON.
///
/// # Errors
///
/// Returns `CliError` if the user does not exist or the database is unreachable.
pub async fn show(user_id: i32) -> Result<(), CliError> {
    let (config, store) = connect().await?;
    let ledger = LedgerService::new(store, CbrRateClient::new(&config.rates)?);

    let history = ledger.history(UserId::new(user_id)).await?;
    if history.opening != Balances::default() {
        tracing::warn!(
            "Replay does not start from zero for user {}; a balance correction was applied",
            user_id
        );
    }

    tracing::info!("{}", serde_json::to_string_pretty(&history)?);
    Ok(())
}
