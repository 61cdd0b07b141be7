//! Account routes: registration, balances, history and wallet requests.

use axum::{Json, extract::State, http::StatusCode};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::db::Store;
use crate::error::Result;
use crate::ledger::history::History;
use crate::middleware::CurrentUser;
use crate::models::{Replenishment, User, Withdrawal};
use crate::rates::RateSource;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub name: String,
}

/// Register a regular user. Administrators are created through the CLI.
///
/// POST /users
pub async fn register<S: Store, R: RateSource>(
    State(state): State<AppState<S, R>>,
    Json(form): Json<RegisterForm>,
) -> Result<(StatusCode, Json<User>)> {
    let user = state.ledger().create_user(&form.name, false).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /me
pub async fn me<S: Store, R: RateSource>(
    State(state): State<AppState<S, R>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<User>> {
    Ok(Json(state.ledger().user(user).await?))
}

/// Replayed balance history, newest first.
///
/// GET /me/history
pub async fn history<S: Store, R: RateSource>(
    State(state): State<AppState<S, R>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<History>> {
    Ok(Json(state.ledger().history(user).await?))
}

#[derive(Debug, Deserialize)]
pub struct ReplenishmentForm {
    pub amount_rub: Decimal,
    pub payment_date: NaiveDate,
    #[serde(default)]
    pub receipt_ref: Option<String>,
}

/// POST /replenishments
pub async fn request_replenishment<S: Store, R: RateSource>(
    State(state): State<AppState<S, R>>,
    CurrentUser(user): CurrentUser,
    Json(form): Json<ReplenishmentForm>,
) -> Result<(StatusCode, Json<Replenishment>)> {
    let request = state
        .ledger()
        .request_replenishment(user, form.amount_rub, form.payment_date, form.receipt_ref)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalForm {
    pub amount_rub: Decimal,
    pub card_number: String,
    pub card_holder: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// POST /withdrawals
pub async fn request_withdrawal<S: Store, R: RateSource>(
    State(state): State<AppState<S, R>>,
    CurrentUser(user): CurrentUser,
    Json(form): Json<WithdrawalForm>,
) -> Result<(StatusCode, Json<Withdrawal>)> {
    let request = state
        .ledger()
        .request_withdrawal(user, form.amount_rub, &form.card_number, &form.card_holder, form.name)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}
