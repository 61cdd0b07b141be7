//! Administrator routes.
//!
//! The services reject callers that are not administrators with 403.

use axum::{
    Json,
    extract::{Path, State},
};
use rubuy_core::{
    Balances, Currency, Decision, OrderId, ReplenishmentId, ShipmentId, ShipmentStatus, UserId,
    WithdrawalId,
};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::db::Store;
use crate::error::Result;
use crate::middleware::CurrentUser;
use crate::models::{Order, OrderUpdate, Replenishment, Shipment, ShipmentView, Withdrawal};
use crate::rates::RateSource;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ReviewForm {
    pub decision: Decision,
    #[serde(default)]
    pub comment: Option<String>,
}

/// GET /admin/replenishments
pub async fn pending_replenishments<S: Store, R: RateSource>(
    State(state): State<AppState<S, R>>,
    CurrentUser(admin): CurrentUser,
) -> Result<Json<Vec<Replenishment>>> {
    Ok(Json(state.ledger().pending_replenishments(admin).await?))
}

/// POST /admin/replenishments/{id}/review
pub async fn review_replenishment<S: Store, R: RateSource>(
    State(state): State<AppState<S, R>>,
    CurrentUser(admin): CurrentUser,
    Path(id): Path<ReplenishmentId>,
    Json(form): Json<ReviewForm>,
) -> Result<Json<Replenishment>> {
    let reviewed = state
        .ledger()
        .review_replenishment(admin, id, form.decision, form.comment)
        .await?;
    Ok(Json(reviewed))
}

/// GET /admin/withdrawals
pub async fn pending_withdrawals<S: Store, R: RateSource>(
    State(state): State<AppState<S, R>>,
    CurrentUser(admin): CurrentUser,
) -> Result<Json<Vec<Withdrawal>>> {
    Ok(Json(state.ledger().pending_withdrawals(admin).await?))
}

/// POST /admin/withdrawals/{id}/review
pub async fn review_withdrawal<S: Store, R: RateSource>(
    State(state): State<AppState<S, R>>,
    CurrentUser(admin): CurrentUser,
    Path(id): Path<WithdrawalId>,
    Json(form): Json<ReviewForm>,
) -> Result<Json<Withdrawal>> {
    let reviewed = state
        .ledger()
        .review_withdrawal(admin, id, form.decision, form.comment)
        .await?;
    Ok(Json(reviewed))
}

#[derive(Debug, Deserialize)]
pub struct BalanceForm {
    pub currency: Currency,
    pub amount: Decimal,
}

/// Overwrite one balance of a user.
///
/// PUT /admin/users/{id}/balance
pub async fn correct_balance<S: Store, R: RateSource>(
    State(state): State<AppState<S, R>>,
    CurrentUser(admin): CurrentUser,
    Path(user): Path<UserId>,
    Json(form): Json<BalanceForm>,
) -> Result<Json<Balances>> {
    let balances = state
        .ledger()
        .correct_balance(admin, user, form.currency, form.amount)
        .await?;
    Ok(Json(balances))
}

/// PATCH /admin/orders/{id}
pub async fn update_order<S: Store, R: RateSource>(
    State(state): State<AppState<S, R>>,
    CurrentUser(admin): CurrentUser,
    Path(id): Path<OrderId>,
    Json(update): Json<OrderUpdate>,
) -> Result<Json<Order>> {
    Ok(Json(state.settlement().update_order(admin, id, &update).await?))
}

/// GET /admin/shipments
pub async fn pending_shipments<S: Store, R: RateSource>(
    State(state): State<AppState<S, R>>,
    CurrentUser(admin): CurrentUser,
) -> Result<Json<Vec<ShipmentView>>> {
    Ok(Json(state.shipments().pending_shipments(admin).await?))
}

#[derive(Debug, Deserialize)]
pub struct StatusForm {
    pub status: ShipmentStatus,
}

/// PUT /admin/shipments/{id}/status
pub async fn set_shipment_status<S: Store, R: RateSource>(
    State(state): State<AppState<S, R>>,
    CurrentUser(admin): CurrentUser,
    Path(id): Path<ShipmentId>,
    Json(form): Json<StatusForm>,
) -> Result<Json<Shipment>> {
    Ok(Json(state.shipments().set_status(admin, id, form.status).await?))
}

#[derive(Debug, Deserialize)]
pub struct PackagingCostForm {
    pub cost_cny: Decimal,
}

/// PUT /admin/shipments/{id}/packaging-cost
pub async fn set_packaging_cost<S: Store, R: RateSource>(
    State(state): State<AppState<S, R>>,
    CurrentUser(admin): CurrentUser,
    Path(id): Path<ShipmentId>,
    Json(form): Json<PackagingCostForm>,
) -> Result<Json<Shipment>> {
    let shipment = state
        .shipments()
        .set_packaging_cost(admin, id, form.cost_cny)
        .await?;
    Ok(Json(shipment))
}
