//! Checkout and order routes.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use rubuy_core::OrderId;
use serde::Deserialize;

use crate::db::Store;
use crate::error::Result;
use crate::middleware::CurrentUser;
use crate::models::{CheckoutLine, CheckoutReceipt, Order};
use crate::rates::RateSource;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckoutForm {
    pub lines: Vec<CheckoutLine>,
    #[serde(default)]
    pub services: Vec<String>,
}

/// POST /checkout
pub async fn checkout<S: Store, R: RateSource>(
    State(state): State<AppState<S, R>>,
    CurrentUser(user): CurrentUser,
    Json(form): Json<CheckoutForm>,
) -> Result<(StatusCode, Json<CheckoutReceipt>)> {
    let receipt = state
        .settlement()
        .checkout(user, &form.lines, &form.services)
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// GET /orders
pub async fn index<S: Store, R: RateSource>(
    State(state): State<AppState<S, R>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<Order>>> {
    Ok(Json(state.settlement().user_orders(user).await?))
}

/// GET /orders/{id}
pub async fn show<S: Store, R: RateSource>(
    State(state): State<AppState<S, R>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    Ok(Json(state.settlement().order(user, id).await?))
}

/// POST /orders/{id}/china-freight
pub async fn pay_china_freight<S: Store, R: RateSource>(
    State(state): State<AppState<S, R>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    Ok(Json(state.settlement().pay_china_freight(user, id).await?))
}
