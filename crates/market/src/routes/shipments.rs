//! Shipment routes.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use rubuy_core::ShipmentId;

use crate::db::Store;
use crate::error::Result;
use crate::middleware::CurrentUser;
use crate::models::{Shipment, ShipmentView};
use crate::rates::RateSource;
use crate::shipment::{ShipmentReceipt, ShipmentRequest};
use crate::state::AppState;

/// POST /shipments
pub async fn create<S: Store, R: RateSource>(
    State(state): State<AppState<S, R>>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<ShipmentRequest>,
) -> Result<(StatusCode, Json<ShipmentReceipt>)> {
    let receipt = state.shipments().create(user, request).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// GET /shipments
pub async fn index<S: Store, R: RateSource>(
    State(state): State<AppState<S, R>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<ShipmentView>>> {
    Ok(Json(state.shipments().user_shipments(user).await?))
}

/// GET /shipments/{id}
pub async fn show<S: Store, R: RateSource>(
    State(state): State<AppState<S, R>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ShipmentId>,
) -> Result<Json<ShipmentView>> {
    Ok(Json(state.shipments().shipment(user, id).await?))
}

/// POST /shipments/{id}/packaging
pub async fn pay_packaging<S: Store, R: RateSource>(
    State(state): State<AppState<S, R>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ShipmentId>,
) -> Result<Json<Shipment>> {
    Ok(Json(state.shipments().pay_packaging(user, id).await?))
}
