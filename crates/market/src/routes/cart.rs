//! Cart routes over the inventory gate.

use axum::{
    Json,
    extract::{Path, State},
};
use rubuy_core::ModelId;
use serde::{Deserialize, Serialize};

use crate::db::Store;
use crate::error::Result;
use crate::middleware::CurrentUser;
use crate::models::CartLine;
use crate::rates::RateSource;
use crate::state::AppState;

/// GET /cart
pub async fn show<S: Store, R: RateSource>(
    State(state): State<AppState<S, R>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<CartLine>>> {
    Ok(Json(state.inventory().cart(user).await?))
}

#[derive(Debug, Deserialize)]
pub struct AddForm {
    pub model_id: ModelId,
    pub quantity: i32,
}

/// Reserve stock and add it to the cart. Returns the whole cart line.
///
/// POST /cart
pub async fn add<S: Store, R: RateSource>(
    State(state): State<AppState<S, R>>,
    CurrentUser(user): CurrentUser,
    Json(form): Json<AddForm>,
) -> Result<Json<CartLine>> {
    let line = state
        .inventory()
        .reserve(user, form.model_id, form.quantity)
        .await?;
    Ok(Json(line))
}

#[derive(Debug, Serialize)]
pub struct Released {
    pub model_id: ModelId,
    pub quantity: i32,
}

/// DELETE /cart/{model_id}
pub async fn remove<S: Store, R: RateSource>(
    State(state): State<AppState<S, R>>,
    CurrentUser(user): CurrentUser,
    Path(model_id): Path<ModelId>,
) -> Result<Json<Released>> {
    let quantity = state.inventory().release(user, model_id).await?;
    Ok(Json(Released { model_id, quantity }))
}
