//! Catalog routes.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use rubuy_core::{ProductId, ProductListing};

use crate::db::Store;
use crate::error::Result;
use crate::middleware::CurrentUser;
use crate::models::{Ingested, ProductDetail};
use crate::rates::RateSource;
use crate::state::AppState;

/// Ingest a scraped listing; 200 when it already existed.
///
/// POST /products
pub async fn ingest<S: Store, R: RateSource>(
    State(state): State<AppState<S, R>>,
    CurrentUser(_): CurrentUser,
    Json(listing): Json<ProductListing>,
) -> Result<(StatusCode, Json<Ingested>)> {
    let ingested = state.catalog().ingest(&listing).await?;
    let status = if ingested.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(ingested)))
}

/// GET /products/{id}
pub async fn show<S: Store, R: RateSource>(
    State(state): State<AppState<S, R>>,
    CurrentUser(_): CurrentUser,
    Path(id): Path<ProductId>,
) -> Result<Json<ProductDetail>> {
    Ok(Json(state.catalog().product(id).await?))
}
