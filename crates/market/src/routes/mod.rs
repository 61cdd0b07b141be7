//! HTTP route handlers for the market API.
//!
//! Every authenticated route reads the caller from the `x-user-id` header.
//! Handlers only deserialize, delegate to a service and serialize.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                               - Liveness
//! GET    /health/ready                         - Readiness (store reachable)
//!
//! # Account
//! POST   /users                                - Register a user
//! GET    /me                                   - Current user with balances
//! GET    /me/history                           - Replayed balance history
//! POST   /replenishments                       - Request a top-up
//! POST   /withdrawals                          - Request a payout
//!
//! # Catalog and cart
//! POST   /products                             - Ingest a scraped listing
//! GET    /products/{id}                        - Product with models
//! GET    /cart                                 - Cart lines
//! POST   /cart                                 - Reserve stock into the cart
//! DELETE /cart/{model_id}                      - Release a cart entry
//!
//! # Orders
//! POST   /checkout                             - Turn lines into orders
//! GET    /orders                               - Caller's orders
//! GET    /orders/{id}                          - One order
//! POST   /orders/{id}/china-freight            - Pay China-leg freight
//!
//! # Shipments
//! POST   /shipments                            - Consolidate orders
//! GET    /shipments                            - Caller's shipments
//! GET    /shipments/{id}                       - One shipment
//! POST   /shipments/{id}/packaging             - Pay packaging
//!
//! # Admin (caller must be an administrator)
//! GET    /admin/replenishments                 - Pending top-ups
//! POST   /admin/replenishments/{id}/review     - Approve or reject
//! GET    /admin/withdrawals                    - Pending payouts
//! POST   /admin/withdrawals/{id}/review        - Approve or reject
//! PUT    /admin/users/{id}/balance             - Balance correction
//! PATCH  /admin/orders/{id}                    - Order update
//! GET    /admin/shipments                      - Pending shipments
//! PUT    /admin/shipments/{id}/status          - Set shipment status
//! PUT    /admin/shipments/{id}/packaging-cost  - Set packaging cost
//! ```

pub mod account;
pub mod admin;
pub mod cart;
pub mod catalog;
pub mod orders;
pub mod shipments;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{delete, get, patch, post, put},
};

use crate::db::Store;
use crate::rates::RateSource;
use crate::state::AppState;

/// Build the full router.
pub fn routes<S: Store, R: RateSource>() -> Router<AppState<S, R>> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness::<S, R>))
        .merge(account_routes())
        .merge(shop_routes())
        .nest("/admin", admin_routes())
}

fn account_routes<S: Store, R: RateSource>() -> Router<AppState<S, R>> {
    Router::new()
        .route("/users", post(account::register::<S, R>))
        .route("/me", get(account::me::<S, R>))
        .route("/me/history", get(account::history::<S, R>))
        .route("/replenishments", post(account::request_replenishment::<S, R>))
        .route("/withdrawals", post(account::request_withdrawal::<S, R>))
}

fn shop_routes<S: Store, R: RateSource>() -> Router<AppState<S, R>> {
    Router::new()
        .route("/products", post(catalog::ingest::<S, R>))
        .route("/products/{id}", get(catalog::show::<S, R>))
        .route("/cart", get(cart::show::<S, R>).post(cart::add::<S, R>))
        .route("/cart/{model_id}", delete(cart::remove::<S, R>))
        .route("/checkout", post(orders::checkout::<S, R>))
        .route("/orders", get(orders::index::<S, R>))
        .route("/orders/{id}", get(orders::show::<S, R>))
        .route("/orders/{id}/china-freight", post(orders::pay_china_freight::<S, R>))
        .route(
            "/shipments",
            get(shipments::index::<S, R>).post(shipments::create::<S, R>),
        )
        .route("/shipments/{id}", get(shipments::show::<S, R>))
        .route("/shipments/{id}/packaging", post(shipments::pay_packaging::<S, R>))
}

fn admin_routes<S: Store, R: RateSource>() -> Router<AppState<S, R>> {
    Router::new()
        .route("/replenishments", get(admin::pending_replenishments::<S, R>))
        .route(
            "/replenishments/{id}/review",
            post(admin::review_replenishment::<S, R>),
        )
        .route("/withdrawals", get(admin::pending_withdrawals::<S, R>))
        .route("/withdrawals/{id}/review", post(admin::review_withdrawal::<S, R>))
        .route("/users/{id}/balance", put(admin::correct_balance::<S, R>))
        .route("/orders/{id}", patch(admin::update_order::<S, R>))
        .route("/shipments", get(admin::pending_shipments::<S, R>))
        .route("/shipments/{id}/status", put(admin::set_shipment_status::<S, R>))
        .route(
            "/shipments/{id}/packaging-cost",
            put(admin::set_packaging_cost::<S, R>),
        )
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the store is not reachable.
async fn readiness<S: Store, R: RateSource>(State(state): State<AppState<S, R>>) -> StatusCode {
    match state.store().ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
