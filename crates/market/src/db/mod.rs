//! Persistence for the marketplace.
//!
//! # Database: `rubuy`
//!
//! ## Tables
//!
//! - `users` - Identity, admin flag and the two wallet balances
//! - `replenishments` - Wallet funding requests
//! - `withdrawals` - RUB payout requests
//! - `products` / `models` - Scraped catalog and purchasable variants
//! - `cart_entries` - Reserved quantities per user and model
//! - `orders` - Settled purchases
//! - `shipments` - Outbound consolidations of paid orders
//!
//! # Migrations
//!
//! Migrations are stored in `crates/market/migrations/` and run via:
//! ```bash
//! cargo run -p rubuy-cli -- migrate
//! ```
//!
//! # Units of work
//!
//! Every [`Store`] method is one atomic unit of work. Preconditions that need
//! the row locks (funds, stock, already-processed) are checked inside it and
//! abort the whole unit with their typed `MarketError`.

pub mod memory;
pub mod postgres;
mod rules;

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rubuy_core::{
    Balances, Currency, ModelId, OrderId, ProductId, ProductListing, ReplenishmentId, ShipmentId,
    ShipmentStatus, UserId, WithdrawalId,
};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use crate::error::Result;
use crate::ledger::history::LedgerSnapshot;
use crate::models::{
    CartEntry, CartLine, CheckoutReceipt, CheckoutRequest, Ingested, MirrorTarget, NewReplenishment,
    NewShipment, NewWithdrawal, Order, OrderUpdate, ProductDetail, PurgeReport, Replenishment,
    Review, Shipment, User, Withdrawal,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation or exhausted retry (e.g., tracking code space).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(
    database_url: &secrecy::SecretString,
) -> std::result::Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Atomic units of work over the marketplace tables.
pub trait Store: Clone + Send + Sync + 'static {
    /// Check connectivity.
    fn ping(&self) -> impl Future<Output = Result<()>> + Send;

    // -------------------------------------------------------------------------
    // Users and balances
    // -------------------------------------------------------------------------

    fn create_user(&self, name: &str, is_admin: bool) -> impl Future<Output = Result<User>> + Send;

    fn user(&self, id: UserId) -> impl Future<Output = Result<User>> + Send;

    /// Add `delta` to one balance under the user row lock.
    fn adjust_balance(
        &self,
        user: UserId,
        currency: Currency,
        delta: Decimal,
    ) -> impl Future<Output = Result<Balances>> + Send;

    /// Overwrite one balance. The only absolute balance write.
    fn set_balance(
        &self,
        user: UserId,
        currency: Currency,
        amount: Decimal,
    ) -> impl Future<Output = Result<Balances>> + Send;

    /// Debit RUB and record the amount on the charged row.
    ///
    /// Fails with `AlreadyProcessed` when the row already carries a mirror
    /// amount, and with `NotFound` unless the row belongs to `user`.
    fn record_mirror(
        &self,
        user: UserId,
        target: MirrorTarget,
        amount_rub: Decimal,
    ) -> impl Future<Output = Result<Balances>> + Send;

    /// Balances and every ledger-affecting row of one user, read consistently.
    fn ledger_snapshot(&self, user: UserId) -> impl Future<Output = Result<LedgerSnapshot>> + Send;

    // -------------------------------------------------------------------------
    // Replenishments and withdrawals
    // -------------------------------------------------------------------------

    fn insert_replenishment(
        &self,
        new: NewReplenishment,
    ) -> impl Future<Output = Result<Replenishment>> + Send;

    /// Settle a pending replenishment; approval credits both balances.
    fn review_replenishment(
        &self,
        id: ReplenishmentId,
        review: &Review,
    ) -> impl Future<Output = Result<Replenishment>> + Send;

    fn pending_replenishments(&self) -> impl Future<Output = Result<Vec<Replenishment>>> + Send;

    /// Insert a withdrawal after checking the amount against the RUB balance.
    fn insert_withdrawal(
        &self,
        new: NewWithdrawal,
    ) -> impl Future<Output = Result<Withdrawal>> + Send;

    fn withdrawal(&self, id: WithdrawalId) -> impl Future<Output = Result<Withdrawal>> + Send;

    /// Settle a pending withdrawal; approval debits the amount and `cny_debit`.
    fn review_withdrawal(
        &self,
        id: WithdrawalId,
        review: &Review,
        cny_debit: Decimal,
    ) -> impl Future<Output = Result<Withdrawal>> + Send;

    fn pending_withdrawals(&self) -> impl Future<Output = Result<Vec<Withdrawal>>> + Send;

    // -------------------------------------------------------------------------
    // Catalog and cart
    // -------------------------------------------------------------------------

    fn ingest_listing(
        &self,
        listing: &ProductListing,
    ) -> impl Future<Output = Result<Ingested>> + Send;

    fn product(&self, id: ProductId) -> impl Future<Output = Result<ProductDetail>> + Send;

    /// Delete unreferenced temporary models created before `cutoff`, then
    /// products left without models.
    fn purge_temporary(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = Result<PurgeReport>> + Send;

    /// Conditionally decrement stock and add the quantity to the cart.
    fn reserve(
        &self,
        user: UserId,
        model: ModelId,
        quantity: i32,
    ) -> impl Future<Output = Result<CartLine>> + Send;

    /// Remove a cart entry and return its quantity to stock.
    fn release(&self, user: UserId, model: ModelId) -> impl Future<Output = Result<i32>> + Send;

    fn cart(&self, user: UserId) -> impl Future<Output = Result<Vec<CartLine>>> + Send;

    fn cart_entry(
        &self,
        user: UserId,
        model: ModelId,
    ) -> impl Future<Output = Result<CartEntry>> + Send;

    // -------------------------------------------------------------------------
    // Orders
    // -------------------------------------------------------------------------

    /// Price, charge CNY and create the orders of one checkout.
    fn checkout(
        &self,
        user: UserId,
        request: &CheckoutRequest,
    ) -> impl Future<Output = Result<CheckoutReceipt>> + Send;

    fn order(&self, id: OrderId) -> impl Future<Output = Result<Order>> + Send;

    fn user_orders(&self, user: UserId) -> impl Future<Output = Result<Vec<Order>>> + Send;

    fn update_order(
        &self,
        id: OrderId,
        update: &OrderUpdate,
    ) -> impl Future<Output = Result<Order>> + Send;

    /// Charge the China-leg freight price of an order.
    fn pay_china_freight(
        &self,
        user: UserId,
        order: OrderId,
    ) -> impl Future<Output = Result<Order>> + Send;

    // -------------------------------------------------------------------------
    // Shipments
    // -------------------------------------------------------------------------

    /// Charge the freight and persist a shipment with a fresh tracking code.
    fn create_shipment(&self, new: &NewShipment) -> impl Future<Output = Result<Shipment>> + Send;

    fn shipment(&self, id: ShipmentId) -> impl Future<Output = Result<Shipment>> + Send;

    fn user_shipments(&self, user: UserId) -> impl Future<Output = Result<Vec<Shipment>>> + Send;

    fn pending_shipments(&self) -> impl Future<Output = Result<Vec<Shipment>>> + Send;

    fn set_shipment_status(
        &self,
        id: ShipmentId,
        status: ShipmentStatus,
    ) -> impl Future<Output = Result<Shipment>> + Send;

    fn set_packaging_cost(
        &self,
        id: ShipmentId,
        cost_cny: Decimal,
    ) -> impl Future<Output = Result<Shipment>> + Send;

    /// Charge the packaging cost and mark it paid.
    fn pay_packaging(
        &self,
        user: UserId,
        id: ShipmentId,
    ) -> impl Future<Output = Result<Shipment>> + Send;
}
