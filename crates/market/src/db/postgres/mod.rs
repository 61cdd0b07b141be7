//! `PostgreSQL` implementation of [`Store`].
//!
//! Queries are runtime-checked (`query_as` over `FromRow` rows) so the crate
//! builds without a live database. Every method opens one transaction and
//! locks the user row with `SELECT ... FOR UPDATE` before touching balances,
//! which serializes concurrent units of work per wallet.

mod catalog;
mod ledger;
mod orders;
mod shipments;
mod users;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rubuy_core::{
    Balances, Currency, ModelId, OrderId, ProductId, ProductListing, ReplenishmentId, ShipmentId,
    ShipmentStatus, TrackingCode, TrackingNamespace, UserId, WithdrawalId,
};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use super::{RepositoryError, Store};
use crate::error::Result;
use crate::ledger::history::LedgerSnapshot;
use crate::models::{
    CartEntry, CartLine, CheckoutReceipt, CheckoutRequest, Ingested, MirrorTarget, NewReplenishment,
    NewShipment, NewWithdrawal, Order, OrderUpdate, ProductDetail, PurgeReport, Replenishment,
    Review, Shipment, User, Withdrawal,
};
use crate::tracking;

/// Store backed by a `PostgreSQL` pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Advisory lock key for code allocation in one namespace.
const fn allocation_lock_key(namespace: TrackingNamespace) -> i64 {
    match namespace {
        TrackingNamespace::Order => 0x5255_0001,
        TrackingNamespace::Shipment => 0x5255_0002,
    }
}

/// Draw candidate codes and keep the first one not yet stored.
///
/// Takes a transaction-scoped advisory lock on the namespace first, so two
/// transactions cannot both pick the same unused code: the second waits until
/// the first commits its rows and then sees them. Order codes rely on this
/// alone because one checkout stores its code on several rows. Shipment codes
/// are also behind a unique index, surfaced as `Conflict` through
/// [`map_unique_violation`].
async fn fresh_code(conn: &mut PgConnection, namespace: TrackingNamespace) -> Result<TrackingCode> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(allocation_lock_key(namespace))
        .execute(&mut *conn)
        .await?;

    let candidates = tracking::candidates(namespace);
    let raw: Vec<String> = candidates.iter().map(|c| c.as_str().to_owned()).collect();

    let sql = match namespace {
        TrackingNamespace::Order => {
            "SELECT DISTINCT tracking_code FROM rubuy.orders WHERE tracking_code = ANY($1)"
        }
        TrackingNamespace::Shipment => {
            "SELECT tracking_code FROM rubuy.shipments WHERE tracking_code = ANY($1)"
        }
    };
    let taken: HashSet<TrackingCode> = sqlx::query_scalar::<_, String>(sql)
        .bind(&raw)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(TrackingCode::from_stored)
        .collect();

    tracking::first_unused(candidates, &taken).ok_or_else(|| {
        RepositoryError::Conflict("no free tracking code after retries".to_owned()).into()
    })
}

fn map_unique_violation(err: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(err)
}

impl Store for PgStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_user(&self, name: &str, is_admin: bool) -> Result<User> {
        users::create(&self.pool, name, is_admin).await
    }

    async fn user(&self, id: UserId) -> Result<User> {
        users::get(&self.pool, id).await
    }

    async fn adjust_balance(&self, user: UserId, currency: Currency, delta: Decimal) -> Result<Balances> {
        users::adjust_balance(&self.pool, user, currency, delta).await
    }

    async fn set_balance(&self, user: UserId, currency: Currency, amount: Decimal) -> Result<Balances> {
        users::set_balance(&self.pool, user, currency, amount).await
    }

    async fn record_mirror(&self, user: UserId, target: MirrorTarget, amount_rub: Decimal) -> Result<Balances> {
        ledger::record_mirror(&self.pool, user, target, amount_rub).await
    }

    async fn ledger_snapshot(&self, user: UserId) -> Result<LedgerSnapshot> {
        ledger::snapshot(&self.pool, user).await
    }

    async fn insert_replenishment(&self, new: NewReplenishment) -> Result<Replenishment> {
        ledger::insert_replenishment(&self.pool, new).await
    }

    async fn review_replenishment(&self, id: ReplenishmentId, review: &Review) -> Result<Replenishment> {
        ledger::review_replenishment(&self.pool, id, review).await
    }

    async fn pending_replenishments(&self) -> Result<Vec<Replenishment>> {
        ledger::pending_replenishments(&self.pool).await
    }

    async fn insert_withdrawal(&self, new: NewWithdrawal) -> Result<Withdrawal> {
        ledger::insert_withdrawal(&self.pool, new).await
    }

    async fn withdrawal(&self, id: WithdrawalId) -> Result<Withdrawal> {
        ledger::withdrawal(&self.pool, id).await
    }

    async fn review_withdrawal(&self, id: WithdrawalId, review: &Review, cny_debit: Decimal) -> Result<Withdrawal> {
        ledger::review_withdrawal(&self.pool, id, review, cny_debit).await
    }

    async fn pending_withdrawals(&self) -> Result<Vec<Withdrawal>> {
        ledger::pending_withdrawals(&self.pool).await
    }

    async fn ingest_listing(&self, listing: &ProductListing) -> Result<Ingested> {
        catalog::ingest(&self.pool, listing).await
    }

    async fn product(&self, id: ProductId) -> Result<ProductDetail> {
        catalog::product(&self.pool, id).await
    }

    async fn purge_temporary(&self, cutoff: DateTime<Utc>) -> Result<PurgeReport> {
        catalog::purge_temporary(&self.pool, cutoff).await
    }

    async fn reserve(&self, user: UserId, model: ModelId, quantity: i32) -> Result<CartLine> {
        catalog::reserve(&self.pool, user, model, quantity).await
    }

    async fn release(&self, user: UserId, model: ModelId) -> Result<i32> {
        catalog::release(&self.pool, user, model).await
    }

    async fn cart(&self, user: UserId) -> Result<Vec<CartLine>> {
        catalog::cart(&self.pool, user).await
    }

    async fn cart_entry(&self, user: UserId, model: ModelId) -> Result<CartEntry> {
        catalog::cart_entry(&self.pool, user, model).await
    }

    async fn checkout(&self, user: UserId, request: &CheckoutRequest) -> Result<CheckoutReceipt> {
        orders::checkout(&self.pool, user, request).await
    }

    async fn order(&self, id: OrderId) -> Result<Order> {
        orders::get(&self.pool, id).await
    }

    async fn user_orders(&self, user: UserId) -> Result<Vec<Order>> {
        orders::for_user(&self.pool, user).await
    }

    async fn update_order(&self, id: OrderId, update: &OrderUpdate) -> Result<Order> {
        orders::update(&self.pool, id, update).await
    }

    async fn pay_china_freight(&self, user: UserId, order: OrderId) -> Result<Order> {
        orders::pay_china_freight(&self.pool, user, order).await
    }

    async fn create_shipment(&self, new: &NewShipment) -> Result<Shipment> {
        shipments::create(&self.pool, new).await
    }

    async fn shipment(&self, id: ShipmentId) -> Result<Shipment> {
        shipments::get(&self.pool, id).await
    }

    async fn user_shipments(&self, user: UserId) -> Result<Vec<Shipment>> {
        shipments::for_user(&self.pool, user).await
    }

    async fn pending_shipments(&self) -> Result<Vec<Shipment>> {
        shipments::pending(&self.pool).await
    }

    async fn set_shipment_status(&self, id: ShipmentId, status: ShipmentStatus) -> Result<Shipment> {
        shipments::set_status(&self.pool, id, status).await
    }

    async fn set_packaging_cost(&self, id: ShipmentId, cost_cny: Decimal) -> Result<Shipment> {
        shipments::set_packaging_cost(&self.pool, id, cost_cny).await
    }

    async fn pay_packaging(&self, user: UserId, id: ShipmentId) -> Result<Shipment> {
        shipments::pay_packaging(&self.pool, user, id).await
    }
}
