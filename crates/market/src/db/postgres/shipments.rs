//! Shipment rows, freight charges and packaging.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use rubuy_core::{
    Currency, DeliveryTier, OrderId, OrderStatus, ShipmentId, ShipmentStatus, TrackingCode,
    TrackingNamespace, UserId,
};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection, PgPool};

use super::{fresh_code, map_unique_violation, users};
use crate::codec;
use crate::db::rules;
use crate::error::{Entity, MarketError, Result};
use crate::models::{NewShipment, Recipient, Shipment};
use crate::shipment::freight::FreightQuote;

macro_rules! shipment_columns {
    () => {
        "id, user_id, order_ids, delivery_tier, packaging, recipient_name, recipient_phone, \
         recipient_address, weight_kg, usd_per_kg, usd_total, cny_per_usd, cny_base, used_pct, \
         fee_cny, cny_charge, rub_equivalent, rub_charged, packaging_cost_cny, packaging_paid, \
         packaging_paid_at, packaging_rub, tracking_code, status, created_at"
    };
}

#[derive(FromRow)]
struct ShipmentRow {
    id: ShipmentId,
    user_id: UserId,
    order_ids: String,
    delivery_tier: DeliveryTier,
    packaging: Vec<String>,
    recipient_name: String,
    recipient_phone: String,
    recipient_address: String,
    weight_kg: Decimal,
    usd_per_kg: Decimal,
    usd_total: Decimal,
    cny_per_usd: Decimal,
    cny_base: Decimal,
    used_pct: Decimal,
    fee_cny: Decimal,
    cny_charge: Decimal,
    rub_equivalent: Decimal,
    rub_charged: Option<Decimal>,
    packaging_cost_cny: Option<Decimal>,
    packaging_paid: bool,
    packaging_paid_at: Option<DateTime<Utc>>,
    packaging_rub: Option<Decimal>,
    tracking_code: TrackingCode,
    status: ShipmentStatus,
    created_at: DateTime<Utc>,
}

impl From<ShipmentRow> for Shipment {
    fn from(row: ShipmentRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            order_ids_raw: row.order_ids,
            delivery_tier: row.delivery_tier,
            packaging: row.packaging,
            recipient: Recipient {
                name: row.recipient_name,
                phone: row.recipient_phone,
                address: row.recipient_address,
            },
            quote: FreightQuote {
                weight_kg: row.weight_kg,
                usd_per_kg: row.usd_per_kg,
                usd_total: row.usd_total,
                cny_per_usd: row.cny_per_usd,
                cny_base: row.cny_base,
                used_pct: row.used_pct,
                fee_cny: row.fee_cny,
                cny_charge: row.cny_charge,
                rub_equivalent: row.rub_equivalent,
            },
            rub_charged: row.rub_charged,
            packaging_cost_cny: row.packaging_cost_cny,
            packaging_paid: row.packaging_paid,
            packaging_paid_at: row.packaging_paid_at,
            packaging_rub: row.packaging_rub,
            tracking_code: row.tracking_code,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

fn convert(rows: Vec<ShipmentRow>) -> Vec<Shipment> {
    rows.into_iter().map(Shipment::from).collect()
}

pub(super) async fn fetch_for_user(conn: &mut PgConnection, user: UserId) -> Result<Vec<Shipment>> {
    let rows = sqlx::query_as::<_, ShipmentRow>(concat!(
        "SELECT ",
        shipment_columns!(),
        " FROM rubuy.shipments WHERE user_id = $1 ORDER BY id"
    ))
    .bind(user)
    .fetch_all(&mut *conn)
    .await?;
    Ok(convert(rows))
}

async fn lock(conn: &mut PgConnection, id: ShipmentId) -> Result<Shipment> {
    sqlx::query_as::<_, ShipmentRow>(concat!(
        "SELECT ",
        shipment_columns!(),
        " FROM rubuy.shipments WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .map(Shipment::from)
    .ok_or(MarketError::NotFound(Entity::Shipment, id.as_i32()))
}

pub(super) async fn create(pool: &PgPool, new: &NewShipment) -> Result<Shipment> {
    if new.order_ids.is_empty() {
        return Err(MarketError::validation("shipment has no orders"));
    }

    let mut tx = pool.begin().await?;
    let balances = users::lock(&mut tx, new.user_id).await?;

    // The user row lock serializes shipment creation per user, so the
    // consolidated set cannot change underneath this check.
    let owned: HashMap<OrderId, OrderStatus> = sqlx::query_as::<_, (OrderId, OrderStatus)>(
        "SELECT id, status FROM rubuy.orders WHERE user_id = $1",
    )
    .bind(new.user_id)
    .fetch_all(&mut *tx)
    .await?
    .into_iter()
    .collect();
    let stored: Vec<String> =
        sqlx::query_scalar::<_, String>("SELECT order_ids FROM rubuy.shipments WHERE user_id = $1")
            .bind(new.user_id)
            .fetch_all(&mut *tx)
            .await?;
    let valid: BTreeSet<OrderId> = owned.keys().copied().collect();
    let consolidated = rules::consolidated_ids(stored.iter().map(String::as_str), &valid);
    for id in &new.order_ids {
        let status = owned
            .get(id)
            .copied()
            .ok_or(MarketError::NotFound(Entity::Order, id.as_i32()))?;
        rules::ensure_unshipped(*id, status, &consolidated)?;
    }

    rules::ensure_funds(&balances, Currency::Cny, new.quote.cny_charge)?;
    let tracking_code = fresh_code(&mut tx, TrackingNamespace::Shipment).await?;
    users::apply_delta(&mut tx, new.user_id, Currency::Cny, -new.quote.cny_charge).await?;

    let quote = &new.quote;
    let row = sqlx::query_as::<_, ShipmentRow>(concat!(
        "INSERT INTO rubuy.shipments (user_id, order_ids, delivery_tier, packaging, \
         recipient_name, recipient_phone, recipient_address, weight_kg, usd_per_kg, usd_total, \
         cny_per_usd, cny_base, used_pct, fee_cny, cny_charge, rub_equivalent, tracking_code) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17) \
         RETURNING ",
        shipment_columns!()
    ))
    .bind(new.user_id)
    .bind(codec::encode(&new.order_ids))
    .bind(new.delivery_tier)
    .bind(&new.packaging)
    .bind(&new.recipient.name)
    .bind(&new.recipient.phone)
    .bind(&new.recipient.address)
    .bind(quote.weight_kg)
    .bind(quote.usd_per_kg)
    .bind(quote.usd_total)
    .bind(quote.cny_per_usd)
    .bind(quote.cny_base)
    .bind(quote.used_pct)
    .bind(quote.fee_cny)
    .bind(quote.cny_charge)
    .bind(quote.rub_equivalent)
    .bind(&tracking_code)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| map_unique_violation(e, "shipment tracking code"))?;
    tx.commit().await?;
    Ok(row.into())
}

pub(super) async fn get(pool: &PgPool, id: ShipmentId) -> Result<Shipment> {
    sqlx::query_as::<_, ShipmentRow>(concat!(
        "SELECT ",
        shipment_columns!(),
        " FROM rubuy.shipments WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .map(Shipment::from)
    .ok_or(MarketError::NotFound(Entity::Shipment, id.as_i32()))
}

pub(super) async fn for_user(pool: &PgPool, user: UserId) -> Result<Vec<Shipment>> {
    let mut conn = pool.acquire().await?;
    users::get_in(&mut conn, user).await?;
    fetch_for_user(&mut conn, user).await
}

pub(super) async fn pending(pool: &PgPool) -> Result<Vec<Shipment>> {
    let rows = sqlx::query_as::<_, ShipmentRow>(concat!(
        "SELECT ",
        shipment_columns!(),
        " FROM rubuy.shipments WHERE status = 'pending' ORDER BY created_at, id"
    ))
    .fetch_all(pool)
    .await?;
    Ok(convert(rows))
}

pub(super) async fn set_status(pool: &PgPool, id: ShipmentId, status: ShipmentStatus) -> Result<Shipment> {
    sqlx::query_as::<_, ShipmentRow>(concat!(
        "UPDATE rubuy.shipments SET status = $2 WHERE id = $1 RETURNING ",
        shipment_columns!()
    ))
    .bind(id)
    .bind(status)
    .fetch_optional(pool)
    .await?
    .map(Shipment::from)
    .ok_or(MarketError::NotFound(Entity::Shipment, id.as_i32()))
}

pub(super) async fn set_packaging_cost(pool: &PgPool, id: ShipmentId, cost_cny: Decimal) -> Result<Shipment> {
    let mut tx = pool.begin().await?;
    let shipment = lock(&mut tx, id).await?;
    rules::packaging_assignable(&shipment, cost_cny)?;

    let row = sqlx::query_as::<_, ShipmentRow>(concat!(
        "UPDATE rubuy.shipments SET packaging_cost_cny = $2 WHERE id = $1 RETURNING ",
        shipment_columns!()
    ))
    .bind(id)
    .bind(cost_cny)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(row.into())
}

pub(super) async fn pay_packaging(pool: &PgPool, user: UserId, id: ShipmentId) -> Result<Shipment> {
    let mut tx = pool.begin().await?;
    let balances = users::lock(&mut tx, user).await?;
    let shipment = lock(&mut tx, id).await?;
    if shipment.user_id != user {
        return Err(MarketError::NotFound(Entity::Shipment, id.as_i32()));
    }
    let cost = rules::packaging_payable(&shipment)?;
    rules::ensure_funds(&balances, Currency::Cny, cost)?;

    users::apply_delta(&mut tx, user, Currency::Cny, -cost).await?;
    let row = sqlx::query_as::<_, ShipmentRow>(concat!(
        "UPDATE rubuy.shipments SET packaging_paid = TRUE, packaging_paid_at = clock_timestamp() \
         WHERE id = $1 RETURNING ",
        shipment_columns!()
    ))
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(row.into())
}
