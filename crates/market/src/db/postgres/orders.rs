//! Checkout, order administration and China-leg freight payment.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rubuy_core::{
    AddOnService, Currency, ModelId, OrderId, OrderStatus, TrackingCode, TrackingNamespace, UserId,
};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection, PgPool};

use super::{fresh_code, users};
use crate::db::{RepositoryError, rules};
use crate::error::{Entity, MarketError, Result};
use crate::models::{CartEntry, CheckoutReceipt, CheckoutRequest, Order, OrderUpdate};
use crate::settlement::allocation::{self, PricedLine};

macro_rules! order_columns {
    () => {
        "id, user_id, model_id, quantity, total_price_cny, services, tracking_code, status, \
         weight_kg, china_freight_cny, china_freight_paid, china_freight_paid_at, \
         china_freight_rub, rub_charged, photos, created_at"
    };
}

#[derive(FromRow)]
struct OrderRow {
    id: OrderId,
    user_id: UserId,
    model_id: ModelId,
    quantity: i32,
    total_price_cny: Decimal,
    services: Vec<String>,
    tracking_code: TrackingCode,
    status: OrderStatus,
    weight_kg: Option<Decimal>,
    china_freight_cny: Option<Decimal>,
    china_freight_paid: bool,
    china_freight_paid_at: Option<DateTime<Utc>>,
    china_freight_rub: Option<Decimal>,
    rub_charged: Option<Decimal>,
    photos: Vec<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> std::result::Result<Self, Self::Error> {
        let services = row
            .services
            .iter()
            .map(|s| s.parse::<AddOnService>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| {
                RepositoryError::DataCorruption(format!("order {}: {e}", row.id))
            })?;

        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            model_id: row.model_id,
            quantity: row.quantity,
            total_price_cny: row.total_price_cny,
            services,
            tracking_code: row.tracking_code,
            status: row.status,
            weight_kg: row.weight_kg,
            china_freight_cny: row.china_freight_cny,
            china_freight_paid: row.china_freight_paid,
            china_freight_paid_at: row.china_freight_paid_at,
            china_freight_rub: row.china_freight_rub,
            rub_charged: row.rub_charged,
            photos: row.photos,
            created_at: row.created_at,
        })
    }
}

fn convert(rows: Vec<OrderRow>) -> Result<Vec<Order>> {
    rows.into_iter()
        .map(|row| Order::try_from(row).map_err(MarketError::from))
        .collect()
}

pub(super) async fn fetch_for_user(conn: &mut PgConnection, user: UserId) -> Result<Vec<Order>> {
    let rows = sqlx::query_as::<_, OrderRow>(concat!(
        "SELECT ",
        order_columns!(),
        " FROM rubuy.orders WHERE user_id = $1 ORDER BY id"
    ))
    .bind(user)
    .fetch_all(&mut *conn)
    .await?;
    convert(rows)
}

async fn lock(conn: &mut PgConnection, id: OrderId) -> Result<Order> {
    let row = sqlx::query_as::<_, OrderRow>(concat!(
        "SELECT ",
        order_columns!(),
        " FROM rubuy.orders WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(MarketError::NotFound(Entity::Order, id.as_i32()))?;
    Ok(row.try_into()?)
}

pub(super) async fn checkout(
    pool: &PgPool,
    user: UserId,
    request: &CheckoutRequest,
) -> Result<CheckoutReceipt> {
    let mut tx = pool.begin().await?;
    let balances = users::lock(&mut tx, user).await?;

    let model_ids: Vec<ModelId> = request.lines.iter().map(|l| l.model_id).collect();
    let prices: HashMap<ModelId, Decimal> =
        sqlx::query_as::<_, (ModelId, Decimal)>("SELECT id, price FROM rubuy.models WHERE id = ANY($1)")
            .bind(&model_ids)
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .collect();
    let priced = request
        .lines
        .iter()
        .map(|line| {
            let unit_price = prices
                .get(&line.model_id)
                .copied()
                .ok_or(MarketError::NotFound(Entity::Model, line.model_id.as_i32()))?;
            Ok(PricedLine {
                model_id: line.model_id,
                unit_price,
                quantity: line.quantity,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let plan = allocation::plan(&priced, &request.services)?;
    rules::ensure_funds(&balances, Currency::Cny, plan.total())?;
    for line in &plan.lines {
        take_from_cart(&mut tx, user, line.model_id, line.quantity).await?;
    }
    let tracking_code = fresh_code(&mut tx, TrackingNamespace::Order).await?;

    users::apply_delta(&mut tx, user, Currency::Cny, -plan.total()).await?;

    let services: Vec<String> = request.services.iter().map(ToString::to_string).collect();
    let mut order_ids = Vec::with_capacity(plan.lines.len());
    let mut order_totals = Vec::with_capacity(plan.lines.len());
    for line in &plan.lines {
        let id = sqlx::query_scalar::<_, OrderId>(
            "INSERT INTO rubuy.orders (user_id, model_id, quantity, total_price_cny, services, tracking_code) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(user)
        .bind(line.model_id)
        .bind(line.quantity)
        .bind(line.total())
        .bind(&services)
        .bind(&tracking_code)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE rubuy.models SET state = 'accepted' WHERE id = $1")
            .bind(line.model_id)
            .execute(&mut *tx)
            .await?;

        order_ids.push(id);
        order_totals.push(line.total());
    }
    tx.commit().await?;

    Ok(CheckoutReceipt {
        order_ids,
        tracking_code,
        product_cost_cny: plan.product_cost,
        service_cost_cny: plan.service_cost,
        total_cny: plan.total(),
        order_totals_cny: order_totals,
    })
}

/// Take a checkout line's units from the user's cart holding, reserving any
/// units the cart does not cover straight from model stock.
///
/// Fails with `InsufficientStock` when stock cannot cover the shortfall; the
/// caller's transaction is then dropped and nothing is kept.
async fn take_from_cart(
    conn: &mut PgConnection,
    user: UserId,
    model: ModelId,
    quantity: i32,
) -> Result<()> {
    let held = sqlx::query_scalar::<_, i32>(
        "SELECT quantity FROM rubuy.cart_entries WHERE user_id = $1 AND model_id = $2 FOR UPDATE",
    )
    .bind(user)
    .bind(model)
    .fetch_optional(&mut *conn)
    .await?
    .map_or(CartEntry::Absent, |quantity| CartEntry::Present { quantity });

    let requested = held.shortfall(quantity);
    if requested > 0 {
        let taken = sqlx::query(
            "UPDATE rubuy.models SET stock = stock - $2 WHERE id = $1 AND stock >= $2",
        )
        .bind(model)
        .bind(requested)
        .execute(&mut *conn)
        .await?
        .rows_affected();
        if taken == 0 {
            let available =
                sqlx::query_scalar::<_, i32>("SELECT stock FROM rubuy.models WHERE id = $1")
                    .bind(model)
                    .fetch_optional(&mut *conn)
                    .await?
                    .ok_or(MarketError::NotFound(Entity::Model, model.as_i32()))?;
            return Err(MarketError::InsufficientStock {
                model,
                requested,
                available,
            });
        }
    }

    match held.consume(quantity) {
        CartEntry::Present { quantity } => {
            sqlx::query(
                "UPDATE rubuy.cart_entries SET quantity = $3 WHERE user_id = $1 AND model_id = $2",
            )
            .bind(user)
            .bind(model)
            .bind(quantity)
            .execute(&mut *conn)
            .await?;
        }
        CartEntry::Absent => {
            sqlx::query("DELETE FROM rubuy.cart_entries WHERE user_id = $1 AND model_id = $2")
                .bind(user)
                .bind(model)
                .execute(&mut *conn)
                .await?;
        }
    }
    Ok(())
}

pub(super) async fn get(pool: &PgPool, id: OrderId) -> Result<Order> {
    let row = sqlx::query_as::<_, OrderRow>(concat!(
        "SELECT ",
        order_columns!(),
        " FROM rubuy.orders WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(MarketError::NotFound(Entity::Order, id.as_i32()))?;
    Ok(row.try_into()?)
}

pub(super) async fn for_user(pool: &PgPool, user: UserId) -> Result<Vec<Order>> {
    let mut conn = pool.acquire().await?;
    users::get_in(&mut conn, user).await?;
    fetch_for_user(&mut conn, user).await
}

pub(super) async fn update(pool: &PgPool, id: OrderId, update: &OrderUpdate) -> Result<Order> {
    let mut tx = pool.begin().await?;
    let mut order = lock(&mut tx, id).await?;
    rules::apply_order_update(&mut order, update)?;

    let row = sqlx::query_as::<_, OrderRow>(concat!(
        "UPDATE rubuy.orders \
         SET status = $2, weight_kg = $3, china_freight_cny = $4, photos = $5 \
         WHERE id = $1 RETURNING ",
        order_columns!()
    ))
    .bind(id)
    .bind(order.status)
    .bind(order.weight_kg)
    .bind(order.china_freight_cny)
    .bind(&order.photos)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(row.try_into()?)
}

pub(super) async fn pay_china_freight(pool: &PgPool, user: UserId, id: OrderId) -> Result<Order> {
    let mut tx = pool.begin().await?;
    let balances = users::lock(&mut tx, user).await?;
    let order = lock(&mut tx, id).await?;
    if order.user_id != user {
        return Err(MarketError::NotFound(Entity::Order, id.as_i32()));
    }
    let price = rules::china_freight_payable(&order)?;
    rules::ensure_funds(&balances, Currency::Cny, price)?;

    users::apply_delta(&mut tx, user, Currency::Cny, -price).await?;
    let row = sqlx::query_as::<_, OrderRow>(concat!(
        "UPDATE rubuy.orders SET china_freight_paid = TRUE, china_freight_paid_at = clock_timestamp() \
         WHERE id = $1 RETURNING ",
        order_columns!()
    ))
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(row.try_into()?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row(services: &[&str]) -> OrderRow {
        OrderRow {
            id: OrderId::new(9),
            user_id: UserId::new(1),
            model_id: ModelId::new(2),
            quantity: 1,
            total_price_cny: Decimal::from(100),
            services: services.iter().map(ToString::to_string).collect(),
            tracking_code: TrackingCode::from_stored("RUB123456789".to_string()),
            status: OrderStatus::Ordered,
            weight_kg: None,
            china_freight_cny: None,
            china_freight_paid: false,
            china_freight_paid_at: None,
            china_freight_rub: None,
            rub_charged: None,
            photos: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_services_are_parsed() {
        let order = Order::try_from(row(&["photos", "inspection"])).unwrap();
        assert_eq!(
            order.services,
            vec![AddOnService::Photos, AddOnService::Inspection]
        );
    }

    #[test]
    fn test_unknown_service_is_corruption() {
        let err = Order::try_from(row(&["massage"])).unwrap_err();
        assert!(matches!(err, RepositoryError::DataCorruption(_)));
    }
}
