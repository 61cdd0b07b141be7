//! Catalog ingestion, stock reservation and cart rows.

use chrono::{DateTime, Utc};
use rubuy_core::{ModelId, ModelState, ProductId, ProductListing, UserId};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection, PgPool};

use super::users;
use crate::error::{Entity, MarketError, Result};
use crate::models::{CartEntry, CartLine, Ingested, Model, Product, ProductDetail, PurgeReport};

#[derive(FromRow)]
struct ProductRow {
    id: ProductId,
    title: String,
    base_price: Decimal,
    temporary: bool,
    created_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            base_price: row.base_price,
            temporary: row.temporary,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct ModelRow {
    id: ModelId,
    product_id: ProductId,
    color_name: String,
    size_name: String,
    price: Decimal,
    stock: i32,
    image_url: Option<String>,
    state: ModelState,
    temporary: bool,
    created_at: DateTime<Utc>,
}

impl From<ModelRow> for Model {
    fn from(row: ModelRow) -> Self {
        Self {
            id: row.id,
            product_id: row.product_id,
            color_name: row.color_name,
            size_name: row.size_name,
            price: row.price,
            stock: row.stock,
            image_url: row.image_url,
            state: row.state,
            temporary: row.temporary,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct CartRow {
    user_id: UserId,
    model_id: ModelId,
    quantity: i32,
    unit_price: Decimal,
    added_at: DateTime<Utc>,
}

impl From<CartRow> for CartLine {
    fn from(row: CartRow) -> Self {
        Self {
            user_id: row.user_id,
            model_id: row.model_id,
            quantity: row.quantity,
            unit_price: row.unit_price,
            added_at: row.added_at,
        }
    }
}

const CART_SELECT: &str = "SELECT c.user_id, c.model_id, c.quantity, m.price AS unit_price, c.added_at \
     FROM rubuy.cart_entries c JOIN rubuy.models m ON m.id = c.model_id";

pub(super) async fn ingest(pool: &PgPool, listing: &ProductListing) -> Result<Ingested> {
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query_scalar::<_, ProductId>(
        "INSERT INTO rubuy.products (title, base_price, temporary) VALUES ($1, $2, $3) \
         ON CONFLICT (title, base_price) DO NOTHING RETURNING id",
    )
    .bind(&listing.title)
    .bind(listing.base_price)
    .bind(listing.temporary)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(product_id) = inserted else {
        let existing = sqlx::query_scalar::<_, ProductId>(
            "SELECT id FROM rubuy.products WHERE title = $1 AND base_price = $2",
        )
        .bind(&listing.title)
        .bind(listing.base_price)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        return Ok(Ingested {
            product_id: existing,
            created: false,
        });
    };

    for variant in &listing.models {
        sqlx::query(
            "INSERT INTO rubuy.models \
             (product_id, color_name, size_name, price, stock, image_url, temporary) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(product_id)
        .bind(&variant.color_name)
        .bind(&variant.size_name)
        .bind(variant.effective_price(listing.base_price))
        .bind(variant.stock)
        .bind(variant.image_url.as_deref())
        .bind(listing.temporary)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    Ok(Ingested {
        product_id,
        created: true,
    })
}

pub(super) async fn product(pool: &PgPool, id: ProductId) -> Result<ProductDetail> {
    let product: Product = sqlx::query_as::<_, ProductRow>(
        "SELECT id, title, base_price, temporary, created_at FROM rubuy.products WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(MarketError::NotFound(Entity::Product, id.as_i32()))?
    .into();

    let models = sqlx::query_as::<_, ModelRow>(
        "SELECT id, product_id, color_name, size_name, price, stock, image_url, state, temporary, \
         created_at FROM rubuy.models WHERE product_id = $1 ORDER BY id",
    )
    .bind(id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(Model::from)
    .collect();

    Ok(ProductDetail::new(product, models))
}

pub(super) async fn purge_temporary(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<PurgeReport> {
    let mut tx = pool.begin().await?;
    let models = sqlx::query(
        "DELETE FROM rubuy.models m \
         WHERE m.temporary AND m.created_at < $1 \
           AND NOT EXISTS (SELECT 1 FROM rubuy.cart_entries c WHERE c.model_id = m.id) \
           AND NOT EXISTS (SELECT 1 FROM rubuy.orders o WHERE o.model_id = m.id)",
    )
    .bind(cutoff)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let products = sqlx::query(
        "DELETE FROM rubuy.products p \
         WHERE p.temporary \
           AND NOT EXISTS (SELECT 1 FROM rubuy.models m WHERE m.product_id = p.id)",
    )
    .execute(&mut *tx)
    .await?
    .rows_affected();
    tx.commit().await?;

    Ok(PurgeReport { models, products })
}

async fn cart_line(conn: &mut PgConnection, user: UserId, model: ModelId) -> Result<CartLine> {
    let sql = format!("{CART_SELECT} WHERE c.user_id = $1 AND c.model_id = $2");
    sqlx::query_as::<_, CartRow>(&sql)
        .bind(user)
        .bind(model)
        .fetch_optional(&mut *conn)
        .await?
        .map(CartLine::from)
        .ok_or(MarketError::NotFound(Entity::CartEntry, model.as_i32()))
}

pub(super) async fn reserve(
    pool: &PgPool,
    user: UserId,
    model: ModelId,
    quantity: i32,
) -> Result<CartLine> {
    let mut tx = pool.begin().await?;
    users::lock(&mut tx, user).await?;

    // Conditional decrement: concurrent reservations can never oversell.
    let remaining = sqlx::query_scalar::<_, i32>(
        "UPDATE rubuy.models SET stock = stock - $2, state = 'in_cart' \
         WHERE id = $1 AND stock >= $2 RETURNING stock",
    )
    .bind(model)
    .bind(quantity)
    .fetch_optional(&mut *tx)
    .await?;

    if remaining.is_none() {
        let available = sqlx::query_scalar::<_, i32>("SELECT stock FROM rubuy.models WHERE id = $1")
            .bind(model)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(MarketError::NotFound(Entity::Model, model.as_i32()))?;
        return Err(MarketError::InsufficientStock {
            model,
            requested: quantity,
            available,
        });
    }

    sqlx::query(
        "INSERT INTO rubuy.cart_entries (user_id, model_id, quantity) VALUES ($1, $2, $3) \
         ON CONFLICT (user_id, model_id) \
         DO UPDATE SET quantity = rubuy.cart_entries.quantity + EXCLUDED.quantity",
    )
    .bind(user)
    .bind(model)
    .bind(quantity)
    .execute(&mut *tx)
    .await?;

    let line = cart_line(&mut tx, user, model).await?;
    tx.commit().await?;
    Ok(line)
}

pub(super) async fn release(pool: &PgPool, user: UserId, model: ModelId) -> Result<i32> {
    let mut tx = pool.begin().await?;
    let quantity = sqlx::query_scalar::<_, i32>(
        "DELETE FROM rubuy.cart_entries WHERE user_id = $1 AND model_id = $2 RETURNING quantity",
    )
    .bind(user)
    .bind(model)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(MarketError::NotFound(Entity::CartEntry, model.as_i32()))?;

    sqlx::query(
        "UPDATE rubuy.models m SET stock = stock + $2, \
         state = CASE \
             WHEN m.state = 'in_cart' \
                  AND NOT EXISTS (SELECT 1 FROM rubuy.cart_entries c WHERE c.model_id = m.id) \
             THEN 'available'::rubuy.model_state \
             ELSE m.state END \
         WHERE m.id = $1",
    )
    .bind(model)
    .bind(quantity)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(quantity)
}

pub(super) async fn cart(pool: &PgPool, user: UserId) -> Result<Vec<CartLine>> {
    let sql = format!("{CART_SELECT} WHERE c.user_id = $1 ORDER BY c.model_id");
    let rows = sqlx::query_as::<_, CartRow>(&sql)
        .bind(user)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(CartLine::from).collect())
}

pub(super) async fn cart_entry(pool: &PgPool, user: UserId, model: ModelId) -> Result<CartEntry> {
    let held = sqlx::query_scalar::<_, i32>(
        "SELECT quantity FROM rubuy.cart_entries WHERE user_id = $1 AND model_id = $2",
    )
    .bind(user)
    .bind(model)
    .fetch_optional(pool)
    .await?;
    Ok(held.map_or(CartEntry::Absent, |quantity| CartEntry::Present { quantity }))
}
