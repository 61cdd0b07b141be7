//! User rows and balance writes.

use chrono::{DateTime, Utc};
use rubuy_core::{Balances, Currency, UserId};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection, PgPool};

use crate::error::{Entity, MarketError, Result};
use crate::models::User;

macro_rules! user_columns {
    () => {
        "id, name, is_admin, balance_rub, balance_cny, created_at"
    };
}

#[derive(FromRow)]
struct UserRow {
    id: UserId,
    name: String,
    is_admin: bool,
    balance_rub: Decimal,
    balance_cny: Decimal,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            is_admin: row.is_admin,
            balances: Balances::new(row.balance_rub, row.balance_cny),
            created_at: row.created_at,
        }
    }
}

pub(super) async fn create(pool: &PgPool, name: &str, is_admin: bool) -> Result<User> {
    let row = sqlx::query_as::<_, UserRow>(concat!(
        "INSERT INTO rubuy.users (name, is_admin) VALUES ($1, $2) RETURNING ",
        user_columns!()
    ))
    .bind(name)
    .bind(is_admin)
    .fetch_one(pool)
    .await?;
    Ok(row.into())
}

pub(super) async fn get(pool: &PgPool, id: UserId) -> Result<User> {
    sqlx::query_as::<_, UserRow>(concat!(
        "SELECT ",
        user_columns!(),
        " FROM rubuy.users WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .map(User::from)
    .ok_or(MarketError::NotFound(Entity::User, id.as_i32()))
}

/// Lock the user row for the rest of the transaction and return its balances.
pub(super) async fn lock(conn: &mut PgConnection, id: UserId) -> Result<Balances> {
    let row = sqlx::query_as::<_, (Decimal, Decimal)>(
        "SELECT balance_rub, balance_cny FROM rubuy.users WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(MarketError::NotFound(Entity::User, id.as_i32()))?;
    Ok(Balances::new(row.0, row.1))
}

/// Current balances, read on an open transaction without locking.
pub(super) async fn get_in(conn: &mut PgConnection, id: UserId) -> Result<Balances> {
    let (rub, cny) = sqlx::query_as::<_, (Decimal, Decimal)>(
        "SELECT balance_rub, balance_cny FROM rubuy.users WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(MarketError::NotFound(Entity::User, id.as_i32()))?;
    Ok(Balances::new(rub, cny))
}

/// Add `delta` to one balance of a locked user row.
pub(super) async fn apply_delta(
    conn: &mut PgConnection,
    id: UserId,
    currency: Currency,
    delta: Decimal,
) -> Result<Balances> {
    let sql = match currency {
        Currency::Rub => {
            "UPDATE rubuy.users SET balance_rub = balance_rub + $2 WHERE id = $1 \
             RETURNING balance_rub, balance_cny"
        }
        Currency::Cny => {
            "UPDATE rubuy.users SET balance_cny = balance_cny + $2 WHERE id = $1 \
             RETURNING balance_rub, balance_cny"
        }
    };
    let (rub, cny) = sqlx::query_as::<_, (Decimal, Decimal)>(sql)
        .bind(id)
        .bind(delta)
        .fetch_one(&mut *conn)
        .await?;
    Ok(Balances::new(rub, cny))
}

pub(super) async fn adjust_balance(
    pool: &PgPool,
    id: UserId,
    currency: Currency,
    delta: Decimal,
) -> Result<Balances> {
    let mut tx = pool.begin().await?;
    lock(&mut tx, id).await?;
    let balances = apply_delta(&mut tx, id, currency, delta).await?;
    tx.commit().await?;
    Ok(balances)
}

pub(super) async fn set_balance(
    pool: &PgPool,
    id: UserId,
    currency: Currency,
    amount: Decimal,
) -> Result<Balances> {
    let mut tx = pool.begin().await?;
    let current = lock(&mut tx, id).await?;
    let balances =
        apply_delta(&mut tx, id, currency, amount - current.amount(currency)).await?;
    tx.commit().await?;
    Ok(balances)
}
