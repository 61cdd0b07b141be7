//! Wallet requests, RUB mirror debits and the history snapshot.

use chrono::{DateTime, NaiveDate, Utc};
use rubuy_core::{Balances, Currency, ReplenishmentId, RequestStatus, UserId, WithdrawalId};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};

use super::{orders, shipments, users};
use crate::db::rules;
use crate::error::{Entity, MarketError, Result};
use crate::ledger::history::LedgerSnapshot;
use crate::models::{MirrorTarget, NewReplenishment, NewWithdrawal, Replenishment, Review, Withdrawal};

macro_rules! replenishment_columns {
    () => {
        "id, user_id, amount_rub, amount_cny, payment_date, receipt_ref, status, admin_id, \
         comment, created_at, processed_at"
    };
}

macro_rules! withdrawal_columns {
    () => {
        "id, user_id, amount_rub, amount_cny, card_number, card_holder, name, status, admin_id, \
         comment, created_at, processed_at"
    };
}

#[derive(FromRow)]
struct ReplenishmentRow {
    id: ReplenishmentId,
    user_id: UserId,
    amount_rub: Decimal,
    amount_cny: Decimal,
    payment_date: NaiveDate,
    receipt_ref: Option<String>,
    status: RequestStatus,
    admin_id: Option<UserId>,
    comment: Option<String>,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl From<ReplenishmentRow> for Replenishment {
    fn from(row: ReplenishmentRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            amount_rub: row.amount_rub,
            amount_cny: row.amount_cny,
            payment_date: row.payment_date,
            receipt_ref: row.receipt_ref,
            status: row.status,
            admin_id: row.admin_id,
            comment: row.comment,
            created_at: row.created_at,
            processed_at: row.processed_at,
        }
    }
}

#[derive(FromRow)]
struct WithdrawalRow {
    id: WithdrawalId,
    user_id: UserId,
    amount_rub: Decimal,
    amount_cny: Option<Decimal>,
    card_number: String,
    card_holder: String,
    name: Option<String>,
    status: RequestStatus,
    admin_id: Option<UserId>,
    comment: Option<String>,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl From<WithdrawalRow> for Withdrawal {
    fn from(row: WithdrawalRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            amount_rub: row.amount_rub,
            amount_cny: row.amount_cny,
            card_number: row.card_number,
            card_holder: row.card_holder,
            name: row.name,
            status: row.status,
            admin_id: row.admin_id,
            comment: row.comment,
            created_at: row.created_at,
            processed_at: row.processed_at,
        }
    }
}

// -----------------------------------------------------------------------------
// RUB mirror
// -----------------------------------------------------------------------------

/// Per-target SQL: lock the charged row and read (paid, recorded mirror),
/// then record the mirror amount.
const fn mirror_sql(target: MirrorTarget) -> (&'static str, &'static str, Entity, i32) {
    match target {
        MirrorTarget::Order(id) => (
            "SELECT TRUE, rub_charged FROM rubuy.orders WHERE id = $1 AND user_id = $2 FOR UPDATE",
            "UPDATE rubuy.orders SET rub_charged = $2 WHERE id = $1",
            Entity::Order,
            id.as_i32(),
        ),
        MirrorTarget::ChinaFreight(id) => (
            "SELECT china_freight_paid, china_freight_rub FROM rubuy.orders \
             WHERE id = $1 AND user_id = $2 FOR UPDATE",
            "UPDATE rubuy.orders SET china_freight_rub = $2 WHERE id = $1",
            Entity::Order,
            id.as_i32(),
        ),
        MirrorTarget::Shipment(id) => (
            "SELECT TRUE, rub_charged FROM rubuy.shipments WHERE id = $1 AND user_id = $2 FOR UPDATE",
            "UPDATE rubuy.shipments SET rub_charged = $2 WHERE id = $1",
            Entity::Shipment,
            id.as_i32(),
        ),
        MirrorTarget::Packaging(id) => (
            "SELECT packaging_paid, packaging_rub FROM rubuy.shipments \
             WHERE id = $1 AND user_id = $2 FOR UPDATE",
            "UPDATE rubuy.shipments SET packaging_rub = $2 WHERE id = $1",
            Entity::Shipment,
            id.as_i32(),
        ),
    }
}

pub(super) async fn record_mirror(
    pool: &PgPool,
    user: UserId,
    target: MirrorTarget,
    amount_rub: Decimal,
) -> Result<Balances> {
    let (select, update, entity, id) = mirror_sql(target);
    let mut tx = pool.begin().await?;
    let balances = users::lock(&mut tx, user).await?;

    let (paid, recorded) = sqlx::query_as::<_, (bool, Option<Decimal>)>(select)
        .bind(id)
        .bind(user)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(MarketError::NotFound(entity, id))?;
    if !paid {
        return Err(MarketError::Validation(format!("{target} is not paid")));
    }
    rules::ensure_mirror_open(recorded, &target.to_string())?;
    rules::ensure_funds(&balances, Currency::Rub, amount_rub)?;

    sqlx::query(update)
        .bind(id)
        .bind(amount_rub)
        .execute(&mut *tx)
        .await?;
    let balances = users::apply_delta(&mut tx, user, Currency::Rub, -amount_rub).await?;
    tx.commit().await?;
    Ok(balances)
}

/// Read balances and every ledger-affecting row from one snapshot.
pub(super) async fn snapshot(pool: &PgPool, user: UserId) -> Result<LedgerSnapshot> {
    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
        .execute(&mut *tx)
        .await?;

    let balances = users::get_in(&mut tx, user).await?;
    let replenishments = sqlx::query_as::<_, ReplenishmentRow>(concat!(
        "SELECT ",
        replenishment_columns!(),
        " FROM rubuy.replenishments WHERE user_id = $1 ORDER BY id"
    ))
    .bind(user)
    .fetch_all(&mut *tx)
    .await?
    .into_iter()
    .map(Replenishment::from)
    .collect();
    let withdrawals = sqlx::query_as::<_, WithdrawalRow>(concat!(
        "SELECT ",
        withdrawal_columns!(),
        " FROM rubuy.withdrawals WHERE user_id = $1 ORDER BY id"
    ))
    .bind(user)
    .fetch_all(&mut *tx)
    .await?
    .into_iter()
    .map(Withdrawal::from)
    .collect();
    let orders = orders::fetch_for_user(&mut tx, user).await?;
    let shipments = shipments::fetch_for_user(&mut tx, user).await?;
    tx.commit().await?;

    Ok(LedgerSnapshot {
        balances,
        replenishments,
        withdrawals,
        orders,
        shipments,
    })
}

// -----------------------------------------------------------------------------
// Replenishments
// -----------------------------------------------------------------------------

pub(super) async fn insert_replenishment(pool: &PgPool, new: NewReplenishment) -> Result<Replenishment> {
    let row = sqlx::query_as::<_, ReplenishmentRow>(concat!(
        "INSERT INTO rubuy.replenishments (user_id, amount_rub, amount_cny, payment_date, receipt_ref) \
         SELECT id, $2, $3, $4, $5 FROM rubuy.users WHERE id = $1 RETURNING ",
        replenishment_columns!()
    ))
    .bind(new.user_id)
    .bind(new.amount_rub)
    .bind(new.amount_cny)
    .bind(new.payment_date)
    .bind(new.receipt_ref)
    .fetch_optional(pool)
    .await?
    .ok_or(MarketError::NotFound(Entity::User, new.user_id.as_i32()))?;
    Ok(row.into())
}

pub(super) async fn review_replenishment(
    pool: &PgPool,
    id: ReplenishmentId,
    review: &Review,
) -> Result<Replenishment> {
    let mut tx = pool.begin().await?;
    let request: Replenishment = sqlx::query_as::<_, ReplenishmentRow>(concat!(
        "SELECT ",
        replenishment_columns!(),
        " FROM rubuy.replenishments WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(MarketError::NotFound(Entity::Replenishment, id.as_i32()))?
    .into();
    rules::ensure_pending(request.status, Entity::Replenishment, id.as_i32())?;
    users::lock(&mut tx, request.user_id).await?;

    let status = review.decision.resulting_status();
    if status == RequestStatus::Approved {
        users::apply_delta(&mut tx, request.user_id, Currency::Rub, request.amount_rub).await?;
        users::apply_delta(&mut tx, request.user_id, Currency::Cny, request.amount_cny).await?;
    }

    let row = sqlx::query_as::<_, ReplenishmentRow>(concat!(
        "UPDATE rubuy.replenishments \
         SET status = $2, admin_id = $3, comment = $4, processed_at = clock_timestamp() \
         WHERE id = $1 RETURNING ",
        replenishment_columns!()
    ))
    .bind(id)
    .bind(status)
    .bind(review.admin)
    .bind(review.comment.as_deref())
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(row.into())
}

pub(super) async fn pending_replenishments(pool: &PgPool) -> Result<Vec<Replenishment>> {
    let rows = sqlx::query_as::<_, ReplenishmentRow>(concat!(
        "SELECT ",
        replenishment_columns!(),
        " FROM rubuy.replenishments WHERE status = 'pending' ORDER BY created_at, id"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Replenishment::from).collect())
}

// -----------------------------------------------------------------------------
// Withdrawals
// -----------------------------------------------------------------------------

pub(super) async fn insert_withdrawal(pool: &PgPool, new: NewWithdrawal) -> Result<Withdrawal> {
    let mut tx = pool.begin().await?;
    let balances = users::lock(&mut tx, new.user_id).await?;
    rules::ensure_funds(&balances, Currency::Rub, new.amount_rub)?;

    let row = sqlx::query_as::<_, WithdrawalRow>(concat!(
        "INSERT INTO rubuy.withdrawals (user_id, amount_rub, card_number, card_holder, name) \
         VALUES ($1, $2, $3, $4, $5) RETURNING ",
        withdrawal_columns!()
    ))
    .bind(new.user_id)
    .bind(new.amount_rub)
    .bind(new.card_number)
    .bind(new.card_holder)
    .bind(new.name)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(row.into())
}

pub(super) async fn withdrawal(pool: &PgPool, id: WithdrawalId) -> Result<Withdrawal> {
    sqlx::query_as::<_, WithdrawalRow>(concat!(
        "SELECT ",
        withdrawal_columns!(),
        " FROM rubuy.withdrawals WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .map(Withdrawal::from)
    .ok_or(MarketError::NotFound(Entity::Withdrawal, id.as_i32()))
}

pub(super) async fn review_withdrawal(
    pool: &PgPool,
    id: WithdrawalId,
    review: &Review,
    cny_debit: Decimal,
) -> Result<Withdrawal> {
    let mut tx = pool.begin().await?;
    let request: Withdrawal = sqlx::query_as::<_, WithdrawalRow>(concat!(
        "SELECT ",
        withdrawal_columns!(),
        " FROM rubuy.withdrawals WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(MarketError::NotFound(Entity::Withdrawal, id.as_i32()))?
    .into();
    rules::ensure_pending(request.status, Entity::Withdrawal, id.as_i32())?;
    let balances = users::lock(&mut tx, request.user_id).await?;

    let status = review.decision.resulting_status();
    let mut amount_cny = None;
    if status == RequestStatus::Approved {
        rules::ensure_funds(&balances, Currency::Rub, request.amount_rub)?;
        let cny = rules::withdrawal_cny_debit(&balances, cny_debit);
        users::apply_delta(&mut tx, request.user_id, Currency::Rub, -request.amount_rub).await?;
        users::apply_delta(&mut tx, request.user_id, Currency::Cny, -cny).await?;
        amount_cny = Some(cny);
    }

    let row = sqlx::query_as::<_, WithdrawalRow>(concat!(
        "UPDATE rubuy.withdrawals \
         SET status = $2, amount_cny = $3, admin_id = $4, comment = $5, \
             processed_at = clock_timestamp() \
         WHERE id = $1 RETURNING ",
        withdrawal_columns!()
    ))
    .bind(id)
    .bind(status)
    .bind(amount_cny)
    .bind(review.admin)
    .bind(review.comment.as_deref())
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(row.into())
}

pub(super) async fn pending_withdrawals(pool: &PgPool) -> Result<Vec<Withdrawal>> {
    let rows = sqlx::query_as::<_, WithdrawalRow>(concat!(
        "SELECT ",
        withdrawal_columns!(),
        " FROM rubuy.withdrawals WHERE status = 'pending' ORDER BY created_at, id"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Withdrawal::from).collect())
}
