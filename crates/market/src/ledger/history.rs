//! Balance history derived from the ledger-affecting rows.
//!
//! There is no stored journal. The history is rebuilt on every request:
//! each source row is projected into a [`LedgerRecord`], the records are
//! ordered newest first, and the running balance is replayed backwards from
//! the live balance. Only records whose status is in [`SETTLED_STATUSES_V1`]
//! move the running balance; the others are listed without a balance.
//!
//! Administrative balance corrections are absolute writes that leave no row
//! behind, so after one the replay no longer ends at zero.

use chrono::{DateTime, Utc};
use rubuy_core::{Balances, Currency, RequestStatus};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::{Order, Replenishment, Shipment, Withdrawal};

/// Source of a ledger record, in tie-breaking order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Replenishment,
    Withdrawal,
    Order,
    ChinaFreight,
    ShipmentFreight,
    Packaging,
}

/// Normalized status of a ledger record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    Pending,
    Approved,
    Rejected,
    /// A charge that has already been taken.
    Paid,
}

/// Statuses whose records count toward the replayed balance.
pub const SETTLED_STATUSES_V1: &[LedgerStatus] = &[LedgerStatus::Approved, LedgerStatus::Paid];

impl LedgerStatus {
    #[must_use]
    pub fn is_settled(self) -> bool {
        SETTLED_STATUSES_V1.contains(&self)
    }
}

impl From<RequestStatus> for LedgerStatus {
    fn from(status: RequestStatus) -> Self {
        match status {
            RequestStatus::Pending => Self::Pending,
            RequestStatus::Approved => Self::Approved,
            RequestStatus::Rejected => Self::Rejected,
        }
    }
}

/// One balance-affecting event with signed deltas in both currencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerRecord {
    pub kind: EntryKind,
    pub source_id: i32,
    pub label: String,
    pub delta: Balances,
    pub at: DateTime<Utc>,
    pub status: LedgerStatus,
}

/// A record with the balance right after it, for settled records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub record: LedgerRecord,
    pub balance_after: Option<Balances>,
}

/// Replayed history, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct History {
    pub entries: Vec<HistoryEntry>,
    /// Balance before the oldest settled record.
    pub opening: Balances,
    pub current: Balances,
}

/// Consistent read of a user's balances and ledger-affecting rows.
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    pub balances: Balances,
    pub replenishments: Vec<Replenishment>,
    pub withdrawals: Vec<Withdrawal>,
    pub orders: Vec<Order>,
    pub shipments: Vec<Shipment>,
}

fn delta(rub: Decimal, cny: Decimal) -> Balances {
    Balances::new(rub, cny)
}

fn debit(rub: Option<Decimal>, cny: Decimal) -> Balances {
    Balances::new(-rub.unwrap_or_default(), -cny)
}

/// Project every source row into ledger records, in insertion order.
///
/// Insertion order is source order (replenishments, withdrawals, orders,
/// China freight, shipment freight, packaging) then ascending id.
#[must_use]
pub fn project(snapshot: &LedgerSnapshot) -> Vec<LedgerRecord> {
    let mut records = Vec::new();

    let mut replenishments: Vec<&Replenishment> = snapshot.replenishments.iter().collect();
    replenishments.sort_by_key(|r| r.id);
    records.extend(replenishments.into_iter().map(|r| {
        let status = LedgerStatus::from(r.status);
        LedgerRecord {
            kind: EntryKind::Replenishment,
            source_id: r.id.as_i32(),
            label: format!("Replenishment #{}", r.id),
            delta: delta(r.amount_rub, r.amount_cny),
            at: effective_at(status, r.processed_at, r.created_at),
            status,
        }
    }));

    let mut withdrawals: Vec<&Withdrawal> = snapshot.withdrawals.iter().collect();
    withdrawals.sort_by_key(|w| w.id);
    records.extend(withdrawals.into_iter().map(|w| {
        let status = LedgerStatus::from(w.status);
        LedgerRecord {
            kind: EntryKind::Withdrawal,
            source_id: w.id.as_i32(),
            label: format!("Withdrawal #{}", w.id),
            delta: debit(Some(w.amount_rub), w.amount_cny.unwrap_or_default()),
            at: effective_at(status, w.processed_at, w.created_at),
            status,
        }
    }));

    let mut orders: Vec<&Order> = snapshot.orders.iter().collect();
    orders.sort_by_key(|o| o.id);
    records.extend(orders.iter().map(|o| LedgerRecord {
        kind: EntryKind::Order,
        source_id: o.id.as_i32(),
        label: format!("Order #{} ({})", o.id, o.tracking_code),
        delta: debit(o.rub_charged, o.total_price_cny),
        at: o.created_at,
        status: LedgerStatus::Paid,
    }));
    records.extend(orders.iter().filter_map(|o| {
        let price = o.china_freight_cny.filter(|_| o.china_freight_paid)?;
        Some(LedgerRecord {
            kind: EntryKind::ChinaFreight,
            source_id: o.id.as_i32(),
            label: format!("China freight for order #{}", o.id),
            delta: debit(o.china_freight_rub, price),
            at: o.china_freight_paid_at.unwrap_or(o.created_at),
            status: LedgerStatus::Paid,
        })
    }));

    let mut shipments: Vec<&Shipment> = snapshot.shipments.iter().collect();
    shipments.sort_by_key(|s| s.id);
    records.extend(shipments.iter().map(|s| LedgerRecord {
        kind: EntryKind::ShipmentFreight,
        source_id: s.id.as_i32(),
        label: format!("Shipment {}", s.tracking_code),
        delta: debit(s.rub_charged, s.quote.cny_charge),
        at: s.created_at,
        status: LedgerStatus::Paid,
    }));
    records.extend(shipments.iter().filter_map(|s| {
        let cost = s.packaging_cost_cny.filter(|_| s.packaging_paid)?;
        Some(LedgerRecord {
            kind: EntryKind::Packaging,
            source_id: s.id.as_i32(),
            label: format!("Packaging for shipment {}", s.tracking_code),
            delta: debit(s.packaging_rub, cost),
            at: s.packaging_paid_at.unwrap_or(s.created_at),
            status: LedgerStatus::Paid,
        })
    }));

    records
}

fn effective_at(
    status: LedgerStatus,
    processed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
) -> DateTime<Utc> {
    if status.is_settled() {
        processed_at.unwrap_or(created_at)
    } else {
        created_at
    }
}

/// Order records newest first and replay balances backwards from `current`.
///
/// The sort is stable, so records sharing a timestamp keep insertion order.
#[must_use]
pub fn replay(current: Balances, mut records: Vec<LedgerRecord>) -> History {
    records.sort_by(|a, b| b.at.cmp(&a.at));

    let mut running = current;
    let entries = records
        .into_iter()
        .map(|record| {
            let balance_after = record.status.is_settled().then(|| {
                let after = running;
                running = running
                    .with_delta(Currency::Rub, -record.delta.rub)
                    .with_delta(Currency::Cny, -record.delta.cny);
                after
            });
            HistoryEntry {
                record,
                balance_after,
            }
        })
        .collect();

    History {
        entries,
        opening: running,
        current,
    }
}

/// Project and replay a snapshot.
#[must_use]
pub fn history(snapshot: &LedgerSnapshot) -> History {
    replay(snapshot.balances, project(snapshot))
}
