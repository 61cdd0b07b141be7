//! Preconditions shared by both store implementations.
//!
//! Each check runs inside the unit of work, after the rows are locked and
//! before the first write.

use std::collections::BTreeSet;

use rubuy_core::{Balances, Currency, OrderId, OrderStatus, RequestStatus};
use rust_decimal::Decimal;

use crate::codec;
use crate::error::{Entity, MarketError, Result};
use crate::models::{Order, OrderUpdate, Shipment};

/// Fail with `InsufficientFunds` unless `balances` cover `amount` in `currency`.
pub fn ensure_funds(balances: &Balances, currency: Currency, amount: Decimal) -> Result<()> {
    if balances.covers(currency, amount) {
        Ok(())
    } else {
        Err(MarketError::InsufficientFunds {
            currency,
            needed: amount,
            available: balances.amount(currency),
        })
    }
}

/// Fail with `AlreadyProcessed` unless the request is still pending.
pub fn ensure_pending(status: RequestStatus, entity: Entity, id: i32) -> Result<()> {
    if status == RequestStatus::Pending {
        Ok(())
    } else {
        Err(MarketError::AlreadyProcessed(format!("{entity} {id} ({status})")))
    }
}

/// CNY actually taken for a withdrawal: the proportional amount, capped at
/// what the wallet still holds.
#[must_use]
pub fn withdrawal_cny_debit(balances: &Balances, requested: Decimal) -> Decimal {
    requested.min(balances.cny).max(Decimal::ZERO)
}

/// Validate the value carried by an order update.
pub fn validate_order_update(update: &OrderUpdate) -> Result<()> {
    match update {
        OrderUpdate::SetWeight { weight_kg } if *weight_kg < Decimal::ZERO => {
            Err(MarketError::validation("weight must not be negative"))
        }
        OrderUpdate::SetChinaFreightPrice { price_cny } if *price_cny < Decimal::ZERO => {
            Err(MarketError::validation("freight price must not be negative"))
        }
        OrderUpdate::AddPhoto { url } | OrderUpdate::RemovePhoto { url } if url.trim().is_empty() => {
            Err(MarketError::validation("photo url is required"))
        }
        _ => Ok(()),
    }
}

/// Apply an update to an order in place, checking state-dependent rules.
pub fn apply_order_update(order: &mut Order, update: &OrderUpdate) -> Result<()> {
    validate_order_update(update)?;
    match update {
        OrderUpdate::SetStatus { status } => order.status = *status,
        OrderUpdate::SetWeight { weight_kg } => order.weight_kg = Some(*weight_kg),
        OrderUpdate::SetChinaFreightPrice { price_cny } => {
            if order.china_freight_paid {
                return Err(MarketError::AlreadyProcessed(format!(
                    "china freight of order {}",
                    order.id
                )));
            }
            order.china_freight_cny = Some(*price_cny);
        }
        OrderUpdate::AddPhoto { url } => {
            if order.photos.iter().any(|p| p == url) {
                return Err(MarketError::Validation(format!(
                    "photo already attached to order {}",
                    order.id
                )));
            }
            order.photos.push(url.clone());
        }
        OrderUpdate::RemovePhoto { url } => {
            let before = order.photos.len();
            order.photos.retain(|p| p != url);
            if order.photos.len() == before {
                return Err(MarketError::NotFound(Entity::Order, order.id.as_i32()));
            }
        }
    }
    Ok(())
}

/// Price of an order's China-leg freight if it can be paid now.
pub fn china_freight_payable(order: &Order) -> Result<Decimal> {
    if order.china_freight_paid {
        return Err(MarketError::AlreadyProcessed(format!(
            "china freight of order {}",
            order.id
        )));
    }
    match order.china_freight_cny {
        Some(price) if price > Decimal::ZERO => Ok(price),
        _ => Err(MarketError::Validation(format!(
            "order {} has no china freight price to pay",
            order.id
        ))),
    }
}

/// Packaging cost of a shipment if it can be paid now.
pub fn packaging_payable(shipment: &Shipment) -> Result<Decimal> {
    if shipment.packaging_paid {
        return Err(MarketError::AlreadyProcessed(format!(
            "packaging of shipment {}",
            shipment.id
        )));
    }
    match shipment.packaging_cost_cny {
        Some(cost) if cost > Decimal::ZERO => Ok(cost),
        _ => Err(MarketError::Validation(format!(
            "shipment {} has no packaging cost to pay",
            shipment.id
        ))),
    }
}

/// Fail unless a packaging cost can still be assigned.
pub fn packaging_assignable(shipment: &Shipment, cost: Decimal) -> Result<()> {
    if cost < Decimal::ZERO {
        return Err(MarketError::validation("packaging cost must not be negative"));
    }
    if shipment.packaging_paid {
        return Err(MarketError::AlreadyProcessed(format!(
            "packaging of shipment {}",
            shipment.id
        )));
    }
    Ok(())
}

/// Order ids already listed by the user's shipments, decoded against the
/// user's own order ids.
pub fn consolidated_ids<'a>(
    stored: impl IntoIterator<Item = &'a str>,
    valid: &BTreeSet<OrderId>,
) -> BTreeSet<OrderId> {
    stored
        .into_iter()
        .flat_map(|raw| codec::decode(raw, valid).ids)
        .collect()
}

/// Fail with `Validation` when the order is already part of a shipment, by
/// status or by an existing shipment listing it.
pub fn ensure_unshipped(
    id: OrderId,
    status: OrderStatus,
    consolidated: &BTreeSet<OrderId>,
) -> Result<()> {
    if status.is_consolidated() || consolidated.contains(&id) {
        return Err(MarketError::Validation(format!(
            "order {id} is already in a shipment"
        )));
    }
    Ok(())
}

/// Fail with `AlreadyProcessed` when a mirror amount was already recorded.
pub fn ensure_mirror_open(recorded: Option<Decimal>, what: &str) -> Result<()> {
    match recorded {
        None => Ok(()),
        Some(_) => Err(MarketError::AlreadyProcessed(format!("RUB mirror of {what}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ensure_funds_reports_amounts() {
        let balances = Balances::new(dec!(0), dec!(50));
        let err = ensure_funds(&balances, Currency::Cny, dec!(280));
        assert!(matches!(
            err,
            Err(MarketError::InsufficientFunds { needed, available, .. })
                if needed == dec!(280) && available == dec!(50)
        ));
        assert!(ensure_funds(&balances, Currency::Cny, dec!(50)).is_ok());
    }

    #[test]
    fn test_ensure_pending() {
        assert!(ensure_pending(RequestStatus::Pending, Entity::Withdrawal, 1).is_ok());
        assert!(matches!(
            ensure_pending(RequestStatus::Approved, Entity::Withdrawal, 1),
            Err(MarketError::AlreadyProcessed(_))
        ));
    }

    #[test]
    fn test_withdrawal_cny_debit_is_capped() {
        let balances = Balances::new(dec!(1000), dec!(10));
        assert_eq!(withdrawal_cny_debit(&balances, dec!(7.69)), dec!(7.69));
        assert_eq!(withdrawal_cny_debit(&balances, dec!(76.92)), dec!(10));

        let empty = Balances::new(dec!(1000), dec!(-1));
        assert_eq!(withdrawal_cny_debit(&empty, dec!(5)), Decimal::ZERO);
    }

    #[test]
    fn test_validate_order_update() {
        assert!(validate_order_update(&OrderUpdate::SetWeight { weight_kg: dec!(-1) }).is_err());
        assert!(validate_order_update(&OrderUpdate::SetWeight { weight_kg: dec!(0) }).is_ok());
        assert!(
            validate_order_update(&OrderUpdate::AddPhoto {
                url: " ".to_string()
            })
            .is_err()
        );
    }

    #[test]
    fn test_shipped_orders_are_not_consolidated_twice() {
        let first = OrderId::new(12);
        let second = OrderId::new(13);
        let valid: BTreeSet<OrderId> = [first, second].into();
        let consolidated = consolidated_ids(["[12]"], &valid);

        assert!(matches!(
            ensure_unshipped(first, OrderStatus::Ordered, &consolidated),
            Err(MarketError::Validation(msg)) if msg == "order 12 is already in a shipment"
        ));
        assert!(ensure_unshipped(second, OrderStatus::InWarehouse, &consolidated).is_ok());
        assert!(ensure_unshipped(second, OrderStatus::Shipped, &consolidated).is_err());
    }

    #[test]
    fn test_mirror_recorded_once() {
        assert!(ensure_mirror_open(None, "order 1").is_ok());
        assert!(matches!(
            ensure_mirror_open(Some(dec!(10)), "order 1"),
            Err(MarketError::AlreadyProcessed(_))
        ));
    }
}
