//! Checkout pricing: product cost per line plus a pro-rata share of add-on services.

use std::collections::BTreeSet;

use rubuy_core::{AddOnService, ModelId};
use rust_decimal::Decimal;

use crate::error::MarketError;
use crate::rates::money;

/// A checkout line with the model's current unit price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricedLine {
    pub model_id: ModelId,
    pub unit_price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedLine {
    pub model_id: ModelId,
    pub quantity: i32,
    pub product_cost: Decimal,
    pub service_cost: Decimal,
}

impl PlannedLine {
    /// Final order price.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.product_cost + self.service_cost
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutPlan {
    pub lines: Vec<PlannedLine>,
    pub product_cost: Decimal,
    pub service_cost: Decimal,
}

impl CheckoutPlan {
    /// Amount charged to the CNY balance.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.product_cost + self.service_cost
    }
}

/// Combined per-unit price of the selected services.
#[must_use]
pub fn service_unit_cost(services: &BTreeSet<AddOnService>) -> Decimal {
    services.iter().map(AddOnService::unit_price_cny).sum()
}

/// Price every line and spread the service cost over them.
///
/// The service cost is the per-unit service price times the total quantity.
/// Each line receives a share proportional to its product cost (evenly when
/// everything is free), rounded to two decimals; the last line absorbs the
/// rounding remainder so shares always sum to the total.
///
/// # Errors
///
/// Returns `MarketError::Validation` for an empty checkout, a quantity below
/// one or a negative price.
pub fn plan(
    lines: &[PricedLine],
    services: &BTreeSet<AddOnService>,
) -> Result<CheckoutPlan, MarketError> {
    if lines.is_empty() {
        return Err(MarketError::validation("checkout has no lines"));
    }
    if let Some(line) = lines.iter().find(|l| l.quantity < 1) {
        return Err(MarketError::Validation(format!(
            "quantity for model {} must be at least 1",
            line.model_id
        )));
    }
    if let Some(line) = lines.iter().find(|l| l.unit_price < Decimal::ZERO) {
        return Err(MarketError::Validation(format!(
            "model {} has a negative price",
            line.model_id
        )));
    }

    let costs: Vec<Decimal> = lines
        .iter()
        .map(|l| l.unit_price * Decimal::from(l.quantity))
        .collect();
    let product_cost: Decimal = costs.iter().sum();
    let total_quantity: i64 = lines.iter().map(|l| i64::from(l.quantity)).sum();
    let service_cost = service_unit_cost(services) * Decimal::from(total_quantity);

    let count = Decimal::from(lines.len());
    let mut allocated = Decimal::ZERO;
    let mut planned = Vec::with_capacity(lines.len());

    for (index, (line, cost)) in lines.iter().zip(&costs).enumerate() {
        let share = if index + 1 == lines.len() {
            service_cost - allocated
        } else if product_cost.is_zero() {
            money(service_cost / count)
        } else {
            money(service_cost * *cost / product_cost)
        };
        allocated += share;

        planned.push(PlannedLine {
            model_id: line.model_id,
            quantity: line.quantity,
            product_cost: *cost,
            service_cost: share,
        });
    }

    Ok(CheckoutPlan {
        lines: planned,
        product_cost,
        service_cost,
    })
}
