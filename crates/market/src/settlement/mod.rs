//! Order settlement: checkout, order administration and China-leg freight.
//!
//! Checkout prices the lines, charges CNY and creates every order in one
//! unit of work (see [`crate::db::Store::checkout`]). The RUB mirror of each
//! order runs afterwards as a [`FollowUps`] task.

pub mod allocation;

use std::collections::BTreeSet;

use rubuy_core::{AddOnService, OrderId, UserId};
use tracing::instrument;

use crate::db::Store;
use crate::error::{Entity, MarketError, Result};
use crate::followup::{FollowUps, MirrorAmount};
use crate::models::{CheckoutLine, CheckoutReceipt, CheckoutRequest, MirrorTarget, Order, OrderUpdate};
use crate::rates::RateSource;

#[derive(Clone)]
pub struct SettlementService<S, R> {
    store: S,
    rates: R,
}

/// Parse service names, rejecting unknown ones. Duplicates collapse.
///
/// # Errors
///
/// Returns `MarketError::Validation` naming the first unknown service.
pub fn parse_services(names: &[String]) -> Result<BTreeSet<AddOnService>> {
    names
        .iter()
        .map(|name| {
            name.trim()
                .to_ascii_lowercase()
                .parse::<AddOnService>()
                .map_err(MarketError::Validation)
        })
        .collect()
}

/// Merge repeated models, keeping first-occurrence order.
///
/// # Errors
///
/// Returns `MarketError::Validation` for an empty list or a quantity below one.
pub fn merge_lines(lines: &[CheckoutLine]) -> Result<Vec<CheckoutLine>> {
    if lines.is_empty() {
        return Err(MarketError::validation("checkout has no lines"));
    }
    let mut merged: Vec<CheckoutLine> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity < 1 {
            return Err(MarketError::Validation(format!(
                "quantity for model {} must be at least 1",
                line.model_id
            )));
        }
        match merged.iter_mut().find(|m| m.model_id == line.model_id) {
            Some(existing) => {
                existing.quantity = existing
                    .quantity
                    .checked_add(line.quantity)
                    .ok_or_else(|| MarketError::validation("quantity too large"))?;
            }
            None => merged.push(*line),
        }
    }
    Ok(merged)
}

impl<S: Store, R: RateSource> SettlementService<S, R> {
    pub const fn new(store: S, rates: R) -> Self {
        Self { store, rates }
    }

    /// Turn checkout lines into orders and charge the CNY balance.
    #[instrument(skip(self, lines, services), fields(line_count = lines.len()))]
    pub async fn checkout(
        &self,
        user: UserId,
        lines: &[CheckoutLine],
        services: &[String],
    ) -> Result<CheckoutReceipt> {
        let request = CheckoutRequest {
            lines: merge_lines(lines)?,
            services: parse_services(services)?,
        };
        let receipt = self.store.checkout(user, &request).await?;
        tracing::info!(
            tracking_code = %receipt.tracking_code,
            orders = receipt.order_ids.len(),
            total_cny = %receipt.total_cny,
            "Checkout completed"
        );

        let mut followups = FollowUps::new();
        for (order, total) in receipt.order_ids.iter().zip(&receipt.order_totals_cny) {
            followups.mirror(user, MirrorTarget::Order(*order), MirrorAmount::Cny(*total));
        }
        followups.run(&self.store, &self.rates).await;

        Ok(receipt)
    }

    /// An order, visible only to its owner.
    pub async fn order(&self, user: UserId, id: OrderId) -> Result<Order> {
        let order = self.store.order(id).await?;
        if order.user_id != user {
            return Err(MarketError::NotFound(Entity::Order, id.as_i32()));
        }
        Ok(order)
    }

    pub async fn user_orders(&self, user: UserId) -> Result<Vec<Order>> {
        self.store.user_orders(user).await
    }

    /// Apply an administrative change to an order.
    #[instrument(skip(self))]
    pub async fn update_order(&self, admin: UserId, id: OrderId, update: &OrderUpdate) -> Result<Order> {
        self.store.user(admin).await?.ensure_admin()?;
        let order = self.store.update_order(id, update).await?;
        tracing::info!(status = %order.status, "Order updated");
        Ok(order)
    }

    /// Pay the China-leg freight price set on an order.
    #[instrument(skip(self))]
    pub async fn pay_china_freight(&self, user: UserId, id: OrderId) -> Result<Order> {
        let order = self.store.pay_china_freight(user, id).await?;
        let paid = order.china_freight_cny.unwrap_or_default();
        tracing::info!(paid_cny = %paid, "China freight paid");

        let mut followups = FollowUps::new();
        followups.mirror(user, MirrorTarget::ChinaFreight(id), MirrorAmount::Cny(paid));
        followups.run(&self.store, &self.rates).await;

        self.store.order(id).await
    }
}
