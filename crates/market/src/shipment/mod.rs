//! Shipment consolidation: group paid orders, price the freight, charge it.
//!
//! Creation runs in three phases:
//!
//! 1. Preparation with no side effects: filter the requested ids down to the
//!    user's own orders, refuse orders already in a shipment, sum their
//!    weight, fetch rates and compute the quote.
//! 2. One unit of work in the store that re-checks that no order is already
//!    consolidated, checks funds, charges CNY, draws a tracking code and
//!    persists the shipment.
//! 3. Post-commit follow-ups: the RUB mirror and the `in_shipment` status of
//!    each order, each attempted and logged on its own.

pub mod freight;

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};

use rubuy_core::{DeliveryTier, OrderId, ShipmentId, ShipmentStatus, TrackingCode, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::codec;
use crate::db::Store;
use crate::error::{Entity, MarketError, Result};
use crate::followup::{FollowUps, MirrorAmount};
use crate::models::{MirrorTarget, NewShipment, Order, Recipient, Shipment, ShipmentView};
use crate::rates::RateSource;
use freight::{FreightQuote, PricingOverrides, PricingParams};

/// A user's request to consolidate orders into one outbound shipment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ShipmentRequest {
    pub order_ids: Vec<OrderId>,
    /// Tier name, e.g. `air_fast`.
    pub delivery_tier: String,
    #[serde(default)]
    pub packaging: Vec<String>,
    pub recipient: Recipient,
    #[serde(default)]
    pub pricing: PricingOverrides,
}

/// What the client gets back after a shipment is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShipmentReceipt {
    pub shipment_id: ShipmentId,
    pub tracking_code: TrackingCode,
    pub order_ids: Vec<OrderId>,
    pub delivery_tier: DeliveryTier,
    pub quote: FreightQuote,
}

#[derive(Clone)]
pub struct ShipmentService<S, R> {
    store: S,
    rates: R,
    pricing: PricingParams,
}

impl<S: Store, R: RateSource> ShipmentService<S, R> {
    pub const fn new(store: S, rates: R, pricing: PricingParams) -> Self {
        Self {
            store,
            rates,
            pricing,
        }
    }

    /// Consolidate orders into a shipment and charge its freight.
    #[instrument(skip(self, request), fields(requested = request.order_ids.len()))]
    pub async fn create(&self, user: UserId, request: ShipmentRequest) -> Result<ShipmentReceipt> {
        let tier: DeliveryTier = request
            .delivery_tier
            .trim()
            .parse()
            .map_err(MarketError::Validation)?;
        let recipient = validate_recipient(request.recipient)?;
        let packaging = normalize_packaging(request.packaging);
        let params = self.pricing.with_overrides(&request.pricing);
        params.validate()?;

        let owned = self.store.user_orders(user).await?;
        let selected = select_owned(&request.order_ids, &owned);
        if selected.is_empty() {
            return Err(MarketError::validation("no orders of yours were selected"));
        }
        if let Some(order) = selected.iter().find(|o| o.status.is_consolidated()) {
            return Err(MarketError::Validation(format!(
                "order {} is already in a shipment",
                order.id
            )));
        }
        if selected.len() < request.order_ids.len() {
            tracing::debug!(
                kept = selected.len(),
                "Dropped order ids that are not the user's"
            );
        }
        let weight = total_weight(&selected)?;

        let rates = self.rates.fetch_rates().await?;
        let quote = freight::quote(tier.usd_per_kg(), weight, &rates, &params)?;

        let order_ids: Vec<OrderId> = selected.iter().map(|o| o.id).collect();
        let shipment = self
            .store
            .create_shipment(&NewShipment {
                user_id: user,
                order_ids: order_ids.clone(),
                delivery_tier: tier,
                packaging,
                recipient,
                quote,
            })
            .await?;
        tracing::info!(
            shipment_id = %shipment.id,
            tracking_code = %shipment.tracking_code,
            cny_charge = %quote.cny_charge,
            "Shipment created"
        );

        let mut followups = FollowUps::new();
        followups.mirror(
            user,
            MirrorTarget::Shipment(shipment.id),
            MirrorAmount::Rub(quote.rub_equivalent),
        );
        for id in &order_ids {
            followups.mark_in_shipment(*id);
        }
        followups.run(&self.store, &self.rates).await;

        Ok(ShipmentReceipt {
            shipment_id: shipment.id,
            tracking_code: shipment.tracking_code,
            order_ids,
            delivery_tier: tier,
            quote,
        })
    }

    /// One shipment of the user with its decoded order ids.
    pub async fn shipment(&self, user: UserId, id: ShipmentId) -> Result<ShipmentView> {
        let shipment = self.store.shipment(id).await?;
        if shipment.user_id != user {
            return Err(MarketError::NotFound(Entity::Shipment, id.as_i32()));
        }
        let valid = self.order_ids_of(user).await?;
        Ok(view(shipment, &valid))
    }

    /// Every shipment of the user, with order ids decoded and repaired if needed.
    #[instrument(skip(self))]
    pub async fn user_shipments(&self, user: UserId) -> Result<Vec<ShipmentView>> {
        let shipments = self.store.user_shipments(user).await?;
        let valid = self.order_ids_of(user).await?;
        Ok(shipments.into_iter().map(|s| view(s, &valid)).collect())
    }

    /// The pending queue for administrators.
    pub async fn pending_shipments(&self, admin: UserId) -> Result<Vec<ShipmentView>> {
        self.ensure_admin(admin).await?;
        let shipments = self.store.pending_shipments().await?;

        let mut valid_by_owner: HashMap<UserId, BTreeSet<OrderId>> = HashMap::new();
        let mut views = Vec::with_capacity(shipments.len());
        for shipment in shipments {
            let valid = match valid_by_owner.entry(shipment.user_id) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(self.order_ids_of(shipment.user_id).await?),
            };
            views.push(view(shipment, valid));
        }
        Ok(views)
    }

    /// Set any status; transitions are not constrained.
    #[instrument(skip(self))]
    pub async fn set_status(&self, admin: UserId, id: ShipmentId, status: ShipmentStatus) -> Result<Shipment> {
        self.ensure_admin(admin).await?;
        let shipment = self.store.set_shipment_status(id, status).await?;
        tracing::info!("Shipment status set");
        Ok(shipment)
    }

    #[instrument(skip(self))]
    pub async fn set_packaging_cost(&self, admin: UserId, id: ShipmentId, cost_cny: Decimal) -> Result<Shipment> {
        self.ensure_admin(admin).await?;
        self.store.set_packaging_cost(id, cost_cny).await
    }

    /// Charge the packaging cost assigned to a shipment.
    #[instrument(skip(self))]
    pub async fn pay_packaging(&self, user: UserId, id: ShipmentId) -> Result<Shipment> {
        let shipment = self.store.pay_packaging(user, id).await?;
        let cost = shipment.packaging_cost_cny.unwrap_or_default();
        tracing::info!(cost_cny = %cost, "Packaging paid");

        let mut followups = FollowUps::new();
        followups.mirror(user, MirrorTarget::Packaging(id), MirrorAmount::Cny(cost));
        followups.run(&self.store, &self.rates).await;

        self.store.shipment(id).await
    }

    async fn ensure_admin(&self, admin: UserId) -> Result<()> {
        self.store.user(admin).await?.ensure_admin()
    }

    async fn order_ids_of(&self, user: UserId) -> Result<BTreeSet<OrderId>> {
        Ok(self
            .store
            .user_orders(user)
            .await?
            .into_iter()
            .map(|o| o.id)
            .collect())
    }
}

fn view(shipment: Shipment, valid: &BTreeSet<OrderId>) -> ShipmentView {
    let decoded = codec::decode(&shipment.order_ids_raw, valid);
    if decoded.repaired {
        tracing::warn!(
            shipment_id = %shipment.id,
            raw = %shipment.order_ids_raw,
            recovered = decoded.ids.len(),
            "Repaired malformed shipment order ids"
        );
    }
    ShipmentView {
        shipment,
        order_ids: decoded.ids,
        repaired: decoded.repaired,
    }
}

/// The user's orders among `requested`, deduplicated, in request order.
fn select_owned<'a>(requested: &[OrderId], owned: &'a [Order]) -> Vec<&'a Order> {
    let mut selected: Vec<&Order> = Vec::new();
    for id in requested {
        if selected.iter().any(|o| o.id == *id) {
            continue;
        }
        if let Some(order) = owned.iter().find(|o| o.id == *id) {
            selected.push(order);
        }
    }
    selected
}

/// Sum of recorded weights, missing ones counted as zero.
fn total_weight(orders: &[&Order]) -> Result<Decimal> {
    let weights: Vec<Decimal> = orders.iter().filter_map(|o| o.weight_kg).collect();
    if weights.is_empty() {
        return Err(MarketError::validation("weight unavailable"));
    }
    Ok(weights.into_iter().sum())
}

fn validate_recipient(recipient: Recipient) -> Result<Recipient> {
    let recipient = Recipient {
        name: recipient.name.trim().to_string(),
        phone: recipient.phone.trim().to_string(),
        address: recipient.address.trim().to_string(),
    };
    for (field, value) in [
        ("name", &recipient.name),
        ("phone", &recipient.phone),
        ("address", &recipient.address),
    ] {
        if value.is_empty() {
            return Err(MarketError::Validation(format!("recipient {field} is required")));
        }
    }
    Ok(recipient)
}

fn normalize_packaging(options: Vec<String>) -> Vec<String> {
    let mut kept: Vec<String> = Vec::with_capacity(options.len());
    for option in options {
        let option = option.trim().to_string();
        if !option.is_empty() && !kept.contains(&option) {
            kept.push(option);
        }
    }
    kept
}
