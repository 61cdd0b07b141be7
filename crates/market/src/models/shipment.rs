//! Outbound shipments grouping paid orders.

use chrono::{DateTime, Utc};
use rubuy_core::{DeliveryTier, OrderId, ShipmentId, ShipmentStatus, TrackingCode, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::shipment::freight::FreightQuote;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub name: String,
    pub phone: String,
    pub address: String,
}

/// A persisted shipment.
///
/// `order_ids_raw` is the stored id set exactly as read; decode it through
/// [`crate::codec`] before use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Shipment {
    pub id: ShipmentId,
    pub user_id: UserId,
    pub order_ids_raw: String,
    pub delivery_tier: DeliveryTier,
    pub packaging: Vec<String>,
    pub recipient: Recipient,
    pub quote: FreightQuote,
    pub rub_charged: Option<Decimal>,
    pub packaging_cost_cny: Option<Decimal>,
    pub packaging_paid: bool,
    pub packaging_paid_at: Option<DateTime<Utc>>,
    pub packaging_rub: Option<Decimal>,
    pub tracking_code: TrackingCode,
    pub status: ShipmentStatus,
    pub created_at: DateTime<Utc>,
}

/// Everything needed to persist a priced shipment.
#[derive(Debug, Clone)]
pub struct NewShipment {
    pub user_id: UserId,
    pub order_ids: Vec<OrderId>,
    pub delivery_tier: DeliveryTier,
    pub packaging: Vec<String>,
    pub recipient: Recipient,
    pub quote: FreightQuote,
}

/// A shipment with its decoded order ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShipmentView {
    #[serde(flatten)]
    pub shipment: Shipment,
    pub order_ids: Vec<OrderId>,
    /// The stored id set was malformed and had to be repaired.
    pub repaired: bool,
}
