//! Orders, checkout requests and ledger mirror targets.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rubuy_core::{AddOnService, ModelId, OrderId, OrderStatus, ShipmentId, TrackingCode, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One purchased model, created at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub model_id: ModelId,
    pub quantity: i32,
    /// Product cost plus the allocated share of add-on services, in CNY.
    pub total_price_cny: Decimal,
    pub services: Vec<AddOnService>,
    /// Shared by every order of one checkout.
    pub tracking_code: TrackingCode,
    pub status: OrderStatus,
    pub weight_kg: Option<Decimal>,
    pub china_freight_cny: Option<Decimal>,
    pub china_freight_paid: bool,
    pub china_freight_paid_at: Option<DateTime<Utc>>,
    pub china_freight_rub: Option<Decimal>,
    /// RUB mirrored for the purchase, once recorded.
    pub rub_charged: Option<Decimal>,
    pub photos: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A requested checkout line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutLine {
    pub model_id: ModelId,
    pub quantity: i32,
}

/// A validated checkout: distinct models with positive quantities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub lines: Vec<CheckoutLine>,
    pub services: BTreeSet<AddOnService>,
}

/// What a successful checkout created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutReceipt {
    pub order_ids: Vec<OrderId>,
    pub tracking_code: TrackingCode,
    pub product_cost_cny: Decimal,
    pub service_cost_cny: Decimal,
    pub total_cny: Decimal,
    /// Per-order totals, aligned with `order_ids`.
    pub order_totals_cny: Vec<Decimal>,
}

/// Administrative changes to a single order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OrderUpdate {
    SetStatus { status: OrderStatus },
    SetWeight { weight_kg: Decimal },
    SetChinaFreightPrice { price_cny: Decimal },
    AddPhoto { url: String },
    RemovePhoto { url: String },
}

/// The row whose charge a RUB mirror debit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MirrorTarget {
    Order(OrderId),
    ChinaFreight(OrderId),
    Shipment(ShipmentId),
    Packaging(ShipmentId),
}

impl std::fmt::Display for MirrorTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Order(id) => write!(f, "order {id}"),
            Self::ChinaFreight(id) => write!(f, "china freight of order {id}"),
            Self::Shipment(id) => write!(f, "shipment {id}"),
            Self::Packaging(id) => write!(f, "packaging of shipment {id}"),
        }
    }
}
