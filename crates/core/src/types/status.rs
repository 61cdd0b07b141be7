//! Status and tier enums for marketplace entities.
//!
//! Each enum has a stable snake_case string form used on the wire and in the
//! database (`Display`/`FromStr` round-trip through it).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Implements `as_str`, `ALL`, `Display` and `FromStr` from one variant/name table.
macro_rules! string_enum {
    ($name:ident, $what:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Stable string form.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(format!(concat!("invalid ", $what, ": {}"), s)),
                }
            }
        }
    };
}

/// Lifecycle of a replenishment or withdrawal request.
///
/// A request leaves `Pending` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "rubuy.request_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

string_enum!(RequestStatus, "request status", {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

/// An administrator's decision on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

string_enum!(Decision, "decision", {
    Approve => "approve",
    Reject => "reject",
});

impl Decision {
    /// The request status this decision produces.
    #[must_use]
    pub const fn resulting_status(&self) -> RequestStatus {
        match self {
            Self::Approve => RequestStatus::Approved,
            Self::Reject => RequestStatus::Rejected,
        }
    }
}

/// Fulfillment lifecycle of an order.
///
/// Administrators may set any status at any time; the engine itself only moves
/// orders to `InShipment` when they are consolidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "rubuy.order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Ordered,
    Accepted,
    InWarehouse,
    InShipment,
    Shipped,
    Delivered,
}

string_enum!(OrderStatus, "order status", {
    Ordered => "ordered",
    Accepted => "accepted",
    InWarehouse => "in_warehouse",
    InShipment => "in_shipment",
    Shipped => "shipped",
    Delivered => "delivered",
});

impl OrderStatus {
    /// The order has been handed to a shipment and cannot be consolidated again.
    #[must_use]
    pub const fn is_consolidated(self) -> bool {
        matches!(self, Self::InShipment | Self::Shipped | Self::Delivered)
    }
}

/// Reservation state of a purchasable model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "rubuy.model_state", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    #[default]
    Available,
    InCart,
    Accepted,
}

string_enum!(ModelState, "model state", {
    Available => "available",
    InCart => "in_cart",
    Accepted => "accepted",
});

/// Shipment lifecycle.
///
/// Transitions are permissive: an administrator may set any status at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "rubuy.shipment_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
}

string_enum!(ShipmentStatus, "shipment status", {
    Pending => "pending",
    Processing => "processing",
    Shipped => "shipped",
    Delivered => "delivered",
});

/// International delivery method, each with a fixed USD-per-kilogram rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "rubuy.delivery_tier", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryTier {
    AirFast,
    AirSlow,
    AutoFast,
}

string_enum!(DeliveryTier, "delivery tier", {
    AirFast => "air_fast",
    AirSlow => "air_slow",
    AutoFast => "auto_fast",
});

impl DeliveryTier {
    /// Freight rate in USD per kilogram.
    #[must_use]
    pub fn usd_per_kg(&self) -> Decimal {
        match self {
            Self::AirFast => Decimal::from(35),
            Self::AirSlow => Decimal::from(8),
            Self::AutoFast => Decimal::from(7),
        }
    }
}

/// Optional per-unit service bought together with an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddOnService {
    Photos,
    Video,
    Inspection,
}

string_enum!(AddOnService, "service", {
    Photos => "photos",
    Video => "video",
    Inspection => "inspection",
});

impl AddOnService {
    /// Price in CNY charged per purchased unit.
    #[must_use]
    pub fn unit_price_cny(&self) -> Decimal {
        match self {
            Self::Photos => Decimal::from(10),
            Self::Video => Decimal::from(30),
            Self::Inspection => Decimal::from(20),
        }
    }
}
