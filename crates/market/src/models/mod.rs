//! Domain records returned by the store and the engine services.

pub mod catalog;
pub mod order;
pub mod requests;
pub mod shipment;
pub mod user;

pub use catalog::{CartEntry, CartLine, Ingested, Model, Product, ProductDetail, PurgeReport};
pub use order::{CheckoutLine, CheckoutReceipt, CheckoutRequest, MirrorTarget, Order, OrderUpdate};
pub use requests::{NewReplenishment, NewWithdrawal, Replenishment, Review, Withdrawal};
pub use shipment::{NewShipment, Recipient, Shipment, ShipmentView};
pub use user::User;
