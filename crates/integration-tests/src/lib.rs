//! Integration tests for Rubuy.
//!
//! # Running Tests
//!
//! ```bash
//! # In-memory scenarios
//! cargo test -p rubuy-integration-tests
//!
//! # Including the PostgreSQL tests (needs a migrated database)
//! RUBUY_DATABASE_URL=postgres://... cargo test -p rubuy-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `checkout` - Reservation, allocation and settlement
//! - `orders` - Order administration and China-leg freight
//! - `shipments` - Consolidation, freight, id-set repair and packaging
//! - `ledger` - Wallet requests, corrections and history replay
//! - `postgres` - The same flows against a live database

#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use rubuy_core::{Balances, Currency, ModelId, ModelListing, OrderId, ProductListing, UserId};
use rubuy_market::db::{MemoryStore, Store};
use rubuy_market::models::{CheckoutLine, OrderUpdate, Recipient};
use rubuy_market::rates::{FixedRates, Rates};
use rubuy_market::shipment::ShipmentRequest;
use rubuy_market::shipment::freight::{PricingOverrides, PricingParams};
use rubuy_market::state::AppState;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// USD→RUB rate used by [`TestMarket::new`].
pub const USD_TO_RUB: Decimal = dec!(95);
/// CNY→RUB rate used by [`TestMarket::new`].
pub const CNY_TO_RUB: Decimal = dec!(13);

/// Engine wired over the in-memory store and fixed rates.
pub struct TestMarket {
    pub store: MemoryStore,
    pub rates: FixedRates,
    pub state: AppState<MemoryStore, FixedRates>,
    admin: UserId,
}

impl TestMarket {
    /// Market with rates 95 RUB/USD and 13 RUB/CNY.
    pub async fn new() -> Self {
        Self::with_rates(FixedRates::new(Rates::new(USD_TO_RUB, CNY_TO_RUB).unwrap())).await
    }

    pub async fn with_rates(rates: FixedRates) -> Self {
        let store = MemoryStore::new();
        let state = AppState::new(store.clone(), rates.clone(), PricingParams::default());
        let admin = store.create_user("Operator", true).await.unwrap().id;
        Self {
            store,
            rates,
            state,
            admin,
        }
    }

    pub const fn admin(&self) -> UserId {
        self.admin
    }

    /// A regular user holding the given balances.
    pub async fn user_with(&self, name: &str, rub: Decimal, cny: Decimal) -> UserId {
        let user = self.state.ledger().create_user(name, false).await.unwrap().id;
        self.state.ledger().adjust(user, Currency::Rub, rub).await.unwrap();
        self.state.ledger().adjust(user, Currency::Cny, cny).await.unwrap();
        user
    }

    /// A single-model product.
    pub async fn model(&self, title: &str, price: Decimal, stock: i32) -> ModelId {
        let ingested = self
            .state
            .catalog()
            .ingest(&ProductListing {
                title: title.to_string(),
                base_price: price,
                temporary: false,
                models: vec![ModelListing {
                    color_name: "black".to_string(),
                    size_name: "M".to_string(),
                    price: None,
                    stock,
                    image_url: None,
                }],
            })
            .await
            .unwrap();
        self.state
            .catalog()
            .product(ingested.product_id)
            .await
            .unwrap()
            .models[0]
            .id
    }

    /// Buy one unit of a fresh model and record its weight.
    pub async fn weighed_order(&self, user: UserId, price: Decimal, weight_kg: Option<Decimal>) -> OrderId {
        let model = self.model(&format!("Parcel item {price}"), price, 1).await;
        let receipt = self
            .state
            .settlement()
            .checkout(
                user,
                &[CheckoutLine {
                    model_id: model,
                    quantity: 1,
                }],
                &[],
            )
            .await
            .unwrap();
        let order = receipt.order_ids[0];
        if let Some(weight_kg) = weight_kg {
            self.state
                .settlement()
                .update_order(self.admin, order, &OrderUpdate::SetWeight { weight_kg })
                .await
                .unwrap();
        }
        order
    }

    pub async fn balances(&self, user: UserId) -> Balances {
        self.state.ledger().balances(user).await.unwrap()
    }
}

pub fn recipient() -> Recipient {
    Recipient {
        name: "Anna Petrova".to_string(),
        phone: "+7 900 000 00 00".to_string(),
        address: "Moscow, Tverskaya 1".to_string(),
    }
}

pub fn shipment_request(order_ids: &[OrderId], tier: &str) -> ShipmentRequest {
    ShipmentRequest {
        order_ids: order_ids.to_vec(),
        delivery_tier: tier.to_string(),
        packaging: vec!["bubble wrap".to_string()],
        recipient: recipient(),
        pricing: PricingOverrides::default(),
    }
}
