//! Settlement and shipment flows against `PostgreSQL`.
//!
//! These tests require:
//! - A running `PostgreSQL` database
//! - Migrations applied (`rubuy-cli migrate`)
//! - `RUBUY_DATABASE_URL` or `DATABASE_URL` pointing at it
//!
//! Run with: cargo test -p rubuy-integration-tests -- --ignored

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use rubuy_core::{Currency, OrderStatus, ProductListing, UserId};
use rubuy_integration_tests::{CNY_TO_RUB, USD_TO_RUB, shipment_request};
use rubuy_market::db::{self, PgStore, Store};
use rubuy_market::error::MarketError;
use rubuy_market::models::{CheckoutLine, OrderUpdate};
use rubuy_market::rates::{FixedRates, Rates};
use rubuy_market::shipment::freight::PricingParams;
use rubuy_market::state::AppState;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use serde_json::json;

type PgMarket = AppState<PgStore, FixedRates>;

async fn market() -> (PgStore, PgMarket) {
    let url = std::env::var("RUBUY_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .expect("RUBUY_DATABASE_URL or DATABASE_URL must be set");
    let pool = db::create_pool(&SecretString::from(url))
        .await
        .expect("Failed to connect to database");
    let store = PgStore::new(pool);
    let rates = FixedRates::new(Rates::new(USD_TO_RUB, CNY_TO_RUB).unwrap());
    let state = AppState::new(store.clone(), rates, PricingParams::default());
    (store, state)
}

async fn user_with(state: &PgMarket, rub: Decimal, cny: Decimal) -> UserId {
    let user = state.ledger().create_user("Integration buyer", false).await.unwrap().id;
    state.ledger().adjust(user, Currency::Rub, rub).await.unwrap();
    state.ledger().adjust(user, Currency::Cny, cny).await.unwrap();
    user
}

fn listing(price: &str, stock: i32) -> ProductListing {
    serde_json::from_value(json!({
        "title": "Integration jacket",
        "basePrice": price,
        "temporary": false,
        "models": [
            { "colorName": "black", "sizeName": "M", "stock": stock }
        ]
    }))
    .unwrap()
}

#[tokio::test]
#[ignore = "Requires a running PostgreSQL database"]
async fn test_checkout_and_ship_round_trip() {
    let (store, state) = market().await;
    let user = user_with(&state, dec!(20000), dec!(2000)).await;
    let admin = state.ledger().create_user("Integration admin", true).await.unwrap().id;

    let ingested = state.catalog().ingest(&listing("100", 3)).await.unwrap();
    let model = state.catalog().product(ingested.product_id).await.unwrap().models[0].id;
    state.inventory().reserve(user, model, 2).await.unwrap();

    let receipt = state
        .settlement()
        .checkout(user, &[CheckoutLine { model_id: model, quantity: 2 }], &["photos".to_string()])
        .await
        .unwrap();
    assert_eq!(receipt.total_cny, dec!(220));
    assert!(state.inventory().cart(user).await.unwrap().is_empty());

    let order = receipt.order_ids[0];
    state
        .settlement()
        .update_order(admin, order, &OrderUpdate::SetWeight { weight_kg: dec!(2) })
        .await
        .unwrap();

    let shipment = state
        .shipments()
        .create(user, shipment_request(&[order], "air_fast"))
        .await
        .unwrap();
    assert_eq!(shipment.quote.cny_charge, dec!(526.88));

    let order = state.settlement().order(user, order).await.unwrap();
    assert_eq!(order.status, OrderStatus::InShipment);
    assert_eq!(order.rub_charged, Some(dec!(2860)));

    let balances = store.user(user).await.unwrap().balances;
    assert_eq!(balances.cny, dec!(2000) - dec!(220) - dec!(526.88));
    assert_eq!(balances.rub, dec!(20000) - dec!(2860) - dec!(6849.50));

    let history = state.ledger().history(user).await.unwrap();
    assert_eq!(history.current, balances);
}

#[tokio::test]
#[ignore = "Requires a running PostgreSQL database"]
async fn test_stored_id_set_is_repaired() {
    let (store, state) = market().await;
    let user = user_with(&state, dec!(20000), dec!(2000)).await;
    let admin = state.ledger().create_user("Integration admin", true).await.unwrap().id;
    let ingested = state.catalog().ingest(&listing("50", 2)).await.unwrap();
    let model = state.catalog().product(ingested.product_id).await.unwrap().models[0].id;

    let mut orders = Vec::new();
    for _ in 0..2 {
        let receipt = state
            .settlement()
            .checkout(user, &[CheckoutLine { model_id: model, quantity: 1 }], &[])
            .await
            .unwrap();
        let id = receipt.order_ids[0];
        state
            .settlement()
            .update_order(admin, id, &OrderUpdate::SetWeight { weight_kg: dec!(1) })
            .await
            .unwrap();
        orders.push(id);
    }
    let receipt = state
        .shipments()
        .create(user, shipment_request(&orders, "air_slow"))
        .await
        .unwrap();

    sqlx::query("UPDATE rubuy.shipments SET order_ids = $1 WHERE id = $2")
        .bind(format!("{};{}", orders[0], orders[1]))
        .bind(receipt.shipment_id.as_i32())
        .execute(store.pool())
        .await
        .unwrap();

    let view = state.shipments().shipment(user, receipt.shipment_id).await.unwrap();
    assert!(view.repaired);
    assert_eq!(view.order_ids, orders);
}

#[tokio::test]
#[ignore = "Requires a running PostgreSQL database"]
async fn test_concurrent_reservations_respect_stock() {
    let (_, state) = market().await;
    let ingested = state.catalog().ingest(&listing("10", 5)).await.unwrap();
    let model = state.catalog().product(ingested.product_id).await.unwrap().models[0].id;

    let mut handles = Vec::new();
    for _ in 0..12 {
        let user = user_with(&state, dec!(0), dec!(0)).await;
        let inventory = state.inventory().clone();
        handles.push(tokio::spawn(async move { inventory.reserve(user, model, 1).await }));
    }

    let mut reserved = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => reserved += 1,
            Err(MarketError::InsufficientStock { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(reserved, 5);
}

#[tokio::test]
#[ignore = "Requires a running PostgreSQL database"]
async fn test_insufficient_funds_rolls_back() {
    let (store, state) = market().await;
    let user = user_with(&state, dec!(0), dec!(10)).await;
    let ingested = state.catalog().ingest(&listing("100", 1)).await.unwrap();
    let model = state.catalog().product(ingested.product_id).await.unwrap().models[0].id;

    let result = state
        .settlement()
        .checkout(user, &[CheckoutLine { model_id: model, quantity: 1 }], &[])
        .await;

    assert!(matches!(result, Err(MarketError::InsufficientFunds { .. })));
    assert!(store.user_orders(user).await.unwrap().is_empty());
    assert_eq!(store.user(user).await.unwrap().balances.cny, dec!(10));
}

#[tokio::test]
#[ignore = "Requires a running PostgreSQL database"]
async fn test_concurrent_checkouts_draw_distinct_codes() {
    let (_, state) = market().await;
    let ingested = state.catalog().ingest(&listing("5", 40)).await.unwrap();
    let model = state.catalog().product(ingested.product_id).await.unwrap().models[0].id;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let user = user_with(&state, dec!(0), dec!(100)).await;
        let settlement = state.settlement().clone();
        handles.push(tokio::spawn(async move {
            settlement
                .checkout(user, &[CheckoutLine { model_id: model, quantity: 1 }], &[])
                .await
        }));
    }

    let mut codes = std::collections::HashSet::new();
    for handle in handles {
        let receipt = handle.await.unwrap().unwrap();
        assert!(codes.insert(receipt.tracking_code));
    }
    assert_eq!(codes.len(), 16);
}

#[tokio::test]
#[ignore = "Requires a running PostgreSQL database"]
async fn test_checkout_cannot_oversell_stock() {
    let (store, state) = market().await;
    let holder = user_with(&state, dec!(0), dec!(1000)).await;
    let buyer = user_with(&state, dec!(0), dec!(1000)).await;
    let ingested = state.catalog().ingest(&listing("100", 1)).await.unwrap();
    let model = state.catalog().product(ingested.product_id).await.unwrap().models[0].id;
    state.inventory().reserve(holder, model, 1).await.unwrap();

    let result = state
        .settlement()
        .checkout(buyer, &[CheckoutLine { model_id: model, quantity: 5 }], &[])
        .await;

    assert!(matches!(
        result,
        Err(MarketError::InsufficientStock { requested: 5, available: 0, .. })
    ));
    assert!(store.user_orders(buyer).await.unwrap().is_empty());
    assert_eq!(store.user(buyer).await.unwrap().balances.cny, dec!(1000));
}
