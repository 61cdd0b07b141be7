//! Shipment consolidation, freight charging and id-set repair.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use rubuy_core::{OrderStatus, ShipmentStatus, TrackingNamespace};
use rubuy_integration_tests::{TestMarket, shipment_request};
use rubuy_market::error::MarketError;
use rubuy_market::rates::FixedRates;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_shipment_charges_freight_and_marks_orders() {
    let market = TestMarket::new().await;
    let user = market.user_with("Sergei", dec!(20000), dec!(2000)).await;
    let first = market.weighed_order(user, dec!(100), Some(dec!(1.5))).await;
    let second = market.weighed_order(user, dec!(100), Some(dec!(0.5))).await;

    let receipt = market
        .state
        .shipments()
        .create(user, shipment_request(&[first, second], "air_fast"))
        .await
        .unwrap();

    assert_eq!(receipt.order_ids, vec![first, second]);
    assert_eq!(receipt.quote.weight_kg, dec!(2));
    assert_eq!(receipt.quote.usd_total, dec!(70));
    assert_eq!(receipt.quote.cny_charge, dec!(526.88));
    assert_eq!(receipt.quote.rub_equivalent, dec!(6849.50));
    assert_eq!(
        receipt.tracking_code.namespace(),
        Some(TrackingNamespace::Shipment)
    );
    assert!(receipt.tracking_code.as_str().starts_with("RUBOX"));

    // 2000 - 2 * 100 - 526.88 CNY; 20000 - 2 * 1300 - 6849.50 RUB
    let balances = market.balances(user).await;
    assert_eq!(balances.cny, dec!(1273.12));
    assert_eq!(balances.rub, dec!(10550.50));

    for id in [first, second] {
        let order = market.state.settlement().order(user, id).await.unwrap();
        assert_eq!(order.status, OrderStatus::InShipment);
    }

    let view = market
        .state
        .shipments()
        .shipment(user, receipt.shipment_id)
        .await
        .unwrap();
    assert_eq!(view.order_ids, vec![first, second]);
    assert!(!view.repaired);
    assert_eq!(view.shipment.rub_charged, Some(dec!(6849.50)));
    assert_eq!(view.shipment.status, ShipmentStatus::Pending);
}

#[tokio::test]
async fn test_foreign_and_duplicate_ids_are_dropped() {
    let market = TestMarket::new().await;
    let user = market.user_with("Tanya", dec!(20000), dec!(2000)).await;
    let other = market.user_with("Yuri", dec!(20000), dec!(2000)).await;
    let mine = market.weighed_order(user, dec!(50), Some(dec!(1))).await;
    let theirs = market.weighed_order(other, dec!(50), Some(dec!(1))).await;

    let receipt = market
        .state
        .shipments()
        .create(user, shipment_request(&[theirs, mine, mine], "air_slow"))
        .await
        .unwrap();

    assert_eq!(receipt.order_ids, vec![mine]);
    let theirs = market.state.settlement().order(other, theirs).await.unwrap();
    assert_eq!(theirs.status, OrderStatus::Ordered);
}

#[tokio::test]
async fn test_only_foreign_ids_is_rejected() {
    let market = TestMarket::new().await;
    let user = market.user_with("Ulyana", dec!(0), dec!(500)).await;
    let other = market.user_with("Vadim", dec!(5000), dec!(500)).await;
    let theirs = market.weighed_order(other, dec!(50), Some(dec!(1))).await;

    let result = market
        .state
        .shipments()
        .create(user, shipment_request(&[theirs], "air_fast"))
        .await;

    assert!(matches!(result, Err(MarketError::Validation(_))));
    assert_eq!(market.balances(user).await.cny, dec!(500));
}

#[tokio::test]
async fn test_shipped_order_cannot_ship_again() {
    let market = TestMarket::new().await;
    let user = market.user_with("Lena", dec!(50000), dec!(5000)).await;
    let order = market.weighed_order(user, dec!(100), Some(dec!(1))).await;
    let shipments = market.state.shipments();
    shipments
        .create(user, shipment_request(&[order], "air_fast"))
        .await
        .unwrap();
    let after_first = market.balances(user).await;

    let again = shipments
        .create(user, shipment_request(&[order], "air_fast"))
        .await;

    assert!(matches!(
        again,
        Err(MarketError::Validation(msg)) if msg == format!("order {order} is already in a shipment")
    ));
    assert_eq!(market.balances(user).await, after_first);
    assert_eq!(shipments.user_shipments(user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_order_listed_in_a_shipment_cannot_ship_again() {
    let market = TestMarket::new().await;
    let user = market.user_with("Mark", dec!(50000), dec!(5000)).await;
    let listed = market.weighed_order(user, dec!(100), Some(dec!(1))).await;
    let fresh = market.weighed_order(user, dec!(100), Some(dec!(1))).await;
    let shipments = market.state.shipments();

    // The status update is lost, so the order still reads as `ordered`.
    market.store.fail_order_updates(true);
    shipments
        .create(user, shipment_request(&[listed], "air_slow"))
        .await
        .unwrap();
    market.store.fail_order_updates(false);
    let cny_before = market.balances(user).await.cny;

    let result = shipments
        .create(user, shipment_request(&[fresh, listed], "air_slow"))
        .await;

    assert!(matches!(result, Err(MarketError::Validation(_))));
    assert_eq!(market.balances(user).await.cny, cny_before);
    let fresh = market.state.settlement().order(user, fresh).await.unwrap();
    assert_eq!(fresh.status, OrderStatus::Ordered);
}

#[tokio::test]
async fn test_unweighed_orders_cannot_ship() {
    let market = TestMarket::new().await;
    let user = market.user_with("Zoya", dec!(5000), dec!(1000)).await;
    let order = market.weighed_order(user, dec!(50), None).await;

    let result = market
        .state
        .shipments()
        .create(user, shipment_request(&[order], "auto_fast"))
        .await;

    assert!(matches!(result, Err(MarketError::Validation(msg)) if msg == "weight unavailable"));
    assert!(market.state.shipments().user_shipments(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_tier_rejected() {
    let market = TestMarket::new().await;
    let user = market.user_with("Artem", dec!(5000), dec!(1000)).await;
    let order = market.weighed_order(user, dec!(50), Some(dec!(1))).await;

    let result = market
        .state
        .shipments()
        .create(user, shipment_request(&[order], "sea"))
        .await;

    assert!(matches!(result, Err(MarketError::Validation(_))));
}

#[tokio::test]
async fn test_insufficient_cny_creates_no_shipment() {
    let market = TestMarket::new().await;
    let user = market.user_with("Boris", dec!(5000), dec!(150)).await;
    let order = market.weighed_order(user, dec!(100), Some(dec!(2))).await;

    let result = market
        .state
        .shipments()
        .create(user, shipment_request(&[order], "air_fast"))
        .await;

    assert!(matches!(result, Err(MarketError::InsufficientFunds { .. })));
    assert_eq!(market.balances(user).await.cny, dec!(50));
    let order = market.state.settlement().order(user, order).await.unwrap();
    assert_eq!(order.status, OrderStatus::Ordered);
}

#[tokio::test]
async fn test_rates_outage_blocks_shipment() {
    let market = TestMarket::with_rates(FixedRates::unavailable()).await;
    let user = market.user_with("Dina", dec!(5000), dec!(1000)).await;
    let order = market.weighed_order(user, dec!(100), Some(dec!(1))).await;

    let result = market
        .state
        .shipments()
        .create(user, shipment_request(&[order], "air_fast"))
        .await;

    assert!(matches!(result, Err(MarketError::RatesUnavailable(_))));
    assert_eq!(market.balances(user).await.cny, dec!(900));
}

// =============================================================================
// Post-commit follow-ups
// =============================================================================

#[tokio::test]
async fn test_failed_mirror_keeps_shipment() {
    let market = TestMarket::new().await;
    let user = market.user_with("Egor", dec!(20000), dec!(1000)).await;
    let order = market.weighed_order(user, dec!(100), Some(dec!(1))).await;
    let rub_before = market.balances(user).await.rub;

    market.store.fail_mirrors(true);
    let receipt = market
        .state
        .shipments()
        .create(user, shipment_request(&[order], "air_fast"))
        .await
        .unwrap();
    market.store.fail_mirrors(false);

    let balances = market.balances(user).await;
    assert_eq!(balances.rub, rub_before);
    assert_eq!(balances.cny, dec!(900) - receipt.quote.cny_charge);

    let view = market
        .state
        .shipments()
        .shipment(user, receipt.shipment_id)
        .await
        .unwrap();
    assert_eq!(view.shipment.rub_charged, None);
    let order = market.state.settlement().order(user, order).await.unwrap();
    assert_eq!(order.status, OrderStatus::InShipment);
}

#[tokio::test]
async fn test_failed_status_updates_keep_shipment() {
    let market = TestMarket::new().await;
    let user = market.user_with("Fedor", dec!(20000), dec!(1000)).await;
    let order = market.weighed_order(user, dec!(100), Some(dec!(1))).await;

    market.store.fail_order_updates(true);
    let receipt = market
        .state
        .shipments()
        .create(user, shipment_request(&[order], "air_slow"))
        .await
        .unwrap();
    market.store.fail_order_updates(false);

    let order = market.state.settlement().order(user, order).await.unwrap();
    assert_eq!(order.status, OrderStatus::Ordered);
    let view = market
        .state
        .shipments()
        .shipment(user, receipt.shipment_id)
        .await
        .unwrap();
    assert_eq!(view.shipment.rub_charged, Some(receipt.quote.rub_equivalent));
}

// =============================================================================
// Stored id sets
// =============================================================================

#[tokio::test]
async fn test_malformed_id_set_is_repaired_on_read() {
    let market = TestMarket::new().await;
    let user = market.user_with("Galina", dec!(20000), dec!(2000)).await;
    let first = market.weighed_order(user, dec!(100), Some(dec!(1))).await;
    let second = market.weighed_order(user, dec!(100), Some(dec!(1))).await;
    let receipt = market
        .state
        .shipments()
        .create(user, shipment_request(&[first, second], "air_slow"))
        .await
        .unwrap();

    market
        .store
        .overwrite_order_ids(receipt.shipment_id, &format!("[{first},,{second}"))
        .await
        .unwrap();

    let views = market.state.shipments().user_shipments(user).await.unwrap();
    assert_eq!(views.len(), 1);
    assert!(views[0].repaired);
    assert_eq!(views[0].order_ids, vec![first, second]);

    let pending = market
        .state
        .shipments()
        .pending_shipments(market.admin())
        .await
        .unwrap();
    assert_eq!(pending[0].order_ids, vec![first, second]);
}

#[tokio::test]
async fn test_shipments_hidden_from_other_users() {
    let market = TestMarket::new().await;
    let user = market.user_with("Ivan", dec!(20000), dec!(1000)).await;
    let other = market.user_with("Kira", dec!(0), dec!(0)).await;
    let order = market.weighed_order(user, dec!(100), Some(dec!(1))).await;
    let receipt = market
        .state
        .shipments()
        .create(user, shipment_request(&[order], "auto_fast"))
        .await
        .unwrap();

    let result = market.state.shipments().shipment(other, receipt.shipment_id).await;
    assert!(matches!(result, Err(MarketError::NotFound(..))));
    assert!(matches!(
        market.state.shipments().pending_shipments(other).await,
        Err(MarketError::Forbidden(_))
    ));
}

// =============================================================================
// Packaging
// =============================================================================

#[tokio::test]
async fn test_packaging_is_paid_once() {
    let market = TestMarket::new().await;
    let user = market.user_with("Marina", dec!(20000), dec!(1000)).await;
    let order = market.weighed_order(user, dec!(100), Some(dec!(1))).await;
    let receipt = market
        .state
        .shipments()
        .create(user, shipment_request(&[order], "auto_fast"))
        .await
        .unwrap();
    let shipments = market.state.shipments();

    assert!(matches!(
        shipments.pay_packaging(user, receipt.shipment_id).await,
        Err(MarketError::Validation(_))
    ));

    shipments
        .set_packaging_cost(market.admin(), receipt.shipment_id, dec!(20))
        .await
        .unwrap();
    let before = market.balances(user).await;
    let paid = shipments.pay_packaging(user, receipt.shipment_id).await.unwrap();

    assert!(paid.packaging_paid);
    assert_eq!(paid.packaging_rub, Some(dec!(260)));
    let after = market.balances(user).await;
    assert_eq!(after.cny, before.cny - dec!(20));
    assert_eq!(after.rub, before.rub - dec!(260));

    assert!(matches!(
        shipments.pay_packaging(user, receipt.shipment_id).await,
        Err(MarketError::AlreadyProcessed(_))
    ));
    assert!(matches!(
        shipments
            .set_packaging_cost(market.admin(), receipt.shipment_id, dec!(30))
            .await,
        Err(MarketError::AlreadyProcessed(_))
    ));
    assert_eq!(market.balances(user).await, after);
}

#[tokio::test]
async fn test_admin_sets_any_status() {
    let market = TestMarket::new().await;
    let user = market.user_with("Nikita", dec!(20000), dec!(1000)).await;
    let order = market.weighed_order(user, dec!(100), Some(dec!(1))).await;
    let receipt = market
        .state
        .shipments()
        .create(user, shipment_request(&[order], "air_fast"))
        .await
        .unwrap();

    let shipped = market
        .state
        .shipments()
        .set_status(market.admin(), receipt.shipment_id, ShipmentStatus::Shipped)
        .await
        .unwrap();
    assert_eq!(shipped.status, ShipmentStatus::Shipped);
    assert!(
        market
            .state
            .shipments()
            .pending_shipments(market.admin())
            .await
            .unwrap()
            .is_empty()
    );

    let back = market
        .state
        .shipments()
        .set_status(market.admin(), receipt.shipment_id, ShipmentStatus::Pending)
        .await
        .unwrap();
    assert_eq!(back.status, ShipmentStatus::Pending);
}
