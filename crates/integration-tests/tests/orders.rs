//! Order administration and China-leg freight payment.

#![allow(clippy::unwrap_used)]

use rubuy_core::{OrderStatus, TrackingNamespace};
use rubuy_integration_tests::TestMarket;
use rubuy_market::error::{Entity, MarketError};
use rubuy_market::ledger::history::EntryKind;
use rubuy_market::models::OrderUpdate;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_admin_updates_order() {
    let market = TestMarket::new().await;
    let user = market.user_with("Olga", dec!(5000), dec!(500)).await;
    let order = market.weighed_order(user, dec!(100), None).await;
    let settlement = market.state.settlement();
    let admin = market.admin();

    let updated = settlement
        .update_order(admin, order, &OrderUpdate::SetStatus { status: OrderStatus::InWarehouse })
        .await
        .unwrap();
    assert_eq!(updated.status, OrderStatus::InWarehouse);

    let updated = settlement
        .update_order(admin, order, &OrderUpdate::SetWeight { weight_kg: dec!(0.75) })
        .await
        .unwrap();
    assert_eq!(updated.weight_kg, Some(dec!(0.75)));
    assert!(matches!(
        settlement
            .update_order(admin, order, &OrderUpdate::SetWeight { weight_kg: dec!(-1) })
            .await,
        Err(MarketError::Validation(_))
    ));

    let photo = "https://img.example/1.jpg".to_string();
    settlement
        .update_order(admin, order, &OrderUpdate::AddPhoto { url: photo.clone() })
        .await
        .unwrap();
    assert!(matches!(
        settlement
            .update_order(admin, order, &OrderUpdate::AddPhoto { url: photo.clone() })
            .await,
        Err(MarketError::Validation(_))
    ));
    let updated = settlement
        .update_order(admin, order, &OrderUpdate::RemovePhoto { url: photo.clone() })
        .await
        .unwrap();
    assert!(updated.photos.is_empty());
    assert!(matches!(
        settlement
            .update_order(admin, order, &OrderUpdate::RemovePhoto { url: photo })
            .await,
        Err(MarketError::NotFound(Entity::Order, _))
    ));
}

#[tokio::test]
async fn test_non_admin_cannot_update_order() {
    let market = TestMarket::new().await;
    let user = market.user_with("Petr", dec!(5000), dec!(500)).await;
    let order = market.weighed_order(user, dec!(100), None).await;

    let result = market
        .state
        .settlement()
        .update_order(user, order, &OrderUpdate::SetStatus { status: OrderStatus::Delivered })
        .await;

    assert!(matches!(result, Err(MarketError::Forbidden(_))));
}

#[tokio::test]
async fn test_orders_are_private() {
    let market = TestMarket::new().await;
    let user = market.user_with("Raisa", dec!(5000), dec!(500)).await;
    let other = market.user_with("Semyon", dec!(0), dec!(0)).await;
    let order = market.weighed_order(user, dec!(100), None).await;

    let mine = market.state.settlement().order(user, order).await.unwrap();
    assert_eq!(mine.tracking_code.namespace(), Some(TrackingNamespace::Order));
    assert!(matches!(
        market.state.settlement().order(other, order).await,
        Err(MarketError::NotFound(Entity::Order, _))
    ));
    assert!(market.state.settlement().user_orders(other).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_china_freight_paid_once() {
    let market = TestMarket::new().await;
    let user = market.user_with("Taisia", dec!(5000), dec!(500)).await;
    let order = market.weighed_order(user, dec!(100), None).await;
    let settlement = market.state.settlement();

    assert!(matches!(
        settlement.pay_china_freight(user, order).await,
        Err(MarketError::Validation(_))
    ));

    settlement
        .update_order(
            market.admin(),
            order,
            &OrderUpdate::SetChinaFreightPrice { price_cny: dec!(15) },
        )
        .await
        .unwrap();
    let before = market.balances(user).await;
    let paid = settlement.pay_china_freight(user, order).await.unwrap();

    assert!(paid.china_freight_paid);
    assert!(paid.china_freight_paid_at.is_some());
    assert_eq!(paid.china_freight_rub, Some(dec!(195)));
    let after = market.balances(user).await;
    assert_eq!(after.cny, before.cny - dec!(15));
    assert_eq!(after.rub, before.rub - dec!(195));

    assert!(matches!(
        settlement.pay_china_freight(user, order).await,
        Err(MarketError::AlreadyProcessed(_))
    ));
    assert!(matches!(
        settlement
            .update_order(
                market.admin(),
                order,
                &OrderUpdate::SetChinaFreightPrice { price_cny: dec!(20) },
            )
            .await,
        Err(MarketError::AlreadyProcessed(_))
    ));

    let history = market.state.ledger().history(user).await.unwrap();
    assert!(history.entries.iter().any(|e| e.record.kind == EntryKind::ChinaFreight));
    assert_eq!(history.current, after);
}

#[tokio::test]
async fn test_china_freight_needs_funds() {
    let market = TestMarket::new().await;
    let user = market.user_with("Ulyana", dec!(5000), dec!(105)).await;
    let order = market.weighed_order(user, dec!(100), None).await;
    market
        .state
        .settlement()
        .update_order(
            market.admin(),
            order,
            &OrderUpdate::SetChinaFreightPrice { price_cny: dec!(10) },
        )
        .await
        .unwrap();

    let result = market.state.settlement().pay_china_freight(user, order).await;

    assert!(matches!(result, Err(MarketError::InsufficientFunds { .. })));
    let order = market.state.settlement().order(user, order).await.unwrap();
    assert!(!order.china_freight_paid);
    assert_eq!(market.balances(user).await.cny, dec!(5));
}
