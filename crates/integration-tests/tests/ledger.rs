//! Wallet requests, administrator corrections and history replay.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use chrono::NaiveDate;
use rubuy_core::{Balances, Currency, Decision, RequestStatus, UserId};
use rubuy_integration_tests::{TestMarket, shipment_request};
use rubuy_market::error::MarketError;
use rubuy_market::ledger::history::{EntryKind, LedgerStatus};
use rubuy_market::models::CheckoutLine;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn paid_on() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
}

/// Fund a fresh user through an approved replenishment.
async fn funded_user(market: &TestMarket, name: &str, amount_rub: Decimal) -> UserId {
    let ledger = market.state.ledger();
    let user = ledger.create_user(name, false).await.unwrap().id;
    let request = ledger
        .request_replenishment(user, amount_rub, paid_on(), Some("receipt-1.jpg".to_string()))
        .await
        .unwrap();
    ledger
        .review_replenishment(market.admin(), request.id, Decision::Approve, None)
        .await
        .unwrap();
    user
}

// =============================================================================
// Replenishments
// =============================================================================

#[tokio::test]
async fn test_approved_replenishment_credits_both_balances() {
    let market = TestMarket::new().await;
    let ledger = market.state.ledger();
    let user = ledger.create_user("Alina", false).await.unwrap().id;

    let request = ledger
        .request_replenishment(user, dec!(1300), paid_on(), None)
        .await
        .unwrap();
    assert_eq!(request.amount_cny, dec!(100));
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(market.balances(user).await, Balances::default());

    let reviewed = ledger
        .review_replenishment(market.admin(), request.id, Decision::Approve, Some("ok".to_string()))
        .await
        .unwrap();
    assert_eq!(reviewed.status, RequestStatus::Approved);
    assert_eq!(reviewed.admin_id, Some(market.admin()));
    assert_eq!(market.balances(user).await, Balances::new(dec!(1300), dec!(100)));

    let again = ledger
        .review_replenishment(market.admin(), request.id, Decision::Reject, None)
        .await;
    assert!(matches!(again, Err(MarketError::AlreadyProcessed(_))));
    assert_eq!(market.balances(user).await, Balances::new(dec!(1300), dec!(100)));
}

#[tokio::test]
async fn test_rejected_replenishment_moves_nothing() {
    let market = TestMarket::new().await;
    let ledger = market.state.ledger();
    let user = ledger.create_user("Bogdan", false).await.unwrap().id;
    let request = ledger
        .request_replenishment(user, dec!(2600), paid_on(), None)
        .await
        .unwrap();

    ledger
        .review_replenishment(market.admin(), request.id, Decision::Reject, Some("blurry receipt".to_string()))
        .await
        .unwrap();

    assert_eq!(market.balances(user).await, Balances::default());
    assert!(ledger.pending_replenishments(market.admin()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_only_admins_review() {
    let market = TestMarket::new().await;
    let ledger = market.state.ledger();
    let user = ledger.create_user("Vera", false).await.unwrap().id;
    let request = ledger
        .request_replenishment(user, dec!(1300), paid_on(), None)
        .await
        .unwrap();

    let result = ledger
        .review_replenishment(user, request.id, Decision::Approve, None)
        .await;

    assert!(matches!(result, Err(MarketError::Forbidden(_))));
    assert_eq!(ledger.pending_replenishments(market.admin()).await.unwrap().len(), 1);
}

// =============================================================================
// Withdrawals
// =============================================================================

#[tokio::test]
async fn test_withdrawal_lifecycle() {
    let market = TestMarket::new().await;
    let ledger = market.state.ledger();
    let user = funded_user(&market, "Daria", dec!(1300)).await;

    assert!(matches!(
        ledger
            .request_withdrawal(user, dec!(99.99), "4111 1111 1111 1111", "daria ivanova", None)
            .await,
        Err(MarketError::Validation(_))
    ));
    assert!(matches!(
        ledger
            .request_withdrawal(user, dec!(500), "4111 1111 1111", "daria ivanova", None)
            .await,
        Err(MarketError::Validation(_))
    ));

    let request = ledger
        .request_withdrawal(user, dec!(520), "4111 1111 1111 1234", "daria  ivanova", None)
        .await
        .unwrap();
    assert_eq!(request.card_number, "**** **** **** 1234");
    assert_eq!(request.card_holder, "DARIA IVANOVA");
    assert_eq!(request.amount_cny, None);
    assert_eq!(market.balances(user).await, Balances::new(dec!(1300), dec!(100)));

    let pending = ledger.pending_withdrawals(market.admin()).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].card_number, "**** **** **** 1234");

    let approved = ledger
        .review_withdrawal(market.admin(), request.id, Decision::Approve, None)
        .await
        .unwrap();
    assert_eq!(approved.status, RequestStatus::Approved);
    assert_eq!(approved.amount_cny, Some(dec!(40)));
    assert_eq!(market.balances(user).await, Balances::new(dec!(780), dec!(60)));

    assert!(matches!(
        ledger
            .review_withdrawal(market.admin(), request.id, Decision::Approve, None)
            .await,
        Err(MarketError::AlreadyProcessed(_))
    ));
}

#[tokio::test]
async fn test_withdrawal_cny_debit_capped_at_balance() {
    let market = TestMarket::new().await;
    let ledger = market.state.ledger();
    let user = funded_user(&market, "Elena", dec!(1300)).await;
    ledger
        .correct_balance(market.admin(), user, Currency::Cny, dec!(10))
        .await
        .unwrap();

    let request = ledger
        .request_withdrawal(user, dec!(1300), "5555555555554444", "Elena", None)
        .await
        .unwrap();
    let approved = ledger
        .review_withdrawal(market.admin(), request.id, Decision::Approve, None)
        .await
        .unwrap();

    assert_eq!(approved.amount_cny, Some(dec!(10)));
    assert_eq!(market.balances(user).await, Balances::default());
}

#[tokio::test]
async fn test_withdrawal_beyond_rub_balance_is_refused() {
    let market = TestMarket::new().await;
    let ledger = market.state.ledger();
    let user = funded_user(&market, "Fedor", dec!(130)).await;

    assert!(matches!(
        ledger
            .request_withdrawal(user, dec!(500), "5555555555554444", "Fedor", None)
            .await,
        Err(MarketError::InsufficientFunds {
            currency: Currency::Rub,
            ..
        })
    ));

    let request = ledger
        .request_withdrawal(user, dec!(120), "5555555555554444", "Fedor", None)
        .await
        .unwrap();
    ledger
        .correct_balance(market.admin(), user, Currency::Rub, dec!(50))
        .await
        .unwrap();

    let result = ledger
        .review_withdrawal(market.admin(), request.id, Decision::Approve, None)
        .await;

    assert!(matches!(
        result,
        Err(MarketError::InsufficientFunds {
            currency: Currency::Rub,
            ..
        })
    ));
    assert_eq!(ledger.pending_withdrawals(market.admin()).await.unwrap().len(), 1);
    assert_eq!(market.balances(user).await, Balances::new(dec!(50), dec!(10)));
}

// =============================================================================
// Balances
// =============================================================================

#[tokio::test]
async fn test_concurrent_adjustments_all_apply() {
    let market = TestMarket::new().await;
    let user = market.user_with("Gennady", dec!(0), dec!(0)).await;

    let handles: Vec<_> = (0..25)
        .map(|i| {
            let ledger = market.state.ledger().clone();
            let delta = if i % 5 == 0 { dec!(-1.50) } else { dec!(3.25) };
            tokio::spawn(async move { ledger.adjust(user, Currency::Cny, delta).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // 20 * 3.25 - 5 * 1.50
    assert_eq!(market.balances(user).await.cny, dec!(57.50));
}

#[tokio::test]
async fn test_correction_requires_admin() {
    let market = TestMarket::new().await;
    let user = market.user_with("Inna", dec!(100), dec!(10)).await;

    assert!(matches!(
        market
            .state
            .ledger()
            .correct_balance(user, user, Currency::Rub, dec!(1000000))
            .await,
        Err(MarketError::Forbidden(_))
    ));

    let corrected = market
        .state
        .ledger()
        .correct_balance(market.admin(), user, Currency::Rub, dec!(42))
        .await
        .unwrap();
    assert_eq!(corrected, Balances::new(dec!(42), dec!(10)));
}

// =============================================================================
// History
// =============================================================================

#[tokio::test]
async fn test_history_replays_to_zero_opening() {
    let market = TestMarket::new().await;
    let ledger = market.state.ledger();
    let user = funded_user(&market, "Kirill", dec!(26000)).await;

    let model = market.model("Coat", dec!(300), 1).await;
    market
        .state
        .settlement()
        .checkout(user, &[CheckoutLine { model_id: model, quantity: 1 }], &[])
        .await
        .unwrap();
    let order = market.weighed_order(user, dec!(100), Some(dec!(1))).await;
    market
        .state
        .shipments()
        .create(user, shipment_request(&[order], "air_slow"))
        .await
        .unwrap();
    let withdrawal = ledger
        .request_withdrawal(user, dec!(260), "4111111111111111", "Kirill", None)
        .await
        .unwrap();
    ledger
        .review_withdrawal(market.admin(), withdrawal.id, Decision::Approve, None)
        .await
        .unwrap();
    ledger
        .request_replenishment(user, dec!(1300), paid_on(), None)
        .await
        .unwrap();

    let history = ledger.history(user).await.unwrap();

    assert_eq!(history.opening, Balances::default());
    assert_eq!(history.current, market.balances(user).await);
    let settled: Vec<_> = history
        .entries
        .iter()
        .filter(|e| e.record.status.is_settled())
        .collect();
    let rub: Decimal = settled.iter().map(|e| e.record.delta.rub).sum();
    let cny: Decimal = settled.iter().map(|e| e.record.delta.cny).sum();
    assert_eq!(Balances::new(rub, cny), history.current);

    // Newest first: the pending replenishment leads and carries no balance.
    assert_eq!(history.entries[0].record.kind, EntryKind::Replenishment);
    assert_eq!(history.entries[0].record.status, LedgerStatus::Pending);
    assert_eq!(history.entries[0].balance_after, None);
    assert_eq!(history.entries[1].record.kind, EntryKind::Withdrawal);
    assert_eq!(history.entries[1].balance_after, Some(history.current));
    assert!(history.entries.iter().any(|e| e.record.kind == EntryKind::ShipmentFreight));

    assert_eq!(ledger.history(user).await.unwrap(), history);
}

#[tokio::test]
async fn test_history_after_correction_has_nonzero_opening() {
    let market = TestMarket::new().await;
    let ledger = market.state.ledger();
    let user = funded_user(&market, "Lidia", dec!(1300)).await;

    ledger
        .correct_balance(market.admin(), user, Currency::Rub, dec!(1500))
        .await
        .unwrap();

    let history = ledger.history(user).await.unwrap();
    assert_eq!(history.opening, Balances::new(dec!(200), dec!(0)));
    assert_eq!(history.entries.len(), 1);
}
