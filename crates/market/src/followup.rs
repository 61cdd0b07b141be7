//! Best-effort work that runs after a unit of work has committed.
//!
//! RUB mirror debits and the order status bump on consolidation are
//! bookkeeping, not correctness. They are collected while the main unit of
//! work is prepared and attempted one by one after it commits. A failure is
//! logged at `warn` and never reaches the caller.

use rubuy_core::{OrderId, OrderStatus, UserId};
use rust_decimal::Decimal;

use crate::db::Store;
use crate::models::{MirrorTarget, OrderUpdate};
use crate::rates::{RateSource, Rates};

/// Amount of a RUB mirror debit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorAmount {
    /// Already priced in RUB, e.g. by a freight quote.
    Rub(Decimal),
    /// A CNY charge converted at the rates fetched after commit.
    Cny(Decimal),
}

/// One post-commit task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    Mirror {
        user: UserId,
        target: MirrorTarget,
        amount: MirrorAmount,
    },
    MarkInShipment(OrderId),
}

impl std::fmt::Display for FollowUp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mirror { target, .. } => write!(f, "RUB mirror of {target}"),
            Self::MarkInShipment(id) => write!(f, "in-shipment status of order {id}"),
        }
    }
}

/// Outcome counts of a follow-up run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FollowUpReport {
    pub completed: usize,
    pub failed: usize,
}

/// Ordered list of post-commit tasks.
#[derive(Debug, Clone, Default)]
#[must_use = "follow-ups do nothing unless run"]
pub struct FollowUps {
    tasks: Vec<FollowUp>,
}

impl FollowUps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mirror(&mut self, user: UserId, target: MirrorTarget, amount: MirrorAmount) {
        self.tasks.push(FollowUp::Mirror {
            user,
            target,
            amount,
        });
    }

    pub fn mark_in_shipment(&mut self, order: OrderId) {
        self.tasks.push(FollowUp::MarkInShipment(order));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Attempt every task in order.
    ///
    /// Rates are fetched at most once, and only if a task needs a CNY
    /// conversion; if that fetch fails those tasks are skipped.
    pub async fn run<S: Store, R: RateSource>(self, store: &S, rates: &R) -> FollowUpReport {
        let mut report = FollowUpReport::default();
        let mut fetched: Option<Option<Rates>> = None;

        for task in self.tasks {
            let outcome = match &task {
                FollowUp::Mirror {
                    user,
                    target,
                    amount,
                } => {
                    let rub = match amount {
                        MirrorAmount::Rub(rub) => Some(*rub),
                        MirrorAmount::Cny(cny) => {
                            if fetched.is_none() {
                                fetched = Some(match rates.fetch_rates().await {
                                    Ok(rates) => Some(rates),
                                    Err(e) => {
                                        tracing::warn!(error = %e, "Rates unavailable, skipping RUB mirror conversions");
                                        None
                                    }
                                });
                            }
                            fetched.flatten().map(|rates| rates.cny_to_rub_amount(*cny))
                        }
                    };
                    match rub {
                        Some(rub) => store.record_mirror(*user, *target, rub).await.map(|_| ()),
                        None => {
                            report.failed += 1;
                            continue;
                        }
                    }
                }
                FollowUp::MarkInShipment(order) => store
                    .update_order(
                        *order,
                        &OrderUpdate::SetStatus {
                            status: OrderStatus::InShipment,
                        },
                    )
                    .await
                    .map(|_| ()),
            };

            match outcome {
                Ok(()) => report.completed += 1,
                Err(e) => {
                    tracing::warn!(task = %task, error = %e, "Post-commit task failed");
                    report.failed += 1;
                }
            }
        }

        report
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rubuy_core::{Currency, ModelListing, ProductListing};
    use rust_decimal_macros::dec;
    use std::collections::BTreeSet;

    use crate::db::MemoryStore;
    use crate::models::{CheckoutLine, CheckoutRequest};
    use crate::rates::FixedRates;

    async fn ordered(store: &MemoryStore) -> (UserId, OrderId) {
        let user = store.create_user("Dasha", false).await.unwrap().id;
        store.adjust_balance(user, Currency::Cny, dec!(100)).await.unwrap();
        store.adjust_balance(user, Currency::Rub, dec!(2000)).await.unwrap();
        let product = store
            .ingest_listing(&ProductListing {
                title: "Scarf".to_string(),
                base_price: dec!(100),
                temporary: false,
                models: vec![ModelListing {
                    color_name: "grey".to_string(),
                    size_name: "one".to_string(),
                    price: None,
                    stock: 1,
                    image_url: None,
                }],
            })
            .await
            .unwrap();
        let model = store.product(product.product_id).await.unwrap().models[0].id;
        let receipt = store
            .checkout(
                user,
                &CheckoutRequest {
                    lines: vec![CheckoutLine { model_id: model, quantity: 1 }],
                    services: BTreeSet::new(),
                },
            )
            .await
            .unwrap();
        (user, receipt.order_ids[0])
    }

    #[tokio::test]
    async fn test_cny_mirror_converts_at_fetched_rate() {
        let store = MemoryStore::new();
        let (user, order) = ordered(&store).await;
        let rates = FixedRates::new(Rates::new(dec!(95), dec!(13)).unwrap());

        let mut tasks = FollowUps::new();
        tasks.mirror(user, MirrorTarget::Order(order), MirrorAmount::Cny(dec!(100)));
        tasks.mark_in_shipment(order);
        let report = tasks.run(&store, &rates).await;

        assert_eq!(report, FollowUpReport { completed: 2, failed: 0 });
        assert_eq!(store.user(user).await.unwrap().balances.rub, dec!(700));
        assert_eq!(store.order(order).await.unwrap().rub_charged, Some(dec!(1300)));
        assert_eq!(store.order(order).await.unwrap().status, OrderStatus::InShipment);
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_raised() {
        let store = MemoryStore::new();
        let (user, order) = ordered(&store).await;
        store.fail_order_updates(true);

        let mut tasks = FollowUps::new();
        tasks.mirror(user, MirrorTarget::Order(order), MirrorAmount::Cny(dec!(100)));
        tasks.mark_in_shipment(order);
        let report = tasks.run(&store, &FixedRates::unavailable()).await;

        assert_eq!(report, FollowUpReport { completed: 0, failed: 2 });
        assert_eq!(store.user(user).await.unwrap().balances.rub, dec!(2000));
        assert_eq!(store.order(order).await.unwrap().rub_charged, None);
    }

    #[tokio::test]
    async fn test_rates_fetched_once() {
        let store = MemoryStore::new();
        let (user, order) = ordered(&store).await;
        let rates = FixedRates::unavailable();

        let mut tasks = FollowUps::new();
        tasks.mirror(user, MirrorTarget::Order(order), MirrorAmount::Cny(dec!(1)));
        tasks.mirror(user, MirrorTarget::ChinaFreight(order), MirrorAmount::Cny(dec!(1)));
        let _ = tasks.run(&store, &rates).await;

        assert_eq!(rates.calls(), 1);
    }
}
