//! In-process [`Store`] with the same unit-of-work semantics as Postgres.
//!
//! All tables sit behind one `tokio::sync::Mutex`; every method holds the
//! lock for its whole unit of work, validates first and only then writes.
//! Used by the test suites and for local experiments without a database.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Utc};
use rubuy_core::{
    Balances, Currency, ModelId, ModelState, OrderId, OrderStatus, ProductId, ProductListing,
    ReplenishmentId, RequestStatus, ShipmentId, ShipmentStatus, TrackingCode, TrackingNamespace,
    UserId, WithdrawalId,
};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use super::rules;
use super::{RepositoryError, Store};
use crate::codec;
use crate::error::{Entity, MarketError, Result};
use crate::ledger::history::LedgerSnapshot;
use crate::models::{
    CartEntry, CartLine, CheckoutReceipt, CheckoutRequest, Ingested, MirrorTarget, Model,
    NewReplenishment, NewShipment, NewWithdrawal, Order, OrderUpdate, Product, ProductDetail,
    PurgeReport, Replenishment, Review, Shipment, User, Withdrawal,
};
use crate::settlement::allocation::{self, PricedLine};
use crate::tracking;

/// In-memory store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Faults>,
}

/// Switchable failures for exercising best-effort paths.
#[derive(Default)]
struct Faults {
    mirror: AtomicBool,
    order_updates: AtomicBool,
}

#[derive(Default)]
struct Tables {
    last_tick: Option<DateTime<Utc>>,
    next_id: i32,
    users: BTreeMap<UserId, User>,
    replenishments: BTreeMap<ReplenishmentId, Replenishment>,
    withdrawals: BTreeMap<WithdrawalId, Withdrawal>,
    products: BTreeMap<ProductId, Product>,
    models: BTreeMap<ModelId, Model>,
    cart: BTreeMap<(UserId, ModelId), (i32, DateTime<Utc>)>,
    orders: BTreeMap<OrderId, Order>,
    shipments: BTreeMap<ShipmentId, Shipment>,
}

impl Tables {
    /// Strictly increasing timestamps, so replay order is never left to ties.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let now = match self.last_tick {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_tick = Some(now);
        now
    }

    fn id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn user(&self, id: UserId) -> Result<&User> {
        self.users
            .get(&id)
            .ok_or(MarketError::NotFound(Entity::User, id.as_i32()))
    }

    fn user_mut(&mut self, id: UserId) -> Result<&mut User> {
        self.users
            .get_mut(&id)
            .ok_or(MarketError::NotFound(Entity::User, id.as_i32()))
    }

    fn model(&self, id: ModelId) -> Result<&Model> {
        self.models
            .get(&id)
            .ok_or(MarketError::NotFound(Entity::Model, id.as_i32()))
    }

    fn order_mut(&mut self, id: OrderId) -> Result<&mut Order> {
        self.orders
            .get_mut(&id)
            .ok_or(MarketError::NotFound(Entity::Order, id.as_i32()))
    }

    fn owned_order(&self, user: UserId, id: OrderId) -> Result<&Order> {
        self.orders
            .get(&id)
            .filter(|o| o.user_id == user)
            .ok_or(MarketError::NotFound(Entity::Order, id.as_i32()))
    }

    fn shipment_mut(&mut self, id: ShipmentId) -> Result<&mut Shipment> {
        self.shipments
            .get_mut(&id)
            .ok_or(MarketError::NotFound(Entity::Shipment, id.as_i32()))
    }

    fn owned_shipment(&self, user: UserId, id: ShipmentId) -> Result<&Shipment> {
        self.shipments
            .get(&id)
            .filter(|s| s.user_id == user)
            .ok_or(MarketError::NotFound(Entity::Shipment, id.as_i32()))
    }

    fn cart_line(&self, user: UserId, model: ModelId) -> Option<CartLine> {
        let (quantity, added_at) = self.cart.get(&(user, model))?;
        let unit_price = self.models.get(&model)?.price;
        Some(CartLine {
            user_id: user,
            model_id: model,
            quantity: *quantity,
            unit_price,
            added_at: *added_at,
        })
    }

    fn held(&self, user: UserId, model: ModelId) -> CartEntry {
        self.cart
            .get(&(user, model))
            .map_or(CartEntry::Absent, |(quantity, _)| CartEntry::Present {
                quantity: *quantity,
            })
    }

    fn fresh_code(&self, namespace: TrackingNamespace) -> Result<TrackingCode> {
        let taken: HashSet<TrackingCode> = match namespace {
            TrackingNamespace::Order => self.orders.values().map(|o| o.tracking_code.clone()).collect(),
            TrackingNamespace::Shipment => self
                .shipments
                .values()
                .map(|s| s.tracking_code.clone())
                .collect(),
        };
        tracking::first_unused(tracking::candidates(namespace), &taken).ok_or_else(|| {
            RepositoryError::Conflict("no free tracking code after retries".to_string()).into()
        })
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every RUB mirror debit fail.
    pub fn fail_mirrors(&self, fail: bool) {
        self.faults.mirror.store(fail, Ordering::SeqCst);
    }

    /// Make every order update fail.
    pub fn fail_order_updates(&self, fail: bool) {
        self.faults.order_updates.store(fail, Ordering::SeqCst);
    }

    /// Overwrite a stored id set, as a corrupted write would.
    pub async fn overwrite_order_ids(&self, id: ShipmentId, raw: &str) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.shipment_mut(id)?.order_ids_raw = raw.to_string();
        Ok(())
    }

    fn injected(flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(RepositoryError::Conflict(format!("injected {what} failure")).into());
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn create_user(&self, name: &str, is_admin: bool) -> Result<User> {
        let mut tables = self.tables.lock().await;
        let id = UserId::new(tables.id());
        let user = User {
            id,
            name: name.to_string(),
            is_admin,
            balances: Balances::default(),
            created_at: tables.tick(),
        };
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    async fn user(&self, id: UserId) -> Result<User> {
        self.tables.lock().await.user(id).cloned()
    }

    async fn adjust_balance(&self, user: UserId, currency: Currency, delta: Decimal) -> Result<Balances> {
        let mut tables = self.tables.lock().await;
        let user = tables.user_mut(user)?;
        user.balances = user.balances.with_delta(currency, delta);
        Ok(user.balances)
    }

    async fn set_balance(&self, user: UserId, currency: Currency, amount: Decimal) -> Result<Balances> {
        let mut tables = self.tables.lock().await;
        let user = tables.user_mut(user)?;
        let current = user.balances.amount(currency);
        user.balances = user.balances.with_delta(currency, amount - current);
        Ok(user.balances)
    }

    async fn record_mirror(&self, user: UserId, target: MirrorTarget, amount_rub: Decimal) -> Result<Balances> {
        Self::injected(&self.faults.mirror, "mirror")?;
        let mut tables = self.tables.lock().await;
        let balances = tables.user(user)?.balances;

        match target {
            MirrorTarget::Order(id) => {
                rules::ensure_mirror_open(tables.owned_order(user, id)?.rub_charged, &target.to_string())?;
            }
            MirrorTarget::ChinaFreight(id) => {
                let order = tables.owned_order(user, id)?;
                if !order.china_freight_paid {
                    return Err(MarketError::Validation(format!("{target} is not paid")));
                }
                rules::ensure_mirror_open(order.china_freight_rub, &target.to_string())?;
            }
            MirrorTarget::Shipment(id) => {
                rules::ensure_mirror_open(tables.owned_shipment(user, id)?.rub_charged, &target.to_string())?;
            }
            MirrorTarget::Packaging(id) => {
                let shipment = tables.owned_shipment(user, id)?;
                if !shipment.packaging_paid {
                    return Err(MarketError::Validation(format!("{target} is not paid")));
                }
                rules::ensure_mirror_open(shipment.packaging_rub, &target.to_string())?;
            }
        }
        rules::ensure_funds(&balances, Currency::Rub, amount_rub)?;

        match target {
            MirrorTarget::Order(id) => tables.order_mut(id)?.rub_charged = Some(amount_rub),
            MirrorTarget::ChinaFreight(id) => tables.order_mut(id)?.china_freight_rub = Some(amount_rub),
            MirrorTarget::Shipment(id) => tables.shipment_mut(id)?.rub_charged = Some(amount_rub),
            MirrorTarget::Packaging(id) => tables.shipment_mut(id)?.packaging_rub = Some(amount_rub),
        }
        let user = tables.user_mut(user)?;
        user.balances = user.balances.with_delta(Currency::Rub, -amount_rub);
        Ok(user.balances)
    }

    async fn ledger_snapshot(&self, user: UserId) -> Result<LedgerSnapshot> {
        let tables = self.tables.lock().await;
        let balances = tables.user(user)?.balances;
        Ok(LedgerSnapshot {
            balances,
            replenishments: tables.replenishments.values().filter(|r| r.user_id == user).cloned().collect(),
            withdrawals: tables.withdrawals.values().filter(|w| w.user_id == user).cloned().collect(),
            orders: tables.orders.values().filter(|o| o.user_id == user).cloned().collect(),
            shipments: tables.shipments.values().filter(|s| s.user_id == user).cloned().collect(),
        })
    }

    async fn insert_replenishment(&self, new: NewReplenishment) -> Result<Replenishment> {
        let mut tables = self.tables.lock().await;
        tables.user(new.user_id)?;
        let id = ReplenishmentId::new(tables.id());
        let replenishment = Replenishment {
            id,
            user_id: new.user_id,
            amount_rub: new.amount_rub,
            amount_cny: new.amount_cny,
            payment_date: new.payment_date,
            receipt_ref: new.receipt_ref,
            status: RequestStatus::Pending,
            admin_id: None,
            comment: None,
            created_at: tables.tick(),
            processed_at: None,
        };
        tables.replenishments.insert(id, replenishment.clone());
        Ok(replenishment)
    }

    async fn review_replenishment(&self, id: ReplenishmentId, review: &Review) -> Result<Replenishment> {
        let mut tables = self.tables.lock().await;
        let request = tables
            .replenishments
            .get(&id)
            .cloned()
            .ok_or(MarketError::NotFound(Entity::Replenishment, id.as_i32()))?;
        rules::ensure_pending(request.status, Entity::Replenishment, id.as_i32())?;
        tables.user(request.user_id)?;

        let status = review.decision.resulting_status();
        if status == RequestStatus::Approved {
            let user = tables.user_mut(request.user_id)?;
            user.balances = user
                .balances
                .with_delta(Currency::Rub, request.amount_rub)
                .with_delta(Currency::Cny, request.amount_cny);
        }

        let processed_at = tables.tick();
        let updated = Replenishment {
            status,
            admin_id: Some(review.admin),
            comment: review.comment.clone(),
            processed_at: Some(processed_at),
            ..request
        };
        tables.replenishments.insert(id, updated.clone());
        Ok(updated)
    }

    async fn pending_replenishments(&self) -> Result<Vec<Replenishment>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .replenishments
            .values()
            .filter(|r| r.status == RequestStatus::Pending)
            .cloned()
            .collect())
    }

    async fn insert_withdrawal(&self, new: NewWithdrawal) -> Result<Withdrawal> {
        let mut tables = self.tables.lock().await;
        let balances = tables.user(new.user_id)?.balances;
        rules::ensure_funds(&balances, Currency::Rub, new.amount_rub)?;

        let id = WithdrawalId::new(tables.id());
        let withdrawal = Withdrawal {
            id,
            user_id: new.user_id,
            amount_rub: new.amount_rub,
            amount_cny: None,
            card_number: new.card_number,
            card_holder: new.card_holder,
            name: new.name,
            status: RequestStatus::Pending,
            admin_id: None,
            comment: None,
            created_at: tables.tick(),
            processed_at: None,
        };
        tables.withdrawals.insert(id, withdrawal.clone());
        Ok(withdrawal)
    }

    async fn withdrawal(&self, id: WithdrawalId) -> Result<Withdrawal> {
        self.tables
            .lock()
            .await
            .withdrawals
            .get(&id)
            .cloned()
            .ok_or(MarketError::NotFound(Entity::Withdrawal, id.as_i32()))
    }

    async fn review_withdrawal(&self, id: WithdrawalId, review: &Review, cny_debit: Decimal) -> Result<Withdrawal> {
        let mut tables = self.tables.lock().await;
        let request = tables
            .withdrawals
            .get(&id)
            .cloned()
            .ok_or(MarketError::NotFound(Entity::Withdrawal, id.as_i32()))?;
        rules::ensure_pending(request.status, Entity::Withdrawal, id.as_i32())?;
        let balances = tables.user(request.user_id)?.balances;

        let status = review.decision.resulting_status();
        let mut amount_cny = None;
        if status == RequestStatus::Approved {
            rules::ensure_funds(&balances, Currency::Rub, request.amount_rub)?;
            let cny = rules::withdrawal_cny_debit(&balances, cny_debit);
            let user = tables.user_mut(request.user_id)?;
            user.balances = user
                .balances
                .with_delta(Currency::Rub, -request.amount_rub)
                .with_delta(Currency::Cny, -cny);
            amount_cny = Some(cny);
        }

        let processed_at = tables.tick();
        let updated = Withdrawal {
            status,
            amount_cny,
            admin_id: Some(review.admin),
            comment: review.comment.clone(),
            processed_at: Some(processed_at),
            ..request
        };
        tables.withdrawals.insert(id, updated.clone());
        Ok(updated)
    }

    async fn pending_withdrawals(&self) -> Result<Vec<Withdrawal>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .withdrawals
            .values()
            .filter(|w| w.status == RequestStatus::Pending)
            .cloned()
            .collect())
    }

    async fn ingest_listing(&self, listing: &ProductListing) -> Result<Ingested> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables
            .products
            .values()
            .find(|p| p.title == listing.title && p.base_price == listing.base_price)
        {
            return Ok(Ingested {
                product_id: existing.id,
                created: false,
            });
        }

        let created_at = tables.tick();
        let product_id = ProductId::new(tables.id());
        tables.products.insert(
            product_id,
            Product {
                id: product_id,
                title: listing.title.clone(),
                base_price: listing.base_price,
                temporary: listing.temporary,
                created_at,
            },
        );
        for variant in &listing.models {
            let id = ModelId::new(tables.id());
            tables.models.insert(
                id,
                Model {
                    id,
                    product_id,
                    color_name: variant.color_name.clone(),
                    size_name: variant.size_name.clone(),
                    price: variant.effective_price(listing.base_price),
                    stock: variant.stock,
                    image_url: variant.image_url.clone(),
                    state: ModelState::Available,
                    temporary: listing.temporary,
                    created_at,
                },
            );
        }

        Ok(Ingested {
            product_id,
            created: true,
        })
    }

    async fn product(&self, id: ProductId) -> Result<ProductDetail> {
        let tables = self.tables.lock().await;
        let product = tables
            .products
            .get(&id)
            .cloned()
            .ok_or(MarketError::NotFound(Entity::Product, id.as_i32()))?;
        let models = tables
            .models
            .values()
            .filter(|m| m.product_id == id)
            .cloned()
            .collect();
        Ok(ProductDetail::new(product, models))
    }

    async fn purge_temporary(&self, cutoff: DateTime<Utc>) -> Result<PurgeReport> {
        let mut tables = self.tables.lock().await;
        let referenced: BTreeSet<ModelId> = tables
            .cart
            .keys()
            .map(|(_, model)| *model)
            .chain(tables.orders.values().map(|o| o.model_id))
            .collect();

        let before_models = tables.models.len();
        tables
            .models
            .retain(|id, m| !(m.temporary && m.created_at < cutoff && !referenced.contains(id)));
        let models = before_models - tables.models.len();

        let with_models: BTreeSet<ProductId> = tables.models.values().map(|m| m.product_id).collect();
        let before_products = tables.products.len();
        tables
            .products
            .retain(|id, p| !(p.temporary && !with_models.contains(id)));
        let products = before_products - tables.products.len();

        Ok(PurgeReport {
            models: models as u64,
            products: products as u64,
        })
    }

    async fn reserve(&self, user: UserId, model: ModelId, quantity: i32) -> Result<CartLine> {
        let mut tables = self.tables.lock().await;
        tables.user(user)?;
        let available = tables.model(model)?.stock;
        if available < quantity {
            return Err(MarketError::InsufficientStock {
                model,
                requested: quantity,
                available,
            });
        }

        let now = tables.tick();
        if let Some(m) = tables.models.get_mut(&model) {
            m.stock -= quantity;
            m.state = ModelState::InCart;
        }
        let entry = tables.cart.entry((user, model)).or_insert((0, now));
        entry.0 += quantity;

        tables
            .cart_line(user, model)
            .ok_or(MarketError::NotFound(Entity::CartEntry, model.as_i32()))
    }

    async fn release(&self, user: UserId, model: ModelId) -> Result<i32> {
        let mut tables = self.tables.lock().await;
        let (quantity, _) = tables
            .cart
            .remove(&(user, model))
            .ok_or(MarketError::NotFound(Entity::CartEntry, model.as_i32()))?;

        let still_held = tables.cart.keys().any(|(_, m)| *m == model);
        if let Some(m) = tables.models.get_mut(&model) {
            m.stock += quantity;
            if !still_held && m.state == ModelState::InCart {
                m.state = ModelState::Available;
            }
        }
        Ok(quantity)
    }

    async fn cart(&self, user: UserId) -> Result<Vec<CartLine>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .cart
            .keys()
            .filter(|(u, _)| *u == user)
            .filter_map(|(u, m)| tables.cart_line(*u, *m))
            .collect())
    }

    async fn cart_entry(&self, user: UserId, model: ModelId) -> Result<CartEntry> {
        Ok(self.tables.lock().await.held(user, model))
    }

    async fn checkout(&self, user: UserId, request: &CheckoutRequest) -> Result<CheckoutReceipt> {
        let mut tables = self.tables.lock().await;
        let balances = tables.user(user)?.balances;

        let priced = request
            .lines
            .iter()
            .map(|line| {
                Ok(PricedLine {
                    model_id: line.model_id,
                    unit_price: tables.model(line.model_id)?.price,
                    quantity: line.quantity,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let plan = allocation::plan(&priced, &request.services)?;
        rules::ensure_funds(&balances, Currency::Cny, plan.total())?;

        // Units not held in the cart come out of model stock.
        let mut shortfalls = Vec::with_capacity(plan.lines.len());
        for line in &plan.lines {
            let requested = tables.held(user, line.model_id).shortfall(line.quantity);
            let available = tables.model(line.model_id)?.stock;
            if requested > available {
                return Err(MarketError::InsufficientStock {
                    model: line.model_id,
                    requested,
                    available,
                });
            }
            shortfalls.push((line.model_id, requested));
        }
        let tracking_code = tables.fresh_code(TrackingNamespace::Order)?;

        // Writes start here.
        for (model, requested) in shortfalls {
            if let Some(m) = tables.models.get_mut(&model) {
                m.stock -= requested;
            }
        }
        let created_at = tables.tick();
        let user_row = tables.user_mut(user)?;
        user_row.balances = user_row.balances.with_delta(Currency::Cny, -plan.total());

        let services: Vec<_> = request.services.iter().copied().collect();
        let mut order_ids = Vec::with_capacity(plan.lines.len());
        let mut order_totals = Vec::with_capacity(plan.lines.len());
        for line in &plan.lines {
            let id = OrderId::new(tables.id());
            tables.orders.insert(
                id,
                Order {
                    id,
                    user_id: user,
                    model_id: line.model_id,
                    quantity: line.quantity,
                    total_price_cny: line.total(),
                    services: services.clone(),
                    tracking_code: tracking_code.clone(),
                    status: OrderStatus::Ordered,
                    weight_kg: None,
                    china_freight_cny: None,
                    china_freight_paid: false,
                    china_freight_paid_at: None,
                    china_freight_rub: None,
                    rub_charged: None,
                    photos: Vec::new(),
                    created_at,
                },
            );
            if let Some(m) = tables.models.get_mut(&line.model_id) {
                m.state = ModelState::Accepted;
            }

            let key = (user, line.model_id);
            match tables.held(user, line.model_id).consume(line.quantity) {
                CartEntry::Present { quantity } => {
                    if let Some(entry) = tables.cart.get_mut(&key) {
                        entry.0 = quantity;
                    }
                }
                CartEntry::Absent => {
                    tables.cart.remove(&key);
                }
            }

            order_ids.push(id);
            order_totals.push(line.total());
        }

        Ok(CheckoutReceipt {
            order_ids,
            tracking_code,
            product_cost_cny: plan.product_cost,
            service_cost_cny: plan.service_cost,
            total_cny: plan.total(),
            order_totals_cny: order_totals,
        })
    }

    async fn order(&self, id: OrderId) -> Result<Order> {
        self.tables
            .lock()
            .await
            .orders
            .get(&id)
            .cloned()
            .ok_or(MarketError::NotFound(Entity::Order, id.as_i32()))
    }

    async fn user_orders(&self, user: UserId) -> Result<Vec<Order>> {
        let tables = self.tables.lock().await;
        tables.user(user)?;
        Ok(tables.orders.values().filter(|o| o.user_id == user).cloned().collect())
    }

    async fn update_order(&self, id: OrderId, update: &OrderUpdate) -> Result<Order> {
        Self::injected(&self.faults.order_updates, "order update")?;
        let mut tables = self.tables.lock().await;
        let mut order = tables.order_mut(id)?.clone();
        rules::apply_order_update(&mut order, update)?;
        tables.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn pay_china_freight(&self, user: UserId, order: OrderId) -> Result<Order> {
        let mut tables = self.tables.lock().await;
        let balances = tables.user(user)?.balances;
        let price = rules::china_freight_payable(tables.owned_order(user, order)?)?;
        rules::ensure_funds(&balances, Currency::Cny, price)?;

        let paid_at = tables.tick();
        let user_row = tables.user_mut(user)?;
        user_row.balances = user_row.balances.with_delta(Currency::Cny, -price);
        let row = tables.order_mut(order)?;
        row.china_freight_paid = true;
        row.china_freight_paid_at = Some(paid_at);
        Ok(row.clone())
    }

    async fn create_shipment(&self, new: &NewShipment) -> Result<Shipment> {
        let mut tables = self.tables.lock().await;
        let balances = tables.user(new.user_id)?.balances;
        let valid: BTreeSet<OrderId> = tables
            .orders
            .values()
            .filter(|o| o.user_id == new.user_id)
            .map(|o| o.id)
            .collect();
        let consolidated = rules::consolidated_ids(
            tables
                .shipments
                .values()
                .filter(|s| s.user_id == new.user_id)
                .map(|s| s.order_ids_raw.as_str()),
            &valid,
        );
        for id in &new.order_ids {
            let order = tables.owned_order(new.user_id, *id)?;
            rules::ensure_unshipped(order.id, order.status, &consolidated)?;
        }
        if new.order_ids.is_empty() {
            return Err(MarketError::validation("shipment has no orders"));
        }
        rules::ensure_funds(&balances, Currency::Cny, new.quote.cny_charge)?;
        let tracking_code = tables.fresh_code(TrackingNamespace::Shipment)?;

        let created_at = tables.tick();
        let user_row = tables.user_mut(new.user_id)?;
        user_row.balances = user_row
            .balances
            .with_delta(Currency::Cny, -new.quote.cny_charge);

        let id = ShipmentId::new(tables.id());
        let shipment = Shipment {
            id,
            user_id: new.user_id,
            order_ids_raw: codec::encode(&new.order_ids),
            delivery_tier: new.delivery_tier,
            packaging: new.packaging.clone(),
            recipient: new.recipient.clone(),
            quote: new.quote,
            rub_charged: None,
            packaging_cost_cny: None,
            packaging_paid: false,
            packaging_paid_at: None,
            packaging_rub: None,
            tracking_code,
            status: ShipmentStatus::Pending,
            created_at,
        };
        tables.shipments.insert(id, shipment.clone());
        Ok(shipment)
    }

    async fn shipment(&self, id: ShipmentId) -> Result<Shipment> {
        self.tables
            .lock()
            .await
            .shipments
            .get(&id)
            .cloned()
            .ok_or(MarketError::NotFound(Entity::Shipment, id.as_i32()))
    }

    async fn user_shipments(&self, user: UserId) -> Result<Vec<Shipment>> {
        let tables = self.tables.lock().await;
        tables.user(user)?;
        Ok(tables.shipments.values().filter(|s| s.user_id == user).cloned().collect())
    }

    async fn pending_shipments(&self) -> Result<Vec<Shipment>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .shipments
            .values()
            .filter(|s| s.status == ShipmentStatus::Pending)
            .cloned()
            .collect())
    }

    async fn set_shipment_status(&self, id: ShipmentId, status: ShipmentStatus) -> Result<Shipment> {
        let mut tables = self.tables.lock().await;
        let shipment = tables.shipment_mut(id)?;
        shipment.status = status;
        Ok(shipment.clone())
    }

    async fn set_packaging_cost(&self, id: ShipmentId, cost_cny: Decimal) -> Result<Shipment> {
        let mut tables = self.tables.lock().await;
        let shipment = tables.shipment_mut(id)?;
        rules::packaging_assignable(shipment, cost_cny)?;
        shipment.packaging_cost_cny = Some(cost_cny);
        Ok(shipment.clone())
    }

    async fn pay_packaging(&self, user: UserId, id: ShipmentId) -> Result<Shipment> {
        let mut tables = self.tables.lock().await;
        let balances = tables.user(user)?.balances;
        let cost = rules::packaging_payable(tables.owned_shipment(user, id)?)?;
        rules::ensure_funds(&balances, Currency::Cny, cost)?;

        let paid_at = tables.tick();
        let user_row = tables.user_mut(user)?;
        user_row.balances = user_row.balances.with_delta(Currency::Cny, -cost);
        let shipment = tables.shipment_mut(id)?;
        shipment.packaging_paid = true;
        shipment.packaging_paid_at = Some(paid_at);
        Ok(shipment.clone())
    }
}
