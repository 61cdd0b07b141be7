//! Application state shared across handlers.

use std::sync::Arc;

use crate::catalog::CatalogService;
use crate::db::Store;
use crate::inventory::InventoryGate;
use crate::ledger::LedgerService;
use crate::rates::RateSource;
use crate::settlement::SettlementService;
use crate::shipment::ShipmentService;
use crate::shipment::freight::PricingParams;

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`. Every service holds its own handle to the
/// same store and rate source.
pub struct AppState<S, R> {
    inner: Arc<AppStateInner<S, R>>,
}

struct AppStateInner<S, R> {
    store: S,
    ledger: LedgerService<S, R>,
    inventory: InventoryGate<S>,
    settlement: SettlementService<S, R>,
    shipments: ShipmentService<S, R>,
    catalog: CatalogService<S>,
}

impl<S, R> Clone for AppState<S, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Store, R: RateSource> AppState<S, R> {
    /// Wire the services over one store and rate source.
    ///
    /// `pricing` holds the default freight parameters that per-request
    /// overrides are applied to.
    pub fn new(store: S, rates: R, pricing: PricingParams) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                ledger: LedgerService::new(store.clone(), rates.clone()),
                inventory: InventoryGate::new(store.clone()),
                settlement: SettlementService::new(store.clone(), rates.clone()),
                shipments: ShipmentService::new(store.clone(), rates, pricing),
                catalog: CatalogService::new(store.clone()),
                store,
            }),
        }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    #[must_use]
    pub fn ledger(&self) -> &LedgerService<S, R> {
        &self.inner.ledger
    }

    #[must_use]
    pub fn inventory(&self) -> &InventoryGate<S> {
        &self.inner.inventory
    }

    #[must_use]
    pub fn settlement(&self) -> &SettlementService<S, R> {
        &self.inner.settlement
    }

    #[must_use]
    pub fn shipments(&self) -> &ShipmentService<S, R> {
        &self.inner.shipments
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogService<S> {
        &self.inner.catalog
    }
}
