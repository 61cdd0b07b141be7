//! Inventory gate: the only path through which model stock changes.
//!
//! A reservation is one conditional decrement; it either takes the whole
//! quantity or fails with `InsufficientStock` and changes nothing.

use rubuy_core::{ModelId, UserId};
use tracing::instrument;

use crate::db::Store;
use crate::error::{MarketError, Result};
use crate::models::{CartEntry, CartLine};

#[derive(Clone)]
pub struct InventoryGate<S> {
    store: S,
}

impl<S: Store> InventoryGate<S> {
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Move `quantity` units from stock into the user's cart.
    #[instrument(skip(self))]
    pub async fn reserve(&self, user: UserId, model: ModelId, quantity: i32) -> Result<CartLine> {
        if quantity < 1 {
            return Err(MarketError::validation("quantity must be at least 1"));
        }
        let line = self.store.reserve(user, model, quantity).await?;
        tracing::debug!(held = line.quantity, "Stock reserved");
        Ok(line)
    }

    /// Drop a cart entry and return its units to stock.
    #[instrument(skip(self))]
    pub async fn release(&self, user: UserId, model: ModelId) -> Result<i32> {
        let quantity = self.store.release(user, model).await?;
        tracing::debug!(quantity, "Reservation released");
        Ok(quantity)
    }

    pub async fn cart(&self, user: UserId) -> Result<Vec<CartLine>> {
        self.store.cart(user).await
    }

    pub async fn cart_entry(&self, user: UserId, model: ModelId) -> Result<CartEntry> {
        self.store.cart_entry(user, model).await
    }
}
