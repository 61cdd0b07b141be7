//! Products, purchasable models and cart contents.

use chrono::{DateTime, Utc};
use rubuy_core::{ModelId, ModelState, ProductId, UserId};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    pub base_price: Decimal,
    pub temporary: bool,
    pub created_at: DateTime<Utc>,
}

/// One purchasable color × size variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Model {
    pub id: ModelId,
    pub product_id: ProductId,
    pub color_name: String,
    pub size_name: String,
    pub price: Decimal,
    pub stock: i32,
    pub image_url: Option<String>,
    pub state: ModelState,
    pub temporary: bool,
    pub created_at: DateTime<Utc>,
}

/// A product with all of its models and their price range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductDetail {
    pub product: Product,
    pub models: Vec<Model>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
}

impl ProductDetail {
    #[must_use]
    pub fn new(product: Product, models: Vec<Model>) -> Self {
        let min_price = models.iter().map(|m| m.price).min();
        let max_price = models.iter().map(|m| m.price).max();
        Self {
            product,
            models,
            min_price,
            max_price,
        }
    }
}

/// Outcome of ingesting a scraped listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ingested {
    pub product_id: ProductId,
    /// `false` when an identical listing already existed.
    pub created: bool,
}

/// Rows removed by one janitor pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub models: u64,
    pub products: u64,
}

/// A user's cart holding for one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CartEntry {
    Present { quantity: i32 },
    Absent,
}

impl CartEntry {
    /// Held quantity, zero when absent.
    #[must_use]
    pub const fn quantity(&self) -> i32 {
        match self {
            Self::Present { quantity } => *quantity,
            Self::Absent => 0,
        }
    }

    /// Units of `quantity` this entry does not hold, which must come from
    /// model stock instead.
    #[must_use]
    pub const fn shortfall(&self, quantity: i32) -> i32 {
        let missing = quantity - self.quantity();
        if missing > 0 { missing } else { 0 }
    }

    /// Entry left after consuming `quantity` units at checkout.
    #[must_use]
    pub const fn consume(self, quantity: i32) -> Self {
        match self {
            Self::Present { quantity: held } if held > quantity => Self::Present {
                quantity: held - quantity,
            },
            _ => Self::Absent,
        }
    }
}

/// A cart row joined with the model's current price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    pub user_id: UserId,
    pub model_id: ModelId,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub added_at: DateTime<Utc>,
}
