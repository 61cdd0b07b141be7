//! The product listing shape produced by the storefront scraper.
//!
//! Listings are consumed once at ingestion time. Field names follow the
//! scraper's camelCase JSON.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A scraped product with its purchasable variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductListing {
    pub title: String,
    pub base_price: Decimal,
    /// Abandoned-scrape listings are purged by the janitor once stale.
    #[serde(default)]
    pub temporary: bool,
    pub models: Vec<ModelListing>,
}

/// One color × size variant of a scraped product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelListing {
    pub color_name: String,
    pub size_name: String,
    /// Falls back to the product's base price when absent.
    #[serde(default)]
    pub price: Option<Decimal>,
    pub stock: i32,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl ModelListing {
    /// Price charged for this variant.
    #[must_use]
    pub fn effective_price(&self, base_price: Decimal) -> Decimal {
        self.price.unwrap_or(base_price)
    }
}
