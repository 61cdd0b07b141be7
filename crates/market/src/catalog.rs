//! Catalog ingestion of scraped listings.

use rubuy_core::{ProductId, ProductListing};
use rust_decimal::Decimal;
use tracing::instrument;

use crate::db::Store;
use crate::error::{MarketError, Result};
use crate::models::{Ingested, ProductDetail};

#[derive(Clone)]
pub struct CatalogService<S> {
    store: S,
}

impl<S: Store> CatalogService<S> {
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Store a listing, or return the existing product with the same title and base price.
    #[instrument(skip(self, listing), fields(title = %listing.title, models = listing.models.len()))]
    pub async fn ingest(&self, listing: &ProductListing) -> Result<Ingested> {
        let listing = normalize(listing)?;
        let ingested = self.store.ingest_listing(&listing).await?;
        if ingested.created {
            tracing::info!(product_id = %ingested.product_id, "Product ingested");
        } else {
            tracing::debug!(product_id = %ingested.product_id, "Listing already known");
        }
        Ok(ingested)
    }

    pub async fn product(&self, id: ProductId) -> Result<ProductDetail> {
        self.store.product(id).await
    }
}

/// Trim names and reject listings the store cannot hold.
fn normalize(listing: &ProductListing) -> Result<ProductListing> {
    let mut listing = listing.clone();
    listing.title = listing.title.trim().to_string();
    if listing.title.is_empty() {
        return Err(MarketError::validation("title is required"));
    }
    if listing.base_price < Decimal::ZERO {
        return Err(MarketError::validation("base price must not be negative"));
    }

    for model in &mut listing.models {
        model.color_name = model.color_name.trim().to_string();
        model.size_name = model.size_name.trim().to_string();
        if model.color_name.is_empty() || model.size_name.is_empty() {
            return Err(MarketError::validation("model color and size are required"));
        }
        if model.price.is_some_and(|p| p < Decimal::ZERO) {
            return Err(MarketError::Validation(format!(
                "price of {} / {} must not be negative",
                model.color_name, model.size_name
            )));
        }
        if model.stock < 0 {
            return Err(MarketError::Validation(format!(
                "stock of {} / {} must not be negative",
                model.color_name, model.size_name
            )));
        }
        model.image_url = model
            .image_url
            .take()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());
    }
    Ok(listing)
}
