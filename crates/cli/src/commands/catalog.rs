//! Catalog import command.
//!
//! Reads one listing in the scraper's camelCase JSON shape:
//!
//! ```json
//! {
//!   "title": "Linen shirt",
//!   "basePrice": "120",
//!   "temporary": false,
//!   "models": [{"colorName": "white", "sizeName": "M", "stock": 4}]
//! }
//! ```

use std::path::Path;

use rubuy_core::{ProductId, ProductListing};
use rubuy_market::catalog::CatalogService;

use super::{CliError, connect};

/// Import a listing file.
///
/// # Errors
///
/// Returns `CliError` if the file cannot be read or parsed, or the listing is invalid.
pub async fn import(file: &Path) -> Result<ProductId, CliError> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .map_err(|source| CliError::Io {
            path: file.display().to_string(),
            source,
        })?;
    let listing: ProductListing = serde_json::from_str(&raw)?;

    let (_, store) = connect().await?;
    let ingested = CatalogService::new(store).ingest(&listing).await?;

    if ingested.created {
        tracing::info!("Imported '{}' as product {}", listing.title, ingested.product_id);
    } else {
        tracing::info!("'{}' already exists as product {}", listing.title, ingested.product_id);
    }
    Ok(ingested.product_id)
}
