//! Periodic cleanup of abandoned temporary listings.
//!
//! A temporary model is purged once it is older than the configured TTL and
//! neither a cart entry nor an order references it. Temporary products left
//! without models go with it.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::config::JanitorConfig;
use crate::db::Store;
use crate::error::Result;
use crate::models::PurgeReport;

/// Run one cleanup pass.
#[instrument(skip(store))]
pub async fn run_once<S: Store>(store: &S, ttl: Duration) -> Result<PurgeReport> {
    let report = store.purge_temporary(cutoff(Utc::now(), ttl)).await?;
    if report.models > 0 || report.products > 0 {
        info!(models = report.models, products = report.products, "Purged temporary listings");
    }
    Ok(report)
}

/// Spawn the janitor loop. It never exits on error.
pub fn spawn<S: Store>(store: S, config: JanitorConfig) -> JoinHandle<()> {
    info!(
        interval_secs = config.interval.as_secs(),
        ttl_secs = config.temporary_model_ttl.as_secs(),
        "Spawning janitor"
    );
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = run_once(&store, config.temporary_model_ttl).await {
                warn!(error = %e, "Janitor pass failed");
            }
        }
    })
}

fn cutoff(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_sub_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rubuy_core::{ModelListing, ProductListing};
    use rust_decimal_macros::dec;

    use crate::db::MemoryStore;

    fn listing(title: &str, temporary: bool) -> ProductListing {
        ProductListing {
            title: title.to_string(),
            base_price: dec!(50),
            temporary,
            models: vec![ModelListing {
                color_name: "black".to_string(),
                size_name: "S".to_string(),
                price: None,
                stock: 3,
                image_url: None,
            }],
        }
    }

    #[test]
    fn test_cutoff_saturates() {
        let now = Utc::now();
        assert_eq!(cutoff(now, Duration::from_secs(60)), now - TimeDelta::seconds(60));
        assert_eq!(cutoff(now, Duration::MAX), DateTime::<Utc>::MIN_UTC);
    }

    #[tokio::test]
    async fn test_purges_only_stale_unreferenced_temporary_models() {
        let store = MemoryStore::new();
        let user = store.create_user("Olya", false).await.unwrap().id;

        let stale = store.ingest_listing(&listing("Stale", true)).await.unwrap();
        let carted = store.ingest_listing(&listing("Carted", true)).await.unwrap();
        let permanent = store.ingest_listing(&listing("Permanent", false)).await.unwrap();
        let carted_model = store.product(carted.product_id).await.unwrap().models[0].id;
        store.reserve(user, carted_model, 1).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        let report = run_once(&store, Duration::ZERO).await.unwrap();

        assert_eq!(report, PurgeReport { models: 1, products: 1 });
        assert!(store.product(stale.product_id).await.is_err());
        assert!(store.product(carted.product_id).await.is_ok());
        assert!(store.product(permanent.product_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_fresh_models_survive() {
        let store = MemoryStore::new();
        let fresh = store.ingest_listing(&listing("Fresh", true)).await.unwrap();

        let report = run_once(&store, Duration::from_secs(3600)).await.unwrap();

        assert_eq!(report, PurgeReport::default());
        assert!(store.product(fresh.product_id).await.is_ok());
    }
}
