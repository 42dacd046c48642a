//! Image enrichment fan-out.
//!
//! Resolves an image for every spot concurrently and reattaches results by
//! index, so the response preserves the model's emission order no matter
//! which lookups finish first. One spot's failure never touches another's.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::images::ImageResolver;
use crate::spots::TouristSpot;

/// Route that proxies resolved upstream images.
pub const IMAGE_PROXY_ROUTE: &str = "/api/image";

pub struct EnrichmentOrchestrator {
    resolver: Arc<ImageResolver>,
    /// Bounds in-flight encyclopedia lookups to respect upstream rate limits.
    semaphore: Arc<Semaphore>,
}

impl EnrichmentOrchestrator {
    pub fn new(resolver: Arc<ImageResolver>, max_concurrent_lookups: usize) -> Self {
        Self {
            resolver,
            semaphore: Arc::new(Semaphore::new(max_concurrent_lookups.max(1))),
        }
    }

    /// Resolve an image for every spot, unconditionally and concurrently.
    ///
    /// Spots whose resolution comes up empty keep `image_url` absent; spots
    /// that resolve get a proxied URL so clients only ever dereference the
    /// hardened boundary.
    pub async fn enrich(&self, spots: Vec<TouristSpot>) -> Vec<TouristSpot> {
        let lookups = spots.into_iter().map(|mut spot| {
            let resolver = Arc::clone(&self.resolver);
            let semaphore = Arc::clone(&self.semaphore);
            async move {
                // The semaphore is never closed; acquire only fails then.
                if let Ok(_permit) = semaphore.acquire().await {
                    let resolved = resolver
                        .resolve(&spot.name, spot.photo_title.as_deref())
                        .await;
                    match resolved {
                        Some(upstream) => spot.image_url = Some(proxied_url(&upstream)),
                        None => {
                            tracing::debug!(spot = %spot.name, "No image resolved");
                        }
                    }
                }
                spot
            }
        });

        // join_all preserves input order regardless of completion order.
        futures::future::join_all(lookups).await
    }
}

/// Rewrite a resolved upstream URL into its proxied form.
fn proxied_url(upstream: &str) -> String {
    format!("{}?url={}", IMAGE_PROXY_ROUTE, urlencoding::encode(upstream))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
