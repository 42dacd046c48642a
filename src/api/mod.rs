pub mod generate;
pub mod health;
pub mod image;

use axum::Router;
use axum::routing::{get, post};

use crate::AppState;

/// Build the full API router.
///
/// Route layout:
/// ```text
/// /health        GET   liveness + today's budget status
/// /api/spots     POST  generate spots for an address
/// /api/image     GET   hardened image proxy (?url=...)
/// /api/usage     GET   recent daily cost records (?days=N)
/// ```
pub fn build_api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/spots", post(generate::generate_spots))
        .route("/api/image", get(image::proxy_image))
        .route("/api/usage", get(health::query_usage))
}
