pub mod api;
pub mod budget;
pub mod config;
pub mod db;
pub mod enrich;
pub mod error;
pub mod images;
pub mod llm;
pub mod spots;

use crate::budget::CostLedger;
use crate::config::Config;
use crate::db::Database;
use crate::spots::GenerationService;

use std::sync::Arc;

/// Shared application state accessible from all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub ledger: Arc<CostLedger>,
    pub generation: Arc<GenerationService>,
    /// Client used by the image proxy's upstream fetch. Carries the fixed
    /// request timeout, so a hung upstream cancels instead of dangling.
    pub image_client: reqwest::Client,
}

/// Build the reqwest client used for proxied image fetches.
pub fn build_image_client(config: &Config) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!(
            "wayfare/",
            env!("CARGO_PKG_VERSION"),
            " (image proxy)"
        ))
        .timeout(std::time::Duration::from_secs(
            config.images.proxy_timeout_secs,
        ))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to build image client with custom config, using defaults");
            reqwest::Client::new()
        })
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------
