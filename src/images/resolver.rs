//! Two-tier encyclopedia image lookup.
//!
//! Tier 1 queries the page-summary endpoint directly by title. Tier 2 falls
//! back to full-text search and retries the summary lookup against the top
//! hit. Every failure at any tier means "this tier produced nothing";
//! resolution never surfaces an error to the caller.

use std::time::Duration;

use reqwest::Client;

use crate::config::ImagesConfig;

const USER_AGENT: &str = concat!(
    "wayfare/",
    env!("CARGO_PKG_VERSION"),
    " (travel spot image resolver)"
);

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Response deserialization
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Deserialize)]
struct SummaryResponse {
    #[serde(default)]
    thumbnail: Option<Thumbnail>,
}

#[derive(Debug, serde::Deserialize)]
struct Thumbnail {
    source: String,
}

#[derive(Debug, serde::Deserialize)]
struct SearchResponse {
    #[serde(default)]
    query: Option<SearchQuery>,
}

#[derive(Debug, serde::Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, serde::Deserialize)]
struct SearchHit {
    title: String,
}

// ---------------------------------------------------------------------------
// ImageResolver
// ---------------------------------------------------------------------------

/// Resolves a photo URL for a spot name against the encyclopedia.
pub struct ImageResolver {
    client: Client,
    summary_base: String,
    search_base: String,
    thumb_width: u32,
}

impl ImageResolver {
    pub fn new(config: &ImagesConfig) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(LOOKUP_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to build HTTP client with custom config, using defaults");
                Client::new()
            });

        Self {
            client,
            summary_base: config.summary_base.trim_end_matches('/').to_string(),
            search_base: config.search_base.to_string(),
            thumb_width: config.thumb_width,
        }
    }

    /// Resolve an image URL for a spot, or `None` when both tiers come up
    /// empty.
    pub async fn resolve(&self, spot_name: &str, canonical_title: Option<&str>) -> Option<String> {
        // Tier 1: direct summary lookup by canonical title or slugified name.
        let title = canonical_title.unwrap_or(spot_name);
        if let Some(url) = self.summary_thumbnail(title).await {
            return Some(url);
        }

        // Tier 2: full-text search, then summary against the top hit.
        let hit = self.search_top_title(spot_name).await?;
        self.summary_thumbnail(&hit).await
    }

    /// Fetch the page summary for a title and return its upscaled thumbnail,
    /// if any.
    async fn summary_thumbnail(&self, title: &str) -> Option<String> {
        let slug = title.trim().replace(' ', "_");
        if slug.is_empty() {
            return None;
        }
        let url = format!("{}/{}", self.summary_base, urlencoding::encode(&slug));

        let resp = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(title = %title, error = %e, "Summary lookup failed");
                return None;
            }
        };

        if !resp.status().is_success() {
            tracing::debug!(title = %title, status = %resp.status(), "Summary lookup non-success");
            return None;
        }

        let summary: SummaryResponse = match resp.json().await {
            Ok(s) => s,
            Err(e) => {
                tracing::debug!(title = %title, error = %e, "Summary parse failed");
                return None;
            }
        };

        summary
            .thumbnail
            .map(|t| upscale_thumbnail(&t.source, self.thumb_width))
    }

    /// Query the full-text search endpoint and return the top hit's title.
    async fn search_top_title(&self, query: &str) -> Option<String> {
        let url = format!(
            "{}?action=query&list=search&format=json&srlimit=1&srsearch={}",
            self.search_base,
            urlencoding::encode(query)
        );

        let resp = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(query = %query, error = %e, "Search lookup failed");
                return None;
            }
        };

        if !resp.status().is_success() {
            tracing::debug!(query = %query, status = %resp.status(), "Search lookup non-success");
            return None;
        }

        let body: SearchResponse = match resp.json().await {
            Ok(b) => b,
            Err(e) => {
                tracing::debug!(query = %query, error = %e, "Search parse failed");
                return None;
            }
        };

        body.query
            .and_then(|q| q.search.into_iter().next())
            .map(|hit| hit.title)
    }
}

/// Rewrite the `/NNNpx-` width token embedded in a thumbnail URL to the
/// target width. URLs without a recognizable token pass through unchanged.
fn upscale_thumbnail(url: &str, width: u32) -> String {
    if let Some(px) = url.find("px-") {
        let digits_start = url[..px]
            .rfind(|c: char| !c.is_ascii_digit())
            .map_or(0, |i| i + 1);
        if digits_start < px && url[..digits_start].ends_with('/') {
            return format!("{}{}{}", &url[..digits_start], width, &url[px..]);
        }
    }
    url.to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
