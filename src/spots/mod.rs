//! Travel-spot domain types and model-output parsing.

pub mod prompt;
pub mod service;

use serde::{Deserialize, Serialize};

pub use self::service::GenerationService;

/// A generated travel spot. Created by parsing the model's JSON output;
/// mutated exactly once, by enrichment, to set `image_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TouristSpot {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub distance: String,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub review_count: u32,
    #[serde(default)]
    pub reviews: Vec<Review>,
    #[serde(default)]
    pub entrance_fee: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub opening_hours: String,
    #[serde(default)]
    pub best_time_to_visit: String,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    /// Canonical encyclopedia title hint emitted by the model. Consumed by
    /// image resolution, never serialized back to clients.
    #[serde(default, skip_serializing)]
    pub photo_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// The response contract: spots in the model's original emission order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub location_name: String,
    pub spots: Vec<TouristSpot>,
}

#[derive(Debug, Deserialize)]
struct GeneratedPayload {
    spots: Vec<TouristSpot>,
}

/// Parse the model's raw JSON content into spots.
///
/// Tolerates a fenced code block around the payload; anything else that is
/// not an object with a `spots` array is an error for the caller to degrade
/// on.
pub fn parse_spots(raw: &str) -> Result<Vec<TouristSpot>, serde_json::Error> {
    let payload: GeneratedPayload = serde_json::from_str(strip_code_fences(raw))?;
    Ok(payload.spots)
}

/// Strip a surrounding ```...``` fence, if present.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(inner) = inner.strip_suffix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the opening fence line.
    match inner.split_once('\n') {
        Some((first, rest)) if first.trim().chars().all(char::is_alphanumeric) => rest.trim(),
        _ => inner.trim(),
    }
}
