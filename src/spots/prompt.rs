//! Fixed-shape prompt for spot generation.

use crate::llm::ChatMessage;

/// System instruction: persona plus the JSON-only contract.
const SYSTEM_PROMPT: &str = "You are an expert local travel guide with deep knowledge of \
tourist attractions worldwide. You recommend only real, verifiable places. \
You always respond with a single JSON object and nothing else: no prose, no \
markdown, no code fences.";

/// Categories the model must choose from.
const CATEGORIES: &str =
    "Nature, Culture, History, Entertainment, Food, Shopping, Religious, Adventure";

/// Build the user instruction requesting exactly 8 spots near the address.
fn user_prompt(address: &str) -> String {
    format!(
        r#"Recommend exactly 8 real tourist spots near the following address: {address}

Respond with a JSON object of this exact shape:
{{
  "spots": [
    {{
      "id": "unique-string-id",
      "name": "Spot name",
      "description": "2-3 sentence description",
      "shortDescription": "one-line description",
      "address": "street address",
      "distance": "approximate distance from the given address, e.g. '1.2 km'",
      "rating": 4.5,
      "reviewCount": 1250,
      "reviews": [
        {{"author": "name", "rating": 5.0, "text": "short review"}},
        {{"author": "name", "rating": 4.0, "text": "short review"}},
        {{"author": "name", "rating": 4.5, "text": "short review"}}
      ],
      "entranceFee": "e.g. 'Free' or '$10'",
      "category": "one of: {categories}",
      "openingHours": "e.g. '09:00-18:00'",
      "bestTimeToVisit": "e.g. 'Early morning'",
      "highlights": ["highlight", "highlight"],
      "tags": ["tag", "tag"],
      "coordinates": {{"lat": 0.0, "lng": 0.0}},
      "photoTitle": "exact Wikipedia article title for this place, or omit if unsure"
    }}
  ]
}}

Every spot must be a real place. Include exactly 3 reviews per spot. Use
plausible, realistic ratings and review counts."#,
        categories = CATEGORIES,
    )
}

/// The two fixed messages sent for every generation request.
pub fn build_messages(address: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(user_prompt(address)),
    ]
}
