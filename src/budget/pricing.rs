//! Model pricing table.
//!
//! Prices are in USD per 1M tokens (input/output). Lookups key off the
//! normalized model id; unrecognized models fall back to a designated
//! default tier so cost accounting never silently records zero.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::PricingConfig;

/// Pricing information for a specific model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Normalized model identifier (e.g. "gpt-4o-mini").
    pub model: String,
    /// Cost per 1M input tokens in USD.
    pub input_per_million: f64,
    /// Cost per 1M output tokens in USD.
    pub output_per_million: f64,
}

/// Static table of per-model prices with a fallback tier.
#[derive(Debug, Clone)]
pub struct PricingTable {
    models: HashMap<String, ModelPricing>,
    fallback_model: String,
}

impl PricingTable {
    /// Create a pricing table with built-in rates.
    pub fn new() -> Self {
        let mut models = HashMap::new();

        for (model, input, output) in [
            ("gpt-4o-mini", 0.15, 0.60),
            ("gpt-4o", 2.50, 10.00),
            ("gpt-4.1-mini", 0.40, 1.60),
            ("gpt-4.1", 2.00, 8.00),
            ("gpt-3.5-turbo", 0.50, 1.50),
        ] {
            models.insert(
                model.to_string(),
                ModelPricing {
                    model: model.to_string(),
                    input_per_million: input,
                    output_per_million: output,
                },
            );
        }

        Self {
            models,
            fallback_model: "gpt-4o-mini".to_string(),
        }
    }

    /// Build a table from the built-in rates plus config overrides.
    pub fn from_config(config: &PricingConfig) -> Self {
        let mut table = Self::new();
        for (model, entry) in &config.models {
            table.models.insert(
                model.clone(),
                ModelPricing {
                    model: model.clone(),
                    input_per_million: entry.input_per_million,
                    output_per_million: entry.output_per_million,
                },
            );
        }
        if table.models.contains_key(&config.fallback_model) {
            table.fallback_model = config.fallback_model.clone();
        } else {
            tracing::warn!(
                model = %config.fallback_model,
                "Configured pricing fallback model has no price entry, keeping default"
            );
        }
        table
    }

    /// Look up pricing for a model id, normalizing first and falling back to
    /// the default tier for unknown ids.
    pub fn get(&self, model: &str) -> &ModelPricing {
        let normalized = normalize_model_id(model);
        self.models.get(normalized).unwrap_or_else(|| {
            tracing::debug!(model = %model, "No pricing entry, using fallback tier");
            &self.models[&self.fallback_model]
        })
    }

    /// Compute the cost of a request in USD.
    pub fn cost(&self, model: &str, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        let pricing = self.get(model);
        (f64::from(prompt_tokens) / 1_000_000.0) * pricing.input_per_million
            + (f64::from(completion_tokens) / 1_000_000.0) * pricing.output_per_million
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip a trailing `-YYYY-MM-DD` snapshot suffix from a model identifier,
/// so "gpt-4o-mini-2024-07-18" prices the same as "gpt-4o-mini".
pub fn normalize_model_id(model: &str) -> &str {
    const SUFFIX_LEN: usize = "-2024-07-18".len();
    let bytes = model.as_bytes();
    if bytes.len() > SUFFIX_LEN {
        let tail = &bytes[bytes.len() - SUFFIX_LEN..];
        let is_date_suffix = tail[0] == b'-'
            && tail[1..5].iter().all(u8::is_ascii_digit)
            && tail[5] == b'-'
            && tail[6..8].iter().all(u8::is_ascii_digit)
            && tail[8] == b'-'
            && tail[9..11].iter().all(u8::is_ascii_digit);
        if is_date_suffix {
            // The suffix is pure ASCII, so the cut lands on a char boundary.
            return &model[..model.len() - SUFFIX_LEN];
        }
    }
    model
}
