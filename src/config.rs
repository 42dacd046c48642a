use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Main configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BudgetConfig {
    /// Maximum spend per calendar day in USD. New paid calls are rejected
    /// once the day's recorded cost reaches this ceiling.
    #[serde(default = "default_daily_limit")]
    pub daily_limit_usd: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_limit_usd: default_daily_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    /// Model requested for spot generation.
    #[serde(default = "default_model")]
    pub model: String,
    /// Base URL of the OpenAI-compatible chat completion endpoint.
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            endpoint: default_llm_endpoint(),
            timeout_secs: default_llm_timeout(),
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImagesConfig {
    /// The single upstream host the image proxy may fetch from. Matched
    /// exactly, never by prefix or substring.
    #[serde(default = "default_allowed_host")]
    pub allowed_host: String,
    /// Base URL of the encyclopedia page-summary endpoint.
    #[serde(default = "default_summary_base")]
    pub summary_base: String,
    /// Base URL of the encyclopedia full-text search endpoint.
    #[serde(default = "default_search_base")]
    pub search_base: String,
    /// Timeout for the proxy's upstream image fetch.
    #[serde(default = "default_proxy_timeout")]
    pub proxy_timeout_secs: u64,
    /// Width token written into resolved thumbnail URLs.
    #[serde(default = "default_thumb_width")]
    pub thumb_width: u32,
    /// Upper bound on in-flight encyclopedia lookups during enrichment.
    #[serde(default = "default_max_lookups")]
    pub max_concurrent_lookups: usize,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            allowed_host: default_allowed_host(),
            summary_base: default_summary_base(),
            search_base: default_search_base(),
            proxy_timeout_secs: default_proxy_timeout(),
            thumb_width: default_thumb_width(),
            max_concurrent_lookups: default_max_lookups(),
        }
    }
}

/// Per-model price overrides layered on top of the built-in table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PricingConfig {
    /// Models not present in the table are priced at this entry's rates.
    #[serde(default = "default_model")]
    pub fallback_model: String,
    #[serde(default)]
    pub models: HashMap<String, PriceOverride>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            fallback_model: default_model(),
            models: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PriceOverride {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    8080
}

fn default_db_path() -> PathBuf {
    PathBuf::from("wayfare.db")
}

const fn default_daily_limit() -> f64 {
    5.0
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

const fn default_llm_timeout() -> u64 {
    60
}

const fn default_temperature() -> f32 {
    0.8
}

fn default_allowed_host() -> String {
    "upload.wikimedia.org".to_string()
}

fn default_summary_base() -> String {
    "https://en.wikipedia.org/api/rest_v1/page/summary".to_string()
}

fn default_search_base() -> String {
    "https://en.wikipedia.org/w/api.php".to_string()
}

const fn default_proxy_timeout() -> u64 {
    8
}

const fn default_thumb_width() -> u32 {
    800
}

const fn default_max_lookups() -> usize {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist. Environment variables override file values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            config
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Apply `WAYFARE_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        macro_rules! env_str {
            ($env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = val;
                }
            };
        }
        macro_rules! env_parse {
            ($env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    if let Ok(parsed) = val.parse() {
                        $field = parsed;
                    }
                }
            };
        }

        env_str!("WAYFARE_HOST", self.server.host);
        env_parse!("WAYFARE_PORT", self.server.port);
        env_parse!("WAYFARE_DB_PATH", self.database.path);
        env_parse!("WAYFARE_DAILY_LIMIT_USD", self.budget.daily_limit_usd);
        env_str!("WAYFARE_MODEL", self.generation.model);
        env_str!("WAYFARE_LLM_ENDPOINT", self.generation.endpoint);
        env_str!("WAYFARE_ALLOWED_IMAGE_HOST", self.images.allowed_host);
        env_str!("WAYFARE_LOG_LEVEL", self.logging.level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert!((config.budget.daily_limit_usd - 5.0).abs() < f64::EPSILON);
        assert_eq!(config.generation.model, "gpt-4o-mini");
        assert_eq!(config.images.allowed_host, "upload.wikimedia.org");
        assert_eq!(config.images.proxy_timeout_secs, 8);
        assert_eq!(config.images.max_concurrent_lookups, 8);
    }

    #[test]
    fn test_listen_addr() {
        let config = Config::default();
        assert_eq!(config.listen_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let toml = r#"
            [budget]
            daily_limit_usd = 2.5

            [images]
            allowed_host = "media.example.org"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!((config.budget.daily_limit_usd - 2.5).abs() < f64::EPSILON);
        assert_eq!(config.images.allowed_host, "media.example.org");
        // Untouched sections keep defaults.
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.generation.model, "gpt-4o-mini");
    }

    #[test]
    fn test_pricing_overrides_parse() {
        let toml = r#"
            [pricing]
            fallback_model = "gpt-4o"

            [pricing.models.gpt-4o]
            input_per_million = 2.0
            output_per_million = 8.0
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.pricing.fallback_model, "gpt-4o");
        let entry = config.pricing.models.get("gpt-4o").unwrap();
        assert!((entry.input_per_million - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load(Path::new("/nonexistent/wayfare.toml")).unwrap();
        assert_eq!(config.server.port, 8080);
    }
}
