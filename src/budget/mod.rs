pub mod audit;
pub mod ledger;
pub mod pricing;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use self::audit::{AuditLogger, spawn_audit_logger};
pub use self::ledger::CostLedger;
pub use self::pricing::PricingTable;

/// Aggregated usage and spend for one calendar date.
///
/// Rows are created lazily at zero on the first request of a new date,
/// mutated only by [`CostLedger::record_usage`], and never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyCostRecord {
    /// Local calendar date, `YYYY-MM-DD`.
    pub date: String,
    pub request_count: i64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub cost_usd: f64,
}

impl DailyCostRecord {
    /// A fresh zero record for the given date.
    pub fn zero(date: String) -> Self {
        Self {
            date,
            request_count: 0,
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            cost_usd: 0.0,
        }
    }
}

/// One record per generation attempt that reached the model call, consumed
/// asynchronously by the audit writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionAuditEntry {
    /// Local calendar date keying the audit stream.
    pub date: String,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub query_address: String,
    pub model: String,
    pub duration_ms: u64,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub request_cost_usd: f64,
    /// Cumulative daily cost after this request was recorded.
    pub daily_cost_usd: f64,
    /// "ok" or "exceeded" relative to the daily ceiling.
    pub budget_status: String,
    /// Full payload returned by the model call, or the error text when the
    /// call failed.
    pub raw_response: String,
}

/// The local calendar date used to key ledger rows and audit streams.
pub fn today_key() -> String {
    chrono::Local::now().date_naive().format("%Y-%m-%d").to_string()
}
