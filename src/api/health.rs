use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::budget::DailyCostRecord;
use crate::error::AppError;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub budget: BudgetSnapshot,
}

#[derive(Debug, Serialize)]
pub struct BudgetSnapshot {
    pub date: String,
    pub cost_usd: f64,
    pub daily_limit_usd: f64,
    pub exceeded: bool,
}

/// GET /health
///
/// Liveness plus today's budget position. No authentication required.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let record = state.ledger.today_record().unwrap_or_else(|_| {
        crate::budget::DailyCostRecord::zero(crate::budget::today_key())
    });

    let limit = state.ledger.daily_limit_usd();
    Json(HealthResponse {
        status: "ok".to_string(),
        budget: BudgetSnapshot {
            date: record.date.clone(),
            cost_usd: record.cost_usd,
            daily_limit_usd: limit,
            exceeded: record.cost_usd >= limit,
        },
    })
}

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    #[serde(default = "default_days")]
    pub days: u32,
}

const fn default_days() -> u32 {
    30
}

/// GET /api/usage?days=N
///
/// Recent daily cost records, newest first. Operator diagnostics only.
pub async fn query_usage(
    State(state): State<AppState>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<Vec<DailyCostRecord>>, AppError> {
    let days = query.days.clamp(1, 365);
    let records = state.ledger.history(days)?;
    Ok(Json(records))
}
