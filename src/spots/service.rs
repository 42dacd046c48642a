//! Top-level generation pipeline.
//!
//! One pass per request: validate, check the budget guardrail, call the
//! model, record usage and audit, parse, enrich, respond. Anything that
//! would waste metered budget fails before the model call; everything after
//! it degrades without losing the spend record.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use uuid::Uuid;

use crate::budget::{AuditLogger, CompletionAuditEntry, CostLedger, DailyCostRecord, today_key};
use crate::enrich::EnrichmentOrchestrator;
use crate::error::AppError;
use crate::llm::{ChatProvider, Completion, CompletionRequest};
use crate::spots::{SearchResult, parse_spots, prompt};

pub struct GenerationService {
    provider: Arc<dyn ChatProvider>,
    ledger: Arc<CostLedger>,
    audit: AuditLogger,
    enricher: Arc<EnrichmentOrchestrator>,
    model: String,
    temperature: f32,
}

impl GenerationService {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        ledger: Arc<CostLedger>,
        audit: AuditLogger,
        enricher: Arc<EnrichmentOrchestrator>,
        model: String,
        temperature: f32,
    ) -> Self {
        Self {
            provider,
            ledger,
            audit,
            enricher,
            model,
            temperature,
        }
    }

    /// Run the full generation pipeline for one request.
    pub async fn generate(&self, address: &str, credential: &str) -> Result<SearchResult, AppError> {
        // Rejections, cheapest first: nothing below this point may run
        // before a passed budget check.
        if credential.trim().is_empty() {
            return Err(AppError::Unauthorized("Missing model credential".into()));
        }

        let address = address.trim();
        if address.is_empty() {
            return Err(AppError::BadRequest("address must not be empty".into()));
        }

        if self.ledger.check_budget_exceeded() {
            tracing::warn!(
                daily_limit_usd = self.ledger.daily_limit_usd(),
                "Daily budget exceeded, rejecting request"
            );
            return Err(AppError::BudgetExceeded(
                "Daily generation budget reached, try again tomorrow".into(),
            ));
        }

        let request_id = Uuid::new_v4().to_string();
        tracing::info!(request_id = %request_id, address = %address, "Generating spots");

        let request = CompletionRequest {
            model: self.model.clone(),
            messages: prompt::build_messages(address),
            temperature: self.temperature,
        };

        let start = Instant::now();
        let result = self.provider.complete(credential, &request).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let completion = match result {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "Completion call failed");
                self.audit_failure(&request_id, address, duration_ms, &e.to_string());
                return Err(AppError::Generation);
            }
        };

        // Cost accounting keys off the model id the upstream actually served.
        let usage = completion.usage;
        let record = match self.ledger.record_usage(
            &completion.model,
            usage.prompt_tokens,
            usage.completion_tokens,
        ) {
            Ok(r) => r,
            Err(e) => {
                // A broken ledger must not fail a response we already paid for.
                tracing::error!(request_id = %request_id, error = %e, "Failed to record usage");
                DailyCostRecord::zero(today_key())
            }
        };

        self.audit_completion(&request_id, address, duration_ms, &completion, &record);

        let spots = match parse_spots(&completion.content) {
            Ok(spots) => spots,
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "Model payload parse failed");
                return Err(AppError::Generation);
            }
        };

        tracing::info!(
            request_id = %request_id,
            spots = spots.len(),
            duration_ms,
            "Spots generated, enriching"
        );

        let spots = self.enricher.enrich(spots).await;

        Ok(SearchResult {
            location_name: address.to_string(),
            spots,
        })
    }

    fn audit_completion(
        &self,
        request_id: &str,
        address: &str,
        duration_ms: u64,
        completion: &Completion,
        record: &DailyCostRecord,
    ) {
        let request_cost = self.ledger.request_cost(
            &completion.model,
            completion.usage.prompt_tokens,
            completion.usage.completion_tokens,
        );
        let budget_status = if record.cost_usd >= self.ledger.daily_limit_usd() {
            "exceeded"
        } else {
            "ok"
        };

        self.audit.log(CompletionAuditEntry {
            date: today_key(),
            timestamp: Utc::now(),
            request_id: request_id.to_string(),
            query_address: address.to_string(),
            model: completion.model.clone(),
            duration_ms,
            prompt_tokens: completion.usage.prompt_tokens,
            completion_tokens: completion.usage.completion_tokens,
            request_cost_usd: request_cost,
            daily_cost_usd: record.cost_usd,
            budget_status: budget_status.to_string(),
            raw_response: completion.raw.clone(),
        });
    }

    fn audit_failure(&self, request_id: &str, address: &str, duration_ms: u64, error: &str) {
        let daily_cost = self
            .ledger
            .today_record()
            .map(|r| r.cost_usd)
            .unwrap_or(0.0);
        let budget_status = if daily_cost >= self.ledger.daily_limit_usd() {
            "exceeded"
        } else {
            "ok"
        };

        self.audit.log(CompletionAuditEntry {
            date: today_key(),
            timestamp: Utc::now(),
            request_id: request_id.to_string(),
            query_address: address.to_string(),
            model: self.model.clone(),
            duration_ms,
            prompt_tokens: 0,
            completion_tokens: 0,
            request_cost_usd: 0.0,
            daily_cost_usd: daily_cost,
            budget_status: budget_status.to_string(),
            raw_response: format!("error: {error}"),
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
