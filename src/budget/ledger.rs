use rusqlite::params;

use crate::budget::pricing::PricingTable;
use crate::budget::{DailyCostRecord, today_key};
use crate::db::Database;
use crate::error::AppError;

/// Owns the persisted per-date usage record.
///
/// All reads and writes of `daily_costs` go through this type; the
/// read-modify-write in [`CostLedger::record_usage`] is a single SQL upsert
/// executed under the database connection mutex, so concurrent requests on
/// the same date cannot lose updates.
pub struct CostLedger {
    db: Database,
    pricing: PricingTable,
    daily_limit_usd: f64,
}

impl CostLedger {
    pub fn new(db: Database, pricing: PricingTable, daily_limit_usd: f64) -> Self {
        Self {
            db,
            pricing,
            daily_limit_usd,
        }
    }

    pub fn daily_limit_usd(&self) -> f64 {
        self.daily_limit_usd
    }

    /// Whether today's recorded spend has reached the daily ceiling.
    ///
    /// Fails open: a storage error must never wrongly block traffic, so it
    /// is logged and treated as "not exceeded".
    pub fn check_budget_exceeded(&self) -> bool {
        match self.today_record() {
            Ok(record) => record.cost_usd >= self.daily_limit_usd,
            Err(e) => {
                tracing::warn!(error = %e, "Budget check failed, allowing request");
                false
            }
        }
    }

    /// Price this request's usage with the normalized-model lookup.
    pub fn request_cost(&self, model: &str, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        self.pricing.cost(model, prompt_tokens, completion_tokens)
    }

    /// Record one request's usage against today's record and return the
    /// updated record.
    pub fn record_usage(
        &self,
        model: &str,
        prompt_tokens: u32,
        completion_tokens: u32,
    ) -> Result<DailyCostRecord, AppError> {
        let cost = self.request_cost(model, prompt_tokens, completion_tokens);
        let date = today_key();
        let prompt = i64::from(prompt_tokens);
        let completion = i64::from(completion_tokens);
        let total = prompt + completion;

        let record = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO daily_costs \
                 (date, request_count, prompt_tokens, completion_tokens, total_tokens, cost_usd) \
                 VALUES (?1, 1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(date) DO UPDATE SET \
                   request_count = request_count + 1, \
                   prompt_tokens = prompt_tokens + ?2, \
                   completion_tokens = completion_tokens + ?3, \
                   total_tokens = total_tokens + ?4, \
                   cost_usd = cost_usd + ?5",
                params![date, prompt, completion, total, cost],
            )?;
            read_record(conn, &date)
        })?;

        let record = record.unwrap_or_else(|| DailyCostRecord::zero(date));

        tracing::debug!(
            model = %model,
            prompt_tokens,
            completion_tokens,
            cost_usd = %format!("{cost:.6}"),
            daily_cost_usd = %format!("{:.6}", record.cost_usd),
            "Usage recorded"
        );

        Ok(record)
    }

    /// Today's record, or a zero record if none exists yet.
    pub fn today_record(&self) -> Result<DailyCostRecord, AppError> {
        let date = today_key();
        let record = self.db.with_conn(|conn| read_record(conn, &date))?;
        Ok(record.unwrap_or_else(|| DailyCostRecord::zero(date)))
    }

    /// The most recent `days` records, newest first. Historical rows are
    /// never deleted, so this is a plain ordered scan.
    pub fn history(&self, days: u32) -> Result<Vec<DailyCostRecord>, AppError> {
        let records = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT date, request_count, prompt_tokens, completion_tokens, \
                 total_tokens, cost_usd \
                 FROM daily_costs ORDER BY date DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![i64::from(days)], |row| {
                Ok(DailyCostRecord {
                    date: row.get(0)?,
                    request_count: row.get(1)?,
                    prompt_tokens: row.get(2)?,
                    completion_tokens: row.get(3)?,
                    total_tokens: row.get(4)?,
                    cost_usd: row.get(5)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })?;
        Ok(records)
    }
}

fn read_record(
    conn: &rusqlite::Connection,
    date: &str,
) -> Result<Option<DailyCostRecord>, rusqlite::Error> {
    let record = conn.query_row(
        "SELECT date, request_count, prompt_tokens, completion_tokens, total_tokens, cost_usd \
         FROM daily_costs WHERE date = ?1",
        params![date],
        |row| {
            Ok(DailyCostRecord {
                date: row.get(0)?,
                request_count: row.get(1)?,
                prompt_tokens: row.get(2)?,
                completion_tokens: row.get(3)?,
                total_tokens: row.get(4)?,
                cost_usd: row.get(5)?,
            })
        },
    );

    match record {
        Ok(r) => Ok(Some(r)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn test_ledger(limit: f64) -> CostLedger {
        let db = Database::open_in_memory().unwrap();
        CostLedger::new(db, PricingTable::new(), limit)
    }

    #[test]
    fn test_first_access_is_zero_record() {
        let ledger = test_ledger(5.0);
        let record = ledger.today_record().unwrap();
        assert_eq!(record.request_count, 0);
        assert_eq!(record.total_tokens, 0);
        assert!((record.cost_usd - 0.0).abs() < f64::EPSILON);
        assert!(!ledger.check_budget_exceeded());
    }

    #[test]
    fn test_record_usage_accumulates() {
        let ledger = test_ledger(5.0);

        let r1 = ledger.record_usage("gpt-4o-mini", 1000, 500).unwrap();
        assert_eq!(r1.request_count, 1);
        assert_eq!(r1.prompt_tokens, 1000);
        assert_eq!(r1.completion_tokens, 500);
        assert_eq!(r1.total_tokens, 1500);

        let r2 = ledger.record_usage("gpt-4o-mini", 200, 100).unwrap();
        assert_eq!(r2.request_count, 2);
        assert_eq!(r2.prompt_tokens, 1200);
        assert_eq!(r2.completion_tokens, 600);
        assert_eq!(r2.total_tokens, 1800);
        assert!(r2.cost_usd > r1.cost_usd);
    }

    #[test]
    fn test_total_tokens_invariant() {
        let ledger = test_ledger(5.0);
        ledger.record_usage("gpt-4o", 123, 456).unwrap();
        ledger.record_usage("gpt-4o-mini", 7, 89).unwrap();
        let record = ledger.today_record().unwrap();
        assert_eq!(
            record.total_tokens,
            record.prompt_tokens + record.completion_tokens
        );
    }

    #[test]
    fn test_normalized_model_costs_match() {
        let dated = test_ledger(5.0);
        let plain = test_ledger(5.0);
        let a = dated
            .record_usage("gpt-4o-mini-2024-07-18", 10_000, 2_000)
            .unwrap();
        let b = plain.record_usage("gpt-4o-mini", 10_000, 2_000).unwrap();
        assert!((a.cost_usd - b.cost_usd).abs() < f64::EPSILON);
    }

    #[test]
    fn test_guardrail_edge() {
        // Ceiling low enough that one request crosses it.
        let ledger = test_ledger(0.005);

        assert!(!ledger.check_budget_exceeded());

        // (1M/1M * $0.15) = $0.15 >= $0.005 -- crossing request completes.
        let record = ledger.record_usage("gpt-4o-mini", 1_000_000, 0).unwrap();
        assert!(record.cost_usd >= 0.005);

        // The NEXT request is the one that gets rejected.
        assert!(ledger.check_budget_exceeded());
    }

    #[test]
    fn test_concurrent_record_usage_no_lost_update() {
        let ledger = Arc::new(test_ledger(100.0));
        let before = ledger.today_record().unwrap().request_count;

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    ledger.record_usage("gpt-4o-mini", 100, 50).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let after = ledger.today_record().unwrap();
        assert_eq!(after.request_count, before + 2);
        assert_eq!(after.prompt_tokens, 200);
        assert_eq!(after.completion_tokens, 100);
    }

    #[test]
    fn test_cost_monotonically_non_decreasing() {
        let ledger = test_ledger(100.0);
        let mut last = 0.0;
        for _ in 0..5 {
            let record = ledger.record_usage("gpt-4o", 1000, 1000).unwrap();
            assert!(record.cost_usd >= last);
            last = record.cost_usd;
        }
    }

    #[test]
    fn test_history_newest_first() {
        let ledger = test_ledger(5.0);
        // Seed an older row directly; record_usage only ever touches today.
        ledger
            .db
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO daily_costs (date, request_count, cost_usd) \
                     VALUES ('2000-01-01', 9, 0.5)",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        ledger.record_usage("gpt-4o-mini", 10, 10).unwrap();

        let history = ledger.history(30).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].date > history[1].date);
        assert_eq!(history[1].date, "2000-01-01");
    }
}
