use std::time::Duration;

use rusqlite::params;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::budget::CompletionAuditEntry;
use crate::db::Database;

/// Maximum number of entries to buffer before flushing, regardless of timer.
const BATCH_SIZE: usize = 50;

/// How often to flush buffered entries even if the batch is not full.
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Fire-and-forget handle for appending completion audit records.
///
/// `log` never fails from the caller's perspective: a closed channel or a
/// failed write is reported to operator diagnostics and the entry is lost.
#[derive(Clone)]
pub struct AuditLogger {
    tx: mpsc::UnboundedSender<CompletionAuditEntry>,
}

impl AuditLogger {
    pub fn log(&self, entry: CompletionAuditEntry) {
        if self.tx.send(entry).is_err() {
            tracing::error!("Audit channel closed, entry dropped");
        }
    }
}

/// Spawn the background task that drains audit entries into the
/// `completion_log` table. Returns the logging handle and the task handle;
/// the task exits once every `AuditLogger` clone is dropped and the buffer
/// has drained.
pub fn spawn_audit_logger(db: Database) -> (AuditLogger, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<CompletionAuditEntry>();

    let handle = tokio::spawn(async move {
        let mut buffer: Vec<CompletionAuditEntry> = Vec::with_capacity(BATCH_SIZE);
        let mut interval = tokio::time::interval(FLUSH_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                entry = rx.recv() => {
                    match entry {
                        Some(e) => {
                            buffer.push(e);
                            if buffer.len() >= BATCH_SIZE {
                                flush_batch(&db, &mut buffer);
                            }
                        }
                        None => {
                            if !buffer.is_empty() {
                                flush_batch(&db, &mut buffer);
                            }
                            tracing::info!("Audit logger shutting down");
                            break;
                        }
                    }
                }
                _ = interval.tick() => {
                    if !buffer.is_empty() {
                        flush_batch(&db, &mut buffer);
                    }
                }
            }
        }
    });

    (AuditLogger { tx }, handle)
}

/// Write a batch of audit entries. A failed batch is dropped, never
/// re-queued: audit records are diagnostics, and the response path must not
/// accumulate state behind a broken writer.
fn flush_batch(db: &Database, buffer: &mut Vec<CompletionAuditEntry>) {
    let entries = std::mem::take(buffer);
    let count = entries.len();

    if let Err(e) = write_entries(db, &entries) {
        tracing::error!(count, error = %e, "Failed to write audit batch, entries lost");
    } else {
        tracing::debug!(count, "Flushed audit batch");
    }
}

fn write_entries(db: &Database, entries: &[CompletionAuditEntry]) -> Result<(), rusqlite::Error> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;

        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO completion_log (id, date, timestamp, request_id, query_address, \
                 model, duration_ms, prompt_tokens, completion_tokens, request_cost_usd, \
                 daily_cost_usd, budget_status, raw_response) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;

            for entry in entries {
                let id = Uuid::new_v4().to_string();
                stmt.execute(params![
                    id,
                    entry.date,
                    entry.timestamp.to_rfc3339(),
                    entry.request_id,
                    entry.query_address,
                    entry.model,
                    entry.duration_ms as i64,
                    i64::from(entry.prompt_tokens),
                    i64::from(entry.completion_tokens),
                    entry.request_cost_usd,
                    entry.daily_cost_usd,
                    entry.budget_status,
                    entry.raw_response,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
