//! SMS ingestion pipeline
//!
//! Orchestrates one batch: resolve the caller, load the category
//! vocabulary, invoke the extraction oracle once for the whole batch,
//! reconcile its output against the original messages, convert foreign
//! currency, insert idempotently, and persist a best-effort run summary.
//!
//! Batch-level failures (unknown credential, invalid batch, oracle down)
//! short-circuit with nothing inserted. Message-level outcomes are
//! isolated: they are counted, never thrown past the per-message boundary.

use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::currency::{CurrencyConverter, BASE_CURRENCY};
use crate::db::{Database, TransactionInsertResult};
use crate::error::{Error, Result};
use crate::models::{
    Category, Direction, NewRunSummary, NewTransaction, RawMessage, RunStatus, TransactionSource,
};
use crate::oracle::{ExtractionBackend, ExtractionCandidate, OracleClient};

/// How one message fared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Inserted,
    Skipped,
    Error,
}

/// Per-message result, one entry per input message in input order
#[derive(Debug, Clone, Serialize)]
pub struct MessageOutcome {
    pub sms_id: i64,
    pub outcome: OutcomeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<i64>,
}

impl MessageOutcome {
    fn skipped(sms_id: i64, reason: &str) -> Self {
        Self {
            sms_id,
            outcome: OutcomeKind::Skipped,
            reason: Some(reason.to_string()),
            transaction_id: None,
        }
    }

    fn error(sms_id: i64, reason: String) -> Self {
        Self {
            sms_id,
            outcome: OutcomeKind::Error,
            reason: Some(reason),
            transaction_id: None,
        }
    }
}

/// Aggregate result of one ingestion batch
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub total: i64,
    pub inserted: i64,
    pub skipped: i64,
    pub errors: i64,
    pub status: RunStatus,
    pub details: Vec<MessageOutcome>,
}

/// The transaction normalization pipeline
///
/// One instance per process; cheap to clone, safe to share across
/// concurrent batches (the only shared mutable state is the converter's
/// rate cache).
#[derive(Clone)]
pub struct IngestionPipeline {
    pub(crate) db: Database,
    oracle: OracleClient,
    converter: CurrencyConverter,
}

impl IngestionPipeline {
    pub fn new(db: Database, oracle: OracleClient, converter: CurrencyConverter) -> Self {
        Self {
            db,
            oracle,
            converter,
        }
    }

    /// Ingest a batch of raw SMS messages for the caller behind `api_key`
    ///
    /// Returns the aggregate report; `inserted + skipped + errors == total`
    /// always holds and the detail list preserves input order.
    pub async fn ingest(&self, api_key: &str, messages: &[RawMessage]) -> Result<IngestReport> {
        if api_key.trim().is_empty() {
            return Err(Error::Validation("api_key must not be empty".into()));
        }
        if messages.is_empty() {
            return Err(Error::Validation("messages must not be empty".into()));
        }

        let started = Instant::now();

        let identity = self
            .db
            .get_identity(api_key)?
            .ok_or_else(|| Error::Unauthorized("unknown api key".into()))?;

        let vocabulary = self.db.categories_for_user(identity.id)?;
        if vocabulary.is_empty() {
            warn!(
                user_id = identity.id,
                "Category vocabulary is empty; messages will be stored uncategorized"
            );
        }

        // One oracle call for the whole batch. Failure here aborts the
        // call: without extraction no message can be correctly classified.
        let candidates = self
            .oracle
            .extract(messages, &vocabulary)
            .await
            .map_err(|e| match e {
                Error::Oracle(_) => e,
                other => Error::Oracle(other.to_string()),
            })?;
        debug!(
            requested = messages.len(),
            returned = candidates.len(),
            "Oracle extraction complete"
        );

        // Correlate strictly by sms_id; order and completeness of the
        // oracle output are not trusted. Last candidate wins on duplicates.
        let mut by_id: HashMap<i64, ExtractionCandidate> = HashMap::new();
        for candidate in candidates {
            by_id.insert(candidate.sms_id, candidate);
        }

        let mut details = Vec::with_capacity(messages.len());
        let (mut inserted, mut skipped, mut errors) = (0i64, 0i64, 0i64);

        for message in messages {
            let outcome = self
                .process_message(identity.id, message, by_id.get(&message.id), &vocabulary)
                .await;
            match outcome.outcome {
                OutcomeKind::Inserted => inserted += 1,
                OutcomeKind::Skipped => skipped += 1,
                OutcomeKind::Error => errors += 1,
            }
            details.push(outcome);
        }

        let total = messages.len() as i64;
        let status = RunStatus::from_counts(inserted, errors, total);
        let report = IngestReport {
            total,
            inserted,
            skipped,
            errors,
            status,
            details,
        };

        info!(
            user_id = identity.id,
            total, inserted, skipped, errors, status = %status,
            "Batch ingested"
        );

        // Audit write races the response by design: launched after the
        // report is computed, never awaited for correctness.
        self.spawn_run_summary(identity.id, messages, &report, started.elapsed().as_millis());

        Ok(report)
    }

    /// Process one message independently of its batch siblings
    async fn process_message(
        &self,
        user_id: i64,
        message: &RawMessage,
        candidate: Option<&ExtractionCandidate>,
        vocabulary: &[Category],
    ) -> MessageOutcome {
        let candidate = match candidate {
            Some(c) => c,
            None => return MessageOutcome::skipped(message.id, "no oracle result"),
        };

        if !candidate.is_transaction {
            let reason = candidate
                .skip_reason
                .as_deref()
                .unwrap_or("not a transaction");
            return MessageOutcome::skipped(message.id, reason);
        }

        // Guard against a malformed candidate masquerading as a transaction
        let direction = candidate
            .direction
            .as_deref()
            .and_then(|s| s.parse::<Direction>().ok());
        let (amount, direction) = match (candidate.amount, direction) {
            (Some(a), Some(d)) => (a, d),
            _ => return MessageOutcome::skipped(message.id, "missing required field"),
        };
        if amount <= 0.0 {
            return MessageOutcome::skipped(message.id, "invalid amount");
        }

        let category_id = candidate
            .category_slug
            .as_deref()
            .and_then(|slug| resolve_category(vocabulary, slug));

        // Foreign-currency amounts convert to base; provenance is kept
        // all-or-nothing
        let currency = candidate
            .currency
            .as_deref()
            .unwrap_or(BASE_CURRENCY)
            .trim()
            .to_uppercase();
        let (amount, original_amount, original_currency) = if currency == BASE_CURRENCY {
            (amount, None, None)
        } else {
            let conversion = self.converter.convert_to_base(amount, &currency).await;
            (conversion.converted_amount, Some(amount), Some(currency))
        };

        let (is_expense, is_income) = derive_flags(direction, candidate);

        let tx = NewTransaction {
            user_id,
            sms_id: Some(message.id),
            amount,
            direction,
            merchant: trimmed(candidate.merchant.as_deref()),
            payment_method: candidate
                .payment_method
                .as_deref()
                .and_then(|s| s.parse().ok()),
            account_last4: trimmed(candidate.account_last4.as_deref()),
            bank_name: trimmed(candidate.bank_name.as_deref()),
            reference_id: trimmed(candidate.reference_id.as_deref()),
            category_id,
            is_expense,
            is_income,
            original_amount,
            original_currency,
            source: TransactionSource::Sms,
            message_timestamp: message.timestamp.clone(),
            import_hash: None,
        };

        match self.db.insert_transaction(&tx) {
            Ok(TransactionInsertResult::Inserted(id)) => MessageOutcome {
                sms_id: message.id,
                outcome: OutcomeKind::Inserted,
                reason: None,
                transaction_id: Some(id),
            },
            // The dedup key fired: this message was already processed.
            // At-least-once delivery upstream composes with at-most-once
            // storage, so a replay is a success, not an error.
            Ok(TransactionInsertResult::Duplicate(id)) => MessageOutcome {
                sms_id: message.id,
                outcome: OutcomeKind::Inserted,
                reason: Some("already processed".to_string()),
                transaction_id: Some(id),
            },
            Err(e) => MessageOutcome::error(message.id, e.to_string()),
        }
    }

    /// Launch the best-effort run-summary write
    ///
    /// Errors are captured and logged, never surfaced; the response the
    /// caller sees was already computed. A process exiting right after the
    /// response can drop the summary - the one intentionally weak
    /// consistency point in the system.
    fn spawn_run_summary(
        &self,
        user_id: i64,
        messages: &[RawMessage],
        report: &IngestReport,
        duration_ms: u128,
    ) {
        let summary = NewRunSummary {
            user_id,
            total: report.total,
            inserted: report.inserted,
            skipped: report.skipped,
            errors: report.errors,
            status: report.status,
            duration_ms: duration_ms as i64,
            input: serde_json::to_string(messages).unwrap_or_else(|_| "[]".to_string()),
            outcomes: serde_json::to_string(&report.details).unwrap_or_else(|_| "[]".to_string()),
        };

        let db = self.db.clone();
        tokio::spawn(async move {
            match db.insert_run(&summary) {
                Ok(run_id) => debug!(run_id, "Run summary persisted"),
                Err(e) => warn!(error = %e, "Failed to persist run summary"),
            }
        });
    }
}

/// Resolve a category slug against the vocabulary, case-insensitively
///
/// An unmatched slug is a valid outcome (None), not an error.
pub(crate) fn resolve_category(vocabulary: &[Category], slug: &str) -> Option<i64> {
    let slug = slug.trim();
    vocabulary
        .iter()
        .find(|c| c.slug.eq_ignore_ascii_case(slug))
        .map(|c| c.id)
}

/// Derive the expense/income flags for the SMS path
///
/// Debit defaults to expense, credit defaults to income, and the oracle
/// may override either (e.g. a debit that is a self-transfer). The
/// opposite-direction flag is always false.
fn derive_flags(direction: Direction, candidate: &ExtractionCandidate) -> (bool, bool) {
    match direction {
        Direction::Debit => (candidate.is_expense.unwrap_or(true), false),
        Direction::Credit => (false, candidate.is_income.unwrap_or(true)),
    }
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(id: i64, slug: &str) -> Category {
        Category {
            id,
            user_id: None,
            slug: slug.to_string(),
            name: slug.to_string(),
        }
    }

    #[test]
    fn test_resolve_category_case_insensitive() {
        let vocab = vec![category(1, "food-dining"), category(2, "fuel")];
        assert_eq!(resolve_category(&vocab, "FOOD-DINING"), Some(1));
        assert_eq!(resolve_category(&vocab, " fuel "), Some(2));
        assert_eq!(resolve_category(&vocab, "unknown"), None);
    }

    #[test]
    fn test_derive_flags_defaults() {
        let candidate = ExtractionCandidate::default();
        assert_eq!(
            derive_flags(Direction::Debit, &candidate),
            (true, false),
            "debit defaults to expense"
        );
        assert_eq!(
            derive_flags(Direction::Credit, &candidate),
            (false, true),
            "credit defaults to income"
        );
    }

    #[test]
    fn test_derive_flags_oracle_override() {
        // A debit the oracle marked as a self-transfer, not spending
        let candidate = ExtractionCandidate {
            is_expense: Some(false),
            ..Default::default()
        };
        assert_eq!(derive_flags(Direction::Debit, &candidate), (false, false));

        // A credit the oracle marked as not income (own money returned)
        let candidate = ExtractionCandidate {
            is_income: Some(false),
            ..Default::default()
        };
        assert_eq!(derive_flags(Direction::Credit, &candidate), (false, false));

        // Overrides for the wrong direction are ignored
        let candidate = ExtractionCandidate {
            is_income: Some(true),
            ..Default::default()
        };
        assert_eq!(derive_flags(Direction::Debit, &candidate), (true, false));
    }
}
