//! Canonical transaction operations

use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{NewTransaction, Transaction};

/// Result of inserting a transaction
#[derive(Debug, Clone)]
pub enum TransactionInsertResult {
    /// Transaction was inserted, contains new transaction ID
    Inserted(i64),
    /// Transaction hit a dedup constraint, contains existing transaction ID
    Duplicate(i64),
}

/// True when the error is specifically a UNIQUE constraint violation
///
/// Other constraint failures (CHECK, FOREIGN KEY) must stay errors - only
/// the dedup keys get reclassified to Duplicate.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

impl Database {
    /// Insert a transaction, resolving dedup conflicts to `Duplicate`
    ///
    /// The insert goes straight at the constraints rather than pre-checking:
    /// the `(user_id, sms_id)` partial unique index and the `import_hash`
    /// column are the sole guards against double-insert under concurrent or
    /// retried ingestion.
    pub fn insert_transaction(&self, tx: &NewTransaction) -> Result<TransactionInsertResult> {
        let conn = self.conn()?;

        let result = conn.execute(
            r#"
            INSERT INTO transactions (
                user_id, sms_id, amount, direction, merchant, payment_method,
                account_last4, bank_name, reference_id, category_id,
                is_expense, is_income, original_amount, original_currency,
                source, message_timestamp, import_hash
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                tx.user_id,
                tx.sms_id,
                tx.amount,
                tx.direction.as_str(),
                tx.merchant,
                tx.payment_method.map(|p| p.as_str()),
                tx.account_last4,
                tx.bank_name,
                tx.reference_id,
                tx.category_id,
                tx.is_expense,
                tx.is_income,
                tx.original_amount,
                tx.original_currency,
                tx.source.as_str(),
                tx.message_timestamp,
                tx.import_hash,
            ],
        );

        match result {
            Ok(_) => Ok(TransactionInsertResult::Inserted(conn.last_insert_rowid())),
            Err(err) if is_unique_violation(&err) => {
                let existing = self.find_by_dedup_key(&conn, tx)?;
                match existing {
                    Some(id) => Ok(TransactionInsertResult::Duplicate(id)),
                    // Violation on something that is not a dedup key
                    None => Err(err.into()),
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Locate the row an insert collided with, by whichever dedup key applies
    fn find_by_dedup_key(
        &self,
        conn: &rusqlite::Connection,
        tx: &NewTransaction,
    ) -> Result<Option<i64>> {
        if let Some(sms_id) = tx.sms_id {
            let id = conn
                .query_row(
                    "SELECT id FROM transactions WHERE user_id = ? AND sms_id = ?",
                    params![tx.user_id, sms_id],
                    |row| row.get(0),
                )
                .optional()?;
            if id.is_some() {
                return Ok(id);
            }
        }
        if let Some(hash) = &tx.import_hash {
            let id = conn
                .query_row(
                    "SELECT id FROM transactions WHERE import_hash = ?",
                    params![hash],
                    |row| row.get(0),
                )
                .optional()?;
            return Ok(id);
        }
        Ok(None)
    }

    /// Count a user's transactions
    pub fn count_transactions(&self, user_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE user_id = ?",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Get a single transaction by ID
    pub fn get_transaction(&self, id: i64) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        let result = conn
            .query_row(
                &format!("{} WHERE id = ?", SELECT_TRANSACTION),
                params![id],
                map_transaction_row,
            )
            .optional()?;
        Ok(result)
    }

    /// List a user's transactions, newest first
    pub fn list_transactions(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE user_id = ? ORDER BY id DESC LIMIT ? OFFSET ?",
            SELECT_TRANSACTION
        ))?;

        let transactions = stmt
            .query_map(params![user_id, limit, offset], map_transaction_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(transactions)
    }
}

const SELECT_TRANSACTION: &str = r#"
    SELECT id, user_id, sms_id, amount, direction, merchant, payment_method,
           account_last4, bank_name, reference_id, category_id,
           is_expense, is_income, original_amount, original_currency,
           source, message_timestamp, import_hash, created_at
    FROM transactions
"#;

fn map_transaction_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let direction_str: String = row.get(4)?;
    let payment_str: Option<String> = row.get(6)?;
    let source_str: String = row.get(15)?;
    let created_at_str: String = row.get(18)?;

    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        sms_id: row.get(2)?,
        amount: row.get(3)?,
        direction: direction_str
            .parse()
            .unwrap_or(crate::models::Direction::Debit),
        merchant: row.get(5)?,
        payment_method: payment_str.and_then(|s| s.parse().ok()),
        account_last4: row.get(7)?,
        bank_name: row.get(8)?,
        reference_id: row.get(9)?,
        category_id: row.get(10)?,
        is_expense: row.get(11)?,
        is_income: row.get(12)?,
        original_amount: row.get(13)?,
        original_currency: row.get(14)?,
        source: source_str
            .parse()
            .unwrap_or(crate::models::TransactionSource::Sms),
        message_timestamp: row.get(16)?,
        import_hash: row.get(17)?,
        created_at: parse_datetime(&created_at_str),
    })
}
