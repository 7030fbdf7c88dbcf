//! Axio expense-tracker CSV import
//!
//! A parallel, synchronous-only ingestion path for bulk historical data.
//! Classification, category and the expense/income flags come directly
//! from the source row - this path never calls the extraction oracle.
//! Parsing is purely textual; the helpers here are deliberately small and
//! individually testable.

use std::io::Read;
use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone};
use csv::ReaderBuilder;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::ingest::{resolve_category, IngestionPipeline};
use crate::models::{Category, Direction, NewTransaction, PaymentKind, TransactionSource};

/// Axio exports timestamps in IST (+05:30)
const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// Cap on retained per-row error details in the response
const MAX_ERROR_DETAILS: usize = 25;

/// One row of an Axio export
///
/// Field names match the export's column headers; lowercase aliases let
/// the JSON import endpoint accept either casing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxioRow {
    #[serde(rename = "Date", alias = "date")]
    pub date: String,
    #[serde(rename = "Time", alias = "time", default)]
    pub time: String,
    #[serde(rename = "Place", alias = "place", default)]
    pub place: Option<String>,
    #[serde(rename = "Amount", alias = "amount")]
    pub amount: String,
    #[serde(rename = "Cr/Dr", alias = "cr_dr", default)]
    pub cr_dr: String,
    #[serde(rename = "Category", alias = "category", default)]
    pub category: String,
    #[serde(rename = "Account", alias = "account", default)]
    pub account: String,
    #[serde(rename = "Note", alias = "note", default)]
    pub note: Option<String>,
    #[serde(rename = "Expense", alias = "expense", default)]
    pub expense: String,
    #[serde(rename = "Income", alias = "income", default)]
    pub income: String,
}

/// Aggregate result of one CSV import
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub total: i64,
    pub inserted: i64,
    pub skipped: i64,
    pub errors: i64,
    /// Capped list of per-row failure messages
    pub error_details: Vec<String>,
}

enum RowResult {
    Inserted,
    Skipped(String),
    Failed(String),
}

impl IngestionPipeline {
    /// Import rows from an Axio export for the caller behind `api_key`
    ///
    /// Each row inserts independently: a row-level failure is counted and
    /// retained but never aborts the remaining rows, unlike the batch-wide
    /// oracle failure on the SMS path.
    pub async fn import_rows(&self, api_key: &str, rows: &[AxioRow]) -> Result<ImportReport> {
        if api_key.trim().is_empty() {
            return Err(Error::Validation("api_key must not be empty".into()));
        }
        if rows.is_empty() {
            return Err(Error::Validation("rows must not be empty".into()));
        }

        let identity = self
            .db
            .get_identity(api_key)?
            .ok_or_else(|| Error::Unauthorized("unknown api key".into()))?;

        let vocabulary = self.db.categories_for_user(identity.id)?;
        if vocabulary.is_empty() {
            warn!(
                user_id = identity.id,
                "Category vocabulary is empty; rows will be stored uncategorized"
            );
        }

        let (mut inserted, mut skipped, mut errors) = (0i64, 0i64, 0i64);
        let mut error_details = Vec::new();

        for (index, row) in rows.iter().enumerate() {
            match self.process_row(identity.id, row, &vocabulary) {
                RowResult::Inserted => inserted += 1,
                RowResult::Skipped(reason) => {
                    debug!(row = index, reason = %reason, "Row skipped");
                    skipped += 1;
                }
                RowResult::Failed(message) => {
                    errors += 1;
                    if error_details.len() < MAX_ERROR_DETAILS {
                        error_details.push(format!("row {}: {}", index, message));
                    }
                }
            }
        }

        let report = ImportReport {
            total: rows.len() as i64,
            inserted,
            skipped,
            errors,
            error_details,
        };

        info!(
            user_id = identity.id,
            total = report.total,
            inserted, skipped, errors,
            "Axio import complete"
        );

        Ok(report)
    }

    fn process_row(&self, user_id: i64, row: &AxioRow, vocabulary: &[Category]) -> RowResult {
        let amount = parse_axio_amount(&row.amount);
        if amount <= 0.0 {
            return RowResult::Skipped("zero or unparseable amount".to_string());
        }

        let timestamp = match compose_timestamp(&row.date, &row.time) {
            Ok(ts) => ts,
            Err(e) => return RowResult::Failed(e.to_string()),
        };

        let direction = parse_direction_code(&row.cr_dr);
        let account = parse_account(&row.account);
        let slug = derive_category_slug(&row.category);
        let category_id = resolve_category(vocabulary, &slug);

        let tx = NewTransaction {
            user_id,
            sms_id: None,
            amount,
            direction,
            merchant: row
                .place
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            payment_method: account.kind,
            account_last4: account.last4,
            bank_name: account.bank_name,
            reference_id: None,
            category_id,
            is_expense: is_affirmative(&row.expense),
            is_income: is_affirmative(&row.income),
            original_amount: None,
            original_currency: None,
            source: TransactionSource::AxioImport,
            message_timestamp: Some(timestamp.to_rfc3339()),
            import_hash: Some(row_fingerprint(user_id, row)),
        };

        match self.db.insert_transaction(&tx) {
            Ok(crate::db::TransactionInsertResult::Inserted(_)) => RowResult::Inserted,
            Ok(crate::db::TransactionInsertResult::Duplicate(_)) => {
                RowResult::Skipped("duplicate row".to_string())
            }
            Err(e) => RowResult::Failed(e.to_string()),
        }
    }
}

/// Read an Axio CSV export into rows
pub fn read_axio_csv<R: Read>(reader: R) -> Result<Vec<AxioRow>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        rows.push(result?);
    }

    debug!("Parsed {} Axio rows", rows.len());
    Ok(rows)
}

/// Parse an Axio amount string
///
/// Strips thousands separators and stray quote characters (the export
/// writes negative amounts as `'-13.0`), parses as a float and takes the
/// absolute value - sign is carried by the Cr/Dr column. Unparseable
/// input yields 0, which downstream skips (zero is never inserted).
pub fn parse_axio_amount(raw: &str) -> f64 {
    let cleaned: String = raw.trim().replace([',', '\'', '"'], "");
    cleaned.parse::<f64>().map(f64::abs).unwrap_or(0.0)
}

/// Map the export's two-letter direction code
///
/// "CR" is a credit; anything else (normally "DR") is a debit.
pub fn parse_direction_code(code: &str) -> Direction {
    if code.trim().eq_ignore_ascii_case("CR") {
        Direction::Credit
    } else {
        Direction::Debit
    }
}

/// True for the export's affirmative tokens, false for anything else
pub fn is_affirmative(value: &str) -> bool {
    let v = value.trim();
    v.eq_ignore_ascii_case("yes") || v.eq_ignore_ascii_case("true")
}

/// Parsed account descriptor fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedAccount {
    pub kind: Option<PaymentKind>,
    pub last4: Option<String>,
    pub bank_name: Option<String>,
}

struct AccountRule {
    name: &'static str,
    apply: fn(&str) -> Option<ParsedAccount>,
}

/// Ordered account-descriptor rules, first match wins
///
/// The order is deliberate: the narrower card patterns must run before
/// the generic `<WORD> <4 digits>` bank-account pattern, or a card
/// transaction would be misread as a bank-account one.
const ACCOUNT_RULES: &[AccountRule] = &[
    AccountRule {
        name: "cash",
        apply: match_cash,
    },
    AccountRule {
        name: "wallet",
        apply: match_wallet,
    },
    AccountRule {
        name: "credit-card",
        apply: match_credit_card,
    },
    AccountRule {
        name: "debit-card",
        apply: match_debit_card,
    },
    AccountRule {
        name: "bank-account",
        apply: match_bank_account,
    },
];

/// Parse a free-text account descriptor into payment fields
pub fn parse_account(raw: &str) -> ParsedAccount {
    for rule in ACCOUNT_RULES {
        if let Some(parsed) = (rule.apply)(raw) {
            debug!(rule = rule.name, account = raw, "Account rule matched");
            return parsed;
        }
    }
    ParsedAccount::default()
}

fn match_cash(raw: &str) -> Option<ParsedAccount> {
    if raw.to_lowercase().contains("cash") {
        Some(ParsedAccount {
            kind: Some(PaymentKind::Other),
            last4: None,
            bank_name: None,
        })
    } else {
        None
    }
}

/// Wallet brands recognized in account descriptors
const WALLET_BRANDS: &[(&str, &str)] = &[
    ("paytm", "Paytm"),
    ("phonepe", "PhonePe"),
    ("amazon pay", "Amazon Pay"),
    ("mobikwik", "MobiKwik"),
    ("freecharge", "Freecharge"),
    ("google pay", "Google Pay"),
    ("gpay", "Google Pay"),
];

fn match_wallet(raw: &str) -> Option<ParsedAccount> {
    let lower = raw.to_lowercase();
    WALLET_BRANDS
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, brand)| ParsedAccount {
            kind: Some(PaymentKind::Wallet),
            last4: None,
            bank_name: Some(brand.to_string()),
        })
}

fn credit_card_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*([A-Za-z]+)\s+credit\s+(\d{4})\s*$").unwrap())
}

fn debit_card_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*([A-Za-z]+)\s+debit\s+(\d{4})\s*$").unwrap())
}

fn bank_account_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*([A-Za-z]+)\s+(\d{4})\s*$").unwrap())
}

fn card_from_captures(caps: regex::Captures<'_>) -> ParsedAccount {
    ParsedAccount {
        kind: Some(PaymentKind::Card),
        last4: Some(caps[2].to_string()),
        bank_name: Some(format!("{} Bank", &caps[1])),
    }
}

fn match_credit_card(raw: &str) -> Option<ParsedAccount> {
    credit_card_re().captures(raw).map(card_from_captures)
}

fn match_debit_card(raw: &str) -> Option<ParsedAccount> {
    debit_card_re().captures(raw).map(card_from_captures)
}

fn match_bank_account(raw: &str) -> Option<ParsedAccount> {
    bank_account_re().captures(raw).map(|caps| ParsedAccount {
        kind: Some(PaymentKind::Upi),
        last4: Some(caps[2].to_string()),
        bank_name: Some(format!("{} Bank", &caps[1])),
    })
}

/// Known Axio labels whose derived slug would miss the seeded vocabulary
const CATEGORY_OVERRIDES: &[(&str, &str)] = &[
    ("FOOD & DRINKS", "food-dining"),
    ("GROCERY", "groceries"),
    ("COMMUTE", "transport"),
    ("BILLS & UTILITIES", "bills-utilities"),
    ("MEDICAL", "health-medical"),
    ("BEAUTY & PERSONAL CARE", "personal-care"),
    ("MUTUAL FUNDS", "investments"),
];

/// Derive a category slug from an Axio category label
///
/// Uppercase-trim, apply the override table for known naming mismatches,
/// else lowercase with whitespace runs replaced by hyphens. The result may
/// still miss the vocabulary; that resolves to a NULL category, which is
/// valid.
pub fn derive_category_slug(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();
    if let Some((_, slug)) = CATEGORY_OVERRIDES.iter().find(|(label, _)| *label == upper) {
        return (*slug).to_string();
    }
    upper
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Compose the export's date and 12-hour clock columns into one timestamp
///
/// Always in fixed +05:30. A malformed time defaults to midnight the same
/// day; a malformed date fails the row.
pub fn compose_timestamp(date: &str, time: &str) -> Result<DateTime<FixedOffset>> {
    let date = NaiveDate::parse_from_str(date.trim(), "%d/%m/%Y")
        .map_err(|_| Error::InvalidData(format!("Unable to parse date: {}", date)))?;

    let time = NaiveTime::parse_from_str(&time.trim().to_uppercase(), "%I:%M %p")
        .unwrap_or_else(|_| NaiveTime::from_hms_opt(0, 0, 0).unwrap());

    let offset = FixedOffset::east_opt(IST_OFFSET_SECS).unwrap();
    let naive = date.and_time(time);
    Ok(offset
        .from_local_datetime(&naive)
        .single()
        .unwrap_or_else(|| offset.from_utc_datetime(&naive)))
}

/// Fingerprint a row for deduplication
///
/// Re-importing the same export must be a no-op, so the hash covers the
/// fields that identify a row within one user's history.
pub fn row_fingerprint(user_id: i64, row: &AxioRow) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.to_be_bytes());
    hasher.update(row.date.trim().as_bytes());
    hasher.update(row.time.trim().as_bytes());
    hasher.update(parse_axio_amount(&row.amount).to_be_bytes());
    hasher.update(row.category.trim().as_bytes());
    hasher.update(row.account.trim().as_bytes());
    hasher.update(row.cr_dr.trim().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_axio_amount() {
        assert_eq!(parse_axio_amount("1,234.50"), 1234.5);
        assert_eq!(parse_axio_amount("'-13.0"), 13.0);
        assert_eq!(parse_axio_amount("450"), 450.0);
        assert_eq!(parse_axio_amount(""), 0.0);
        assert_eq!(parse_axio_amount("n/a"), 0.0);
        assert_eq!(parse_axio_amount("\"2,000\""), 2000.0);
    }

    #[test]
    fn test_parse_direction_code() {
        assert_eq!(parse_direction_code("CR"), Direction::Credit);
        assert_eq!(parse_direction_code("cr"), Direction::Credit);
        assert_eq!(parse_direction_code("DR"), Direction::Debit);
        assert_eq!(parse_direction_code(""), Direction::Debit);
        assert_eq!(parse_direction_code("anything"), Direction::Debit);
    }

    #[test]
    fn test_is_affirmative() {
        assert!(is_affirmative("Yes"));
        assert!(is_affirmative("TRUE"));
        assert!(!is_affirmative("No"));
        assert!(!is_affirmative(""));
        assert!(!is_affirmative("1"));
    }

    #[test]
    fn test_account_credit_card() {
        let parsed = parse_account("HDFC credit 5487");
        assert_eq!(parsed.kind, Some(PaymentKind::Card));
        assert_eq!(parsed.last4.as_deref(), Some("5487"));
        assert_eq!(parsed.bank_name.as_deref(), Some("HDFC Bank"));
    }

    #[test]
    fn test_account_debit_card() {
        let parsed = parse_account("ICICI debit 1234");
        assert_eq!(parsed.kind, Some(PaymentKind::Card));
        assert_eq!(parsed.last4.as_deref(), Some("1234"));
        assert_eq!(parsed.bank_name.as_deref(), Some("ICICI Bank"));
    }

    #[test]
    fn test_account_generic_bank() {
        let parsed = parse_account("Kotak 3760");
        assert_eq!(parsed.kind, Some(PaymentKind::Upi));
        assert_eq!(parsed.last4.as_deref(), Some("3760"));
        assert_eq!(parsed.bank_name.as_deref(), Some("Kotak Bank"));
    }

    #[test]
    fn test_account_cash_wins_anywhere() {
        let parsed = parse_account("Petty cash 1234");
        assert_eq!(parsed.kind, Some(PaymentKind::Other));
        assert_eq!(parsed.last4, None);
        assert_eq!(parsed.bank_name, None);
    }

    #[test]
    fn test_account_wallet() {
        let parsed = parse_account("Paytm Wallet");
        assert_eq!(parsed.kind, Some(PaymentKind::Wallet));
        assert_eq!(parsed.last4, None);
        assert_eq!(parsed.bank_name.as_deref(), Some("Paytm"));
    }

    #[test]
    fn test_account_priority_card_before_generic() {
        // Without the priority order this would match the generic
        // two-token pattern and come out as a bank account
        let parsed = parse_account("SBI credit 9012");
        assert_eq!(parsed.kind, Some(PaymentKind::Card));
    }

    #[test]
    fn test_account_no_match() {
        assert_eq!(parse_account("My Savings"), ParsedAccount::default());
        assert_eq!(parse_account(""), ParsedAccount::default());
    }

    #[test]
    fn test_derive_category_slug_override() {
        assert_eq!(derive_category_slug("Food & Drinks"), "food-dining");
        assert_eq!(derive_category_slug("  GROCERY "), "groceries");
    }

    #[test]
    fn test_derive_category_slug_generic() {
        assert_eq!(derive_category_slug("Personal Loan"), "personal-loan");
        assert_eq!(derive_category_slug("Rent"), "rent");
        assert_eq!(derive_category_slug("A   B\tC"), "a-b-c");
    }

    #[test]
    fn test_compose_timestamp() {
        let ts = compose_timestamp("15/03/2024", "09:45 PM").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-15T21:45:00+05:30");
    }

    #[test]
    fn test_compose_timestamp_malformed_time_defaults_to_midnight() {
        let ts = compose_timestamp("15/03/2024", "whenever").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-15T00:00:00+05:30");

        let ts = compose_timestamp("15/03/2024", "").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-15T00:00:00+05:30");
    }

    #[test]
    fn test_compose_timestamp_malformed_date_fails() {
        assert!(compose_timestamp("2024-03-15", "09:45 PM").is_err());
        assert!(compose_timestamp("", "09:45 PM").is_err());
    }

    #[test]
    fn test_row_fingerprint_stable_and_user_scoped() {
        let row = AxioRow {
            date: "15/03/2024".to_string(),
            time: "09:45 PM".to_string(),
            place: Some("Swiggy".to_string()),
            amount: "450".to_string(),
            cr_dr: "DR".to_string(),
            category: "Food & Drinks".to_string(),
            account: "HDFC credit 5487".to_string(),
            note: None,
            expense: "Yes".to_string(),
            income: "No".to_string(),
        };

        assert_eq!(row_fingerprint(1, &row), row_fingerprint(1, &row));
        assert_ne!(row_fingerprint(1, &row), row_fingerprint(2, &row));

        let mut other = row.clone();
        other.amount = "451".to_string();
        assert_ne!(row_fingerprint(1, &row), row_fingerprint(1, &other));
    }

    #[test]
    fn test_read_axio_csv() {
        let csv = "\
Date,Time,Place,Amount,Cr/Dr,Category,Account,Note,Expense,Income
15/03/2024,09:45 PM,Swiggy,450,DR,Food & Drinks,HDFC credit 5487,,Yes,No
16/03/2024,08:00 AM,Employer,\"1,00,000\",CR,Salary,Kotak 3760,march,No,Yes
";
        let rows = read_axio_csv(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].place.as_deref(), Some("Swiggy"));
        assert_eq!(rows[0].cr_dr, "DR");
        assert_eq!(parse_axio_amount(&rows[1].amount), 100000.0);
        assert_eq!(rows[1].note.as_deref(), Some("march"));
    }
}
