//! Domain models for Khata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A resolved caller identity
///
/// Produced by looking up an opaque api key in the users table.
/// Resolution never mutates anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    pub email: Option<String>,
}

/// A spending/income category
///
/// `user_id` is None for system-wide categories. Slugs are unique
/// (case-insensitively) within the vocabulary visible to one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub user_id: Option<i64>,
    pub slug: String,
    pub name: String,
}

/// A raw SMS message as submitted by a device
///
/// `id` is unique per source device only, never globally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: i64,
    pub sender: String,
    pub body: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Money movement direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "credit" | "cr" => Ok(Self::Credit),
            "debit" | "dr" => Ok(Self::Debit),
            _ => Err(format!("Unknown direction: {}", s)),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment instrument used for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentKind {
    Card,
    Upi,
    Wallet,
    Netbanking,
    Other,
}

impl PaymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::Upi => "upi",
            Self::Wallet => "wallet",
            Self::Netbanking => "netbanking",
            Self::Other => "other",
        }
    }
}

impl std::str::FromStr for PaymentKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "card" | "credit_card" | "debit_card" => Ok(Self::Card),
            "upi" => Ok(Self::Upi),
            "wallet" => Ok(Self::Wallet),
            "netbanking" | "net_banking" => Ok(Self::Netbanking),
            "other" | "cash" => Ok(Self::Other),
            _ => Err(format!("Unknown payment kind: {}", s)),
        }
    }
}

impl std::fmt::Display for PaymentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transaction provenance - which ingestion path created it
///
/// Never mutated after insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionSource {
    Sms,
    AxioImport,
}

impl TransactionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::AxioImport => "axio-import",
        }
    }
}

impl std::str::FromStr for TransactionSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sms" => Ok(Self::Sms),
            "axio-import" | "axio_import" => Ok(Self::AxioImport),
            _ => Err(format!("Unknown transaction source: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one ingestion run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Partial,
    Failed,
    NoMessages,
}

impl RunStatus {
    /// Derive the run status from aggregate counts
    ///
    /// Empty batches are rejected before ingestion starts, so NoMessages
    /// is reachable only through a degenerate path.
    pub fn from_counts(inserted: i64, errors: i64, total: i64) -> Self {
        if total == 0 {
            Self::NoMessages
        } else if errors > 0 && inserted == 0 {
            Self::Failed
        } else if errors > 0 {
            Self::Partial
        } else {
            Self::Success
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::NoMessages => "no_messages",
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "success" => Ok(Self::Success),
            "partial" => Ok(Self::Partial),
            "failed" => Ok(Self::Failed),
            "no_messages" => Ok(Self::NoMessages),
            _ => Err(format!("Unknown run status: {}", s)),
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A transaction ready to be inserted
///
/// `amount` is always positive and always in the base currency;
/// `original_amount`/`original_currency` are both set or both None.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub user_id: i64,
    /// Device-scoped message id; None for CSV imports
    pub sms_id: Option<i64>,
    pub amount: f64,
    pub direction: Direction,
    pub merchant: Option<String>,
    pub payment_method: Option<PaymentKind>,
    pub account_last4: Option<String>,
    pub bank_name: Option<String>,
    pub reference_id: Option<String>,
    pub category_id: Option<i64>,
    pub is_expense: bool,
    pub is_income: bool,
    pub original_amount: Option<f64>,
    pub original_currency: Option<String>,
    pub source: TransactionSource,
    /// Sender-reported timestamp, stored verbatim
    pub message_timestamp: Option<String>,
    /// CSV row fingerprint; None for the SMS path
    pub import_hash: Option<String>,
}

/// A stored transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub sms_id: Option<i64>,
    pub amount: f64,
    pub direction: Direction,
    pub merchant: Option<String>,
    pub payment_method: Option<PaymentKind>,
    pub account_last4: Option<String>,
    pub bank_name: Option<String>,
    pub reference_id: Option<String>,
    pub category_id: Option<i64>,
    pub is_expense: bool,
    pub is_income: bool,
    pub original_amount: Option<f64>,
    pub original_currency: Option<String>,
    pub source: TransactionSource,
    pub message_timestamp: Option<String>,
    pub import_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Audit record for one ingestion batch, ready to be inserted
///
/// `input` and `outcomes` carry a verbatim JSON copy of the batch and the
/// per-message results for replay/audit.
#[derive(Debug, Clone)]
pub struct NewRunSummary {
    pub user_id: i64,
    pub total: i64,
    pub inserted: i64,
    pub skipped: i64,
    pub errors: i64,
    pub status: RunStatus,
    pub duration_ms: i64,
    pub input: String,
    pub outcomes: String,
}

/// A stored run summary
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub id: i64,
    pub user_id: i64,
    pub total: i64,
    pub inserted: i64,
    pub skipped: i64,
    pub errors: i64,
    pub status: RunStatus,
    pub duration_ms: i64,
    pub input: String,
    pub outcomes: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_from_counts() {
        assert_eq!(RunStatus::from_counts(3, 0, 3), RunStatus::Success);
        assert_eq!(RunStatus::from_counts(2, 1, 3), RunStatus::Partial);
        assert_eq!(RunStatus::from_counts(0, 2, 2), RunStatus::Failed);
        assert_eq!(RunStatus::from_counts(0, 0, 0), RunStatus::NoMessages);
        // Skips alone never degrade the status
        assert_eq!(RunStatus::from_counts(0, 0, 3), RunStatus::Success);
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("credit".parse::<Direction>().unwrap(), Direction::Credit);
        assert_eq!("DEBIT".parse::<Direction>().unwrap(), Direction::Debit);
        assert_eq!("CR".parse::<Direction>().unwrap(), Direction::Credit);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_source_round_trip() {
        assert_eq!(TransactionSource::AxioImport.as_str(), "axio-import");
        assert_eq!(
            "axio-import".parse::<TransactionSource>().unwrap(),
            TransactionSource::AxioImport
        );
        assert_eq!(
            "sms".parse::<TransactionSource>().unwrap(),
            TransactionSource::Sms
        );
    }
}
