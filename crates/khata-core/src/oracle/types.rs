//! Shared types for extraction oracle backends

use serde::{Deserialize, Serialize};

/// Per-message output of the extraction oracle
///
/// This is untrusted external input: optional fields may be missing or
/// nonsensical even when `is_transaction` is true, candidates may arrive
/// out of order, duplicated, or not at all. Correlation is strictly by
/// `sms_id`; the pipeline re-validates everything before insert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionCandidate {
    pub sms_id: i64,
    #[serde(default)]
    pub is_transaction: bool,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    /// "credit" or "debit"; kept as text and parsed leniently downstream
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub account_last4: Option<String>,
    #[serde(default)]
    pub bank_name: Option<String>,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub category_slug: Option<String>,
    /// Override for the default debit-is-expense policy
    #[serde(default)]
    pub is_expense: Option<bool>,
    /// Override for the default credit-is-income policy
    #[serde(default)]
    pub is_income: Option<bool>,
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Populated only when `is_transaction` is false
    #[serde(default)]
    pub skip_reason: Option<String>,
}
