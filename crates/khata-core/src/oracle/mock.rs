//! Mock oracle backend for testing
//!
//! Classifies with deterministic keyword heuristics, so tests and local
//! development work without a running model server. Tests can also script
//! the exact candidate list or force the extraction call to fail.

use std::sync::Arc;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use crate::error::{Error, Result};
use crate::models::{Category, RawMessage};

use super::types::ExtractionCandidate;
use super::ExtractionBackend;

/// Mock extraction backend
#[derive(Clone, Default)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    /// When set, extract() returns exactly these candidates
    scripted: Option<Arc<Vec<ExtractionCandidate>>>,
    /// When true, extract() fails (for oracle-failure tests)
    failing: bool,
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            scripted: None,
            failing: false,
        }
    }

    /// Create a mock that returns exactly the given candidates
    pub fn with_candidates(candidates: Vec<ExtractionCandidate>) -> Self {
        Self {
            healthy: true,
            scripted: Some(Arc::new(candidates)),
            failing: false,
        }
    }

    /// Create a mock whose extraction call always fails
    pub fn failing() -> Self {
        Self {
            healthy: false,
            scripted: None,
            failing: true,
        }
    }

    /// Heuristic classification of a single message body
    fn classify(message: &RawMessage) -> ExtractionCandidate {
        let body = message.body.to_lowercase();

        let direction = if body.contains("credited") || body.contains("received") {
            Some("credit")
        } else if body.contains("debited") || body.contains("spent") || body.contains("paid") {
            Some("debit")
        } else {
            None
        };

        let amount_capture = amount_re().captures(&message.body);

        match (direction, amount_capture) {
            (Some(direction), Some(caps)) => {
                let currency = match caps.get(1).map(|m| m.as_str().to_lowercase()) {
                    Some(token) if token == "$" || token == "usd" => "USD",
                    _ => "INR",
                };
                let amount = caps
                    .get(2)
                    .and_then(|m| m.as_str().replace(',', "").parse::<f64>().ok());

                let merchant = merchant_re()
                    .captures(&message.body)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|s| !s.is_empty());

                let account_last4 = last4_re()
                    .captures(&message.body)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string());

                let bank_name = detect_bank(&message.sender).or_else(|| detect_bank(&message.body));

                let category_slug = merchant.as_deref().and_then(known_category);

                ExtractionCandidate {
                    sms_id: message.id,
                    is_transaction: true,
                    amount,
                    currency: Some(currency.to_string()),
                    direction: Some(direction.to_string()),
                    merchant,
                    payment_method: if body.contains("upi") {
                        Some("upi".to_string())
                    } else if body.contains("card") {
                        Some("card".to_string())
                    } else {
                        None
                    },
                    account_last4,
                    bank_name,
                    reference_id: None,
                    category_slug,
                    is_expense: None,
                    is_income: None,
                    confidence: Some(0.9),
                    skip_reason: None,
                }
            }
            _ => ExtractionCandidate {
                sms_id: message.id,
                is_transaction: false,
                skip_reason: Some("no transaction pattern".to_string()),
                ..Default::default()
            },
        }
    }
}

fn amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(rs\.?|inr|₹|usd|\$)\s*([0-9][0-9,]*(?:\.[0-9]+)?)").unwrap()
    })
}

fn merchant_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:at|to)\s+([A-Za-z][A-Za-z0-9&*. ]*?)(?:\s+(?:on|via|using|ref)\b|[.,]|$)")
            .unwrap()
    })
}

fn last4_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:a/c|acct|account|card)\s*(?:no\.?\s*)?(?:[x*]*|ending\s*)(\d{4})")
            .unwrap()
    })
}

/// Map a sender/body fragment to a bank name
fn detect_bank(text: &str) -> Option<String> {
    const BANKS: &[&str] = &["HDFC", "ICICI", "SBI", "Kotak", "Axis", "IDFC", "Yes"];
    let upper = text.to_uppercase();
    BANKS
        .iter()
        .find(|b| upper.contains(&b.to_uppercase()))
        .map(|b| format!("{} Bank", b))
}

/// Map well-known merchants to category slugs
fn known_category(merchant: &str) -> Option<String> {
    let m = merchant.to_lowercase();
    let slug = if m.contains("swiggy") || m.contains("zomato") {
        "food-dining"
    } else if m.contains("uber") || m.contains("ola") {
        "transport"
    } else if m.contains("amazon") || m.contains("flipkart") {
        "shopping"
    } else if m.contains("netflix") || m.contains("spotify") {
        "entertainment"
    } else if m.contains("bigbasket") || m.contains("blinkit") {
        "groceries"
    } else {
        return None;
    };
    Some(slug.to_string())
}

#[async_trait]
impl ExtractionBackend for MockBackend {
    async fn extract(
        &self,
        messages: &[RawMessage],
        _vocabulary: &[Category],
    ) -> Result<Vec<ExtractionCandidate>> {
        if self.failing {
            return Err(Error::Oracle("mock oracle unavailable".into()));
        }
        if let Some(scripted) = &self.scripted {
            return Ok(scripted.as_ref().clone());
        }
        Ok(messages.iter().map(Self::classify).collect())
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: i64, body: &str) -> RawMessage {
        RawMessage {
            id,
            sender: "VM-HDFCBK".to_string(),
            body: body.to_string(),
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn test_classifies_debit_with_amount() {
        let mock = MockBackend::new();
        let candidates = mock
            .extract(
                &[message(1, "Rs.450.00 debited from A/c XX5487 at Swiggy on 12-03")],
                &[],
            )
            .await
            .unwrap();

        let c = &candidates[0];
        assert!(c.is_transaction);
        assert_eq!(c.amount, Some(450.0));
        assert_eq!(c.currency.as_deref(), Some("INR"));
        assert_eq!(c.direction.as_deref(), Some("debit"));
        assert_eq!(c.merchant.as_deref(), Some("Swiggy"));
        assert_eq!(c.account_last4.as_deref(), Some("5487"));
        assert_eq!(c.bank_name.as_deref(), Some("HDFC Bank"));
        assert_eq!(c.category_slug.as_deref(), Some("food-dining"));
    }

    #[tokio::test]
    async fn test_classifies_credit_and_foreign_currency() {
        let mock = MockBackend::new();
        let candidates = mock
            .extract(&[message(2, "USD 25.00 credited to your account")], &[])
            .await
            .unwrap();

        let c = &candidates[0];
        assert!(c.is_transaction);
        assert_eq!(c.currency.as_deref(), Some("USD"));
        assert_eq!(c.direction.as_deref(), Some("credit"));
    }

    #[tokio::test]
    async fn test_skips_non_transaction() {
        let mock = MockBackend::new();
        let candidates = mock
            .extract(&[message(3, "Your OTP for login is 482913")], &[])
            .await
            .unwrap();

        assert!(!candidates[0].is_transaction);
        assert!(candidates[0].skip_reason.is_some());
    }

    #[tokio::test]
    async fn test_amount_with_thousands_separator() {
        let mock = MockBackend::new();
        let candidates = mock
            .extract(&[message(4, "Rs.1,23,456.78 debited for rent")], &[])
            .await
            .unwrap();

        assert_eq!(candidates[0].amount, Some(123456.78));
    }

    #[tokio::test]
    async fn test_failing_mock() {
        let mock = MockBackend::failing();
        assert!(mock.extract(&[message(1, "x")], &[]).await.is_err());
        assert!(!mock.health_check().await);
    }
}
