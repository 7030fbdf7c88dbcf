//! OpenAI-compatible extraction backend
//!
//! Speaks the `/v1/chat/completions` protocol, which covers vLLM, LocalAI,
//! llama-server, Docker Model Runner and hosted providers alike. Extraction
//! uses temperature 0 so the same batch yields the same candidates.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{Category, RawMessage};

use super::parsing::parse_candidates;
use super::types::ExtractionCandidate;
use super::ExtractionBackend;

/// Backend for OpenAI-compatible chat-completions servers
#[derive(Clone)]
pub struct OpenAICompatibleBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAICompatibleBackend {
    /// Create a new backend
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: None,
        }
    }

    /// Attach a bearer api key (required by hosted providers)
    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }

    /// Create from environment variables
    ///
    /// Requires `ORACLE_HOST`; `ORACLE_MODEL` defaults to llama3.2 and
    /// `ORACLE_API_KEY` is optional.
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("ORACLE_HOST").ok()?;
        let model = std::env::var("ORACLE_MODEL").unwrap_or_else(|_| "llama3.2".to_string());
        let mut backend = Self::new(&host, &model);
        if let Ok(key) = std::env::var("ORACLE_API_KEY") {
            backend.api_key = Some(key);
        }
        Some(backend)
    }
}

/// Request to the chat-completions endpoint
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

/// Response from the chat-completions endpoint
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Render the extraction instructions with the caller's category vocabulary
fn build_system_prompt(vocabulary: &[Category]) -> String {
    let slugs = if vocabulary.is_empty() {
        "(none - leave category_slug null)".to_string()
    } else {
        vocabulary
            .iter()
            .map(|c| c.slug.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        r#"You classify SMS messages from Indian banks, UPI apps and card issuers.

For each input message decide whether it describes a real, completed financial transaction (money actually moved). Promotional messages, OTPs, balance updates, payment reminders and failed-transaction notices are NOT transactions.

Respond with ONLY a JSON array, one object per input message, each with:
- sms_id (number, copied from the input)
- is_transaction (boolean)
- skip_reason (string, only when is_transaction is false)
and, when is_transaction is true:
- amount (number, positive), currency (ISO code, e.g. "INR", "USD")
- direction ("credit" or "debit")
- merchant, payment_method ("card"|"upi"|"wallet"|"netbanking"|"other")
- account_last4 (4 digits), bank_name, reference_id
- category_slug (one of the allowed slugs, or null if none fits)
- is_expense / is_income (booleans; set is_expense false for a debit that is a self-transfer or investment, set is_income false for a credit that is a refund of your own money)
- confidence (0.0-1.0)

Allowed category slugs: {}"#,
        slugs
    )
}

/// Render the message batch as the user turn
fn build_user_prompt(messages: &[RawMessage]) -> Result<String> {
    let batch: Vec<_> = messages
        .iter()
        .map(|m| json!({"id": m.id, "sender": m.sender, "body": m.body}))
        .collect();
    Ok(serde_json::to_string(&batch)?)
}

#[async_trait]
impl ExtractionBackend for OpenAICompatibleBackend {
    async fn extract(
        &self,
        messages: &[RawMessage],
        vocabulary: &[Category],
    ) -> Result<Vec<ExtractionCandidate>> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: build_system_prompt(vocabulary),
                },
                ChatMessage {
                    role: "user",
                    content: build_user_prompt(messages)?,
                },
            ],
            temperature: 0.0,
        };

        let mut req = self
            .http_client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        if !response.status().is_success() {
            return Err(Error::Oracle(format!(
                "Oracle returned status {}",
                response.status()
            )));
        }

        let chat: ChatResponse = response.json().await?;
        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| Error::Oracle("Oracle response had no choices".into()))?;

        debug!(len = content.len(), "Oracle response received");
        parse_candidates(content)
    }

    async fn health_check(&self) -> bool {
        let mut req = self
            .http_client
            .get(format!("{}/v1/models", self.base_url));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        match req.send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(slug: &str) -> Category {
        Category {
            id: 1,
            user_id: None,
            slug: slug.to_string(),
            name: slug.to_string(),
        }
    }

    #[test]
    fn test_system_prompt_renders_vocabulary() {
        let prompt = build_system_prompt(&[category("groceries"), category("fuel")]);
        assert!(prompt.contains("groceries, fuel"));
    }

    #[test]
    fn test_system_prompt_empty_vocabulary() {
        let prompt = build_system_prompt(&[]);
        assert!(prompt.contains("leave category_slug null"));
    }

    #[test]
    fn test_user_prompt_is_ordered_json() {
        let messages = vec![
            RawMessage {
                id: 2,
                sender: "VM-HDFCBK".to_string(),
                body: "Rs.450 debited".to_string(),
                timestamp: None,
            },
            RawMessage {
                id: 1,
                sender: "AX-KOTAKB".to_string(),
                body: "Rs.90 credited".to_string(),
                timestamp: None,
            },
        ];

        let rendered = build_user_prompt(&messages).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed[0]["id"], 2);
        assert_eq!(parsed[1]["id"], 1);
        assert_eq!(parsed[0]["sender"], "VM-HDFCBK");
    }
}
