//! Pluggable extraction-oracle abstraction
//!
//! The oracle is the external service that decides whether an SMS message
//! is a financial transaction and extracts its structured fields. This
//! module provides a backend-agnostic interface around it.
//!
//! # Architecture
//!
//! - `ExtractionBackend` trait: the one batch extraction operation plus
//!   health/identity accessors
//! - `OracleClient` enum: concrete wrapper providing Clone + compile-time
//!   dispatch
//! - Backend implementations: `OpenAICompatibleBackend`, `MockBackend`
//!
//! # Configuration
//!
//! Environment variables:
//! - `ORACLE_BACKEND`: Backend to use (openai_compatible, mock).
//!   Default: openai_compatible
//! - `ORACLE_HOST`: Server URL (required for openai_compatible)
//! - `ORACLE_MODEL`: Model name (default: llama3.2)
//! - `ORACLE_API_KEY`: Bearer key if the server requires one (optional)

mod mock;
mod openai_compatible;
pub mod parsing;
pub mod types;

pub use mock::MockBackend;
pub use openai_compatible::OpenAICompatibleBackend;
pub use types::ExtractionCandidate;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Category, RawMessage};

/// Trait defining the interface for extraction oracle backends
///
/// Backends must be Send + Sync to allow use across async tasks. The
/// response is untrusted: callers must not rely on order, completeness,
/// or one-candidate-per-message.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Classify a whole message batch against a category vocabulary
    ///
    /// One call per batch, not per message, to amortize cost and latency.
    async fn extract(
        &self,
        messages: &[RawMessage],
        vocabulary: &[Category],
    ) -> Result<Vec<ExtractionCandidate>>;

    /// Check if the backend is available
    async fn health_check(&self) -> bool;

    /// Get the model name (for logging)
    fn model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete oracle client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum OracleClient {
    /// OpenAI-compatible backend (vLLM, LocalAI, llama-server, hosted APIs)
    OpenAICompatible(OpenAICompatibleBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl OracleClient {
    /// Create an oracle client from environment variables
    ///
    /// Checks `ORACLE_BACKEND` to determine which backend to use.
    /// Returns None if the required environment variables are not set.
    pub fn from_env() -> Option<Self> {
        let backend =
            std::env::var("ORACLE_BACKEND").unwrap_or_else(|_| "openai_compatible".to_string());

        match backend.to_lowercase().as_str() {
            "openai_compatible" | "openai" | "vllm" | "localai" | "llamacpp" => {
                OpenAICompatibleBackend::from_env().map(OracleClient::OpenAICompatible)
            }
            "mock" => Some(OracleClient::Mock(MockBackend::new())),
            _ => {
                tracing::warn!(backend = %backend, "Unknown ORACLE_BACKEND, falling back to openai_compatible");
                OpenAICompatibleBackend::from_env().map(OracleClient::OpenAICompatible)
            }
        }
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        OracleClient::Mock(MockBackend::new())
    }
}

// Implement ExtractionBackend for OracleClient by delegating to the inner backend
#[async_trait]
impl ExtractionBackend for OracleClient {
    async fn extract(
        &self,
        messages: &[RawMessage],
        vocabulary: &[Category],
    ) -> Result<Vec<ExtractionCandidate>> {
        match self {
            OracleClient::OpenAICompatible(b) => b.extract(messages, vocabulary).await,
            OracleClient::Mock(b) => b.extract(messages, vocabulary).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            OracleClient::OpenAICompatible(b) => b.health_check().await,
            OracleClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            OracleClient::OpenAICompatible(b) => b.model(),
            OracleClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            OracleClient::OpenAICompatible(b) => b.host(),
            OracleClient::Mock(b) => b.host(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oracle_client_mock() {
        let client = OracleClient::mock();
        assert_eq!(client.model(), "mock");
        assert_eq!(client.host(), "mock://localhost");
    }

    #[tokio::test]
    async fn test_mock_health_check() {
        let client = OracleClient::mock();
        assert!(client.health_check().await);
    }
}
