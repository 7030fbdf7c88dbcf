//! Khata Core Library
//!
//! Shared functionality for the Khata transaction ingestion service:
//! - SQLite store with idempotent transaction inserts
//! - SMS ingestion pipeline (extraction oracle + normalization)
//! - Axio CSV import pipeline
//! - Currency conversion with a time-bounded rate cache
//! - Pluggable extraction-oracle backends (OpenAI-compatible, mock)

pub mod axio;
pub mod currency;
pub mod db;
pub mod error;
pub mod ingest;
pub mod models;
pub mod oracle;

pub use axio::{read_axio_csv, AxioRow, ImportReport, ParsedAccount};
pub use currency::{Conversion, CurrencyConverter, BASE_CURRENCY};
pub use db::{Database, TransactionInsertResult};
pub use error::{Error, Result};
pub use ingest::{IngestReport, IngestionPipeline, MessageOutcome, OutcomeKind};
pub use oracle::{ExtractionBackend, ExtractionCandidate, MockBackend, OracleClient};
