//! HTTP request handlers organized by domain

pub mod health;
pub mod import;
pub mod ingest;

// Re-export all handlers for use in router
pub use health::*;
pub use import::*;
pub use ingest::*;
