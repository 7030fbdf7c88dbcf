//! JSON parsing helpers for oracle responses
//!
//! Model responses often include extra text before/after the JSON payload;
//! these functions locate and deserialize the array of candidates.

use crate::error::{Error, Result};

use super::types::ExtractionCandidate;

/// Extract the candidate array from a model response
pub fn parse_candidates(response: &str) -> Result<Vec<ExtractionCandidate>> {
    let response = response.trim();

    let start = response.find('[');
    let end = response.rfind(']');

    match (start, end) {
        (Some(s), Some(e)) if s < e => {
            let json_str = &response[s..=e];
            serde_json::from_str(json_str).map_err(|e| {
                Error::Oracle(format!(
                    "Invalid JSON from oracle: {} | Raw: {}",
                    e,
                    truncate(json_str)
                ))
            })
        }
        _ => Err(Error::Oracle(format!(
            "No JSON array found in oracle response | Raw: {}",
            truncate(response)
        ))),
    }
}

/// Truncate long responses for error messages
fn truncate(s: &str) -> String {
    if s.len() > 200 {
        format!("{}...", &s[..200])
    } else {
        s.to_string()
    }
}
