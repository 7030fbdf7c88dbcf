//! SMS ingestion handler

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::{AppError, AppState, MAX_BODY_SIZE};
use khata_core::ingest::MessageOutcome;
use khata_core::models::{RawMessage, RunStatus};

/// Request body for `POST /sms/ingest`
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub api_key: String,
    #[serde(default)]
    pub messages: Vec<RawMessage>,
}

/// Response body for `POST /sms/ingest`
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub success: bool,
    pub total: i64,
    pub inserted: i64,
    pub skipped: i64,
    pub errors: i64,
    pub status: RunStatus,
    pub details: Vec<MessageOutcome>,
}

/// POST /sms/ingest - ingest a batch of raw SMS messages
pub async fn ingest_sms(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<IngestResponse>, AppError> {
    let bytes = axum::body::to_bytes(request.into_body(), MAX_BODY_SIZE)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;
    let req: IngestRequest = serde_json::from_slice(&bytes)
        .map_err(|e| AppError::bad_request(&format!("Invalid JSON: {}", e)))?;

    let report = state.pipeline.ingest(&req.api_key, &req.messages).await?;

    Ok(Json(IngestResponse {
        success: true,
        total: report.total,
        inserted: report.inserted,
        skipped: report.skipped,
        errors: report.errors,
        status: report.status,
        details: report.details,
    }))
}
