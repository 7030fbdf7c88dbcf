//! Axio CSV import handler

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::{AppError, AppState, MAX_BODY_SIZE};
use khata_core::axio::AxioRow;

/// Request body for `POST /import/axio`
#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub api_key: String,
    #[serde(default)]
    pub rows: Vec<AxioRow>,
}

/// Response body for `POST /import/axio`
#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub success: bool,
    pub total: i64,
    pub inserted: i64,
    pub skipped: i64,
    pub errors: i64,
    pub error_details: Vec<String>,
}

/// POST /import/axio - import rows from an Axio export
pub async fn import_axio(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<ImportResponse>, AppError> {
    let bytes = axum::body::to_bytes(request.into_body(), MAX_BODY_SIZE)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;
    let req: ImportRequest = serde_json::from_slice(&bytes)
        .map_err(|e| AppError::bad_request(&format!("Invalid JSON: {}", e)))?;

    let report = state.pipeline.import_rows(&req.api_key, &req.rows).await?;

    Ok(Json(ImportResponse {
        success: true,
        total: report.total,
        inserted: report.inserted,
        skipped: report.skipped,
        errors: report.errors,
        error_details: report.error_details,
    }))
}
