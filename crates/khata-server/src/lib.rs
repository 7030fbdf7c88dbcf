//! Khata Web Server
//!
//! Axum-based REST API exposing the two ingestion paths and a health
//! probe. The interesting logic lives in khata-core; this layer maps HTTP
//! bodies to pipeline calls and pipeline errors to status codes:
//!
//! - invalid body / empty batch => 400 with validation detail
//! - unknown credential => 401
//! - oracle failure => 500 with the error echoed
//!
//! Per-message outcomes never change the status code of an otherwise
//! successful call; they come back in the response counts.

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use khata_core::currency::CurrencyConverter;
use khata_core::db::Database;
use khata_core::ingest::IngestionPipeline;
use khata_core::oracle::{ExtractionBackend, OracleClient};

mod handlers;


/// Maximum accepted request body size (2 MB)
pub const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub pipeline: IngestionPipeline,
}

/// Build the router with an explicit oracle and converter
pub fn create_router(db: Database, oracle: OracleClient, converter: CurrencyConverter) -> Router {
    info!(
        host = oracle.host(),
        model = oracle.model(),
        "Oracle backend configured"
    );

    let pipeline = IngestionPipeline::new(db.clone(), oracle, converter);
    let state = Arc::new(AppState { db, pipeline });

    Router::new()
        .route("/sms/ingest", post(handlers::ingest_sms))
        .route("/import/axio", post(handlers::import_axio))
        .route("/sms/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the server on the given address
pub async fn serve(db: Database, host: &str, port: u16) -> anyhow::Result<()> {
    let oracle = OracleClient::from_env().ok_or_else(|| {
        anyhow::anyhow!(
            "No oracle configured. Set ORACLE_HOST (or ORACLE_BACKEND=mock for development)."
        )
    })?;
    let converter = CurrencyConverter::from_env();

    let app = create_router(db, oracle, converter);

    let addr = format!("{}:{}", host, port);
    info!("Khata server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// API error with an HTTP status
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "success": false,
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl From<khata_core::Error> for AppError {
    fn from(err: khata_core::Error) -> Self {
        use khata_core::Error;

        // Oracle failures land in the catch-all: 500 with the error echoed
        let status = match &err {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %err, "Request failed");
        }

        Self {
            status,
            message: err.to_string(),
        }
    }
}
