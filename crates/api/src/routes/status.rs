//! API status and manual storage check endpoints.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use courier_common::error::AppError;
use courier_common::types::{EmailLog, EmailMessage};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/status", get(api_status))
        .route("/api/v1/test-email-log", post(test_email_log))
}

async fn api_status() -> Json<serde_json::Value> {
    tracing::debug!("API status requested");
    Json(json!({
        "api_version": "v1",
        "status": "operational",
    }))
}

/// Store a synthetic success record through the active storage backend.
async fn test_email_log(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    tracing::info!("Test email log requested");

    let email = EmailMessage {
        to: vec!["test@example.com".to_string()],
        subject: "Test Email Log".to_string(),
        body_html: None,
        body_text: None,
        from: None,
    };
    let log = EmailLog::attempt(&email, "test").succeeded();

    if let Err(e) = state.storage.store(&log).await {
        tracing::error!(
            error = %e,
            storage = state.storage.storage_name(),
            "Failed to store test email log"
        );
        return Err(e.into());
    }

    tracing::info!(id = %log.id, "Test email log stored");
    Ok(Json(json!({
        "message": "Test email log stored",
        "storage_type": state.storage.storage_name(),
        "log": log,
    })))
}
