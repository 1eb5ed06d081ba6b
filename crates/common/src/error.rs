use std::time::Duration;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// The broker payload is not a valid delivery envelope. Never retried.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed queue message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// An outbound send failed. Recorded as a `failed` log, not retried here.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no recipients specified")]
    NoRecipients,

    #[error("email body is required")]
    MissingBody,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("{0}")]
    Transport(String),

    #[error("{provider} API returned status {status}")]
    UnexpectedStatus { provider: &'static str, status: u16 },
}

/// Persisting a delivery outcome failed. Causes broker redelivery.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("document encoding error: {0}")]
    Document(#[from] mongodb::bson::ser::Error),

    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("insert timed out after {0:?}")]
    Timeout(Duration),

    #[error("storage is closed")]
    Closed,
}

/// Fatal problems detected before the worker starts consuming.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("unsupported email provider: {0}")]
    UnknownProvider(String),

    #[error("unknown storage type: {0}")]
    UnknownStorage(String),

    #[error("{component} requires {detail}")]
    MissingSetting {
        component: &'static str,
        detail: &'static str,
    },

    #[error("message broker error: {0}")]
    Broker(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("storage backend error: {0}")]
    Storage(#[from] StorageError),

    #[error("HTTP listener error: {0}")]
    Http(#[from] std::io::Error),
}

/// Errors returned by the HTTP status surface.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Storage(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to store email log".to_string(),
            ),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = json!({ "error": message });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_messages() {
        assert_eq!(
            ProviderError::NoRecipients.to_string(),
            "no recipients specified"
        );
        assert_eq!(ProviderError::MissingBody.to_string(), "email body is required");
        assert_eq!(
            ProviderError::Transport("network down".to_string()).to_string(),
            "network down"
        );
        assert_eq!(
            ProviderError::UnexpectedStatus {
                provider: "SendGrid",
                status: 400
            }
            .to_string(),
            "SendGrid API returned status 400"
        );
    }

    #[test]
    fn test_missing_setting_message() {
        let err = StartupError::MissingSetting {
            component: "gmail provider",
            detail: "username and password",
        };
        assert_eq!(err.to_string(), "gmail provider requires username and password");
    }

    #[test]
    fn test_storage_error_response_is_generic() {
        let err = AppError::Storage(StorageError::Closed);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
