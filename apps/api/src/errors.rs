use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::assessment::measurement::ExtractionError;
use crate::llm_client::ProviderError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Landmark extraction failed: {0}")]
    ExtractionFailed(#[from] ExtractionError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: &'static str, secs: u64 },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::MalformedResponse(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "MALFORMED_RESPONSE",
                msg.clone(),
            ),
            AppError::Configuration(msg) => {
                tracing::error!("Configuration error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIGURATION_ERROR",
                    "The service is not configured correctly".to_string(),
                )
            }
            AppError::ExtractionFailed(e) => {
                tracing::error!("Extraction error: {e}");
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "EXTRACTION_FAILED",
                    "Pose landmarks could not be extracted from the images".to_string(),
                )
            }
            AppError::Provider(e) => {
                tracing::error!("Provider error: {e}");
                let status = match e {
                    ProviderError::RateLimited { .. } | ProviderError::Api { status: 429, .. } => {
                        StatusCode::TOO_MANY_REQUESTS
                    }
                    _ => StatusCode::BAD_GATEWAY,
                };
                (
                    status,
                    "PROVIDER_ERROR",
                    "The AI provider request failed".to_string(),
                )
            }
            AppError::Timeout { stage, secs } => (
                StatusCode::GATEWAY_TIMEOUT,
                "TIMEOUT",
                format!("{stage} did not finish within {secs}s"),
            ),
            AppError::Cancelled => (
                StatusCode::SERVICE_UNAVAILABLE,
                "CANCELLED",
                "The run was cancelled".to_string(),
            ),
            AppError::Io(e) => {
                tracing::error!("I/O error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "IO_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::NotFound("run".into()), StatusCode::NOT_FOUND),
            (AppError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (AppError::ExtractionFailed(ExtractionError::NoJson), StatusCode::UNPROCESSABLE_ENTITY),
            (
                AppError::Provider(ProviderError::RateLimited { retries: 3 }),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (AppError::Provider(ProviderError::EmptyContent), StatusCode::BAD_GATEWAY),
            (
                AppError::Timeout { stage: "provider", secs: 600 },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (AppError::Configuration("key".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[tokio::test]
    async fn test_internal_details_are_redacted() {
        let response = AppError::Configuration("GOOGLE_API_KEY is not set".into()).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "CONFIGURATION_ERROR");
        assert!(!body["error"]["message"].as_str().unwrap().contains("GOOGLE_API_KEY"));
    }
}
