//! Vision provider boundary: the single point of entry for all generative-model calls.
//!
//! ARCHITECTURAL RULE: No other module may call Gemini or OpenAI directly.
//! The pipeline only sees `VisionProvider` and receives raw response text; cleaning and
//! parsing that text is the normalizer's job, not the client's.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::config::{Config, ProviderKind};
use crate::errors::AppError;

pub mod gemini;
pub mod openai;
pub mod prompts;

use gemini::GeminiClient;
use openai::OpenAiClient;

const MAX_RETRIES: u32 = 3;
/// Large multimodal requests routinely take minutes; the pipeline deadline still applies.
const HTTP_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("Provider returned empty content")]
    EmptyContent,
}

/// One segment of a multimodal request. Order is significant.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestPart {
    Text(String),
    Image { mime_type: String, data: Bytes },
}

/// Provider-neutral request: prompt text and labelled images, in attachment order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderRequest {
    pub parts: Vec<RequestPart>,
}

impl ProviderRequest {
    pub fn image_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| matches!(p, RequestPart::Image { .. }))
            .count()
    }
}

/// How a provider guarantees the response shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaEnforcement {
    /// The schema is sent with the request and the model is constrained while decoding.
    GenerationTime,
    /// Only syntactically valid JSON is guaranteed; the caller validates the shape.
    PostValidation,
}

#[async_trait]
pub trait VisionProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn model(&self) -> &str;
    fn enforcement(&self) -> SchemaEnforcement;
    /// Sends the request and returns the raw response text, unmodified.
    async fn generate(&self, request: &ProviderRequest) -> Result<String, ProviderError>;
}

/// Builds the configured provider. A missing credential is a configuration error.
pub fn provider_from_config(config: &Config) -> Result<Arc<dyn VisionProvider>, AppError> {
    let client = http_client()?;
    match config.provider {
        ProviderKind::Gemini => {
            let key = config.gemini_api_key.clone().ok_or_else(|| {
                AppError::Configuration("GOOGLE_API_KEY (or GEMINI_API_KEY) is not set".to_string())
            })?;
            Ok(Arc::new(GeminiClient::new(client, key, config.gemini_model.clone())))
        }
        ProviderKind::OpenAi => {
            let key = config
                .openai_api_key
                .clone()
                .ok_or_else(|| AppError::Configuration("OPENAI_API_KEY is not set".to_string()))?;
            Ok(Arc::new(OpenAiClient::new(client, key, config.openai_model.clone())))
        }
    }
}

pub(crate) fn http_client() -> Result<Client, ProviderError> {
    Ok(Client::builder().timeout(HTTP_TIMEOUT).build()?)
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Sends a request built by `make`, retrying on 429 (rate limit) and 5xx errors
/// with exponential backoff. Any other non-success status fails immediately.
pub(crate) async fn send_with_retry<F>(make: F) -> Result<Response, ProviderError>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_error: Option<ProviderError> = None;

    for attempt in 0..MAX_RETRIES {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s
            let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
            warn!(
                "Provider call attempt {} failed, retrying after {}ms...",
                attempt,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }

        let response = match make().send().await {
            Ok(r) => r,
            Err(e) => {
                last_error = Some(ProviderError::Http(e));
                continue;
            }
        };

        let status = response.status();

        if status.as_u16() == 429 || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            warn!("Provider API returned {}: {}", status, body);
            last_error = Some(ProviderError::Api {
                status: status.as_u16(),
                message: body,
            });
            continue;
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: api_error_message(body),
            });
        }

        return Ok(response);
    }

    Err(last_error.unwrap_or(ProviderError::RateLimited {
        retries: MAX_RETRIES,
    }))
}

/// Both providers wrap errors as `{"error": {"message": ...}}`; fall back to the raw body.
fn api_error_message(body: String) -> String {
    serde_json::from_str::<ApiErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_message_extracts_nested_message() {
        let body = r#"{"error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}}"#;
        assert_eq!(api_error_message(body.to_string()), "API key not valid");
    }

    #[test]
    fn test_api_error_message_falls_back_to_body() {
        assert_eq!(api_error_message("Bad Gateway".to_string()), "Bad Gateway");
    }

    #[test]
    fn test_image_count() {
        let request = ProviderRequest {
            parts: vec![
                RequestPart::Text("prompt".to_string()),
                RequestPart::Text("[Front View]".to_string()),
                RequestPart::Image {
                    mime_type: "image/jpeg".to_string(),
                    data: Bytes::from_static(b"jpeg"),
                },
            ],
        };
        assert_eq!(request.image_count(), 1);
    }
}
