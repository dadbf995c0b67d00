//! Gemini client: generation-time schema enforcement via `responseSchema`.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::assessment::contract::posture_schema;
use crate::llm_client::{
    send_with_retry, ProviderError, ProviderRequest, RequestPart, SchemaEnforcement,
    VisionProvider,
};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
    next_page_token: Option<String>,
}

/// A model advertised by the Gemini API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    response_schema: Value,
}

impl GeminiClient {
    pub fn new(client: Client, api_key: String, model: String) -> Self {
        Self {
            client,
            api_key,
            model,
            response_schema: posture_schema().to_gemini(),
        }
    }

    fn request_body(&self, request: &ProviderRequest) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": request.parts.iter().map(part_json).collect::<Vec<_>>(),
            }],
            "generationConfig": {
                "temperature": 0.0,
                "topK": 1,
                "responseMimeType": "application/json",
                "responseSchema": self.response_schema,
            }
        })
    }

    /// Lists every model visible to this API key, following pagination.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let url = format!("{GEMINI_API_BASE}/models");
            let token = page_token.clone();
            let response = send_with_retry(|| {
                let mut builder = self
                    .client
                    .get(&url)
                    .header("x-goog-api-key", &self.api_key);
                if let Some(token) = &token {
                    builder = builder.query(&[("pageToken", token)]);
                }
                builder
            })
            .await?;

            let page: ListModelsResponse = response.json().await?;
            models.extend(page.models);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(models)
    }
}

fn part_json(part: &RequestPart) -> Value {
    match part {
        RequestPart::Text(text) => json!({ "text": text }),
        RequestPart::Image { mime_type, data } => json!({
            "inline_data": {
                "mime_type": mime_type,
                "data": STANDARD.encode(data),
            }
        }),
    }
}

#[async_trait]
impl VisionProvider for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn enforcement(&self) -> SchemaEnforcement {
        SchemaEnforcement::GenerationTime
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<String, ProviderError> {
        let url = format!("{GEMINI_API_BASE}/models/{}:generateContent", self.model);
        let body = self.request_body(request);

        info!(
            "Sending request to Gemini ({}) with {} image(s)...",
            self.model,
            request.image_count()
        );

        let response = send_with_retry(|| {
            self.client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
        })
        .await?;

        let parsed: GenerateContentResponse = response.json().await?;

        if let Some(usage) = &parsed.usage_metadata {
            debug!(
                "Gemini call succeeded: prompt_tokens={}, candidate_tokens={}",
                usage.prompt_token_count, usage.candidates_token_count
            );
        }

        let text = collect_text(&parsed);
        if text.is_empty() {
            return Err(ProviderError::EmptyContent);
        }
        Ok(text)
    }
}

/// Concatenates the text of every part of every candidate.
fn collect_text(response: &GenerateContentResponse) -> String {
    response
        .candidates
        .iter()
        .filter_map(|c| c.content.as_ref())
        .flat_map(|c| c.parts.iter())
        .filter_map(|p| p.text.as_deref())
        .collect()
}
