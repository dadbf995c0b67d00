//! OpenAI chat-completions client. JSON mode only guarantees well-formed JSON, so the
//! contract is sent as an instruction and the pipeline validates the result afterward.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::assessment::contract::posture_schema;
use crate::llm_client::prompts::schema_instruction;
use crate::llm_client::{
    send_with_retry, ProviderError, ProviderRequest, RequestPart, SchemaEnforcement,
    VisionProvider,
};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    model: String,
    instruction: String,
}

impl OpenAiClient {
    pub fn new(client: Client, api_key: String, model: String) -> Self {
        Self {
            client,
            api_key,
            model,
            instruction: schema_instruction(&posture_schema().to_json_schema()),
        }
    }

    fn request_body(&self, request: &ProviderRequest) -> Value {
        let mut content: Vec<Value> = request.parts.iter().map(part_json).collect();
        content.push(json!({ "type": "text", "text": self.instruction }));

        json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": content }],
            "temperature": 0.0,
            "response_format": { "type": "json_object" },
        })
    }
}

fn part_json(part: &RequestPart) -> Value {
    match part {
        RequestPart::Text(text) => json!({ "type": "text", "text": text }),
        RequestPart::Image { mime_type, data } => json!({
            "type": "image_url",
            "image_url": {
                "url": format!("data:{mime_type};base64,{}", STANDARD.encode(data)),
                "detail": "auto",
            }
        }),
    }
}

#[async_trait]
impl VisionProvider for OpenAiClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn enforcement(&self) -> SchemaEnforcement {
        SchemaEnforcement::PostValidation
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<String, ProviderError> {
        let body = self.request_body(request);

        info!(
            "Sending request to OpenAI ({}) with {} image(s)...",
            self.model,
            request.image_count()
        );

        let response = send_with_retry(|| {
            self.client
                .post(OPENAI_API_URL)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;

        let parsed: ChatCompletionResponse = response.json().await?;

        if let Some(usage) = &parsed.usage {
            debug!(
                "OpenAI call succeeded: prompt_tokens={}, completion_tokens={}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        first_choice_text(parsed).ok_or(ProviderError::EmptyContent)
    }
}

fn first_choice_text(response: ChatCompletionResponse) -> Option<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|text| !text.is_empty())
}
