use async_trait::async_trait;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::GeneratorConfig;
use crate::error::AppError;

use super::{CompletionClient, GenerationError};

// ============================================================================
// Wire types (OpenAI-compatible chat completions + images)
// ============================================================================

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
}

#[derive(Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    #[serde(default)]
    b64_json: Option<String>,
}

const SYSTEM_PROMPT: &str = "You are a product ideation assistant. \
Always answer with valid JSON only, no commentary.";

// ============================================================================
// OpenAiCompatClient
// ============================================================================

/// `CompletionClient` for any OpenAI-compatible HTTP API.
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    chat_url: Url,
    images_url: Url,
    api_key: String,
    model: String,
    image_model: String,
    temperature: f32,
}

impl OpenAiCompatClient {
    pub fn from_config(config: &GeneratorConfig) -> Result<Self, AppError> {
        let api_key = config.api_key()?;
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base)
            .map_err(|e| AppError::Config(format!("invalid generator base_url: {e}")))?;
        let join = |path: &str| {
            base.join(path)
                .map_err(|e| AppError::Config(format!("invalid generator endpoint {path}: {e}")))
        };

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            chat_url: join("chat/completions")?,
            images_url: join("images/generations")?,
            api_key,
            model: config.model.clone(),
            image_model: config.image_model.clone(),
            temperature: config.temperature,
        })
    }

    /// Send a request and decode the JSON body, classifying failures by
    /// HTTP status.
    async fn send_json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, GenerationError> {
        let response = req
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(transport_err)?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::RateLimited(format!(
                "HTTP {status}: {}",
                truncate(&body, 300)
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Provider(format!(
                "HTTP {status}: {}",
                truncate(&body, 300)
            )));
        }

        response.json::<T>().await.map_err(transport_err)
    }
}

fn transport_err(e: reqwest::Error) -> GenerationError {
    GenerationError::Provider(e.to_string())
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[async_trait]
impl CompletionClient for OpenAiCompatClient {
    async fn complete(&self, category: &str, prompt: &str) -> Result<String, GenerationError> {
        tracing::debug!(category, model = %self.model, prompt_len = prompt.len(), "chat completion request");
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
        };

        let response: ChatResponse = self
            .send_json(self.http.post(self.chat_url.clone()).json(&body))
            .await?;

        response
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(GenerationError::EmptyResponse)
    }

    async fn generate_image(&self, prompt: &str) -> Result<Option<Vec<u8>>, GenerationError> {
        tracing::debug!(model = %self.image_model, "image generation request");
        let body = ImageRequest {
            model: &self.image_model,
            prompt,
            n: 1,
            size: "1024x1024",
        };

        let response: ImageResponse = self
            .send_json(self.http.post(self.images_url.clone()).json(&body))
            .await?;

        let Some(encoded) = response.data.into_iter().find_map(|d| d.b64_json) else {
            return Ok(None);
        };
        base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map(Some)
            .map_err(|e| GenerationError::Provider(format!("invalid image payload: {e}")))
    }
}
