use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::{Instant, timeout};

use crate::config::OpenAiConfig;
use crate::error::GatewayError;
use crate::gateway::{ChatCompletion, ImageGenerationGateway, ImageGenerationRequest, ImageResult};
use crate::http_client::build_client;
use crate::retry::{RetryPolicy, with_retry};
use crate::scene::validation::is_large_size;
use crate::url_validation::validate_http_url;

const CHAT_MAX_TOKENS: u32 = 500;
const CHAT_TEMPERATURE: f64 = 0.7;
const IMAGE_QUALITY: &str = "standard";
const IMAGE_STYLE: &str = "vivid";

const RESPONSE_FORMAT_URL: &str = "url";
const RESPONSE_FORMAT_BASE64: &str = "b64_json";

async fn assert_ok_response(
    response: reqwest::Response,
) -> Result<reqwest::Response, GatewayError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(GatewayError::Status { status, body })
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Option<Vec<ChatChoice>>,
    error: Option<ProviderError>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageGenerationResponse {
    #[serde(default)]
    data: Vec<ImageData>,
    usage: Option<ImageUsage>,
    error: Option<ProviderError>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
    b64_json: Option<String>,
    revised_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageUsage {
    input_tokens: Option<u32>,
}

/// Rough list price per image, used for telemetry only.
pub fn estimate_cost_usd(size: &str) -> Option<f64> {
    match size {
        "1024x512" => Some(0.04),
        "2048x1024" => Some(0.08),
        "4096x2048" => Some(0.12),
        _ => None,
    }
}

/// Response format actually requested from the provider.
pub fn resolve_response_format(size: &str, want_inline: bool) -> &'static str {
    if want_inline && !is_large_size(size) {
        RESPONSE_FORMAT_BASE64
    } else {
        RESPONSE_FORMAT_URL
    }
}

fn parse_payload<T: for<'de> Deserialize<'de>>(text: &str, what: &str) -> Result<T, GatewayError> {
    serde_json::from_str(text)
        .map_err(|err| {
            GatewayError::InvalidPayload(format!("failed to parse {what} response: {err}"))
        })
}

/// Client for an OpenAI-compatible `/chat/completions` + `/images/generations` API.
pub struct OpenAiClient {
    client: Client,
    config: OpenAiConfig,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> anyhow::Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow!("missing OPENAI_API_KEY"))?;
        let client = build_client(config.image_timeout())?;
        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn chat_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.config.max_retries,
            Duration::from_millis(self.config.chat_retry_base_delay_ms),
            Duration::from_millis(self.config.max_retry_delay_ms),
        )
    }

    fn image_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.config.max_retries,
            Duration::from_millis(self.config.image_retry_base_delay_ms),
            Duration::from_millis(self.config.max_retry_delay_ms),
        )
    }

    async fn post_json(
        &self,
        path: &str,
        body: &Value,
        request_timeout: Duration,
    ) -> Result<String, GatewayError> {
        let response = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(&self.api_key)
            .timeout(request_timeout)
            .json(body)
            .send()
            .await?;
        let response = assert_ok_response(response).await?;
        Ok(response.text().await?)
    }

    async fn send_chat_once(&self, body: &Value) -> Result<String, GatewayError> {
        let text = self.post_json("chat/completions", body, self.config.timeout()).await?;
        let payload: ChatCompletionResponse = parse_payload(&text, "chat completion")?;
        if let Some(message) = payload.error.and_then(|err| err.message) {
            return Err(GatewayError::InvalidPayload(message));
        }
        let content = payload
            .choices
            .and_then(|choices| choices.into_iter().next())
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(GatewayError::EmptyResponse)?;
        Ok(content)
    }

    async fn send_image_once(&self, body: &Value) -> Result<ImageGenerationResponse, GatewayError> {
        let text = self
            .post_json("images/generations", body, self.config.image_timeout())
            .await?;
        tracing::debug!(bytes = text.len(), "image generation response received");
        let payload: ImageGenerationResponse = parse_payload(&text, "image generation")?;
        if let Some(message) = payload.error.as_ref().and_then(|err| err.message.clone()) {
            return Err(GatewayError::InvalidPayload(message));
        }
        Ok(payload)
    }
}

#[async_trait]
impl ChatCompletion for OpenAiClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, GatewayError> {
        tracing::debug!(model = %self.config.chat_model, "crafting prompt with chat model");
        let body = json!({
            "model": self.config.chat_model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt}
            ],
            "max_tokens": CHAT_MAX_TOKENS,
            "temperature": CHAT_TEMPERATURE,
        });

        let started = Instant::now();
        let hard_timeout = self.config.timeout();
        let policy = self.chat_retry_policy();
        let content = timeout(
            hard_timeout,
            with_retry(&policy, "chat_completion", || self.send_chat_once(&body)),
        )
        .await
        .map_err(|_| GatewayError::Timeout(hard_timeout))??;

        tracing::debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            chars = content.chars().count(),
            "prompt crafting completed"
        );
        Ok(content)
    }
}

#[async_trait]
impl ImageGenerationGateway for OpenAiClient {
    async fn generate(
        &self,
        request: ImageGenerationRequest<'_>,
    ) -> Result<ImageResult, GatewayError> {
        let response_format = resolve_response_format(request.size, request.want_inline);
        let inline = response_format == RESPONSE_FORMAT_BASE64;
        if request.want_inline && !inline {
            tracing::warn!(
                size = request.size,
                "inline data requested for a large size, falling back to url mode"
            );
        }
        if let Some(seed) = request.seed {
            tracing::debug!(seed, "seed is recorded but not forwarded to the images endpoint");
        }

        let body = json!({
            "model": self.config.image_model,
            "prompt": request.prompt,
            "n": 1,
            "size": request.size,
            "quality": IMAGE_QUALITY,
            "style": IMAGE_STYLE,
            "response_format": response_format,
        });
        tracing::debug!(
            model = %self.config.image_model,
            size = request.size,
            response_format,
            "generating image"
        );

        let started = Instant::now();
        let hard_timeout = self.config.image_timeout();
        let policy = self.image_retry_policy();
        let payload = timeout(
            hard_timeout,
            with_retry(&policy, "image_generation", || self.send_image_once(&body)),
        )
        .await
        .map_err(|_| GatewayError::Timeout(hard_timeout))??;
        let response_time_ms = started.elapsed().as_millis() as u64;

        let prompt_tokens = payload.usage.and_then(|usage| usage.input_tokens);
        let data = payload.data.into_iter().next().ok_or(GatewayError::EmptyResponse)?;

        let base64 = if inline { data.b64_json } else { None };
        if let Some(encoded) = base64.as_deref() {
            let bytes = BASE64
                .decode(encoded)
                .map_err(|err| {
                    GatewayError::InvalidPayload(format!("inline image is not valid base64: {err}"))
                })?;
            tracing::debug!(bytes = bytes.len(), "inline image decoded");
        }
        let url = match data.url {
            Some(raw) => Some(
                validate_http_url(&raw)
                    .map_err(|err| GatewayError::InvalidPayload(err.to_string()))?
                    .to_string(),
            ),
            None => None,
        };
        if url.is_none() && base64.is_none() {
            return Err(GatewayError::EmptyResponse);
        }

        tracing::info!(response_time_ms, size = request.size, inline, "image generation completed");
        Ok(ImageResult {
            url,
            base64,
            revised_prompt: data.revised_prompt,
            response_time_ms,
            prompt_tokens,
            cost_usd: estimate_cost_usd(request.size),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_large_size_never_requests_inline_data() {
        assert_eq!(resolve_response_format("4096x2048", true), "url");
        assert_eq!(resolve_response_format("2048x1024", true), "b64_json");
        assert_eq!(resolve_response_format("2048x1024", false), "url");
    }

    #[test]
    fn test_client_requires_api_key() {
        assert!(OpenAiClient::new(OpenAiConfig::default()).is_err());
        let config = OpenAiConfig {
            api_key: Some("sk-test".to_string()),
            ..OpenAiConfig::default()
        };
        assert!(OpenAiClient::new(config).is_ok());
    }

    #[test]
    fn test_cost_estimate_table() {
        assert_eq!(estimate_cost_usd("2048x1024"), Some(0.08));
        assert_eq!(estimate_cost_usd("800x600"), None);
    }
}
