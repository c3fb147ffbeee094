//! Outbound provider contracts used by the scene pipeline.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::GatewayError;

/// One image synthesis call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageGenerationRequest<'a> {
    pub prompt: &'a str,
    pub size: &'a str,
    pub seed: Option<i64>,
    /// Ask for base64 bytes instead of a hosted URL. Ignored for large sizes.
    pub want_inline: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImageResult {
    pub url: Option<String>,
    pub base64: Option<String>,
    pub revised_prompt: Option<String>,
    pub response_time_ms: u64,
    pub prompt_tokens: Option<u32>,
    pub cost_usd: Option<f64>,
}

#[async_trait]
pub trait ImageGenerationGateway: Send + Sync {
    async fn generate(
        &self,
        request: ImageGenerationRequest<'_>,
    ) -> Result<ImageResult, GatewayError>;
}

/// System + user prompt in, trimmed assistant text out.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, GatewayError>;
}
