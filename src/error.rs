//! Error taxonomy for scene image generation.
//!
//! Callers can tell "fix your input" (`InvalidArgument`, `InvalidSize`,
//! `NotFound`) apart from "try again later" (`GenerationFailed`).

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SceneImageError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid size: {0}")]
    InvalidSize(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("scene image generation failed: {0}")]
    GenerationFailed(String),
}

impl SceneImageError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn invalid_size(message: impl Into<String>) -> Self {
        Self::InvalidSize(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn generation_failed(message: impl Into<String>) -> Self {
        Self::GenerationFailed(message.into())
    }

    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::GenerationFailed(_))
    }
}

/// Failure talking to the prompt-crafting or image-synthesis provider.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider returned an empty response")]
    EmptyResponse,

    #[error("provider returned an invalid payload: {0}")]
    InvalidPayload(String),
}

impl GatewayError {
    /// 429 and 5xx gateway statuses, plus connection-level hiccups.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            Self::Transport(err) => err.is_timeout() || err.is_connect(),
            Self::Timeout(_) | Self::EmptyResponse | Self::InvalidPayload(_) => false,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("rate limit exceeded, retry after {}s", retry_after.as_secs())]
pub struct RateLimitExceeded {
    pub retry_after: Duration,
}
