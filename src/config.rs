use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use crate::scene::validation;
use crate::url_validation::validate_http_url;

/// OpenAI-compatible provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAiConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default = "default_image_model")]
    pub image_model: String,

    /// Hard timeout for prompt-crafting calls, retries included
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Hard timeout for image synthesis, retries included
    #[serde(default = "default_image_timeout_secs")]
    pub image_timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_chat_retry_base_delay_ms")]
    pub chat_retry_base_delay_ms: u64,

    #[serde(default = "default_image_retry_base_delay_ms")]
    pub image_retry_base_delay_ms: u64,

    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o".to_string()
}

fn default_image_model() -> String {
    "gpt-image-1".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_image_timeout_secs() -> u64 {
    90
}

fn default_max_retries() -> u32 {
    3
}

fn default_chat_retry_base_delay_ms() -> u64 {
    1_000
}

fn default_image_retry_base_delay_ms() -> u64 {
    2_000
}

fn default_max_retry_delay_ms() -> u64 {
    30_000
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            image_model: default_image_model(),
            timeout_secs: default_timeout_secs(),
            image_timeout_secs: default_image_timeout_secs(),
            max_retries: default_max_retries(),
            chat_retry_base_delay_ms: default_chat_retry_base_delay_ms(),
            image_retry_base_delay_ms: default_image_retry_base_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
        }
    }
}

impl OpenAiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

fn default_requests_per_minute() -> u32 {
    10
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

/// Request bounds and defaults for scene generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneImageConfig {
    #[serde(default = "default_size")]
    pub default_size: String,

    #[serde(default = "default_min_text_length")]
    pub min_text_length: usize,

    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

fn default_size() -> String {
    "2048x1024".to_string()
}

fn default_min_text_length() -> usize {
    15
}

fn default_max_text_length() -> usize {
    2000
}

impl Default for SceneImageConfig {
    fn default() -> Self {
        Self {
            default_size: default_size(),
            min_text_length: default_min_text_length(),
            max_text_length: default_max_text_length(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Service configuration: JSON file first, environment variables on top
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Where generation records live; falls back to the platform cache dir
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// JSON seed for the book / reading-club catalog
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,

    #[serde(default)]
    pub openai: OpenAiConfig,

    #[serde(default)]
    pub scene_image: SceneImageConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cache_dir: None,
            catalog_path: None,
            openai: OpenAiConfig::default(),
            scene_image: SceneImageConfig::default(),
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> anyhow::Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|err| anyhow::anyhow!("invalid value for {name}: {err}")),
        None => Ok(None),
    }
}

impl Config {
    pub fn default_config_path() -> &'static str {
        "config.json"
    }

    /// Reads the JSON file at `path`; a missing file yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// File (if any), then environment overrides, then validation.
    pub fn from_env() -> anyhow::Result<Self> {
        let path = env_string("CONFIG_PATH")
            .unwrap_or_else(|| Self::default_config_path().to_string());
        let mut config = Self::load(&path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Some(host) = env_string("HOST") {
            self.host = host;
        }
        if let Some(port) = env_parse("PORT")? {
            self.port = port;
        }
        if let Some(dir) = env_string("CACHE_DIR") {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(path) = env_string("CATALOG_PATH") {
            self.catalog_path = Some(PathBuf::from(path));
        }

        let openai = &mut self.openai;
        if let Some(key) = env_string("OPENAI_API_KEY") {
            openai.api_key = Some(key);
        }
        if let Some(url) = env_string("OPENAI_BASE_URL") {
            openai.base_url = url;
        }
        if let Some(model) = env_string("OPENAI_CHAT_MODEL") {
            openai.chat_model = model;
        }
        if let Some(model) = env_string("OPENAI_IMAGE_MODEL") {
            openai.image_model = model;
        }
        if let Some(secs) = env_parse("OPENAI_TIMEOUT_SECS")? {
            openai.timeout_secs = secs;
        }
        if let Some(secs) = env_parse("OPENAI_IMAGE_TIMEOUT_SECS")? {
            openai.image_timeout_secs = secs;
        }
        if let Some(retries) = env_parse("OPENAI_MAX_RETRIES")? {
            openai.max_retries = retries;
        }

        let scene = &mut self.scene_image;
        if let Some(size) = env_string("SCENE_IMAGE_DEFAULT_SIZE") {
            scene.default_size = size;
        }
        if let Some(min) = env_parse("SCENE_IMAGE_MIN_TEXT_LENGTH")? {
            scene.min_text_length = min;
        }
        if let Some(max) = env_parse("SCENE_IMAGE_MAX_TEXT_LENGTH")? {
            scene.max_text_length = max;
        }
        if let Some(rpm) = env_parse("SCENE_IMAGE_REQUESTS_PER_MINUTE")? {
            scene.rate_limit.requests_per_minute = rpm;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let scene = &self.scene_image;
        if scene.min_text_length == 0 || scene.min_text_length > scene.max_text_length {
            bail!(
                "text length bounds must satisfy 0 < min <= max (got {}..={})",
                scene.min_text_length,
                scene.max_text_length
            );
        }
        validation::validate_size(&scene.default_size)
            .with_context(|| format!("default size {} is not usable", scene.default_size))?;
        if scene.rate_limit.requests_per_minute == 0 {
            bail!("requestsPerMinute must be greater than zero");
        }
        validate_http_url(&self.openai.base_url).context("invalid OpenAI base URL")?;
        if self.openai.image_timeout_secs == 0 || self.openai.timeout_secs == 0 {
            bail!("provider timeouts must be greater than zero");
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn resolve_cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.cache_dir {
            return dir.clone();
        }
        let mut base = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
        base.push("scene-image-service");
        base
    }
}
