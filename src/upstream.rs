use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::compose::{GenerationParameters, UpstreamPayload};
use crate::models::EncodedImage;

// ── Constants ────────────────────────────────────────────────────────────────

pub const DEFAULT_API_URL: &str =
    "https://dashscope.aliyuncs.com/api/v1/services/aigc/multimodal-generation/generation";
pub const DEFAULT_MODEL: &str = "qwen-vl-plus";
pub const DEFAULT_MAX_TOKENS: u32 = 200;
pub const DEFAULT_TEMPERATURE: f64 = 0.2;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const USER_AGENT: &str = "caption-relay/1.0";

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Upstream timeout")]
    Timeout,
    #[error("{0}")]
    Unavailable(String),
    #[error("Upstream error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Unexpected upstream response format")]
    Malformed,
}

// ── Captioner seam ───────────────────────────────────────────────────────────

/// Anything that can turn a set of images plus instructions into raw text.
#[async_trait]
pub trait UpstreamCaptioner: Send + Sync {
    async fn generate(
        &self,
        images: &[EncodedImage],
        system_prompt: Option<&str>,
        user_prompt: &str,
    ) -> Result<String, UpstreamError>;
}

// ── DashScope client ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct UpstreamSettings {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout: Duration,
}

impl std::fmt::Debug for UpstreamSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamSettings")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .finish()
    }
}

pub struct DashScopeClient {
    settings: UpstreamSettings,
    client: reqwest::Client,
}

impl DashScopeClient {
    pub fn new(settings: UpstreamSettings) -> Result<Self, UpstreamError> {
        let client = reqwest::ClientBuilder::new()
            .timeout(settings.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| UpstreamError::Unavailable(e.to_string()))?;
        Ok(Self { settings, client })
    }

    fn parameters(&self) -> GenerationParameters {
        GenerationParameters {
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        }
    }
}

#[async_trait]
impl UpstreamCaptioner for DashScopeClient {
    async fn generate(
        &self,
        images: &[EncodedImage],
        system_prompt: Option<&str>,
        user_prompt: &str,
    ) -> Result<String, UpstreamError> {
        let payload = UpstreamPayload::new(
            &self.settings.model,
            images,
            system_prompt,
            user_prompt,
            self.parameters(),
        );

        info!(
            images = images.len(),
            model = %self.settings.model,
            has_system = system_prompt.is_some(),
            "sending caption request upstream"
        );

        let response = self
            .client
            .post(&self.settings.api_url)
            .bearer_auth(&self.settings.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    warn!("upstream timed out: {}", e);
                    UpstreamError::Timeout
                } else {
                    warn!("upstream request failed: {}", e);
                    UpstreamError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout
            } else {
                UpstreamError::Unavailable(e.to_string())
            }
        })?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "upstream returned an error");
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = serde_json::from_str(&body).map_err(|_| UpstreamError::Malformed)?;
        parse_caption_envelope(&value)
    }
}

// ── Response envelope ────────────────────────────────────────────────────────

/// Pull `output.choices[0].message.content` out of a response body.
///
/// Content may be a string or a list of blocks; a first block with a `text`
/// field wins, anything else is rendered as its JSON text. A choice with no
/// content yields an empty string, which callers treat as an empty caption.
pub fn parse_caption_envelope(value: &Value) -> Result<String, UpstreamError> {
    let first = value
        .get("output")
        .and_then(|o| o.get("choices"))
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .ok_or(UpstreamError::Malformed)?;

    let content = match first.get("message").and_then(|m| m.get("content")) {
        None | Some(Value::Null) => return Ok(String::new()),
        Some(c) => c,
    };

    if let Some(block_text) = content
        .as_array()
        .and_then(|blocks| blocks.first())
        .and_then(|block| block.get("text"))
    {
        return Ok(value_to_text(block_text));
    }

    Ok(value_to_text(content))
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
