use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const MAX_OUTPUT_TOKENS: u32 = 800;
pub const TEMPERATURE: f32 = 0.8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("the answer generator is not configured; set VIAJE_GEMINI_API_KEY")]
    Unconfigured,
    #[error("the Gemini API quota is exhausted; check the plan attached to the API key")]
    QuotaExceeded,
    #[error("the Gemini API key is not valid")]
    InvalidApiKey,
    #[error("too many requests to the answer backend; wait a moment and try again")]
    RateLimited,
    #[error("answer backend returned status {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("answer backend request failed: {0}")]
    Transport(String),
    #[error("answer backend returned no text")]
    EmptyReply,
}

impl GenerationError {
    /// Maps a non-success upstream response to the closest user-facing failure.
    pub fn from_upstream(status: u16, body: &str) -> Self {
        let lowered = body.to_lowercase();

        if lowered.contains("quota") {
            Self::QuotaExceeded
        } else if body.contains("API_KEY_INVALID")
            || lowered.contains("invalid_api_key")
            || lowered.contains("api key not valid")
            || lowered.contains("authentication")
        {
            Self::InvalidApiKey
        } else if status == StatusCode::TOO_MANY_REQUESTS.as_u16()
            || body.contains("RESOURCE_EXHAUSTED")
            || lowered.contains("rate_limit")
        {
            Self::RateLimited
        } else {
            Self::Upstream {
                status,
                body: body.chars().take(300).collect(),
            }
        }
    }
}

pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_endpoint: String,
    pub static_answer: Option<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
            static_answer: None,
        }
    }
}

impl GeneratorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            gemini_api_key: non_empty_env("VIAJE_GEMINI_API_KEY"),
            gemini_model: non_empty_env("VIAJE_GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_endpoint: non_empty_env("VIAJE_GEMINI_ENDPOINT")
                .unwrap_or(defaults.gemini_endpoint),
            static_answer: non_empty_env("VIAJE_STATIC_ANSWER"),
        }
    }
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Clone)]
pub struct GeminiGenerator {
    http_client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl GeminiGenerator {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            http_client: Client::builder()
                .connect_timeout(Duration::from_secs(6))
                .timeout(Duration::from_secs(30))
                .build()
                .context("failed to build HTTP client")?,
            api_key: api_key.into(),
            model: model.into(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

fn generation_payload(prompt: &str) -> Value {
    serde_json::json!({
        "contents": [
            {
                "role": "user",
                "parts": [ { "text": prompt } ]
            }
        ],
        "generationConfig": {
            "maxOutputTokens": MAX_OUTPUT_TOKENS,
            "temperature": TEMPERATURE
        }
    })
}

/// Joins the text parts of the first candidate.
pub fn extract_candidate_text(body: &Value) -> Option<String> {
    let parts = body
        .get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()?;

    let text = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<String>();

    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

impl AnswerGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let response = self
            .http_client
            .post(self.request_url())
            .header("x-goog-api-key", self.api_key.as_str())
            .json(&generation_payload(prompt))
            .send()
            .await
            .map_err(|err| GenerationError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "gemini returned non-success status");
            return Err(GenerationError::from_upstream(status.as_u16(), &body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| GenerationError::Transport(err.to_string()))?;
        extract_candidate_text(&body).ok_or(GenerationError::EmptyReply)
    }
}

/// Replies with the same text every time; for offline runs and tests.
#[derive(Debug, Clone)]
pub struct StaticGenerator {
    answer: String,
}

impl StaticGenerator {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
        }
    }
}

impl AnswerGenerator for StaticGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        Ok(self.answer.clone())
    }
}

#[derive(Debug, Clone)]
pub enum Generator {
    Gemini(GeminiGenerator),
    Static(StaticGenerator),
    Unconfigured,
}

impl Generator {
    /// A Gemini key wins over a static answer; neither leaves the generator unconfigured.
    pub fn from_config(config: &GeneratorConfig) -> Result<Self> {
        if let Some(api_key) = config.gemini_api_key.as_deref() {
            let gemini =
                GeminiGenerator::new(api_key, &config.gemini_model, &config.gemini_endpoint)?;
            return Ok(Self::Gemini(gemini));
        }

        Ok(match config.static_answer.as_deref() {
            Some(answer) => Self::Static(StaticGenerator::new(answer)),
            None => Self::Unconfigured,
        })
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Generator::Gemini(_) => "gemini",
            Generator::Static(_) => "static",
            Generator::Unconfigured => "unconfigured",
        }
    }

    pub fn is_configured(&self) -> bool {
        !matches!(self, Generator::Unconfigured)
    }
}

impl AnswerGenerator for Generator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        match self {
            Generator::Gemini(generator) => generator.generate(prompt).await,
            Generator::Static(generator) => generator.generate(prompt).await,
            Generator::Unconfigured => Err(GenerationError::Unconfigured),
        }
    }
}
