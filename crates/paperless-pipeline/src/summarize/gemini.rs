//! Google Gemini `generateContent` client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{Summarizer, SummarizerError};
use crate::config::{optional, parse_or, require, ConfigResult};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_TIMEOUT_SECS: u64 = 60;

const PROMPT_PREFIX: &str = "Summarize the following document:\n";

#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    /// Model name, e.g. "gemini-2.5-flash"
    pub model: String,
    /// Base endpoint URL, without the `/models/...` suffix
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
            timeout_secs: DEFAULT_GEMINI_TIMEOUT_SECS,
        }
    }

    /// `GEMINI_API_KEY` is required.
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            api_key: require("GEMINI_API_KEY")?,
            model: optional("GEMINI_MODEL", DEFAULT_GEMINI_MODEL),
            endpoint: optional("GEMINI_ENDPOINT", DEFAULT_GEMINI_ENDPOINT),
            timeout_secs: parse_or("GEMINI_TIMEOUT_SECS", DEFAULT_GEMINI_TIMEOUT_SECS)?,
        })
    }
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

pub struct GeminiSummarizer {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiSummarizer {
    pub fn new(config: GeminiConfig) -> Result<Self, SummarizerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SummarizerError::Http(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn build_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }
}

// Gemini API request/response structures

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Debug, Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl Summarizer for GeminiSummarizer {
    #[instrument(skip(self, text), fields(model = %self.config.model, chars = text.len()))]
    async fn summarize(&self, text: &str) -> Result<String, SummarizerError> {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: format!("{}{}", PROMPT_PREFIX, text),
                }],
            }],
        };

        let response = self
            .client
            .post(self.build_url())
            .query(&[("key", self.config.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| SummarizerError::Http(e.without_url().to_string()))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| SummarizerError::Http(e.without_url().to_string()))?;

        if !status.is_success() {
            return Err(SummarizerError::Status {
                status: status.as_u16(),
                body: raw,
            });
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&raw).map_err(|e| SummarizerError::Decode(e.to_string()))?;

        if let Some(error) = parsed.error {
            return Err(SummarizerError::Api(error.message));
        }

        let summary = parsed
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .unwrap_or_default();

        if summary.trim().is_empty() {
            return Err(SummarizerError::Empty);
        }

        debug!(summary_chars = summary.chars().count(), "Received candidate summary");
        Ok(summary)
    }
}
