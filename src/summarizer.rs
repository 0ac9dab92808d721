use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Provider, SummarizerConfig};
use crate::text::{fallback_summary, truncate_chars};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

pub const GEMINI_DEFAULT_MODEL: &str = "gemini-2.0-flash-lite";
pub const GROQ_DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

const CHAT_SYSTEM_PROMPT: &str = "తెలుగులో చాలా చిన్న, క్లియర్ short news summary ఇవ్వు. \
Clickbait లేకుండా, single paragraph లో.";

#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("HTTP request failed: {0}")]
    Request(reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("provider response contained no summary text")]
    EmptyResponse,

    #[error("summarizer is not configured: {0}")]
    Unconfigured(String),
}

impl From<reqwest::Error> for SummarizeError {
    // Request URLs can carry credentials, keep them out of logs
    fn from(err: reqwest::Error) -> Self {
        SummarizeError::Request(err.without_url())
    }
}

/// A provider that turns an article into a short Telugu summary
#[async_trait]
pub trait Summarizer: Send + Sync {
    fn name(&self) -> &str;

    async fn summarize(&self, title: &str, content: &str) -> Result<String, SummarizeError>;
}

/// Prompt sent to providers that take a single text input
pub fn build_prompt(title: &str, content: &str) -> String {
    format!(
        "Summarize the following Telugu article in 250-300 Telugu characters, \
         neutral tone, no clickbait.\n\nTITLE: {}\n\nCONTENT:\n{}",
        title.trim(),
        content.trim()
    )
}

/// Summarize with `summarizer`, falling back to trimmed article text on any failure
pub async fn summarize_or_fallback(
    summarizer: &dyn Summarizer,
    title: &str,
    content: &str,
    max_chars: usize,
) -> String {
    match summarizer.summarize(title, content).await {
        Ok(summary) if !summary.trim().is_empty() => truncate_chars(summary.trim(), max_chars),
        Ok(_) => {
            warn!("{} returned an empty summary for '{}'", summarizer.name(), title);
            fallback_summary(title, content, max_chars)
        }
        Err(e) => {
            warn!("{} summarize failed for '{}': {}", summarizer.name(), title, e);
            fallback_summary(title, content, max_chars)
        }
    }
}

/// Offline summarizer: the trimmed article text is the summary
pub struct TrimSummarizer {
    max_chars: usize,
}

impl TrimSummarizer {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

#[async_trait]
impl Summarizer for TrimSummarizer {
    fn name(&self) -> &str {
        "trim"
    }

    async fn summarize(&self, title: &str, content: &str) -> Result<String, SummarizeError> {
        Ok(fallback_summary(title, content, self.max_chars))
    }
}

pub struct GeminiSummarizer {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    max_output_tokens: u32,
    temperature: f32,
}

impl GeminiSummarizer {
    pub fn new(client: Client, base_url: &str, model: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.trim_start_matches("models/").to_string(),
            api_key: api_key.to_string(),
            max_output_tokens: 256,
            temperature: 0.2,
        }
    }

    pub fn with_generation(mut self, max_output_tokens: u32, temperature: f32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self.temperature = temperature;
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    /// Pull the summary text out of a generateContent response.
    ///
    /// Older API revisions and proxies return slightly different shapes, so this
    /// checks the documented path first and then a few known alternatives.
    pub fn extract_text(response: &Value) -> Option<String> {
        let candidate = response
            .get("candidates")
            .or_else(|| response.get("outputs"))
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first());

        if let Some(candidate) = candidate {
            let parts_text: String = candidate
                .pointer("/content/parts")
                .and_then(Value::as_array)
                .map(|parts| {
                    parts
                        .iter()
                        .filter_map(|part| part.get("text").and_then(Value::as_str))
                        .collect()
                })
                .unwrap_or_default();
            if !parts_text.trim().is_empty() {
                return Some(parts_text.trim().to_string());
            }

            for key in ["output", "text", "content"] {
                if let Some(text) = candidate.get(key).and_then(Value::as_str) {
                    if !text.trim().is_empty() {
                        return Some(text.trim().to_string());
                    }
                }
            }
        }

        ["output_text", "output"]
            .iter()
            .filter_map(|key| response.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .find(|text| !text.is_empty())
            .map(str::to_string)
    }
}

#[async_trait]
impl Summarizer for GeminiSummarizer {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn summarize(&self, title: &str, content: &str) -> Result<String, SummarizeError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": build_prompt(title, content) }] }],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_output_tokens,
            },
        });

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.as_str())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SummarizeError::Status {
                status,
                body: truncate_chars(&body, 200),
            });
        }

        let json: Value = response.json().await?;
        debug!("gemini response: {}", json);
        Self::extract_text(&json).ok_or(SummarizeError::EmptyResponse)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completions, used for both Groq and OpenAI
pub struct ChatCompletionsSummarizer {
    name: String,
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
}

impl ChatCompletionsSummarizer {
    pub fn new(name: &str, client: Client, base_url: &str, model: &str, api_key: &str) -> Self {
        Self {
            name: name.to_string(),
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            max_tokens: 256,
            temperature: 0.3,
        }
    }

    pub fn with_generation(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl Summarizer for ChatCompletionsSummarizer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn summarize(&self, title: &str, content: &str) -> Result<String, SummarizeError> {
        let article = format!("{}\n\n{}", title.trim(), content.trim());
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: CHAT_SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: article.trim(),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SummarizeError::Status {
                status,
                body: truncate_chars(&body, 200),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(SummarizeError::EmptyResponse)
    }
}

/// Build the configured summarizer. Providers without an API key degrade to trimming.
pub fn build_summarizer(config: &SummarizerConfig) -> anyhow::Result<Arc<dyn Summarizer>> {
    let trim = || -> Arc<dyn Summarizer> { Arc::new(TrimSummarizer::new(config.summary_chars)) };

    if config.provider == Provider::None {
        info!("No summarizer provider configured, using trimmed article text");
        return Ok(trim());
    }

    let Some(api_key) = config.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
        warn!(
            "{:?} summarizer has no API key, using trimmed article text",
            config.provider
        );
        return Ok(trim());
    };

    let client = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let summarizer: Arc<dyn Summarizer> = match config.provider {
        Provider::Gemini => Arc::new(
            GeminiSummarizer::new(
                client,
                config.base_url.as_deref().unwrap_or(GEMINI_BASE_URL),
                config.model.as_deref().unwrap_or(GEMINI_DEFAULT_MODEL),
                api_key,
            )
            .with_generation(config.max_output_tokens, config.temperature),
        ),
        Provider::Groq => Arc::new(
            ChatCompletionsSummarizer::new(
                "groq",
                client,
                config.base_url.as_deref().unwrap_or(GROQ_BASE_URL),
                config.model.as_deref().unwrap_or(GROQ_DEFAULT_MODEL),
                api_key,
            )
            .with_generation(config.max_output_tokens, config.temperature),
        ),
        Provider::Openai => Arc::new(
            ChatCompletionsSummarizer::new(
                "openai",
                client,
                config.base_url.as_deref().unwrap_or(OPENAI_BASE_URL),
                config.model.as_deref().unwrap_or(OPENAI_DEFAULT_MODEL),
                api_key,
            )
            .with_generation(config.max_output_tokens, config.temperature),
        ),
        Provider::None => trim(),
    };

    info!("Using {} summarizer", summarizer.name());
    Ok(summarizer)
}
