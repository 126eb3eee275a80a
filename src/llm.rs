//! Chat-completion backends.
//!
//! - **[`OpenAIChat`]**: `POST /v1/chat/completions`, requires `OPENAI_API_KEY`.
//! - **[`OllamaChat`]**: `POST /api/chat` on a local Ollama instance.
//!
//! Both are non-streaming and share the retry policy in [`crate::retry`].

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::json;

use crate::config::LlmConfig;
use crate::models::ChatMessage;
use crate::retry;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// A model that answers a conversation with one assistant message.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

pub struct OpenAIChat {
    model: String,
    base_url: String,
    api_key: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIChat {
    /// Fails when `OPENAI_API_KEY` is not set.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            bail!("OPENAI_API_KEY is empty");
        }
        Ok(Self {
            model: config.model.clone(),
            base_url: base_url(config.url.as_deref(), OPENAI_BASE_URL),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            client: retry::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl CompletionModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "stream": false,
        });
        if let (Some(obj), Some(max)) = (body.as_object_mut(), self.max_tokens) {
            obj.insert("max_tokens".to_string(), json!(max));
        }

        let payload = retry::post_json(
            &self.client,
            &format!("{}/v1/chat/completions", self.base_url),
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))
    }
}

pub struct OllamaChat {
    model: String,
    base_url: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            base_url: base_url(config.url.as_deref(), OLLAMA_BASE_URL),
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: retry::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl CompletionModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "options": { "temperature": self.temperature },
        });

        let payload = retry::post_json(
            &self.client,
            &format!("{}/api/chat", self.base_url),
            None,
            &body,
            self.max_retries,
            "Ollama",
        )
        .await?;

        payload["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing message content"))
    }
}

/// Pick the backend named by `config.provider`.
pub fn create_completion_model(config: &LlmConfig) -> Result<Box<dyn CompletionModel>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAIChat::new(config)?)),
        "ollama" => Ok(Box::new(OllamaChat::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

fn base_url(configured: Option<&str>, default: &str) -> String {
    configured.unwrap_or(default).trim_end_matches('/').to_string()
}
