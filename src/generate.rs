//! Generative model client.
//!
//! The [`Generator`] trait is the seam between the answerer and whatever
//! model writes the answer. [`ChatCompletionsGenerator`] talks to any
//! OpenAI-compatible `/chat/completions` endpoint; the default config points
//! it at Groq's `llama3-8b-8192` with temperature 0.2.
//!
//! Failures (transport, timeout, non-2xx status, undecodable body, empty
//! completion) are all [`Error::Generation`]. Retries only happen when
//! `generation.max_retries > 0`, since every call costs quota.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GenerationConfig;
use crate::error::{Error, Result};
use crate::http;

#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    /// Complete a single-turn prompt and return the model's text.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
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

/// Client for an OpenAI-compatible chat-completions API.
pub struct ChatCompletionsGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_retries: u32,
}

impl ChatCompletionsGenerator {
    /// Build from config, reading the API key from `config.api_key_env`.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            Error::InvalidConfig(format!(
                "{} environment variable not set",
                config.api_key_env
            ))
        })?;
        Self::with_key(config, Some(api_key))
    }

    /// Build with an explicit key. `None` sends no `Authorization` header,
    /// for local servers that do not check one.
    pub fn with_key(config: &GenerationConfig, api_key: Option<String>) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs, Error::Generation)?,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Generator for ChatCompletionsGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        };
        let request = || {
            let builder = self.client.post(&self.endpoint).json(&body);
            match &self.api_key {
                Some(key) => builder.bearer_auth(key),
                None => builder,
            }
        };

        let response: ChatResponse =
            http::send_with_retry("chat completions", request, self.max_retries, Error::Generation)
                .await?;

        if let Some(usage) = &response.usage {
            debug!(
                model = %self.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "generation usage"
            );
        }

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|t| t.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(Error::Generation(format!(
                "{} returned an empty completion",
                self.model
            )));
        }
        Ok(text)
    }
}

/// Build the configured generator.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    Ok(Arc::new(ChatCompletionsGenerator::new(config)?))
}
