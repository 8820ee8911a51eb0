//! Language-model adapters.
//!
//! | Config Value | Backend | Endpoint |
//! |-------------|---------|----------|
//! | `"disabled"` | [`DisabledModel`] | none, always fails |
//! | `"openai"` | [`OpenAIChat`] | `POST {url}/v1/chat/completions` |
//! | `"ollama"` | [`OllamaGenerate`] | `POST {url}/api/generate` (`stream: false`) |
//!
//! Both remote backends share the retry policy in [`crate::http`]. Failures
//! that survive the retries are reported as [`RagError::GenerationFailed`].

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use groundwork_core::llm::{CompletionOptions, LanguageModel};
use groundwork_core::RagError;

use crate::config::LlmConfig;
use crate::http::{self, RetryPolicy};

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

fn generation_failed(e: anyhow::Error) -> RagError {
    RagError::GenerationFailed(format!("{e:#}"))
}

pub struct DisabledModel;

#[async_trait]
impl LanguageModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(
        &self,
        _prompt: &str,
        _options: &CompletionOptions,
    ) -> groundwork_core::Result<String> {
        Err(RagError::GenerationFailed(
            "llm provider is disabled; set [llm].provider in the config".into(),
        ))
    }
}

/// OpenAI chat completions. The prompt is sent as a single user message.
pub struct OpenAIChat {
    client: reqwest::Client,
    model: String,
    url: String,
    api_key: String,
    policy: RetryPolicy,
}

impl OpenAIChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for OpenAI provider"))?;
        let base = config.url.as_deref().unwrap_or(OPENAI_BASE_URL);
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            model,
            url: format!("{}/v1/chat/completions", base.trim_end_matches('/')),
            api_key: api_key.into(),
            policy: RetryPolicy::new(config.max_retries, config.backoff_base_ms),
        })
    }

    async fn request(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
        });
        let json = http::post_json(
            &self.client,
            "OpenAI",
            &self.url,
            Some(&self.api_key),
            &body,
            &self.policy,
        )
        .await?;
        parse_chat_response(&json)
    }
}

#[async_trait]
impl LanguageModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> groundwork_core::Result<String> {
        self.request(prompt, options)
            .await
            .map_err(generation_failed)
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

/// Ollama non-streaming generation.
pub struct OllamaGenerate {
    client: reqwest::Client,
    model: String,
    url: String,
    policy: RetryPolicy,
}

impl OllamaGenerate {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for Ollama provider"))?;
        let base = config.url.as_deref().unwrap_or(OLLAMA_BASE_URL);
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            model,
            url: format!("{}/api/generate", base.trim_end_matches('/')),
            policy: RetryPolicy::new(config.max_retries, config.backoff_base_ms),
        })
    }

    async fn request(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "num_predict": options.max_tokens,
                "temperature": options.temperature,
            },
        });
        let json =
            http::post_json(&self.client, "Ollama", &self.url, None, &body, &self.policy).await?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response field"))
    }
}

#[async_trait]
impl LanguageModel for OllamaGenerate {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> groundwork_core::Result<String> {
        self.request(prompt, options)
            .await
            .map_err(generation_failed)
    }
}

/// Create the [`LanguageModel`] named by `config.provider`.
pub fn create_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledModel)),
        "openai" => Ok(Arc::new(OpenAIChat::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerate::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}
