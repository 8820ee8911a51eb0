//! Language-model service contract.
//!
//! Concrete backends (OpenAI chat completions, Ollama generate) live in the
//! `groundwork` app crate and handle their own retry/backoff.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Sampling limits for a single completion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1000,
            temperature: 0.7,
        }
    }
}

/// A text-completion service: `complete(prompt) → text`.
///
/// Errors are reported as [`RagError::GenerationFailed`](crate::RagError::GenerationFailed).
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String>;
}
