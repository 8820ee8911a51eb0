//! Grounded answer generation.
//!
//! The generator turns a query plus retrieved context into an [`Answer`]:
//!
//! 1. Number the context passages `[1]`, `[2]`, … and insert them in a
//!    fixed prompt that restricts the model to the supplied context.
//! 2. Call the [`LanguageModel`].
//! 3. Post-process: trim, validate, and regenerate **once** with a stricter
//!    instruction if the response is invalid. The second response is
//!    accepted whatever it looks like.
//! 4. Attribute the response to the passages it used and append a
//!    `Sources:` footer.
//!
//! Empty context never reaches the model: the answer is the fixed
//! [`INSUFFICIENT_CONTEXT`] text.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::llm::{CompletionOptions, LanguageModel};
use crate::models::{Answer, ScoredResult, SourceRef, Validation};
use crate::text::content_terms;

/// Response used when no context is available.
pub const INSUFFICIENT_CONTEXT: &str =
    "I don't have enough information in the provided context to answer this question.";

/// Instruction prefixed to the original query when merging sub-answers.
pub const SYNTHESIS_INSTRUCTION: &str =
    "Synthesize a comprehensive answer from these partial responses to the original query.";

const STRICT_SUFFIX: &str = "\nYour previous answer did not use the context. Answer again using only \
     the numbered context passages above and cite each passage you use as [n]. If the context \
     does not contain the answer, say so.";

const REFUSAL_PREFIXES: &[&str] = &["error:", "i'm sorry", "i am sorry", "as an ai"];

const FOOTER_HEADER: &str = "\n\nSources:\n";

/// Minimum length of a term that counts as shared with the context.
const TERM_MIN_LEN: usize = 4;

/// Sampling and validation settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_output_tokens: u32,
    pub temperature: f32,
    /// Regenerate once when the first response fails validation.
    pub regenerate_on_invalid: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: 1000,
            temperature: 0.7,
            regenerate_on_invalid: true,
        }
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_output_tokens == 0 {
            return Err(RagError::InvalidConfig(
                "generation.max_output_tokens must be > 0".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(RagError::InvalidConfig(format!(
                "generation.temperature must be within [0, 2], got {}",
                self.temperature
            )));
        }
        Ok(())
    }

    fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            max_tokens: self.max_output_tokens,
            temperature: self.temperature,
        }
    }
}

/// Produces grounded answers with a [`LanguageModel`].
pub struct Generator {
    model: Arc<dyn LanguageModel>,
    config: GenerationConfig,
}

impl Generator {
    pub fn new(model: Arc<dyn LanguageModel>, config: GenerationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { model, config })
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub async fn generate(&self, query: &str, context: &[ScoredResult]) -> Result<Answer> {
        self.generate_with(query, context, &self.config).await
    }

    /// Generate with per-call sampling settings.
    pub async fn generate_with(
        &self,
        query: &str,
        context: &[ScoredResult],
        config: &GenerationConfig,
    ) -> Result<Answer> {
        config.validate()?;
        if context.is_empty() {
            tracing::debug!("empty context, skipping model call");
            return Ok(insufficient());
        }
        let passages: Vec<&str> = context.iter().map(|r| r.chunk.content.as_str()).collect();
        let sources: Vec<SourceRef> = context.iter().map(|r| r.chunk.source_ref()).collect();
        let (body, validation) = self.complete_validated(query, &passages, config).await?;
        let cited = cite(&body, &passages);
        Ok(Answer {
            response: with_footer(&body, &sources, &cited),
            sources,
            cited,
            insufficient_context: false,
            validation,
        })
    }

    /// Merge sub-answers into one answer for `query`.
    ///
    /// Insufficient sub-answers are left out of the prompt. When none is
    /// left, no model call is made. Merged `sources` is the concatenation of
    /// the sub-answers' sources in input order.
    pub async fn synthesize(&self, query: &str, partials: &[Answer]) -> Result<Answer> {
        self.synthesize_with(query, partials, &self.config).await
    }

    /// [`synthesize`](Self::synthesize) with per-call sampling settings.
    pub async fn synthesize_with(
        &self,
        query: &str,
        partials: &[Answer],
        config: &GenerationConfig,
    ) -> Result<Answer> {
        config.validate()?;
        let usable: Vec<&Answer> = partials.iter().filter(|a| !a.insufficient_context).collect();
        if usable.is_empty() {
            tracing::debug!(partials = partials.len(), "no usable sub-answers, skipping merge");
            return Ok(insufficient());
        }

        let mut sources = Vec::new();
        let mut offsets = Vec::with_capacity(usable.len());
        for answer in &usable {
            offsets.push(sources.len());
            sources.extend(answer.sources.iter().cloned());
        }

        let passages: Vec<&str> = usable.iter().map(|a| response_body(&a.response)).collect();
        let merge_query = format!("{SYNTHESIS_INSTRUCTION}\nOriginal query: {query}");
        let (body, validation) = self
            .complete_validated(&merge_query, &passages, config)
            .await?;

        let mut cited: Vec<usize> = cite(&body, &passages)
            .into_iter()
            .flat_map(|p| {
                let base = offsets[p];
                usable[p].cited.iter().map(move |&c| base + c)
            })
            .collect();
        cited.sort_unstable();
        cited.dedup();

        Ok(Answer {
            response: with_footer(&body, &sources, &cited),
            sources,
            cited,
            insufficient_context: false,
            validation,
        })
    }

    /// Call the model, validate, and regenerate at most once.
    async fn complete_validated(
        &self,
        query: &str,
        passages: &[&str],
        config: &GenerationConfig,
    ) -> Result<(String, Validation)> {
        let prompt = build_prompt(query, passages);
        let options = config.completion_options();

        let first = self.call(&prompt, &options).await?;
        if is_valid(&first, passages) {
            return Ok((first, Validation::Passed));
        }
        if !config.regenerate_on_invalid {
            tracing::warn!(model = self.model.model_name(), "response failed validation");
            return Ok((first, Validation::Exhausted));
        }

        tracing::debug!("response failed validation, regenerating once");
        let second = self
            .call(&format!("{prompt}{STRICT_SUFFIX}"), &options)
            .await?;
        if is_valid(&second, passages) {
            Ok((second, Validation::Regenerated))
        } else {
            tracing::warn!(
                model = self.model.model_name(),
                "regenerated response still failed validation, accepting it"
            );
            Ok((second, Validation::Exhausted))
        }
    }

    async fn call(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        let raw = self
            .model
            .complete(prompt, options)
            .await
            .map_err(|e| match e {
                RagError::GenerationFailed(_) => e,
                other => RagError::GenerationFailed(other.to_string()),
            })?;
        Ok(raw.trim().to_string())
    }
}

fn insufficient() -> Answer {
    Answer {
        response: INSUFFICIENT_CONTEXT.to_string(),
        sources: Vec::new(),
        cited: Vec::new(),
        insufficient_context: true,
        validation: Validation::Skipped,
    }
}

/// Build the grounded prompt. Passages are numbered from 1 in the order given.
pub fn build_prompt(query: &str, passages: &[&str]) -> String {
    let context = passages
        .iter()
        .enumerate()
        .map(|(i, p)| format!("[{}] {}", i + 1, p))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Context information is below.\n\
         ---------------------\n\
         {context}\n\
         ---------------------\n\
         Given the context information, answer the query using only the passages above. \
         Do not use prior knowledge. Cite the passages you use with their [n] markers.\n\
         Query: {query}\n\
         Answer:"
    )
}

/// The response text without its `Sources:` footer.
pub fn response_body(response: &str) -> &str {
    match response.rfind(FOOTER_HEADER) {
        Some(idx) => &response[..idx],
        None => response,
    }
}

fn is_valid(response: &str, passages: &[&str]) -> bool {
    if response.is_empty() {
        return false;
    }
    // Models often emit a typographic apostrophe in "I’m sorry".
    let lower = response.to_lowercase().replace('\u{2019}', "'");
    if REFUSAL_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return false;
    }
    if markers(response).any(|n| (1..=passages.len()).contains(&n)) {
        return true;
    }
    let terms = content_terms(response, TERM_MIN_LEN);
    passages
        .iter()
        .any(|p| !content_terms(p, TERM_MIN_LEN).is_disjoint(&terms))
}

/// Zero-based indices of the passages `response` draws on.
///
/// Explicit `[n]` markers win. Without markers, passages sharing at least
/// two content terms with the response are cited. When neither applies,
/// every passage is cited.
fn cite(response: &str, passages: &[&str]) -> Vec<usize> {
    let mut explicit: Vec<usize> = markers(response)
        .filter(|n| (1..=passages.len()).contains(n))
        .map(|n| n - 1)
        .collect();
    explicit.sort_unstable();
    explicit.dedup();
    if !explicit.is_empty() {
        return explicit;
    }

    let terms = content_terms(response, TERM_MIN_LEN);
    let overlapping: Vec<usize> = passages
        .iter()
        .enumerate()
        .filter(|(_, p)| content_terms(p, TERM_MIN_LEN).intersection(&terms).count() >= 2)
        .map(|(i, _)| i)
        .collect();
    if !overlapping.is_empty() {
        return overlapping;
    }
    (0..passages.len()).collect()
}

/// Values of `[n]` markers in `text`, in order of appearance.
fn markers(text: &str) -> impl Iterator<Item = usize> + '_ {
    text.split('[').skip(1).filter_map(|rest| {
        let end = rest.find(']')?;
        rest[..end].trim().parse().ok()
    })
}

fn with_footer(body: &str, sources: &[SourceRef], cited: &[usize]) -> String {
    let mut seen = HashSet::new();
    let lines: Vec<String> = cited
        .iter()
        .filter(|&&i| i < sources.len() && seen.insert(i))
        .map(|&i| format!("[{}] {}", i + 1, sources[i].label()))
        .collect();
    if lines.is_empty() {
        return body.to_string();
    }
    format!("{body}{FOOTER_HEADER}{}", lines.join("\n"))
}
