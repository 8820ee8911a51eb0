//! Second-pass relevance scoring.
//!
//! The retriever treats relevance scoring as an external service with a
//! cross-encoder shape: `score(query, passage) → f32`, higher is better.
//! The retriever scores a whole candidate set at once through
//! [`Reranker::score_all`], which defaults to concurrent `score` calls.
//! Three scorers ship with the crate:
//!
//! | Scorer | Score range | Cost |
//! |--------|-------------|------|
//! | [`LexicalReranker`] | `[0, 1]` fraction of query terms present | pure, no I/O |
//! | [`EmbeddingReranker`] | `[-1, 1]` cosine of query and passage embeddings | one query embedding plus one batched embedding per passage |
//! | [`LlmReranker`] | `[0, 1]` model-judged relevance / 10 | one completion per passage |

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;

use crate::embedding::{cosine_similarity, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::llm::{CompletionOptions, LanguageModel};
use crate::text::content_terms;

/// A relevance scoring service.
#[async_trait]
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;

    /// Relevance of `content` to `query`. Failures are
    /// [`RagError::ScoringFailed`].
    async fn score(&self, query: &str, content: &str) -> Result<f32>;

    /// Scores for every passage in `contents`, in input order.
    async fn score_all(&self, query: &str, contents: &[&str]) -> Result<Vec<f32>> {
        try_join_all(contents.iter().map(|content| self.score(query, content))).await
    }
}

/// Scores by the fraction of the query's content terms found in the passage.
#[derive(Debug, Clone, Default)]
pub struct LexicalReranker;

impl LexicalReranker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Reranker for LexicalReranker {
    fn name(&self) -> &str {
        "lexical"
    }

    async fn score(&self, query: &str, content: &str) -> Result<f32> {
        let query_terms = content_terms(query, 2);
        if query_terms.is_empty() {
            return Ok(0.0);
        }
        let passage_terms = content_terms(content, 2);
        let hits = query_terms
            .iter()
            .filter(|t| passage_terms.contains(*t))
            .count();
        Ok(hits as f32 / query_terms.len() as f32)
    }
}

/// Scores by cosine similarity between query and passage embeddings.
///
/// [`score_all`](Reranker::score_all) embeds the query once and the passages
/// in one batch. Nothing is cached between calls.
pub struct EmbeddingReranker {
    provider: Arc<dyn EmbeddingProvider>,
}

impl EmbeddingReranker {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Reranker for EmbeddingReranker {
    fn name(&self) -> &str {
        "embedding"
    }

    async fn score(&self, query: &str, content: &str) -> Result<f32> {
        self.score_all(query, &[content])
            .await?
            .pop()
            .ok_or_else(|| RagError::ScoringFailed("no score returned".into()))
    }

    async fn score_all(&self, query: &str, contents: &[&str]) -> Result<Vec<f32>> {
        if contents.is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = self.provider.embed(query).await.map_err(as_scoring)?;
        let texts: Vec<String> = contents.iter().map(|c| c.to_string()).collect();
        let passages = self
            .provider
            .embed_batch(&texts)
            .await
            .map_err(as_scoring)?;
        if passages.len() != contents.len() {
            return Err(RagError::ScoringFailed(format!(
                "expected {} passage embeddings, got {}",
                contents.len(),
                passages.len()
            )));
        }
        Ok(passages
            .iter()
            .map(|p| cosine_similarity(&query_vec, p))
            .collect())
    }
}

/// Asks a language model to rate relevance from 0 to 10.
pub struct LlmReranker {
    model: Arc<dyn LanguageModel>,
}

impl LlmReranker {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    fn prompt(query: &str, content: &str) -> String {
        format!(
            "Rate how relevant the passage is to the query on a scale from 0 (unrelated) \
             to 10 (directly answers it). Reply with a single number only.\n\
             Query: {query}\n\
             Passage:\n{content}\n\
             Relevance:"
        )
    }
}

#[async_trait]
impl Reranker for LlmReranker {
    fn name(&self) -> &str {
        "llm"
    }

    async fn score(&self, query: &str, content: &str) -> Result<f32> {
        let options = CompletionOptions {
            max_tokens: 8,
            temperature: 0.0,
        };
        let reply = self
            .model
            .complete(&Self::prompt(query, content), &options)
            .await
            .map_err(as_scoring)?;
        let rating = parse_rating(&reply).ok_or_else(|| {
            RagError::ScoringFailed(format!("unparseable relevance rating: {:?}", reply.trim()))
        })?;
        Ok(rating.clamp(0.0, 10.0) / 10.0)
    }
}

/// First number in `reply`, e.g. `"Relevance: 7/10"` → `7.0`.
fn parse_rating(reply: &str) -> Option<f32> {
    let start = reply.find(|c: char| c.is_ascii_digit())?;
    let rest = &reply[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    rest[..end].trim_end_matches('.').parse().ok()
}

fn as_scoring(err: RagError) -> RagError {
    match err {
        RagError::ScoringFailed(_) => err,
        other => RagError::ScoringFailed(other.to_string()),
    }
}
