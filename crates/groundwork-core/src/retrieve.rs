//! Query-time retrieval: vector search, context expansion and reranking.
//!
//! ```text
//! query ─▶ embed ─▶ index.search(top_k)
//!                      │
//!                      ├─▶ index.neighbors(hit, context_window)  (per hit)
//!                      ▼
//!            candidates (deduplicated by chunk id)
//!                      │
//!                      ▼
//!            reranker.score_all(query, chunks)
//!                      │
//!                      ▼
//!            sort desc (tie: id asc) ─▶ drop score < min_score
//! ```
//!
//! An empty result is a normal outcome. Failures of the embedding service,
//! the index or the reranker are wrapped in
//! [`RagError::RetrievalFailed`] with the original error as cause. The
//! retriever itself never retries.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::models::{Chunk, ScoredResult};
use crate::rerank::Reranker;

/// Retrieval parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    /// Number of first-pass hits requested from the index.
    pub top_k: usize,
    /// Minimum rerank score a candidate needs to be returned.
    pub min_score: f32,
    /// Neighbors fetched on each side of every hit.
    pub context_window: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: 0.7,
            context_window: 2,
        }
    }
}

impl RetrieverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(RagError::InvalidConfig("retrieval.top_k must be > 0".into()));
        }
        if self.min_score.is_nan() {
            return Err(RagError::InvalidConfig(
                "retrieval.min_score must be a number".into(),
            ));
        }
        Ok(())
    }
}

/// Finds, expands and reranks the chunks relevant to a query.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    reranker: Arc<dyn Reranker>,
    config: RetrieverConfig,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        reranker: Arc<dyn Reranker>,
        config: RetrieverConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            embedder,
            index,
            reranker,
            config,
        })
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Retrieve with the configured parameters.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredResult>> {
        self.retrieve_with(query, &self.config).await
    }

    /// Retrieve with per-call parameters.
    pub async fn retrieve_with(
        &self,
        query: &str,
        config: &RetrieverConfig,
    ) -> Result<Vec<ScoredResult>> {
        config.validate()?;
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(RagError::retrieval)?;
        let hits = self
            .index
            .search(&embedding, config.top_k)
            .await
            .map_err(RagError::retrieval)?;
        tracing::debug!(hits = hits.len(), top_k = config.top_k, "vector search done");

        let candidates = self
            .expand(hits.into_iter().map(|h| h.chunk).collect(), config.context_window)
            .await?;
        let candidate_count = candidates.len();

        let contents: Vec<&str> = candidates.iter().map(|c| c.content.as_str()).collect();
        let scores = self
            .reranker
            .score_all(query, &contents)
            .await
            .map_err(RagError::retrieval)?;
        if scores.len() != candidate_count {
            return Err(RagError::retrieval(RagError::ScoringFailed(format!(
                "reranker returned {} scores for {} candidates",
                scores.len(),
                candidate_count
            ))));
        }

        let mut results: Vec<ScoredResult> = candidates
            .into_iter()
            .zip(scores)
            .map(|(chunk, score)| ScoredResult { chunk, score })
            .collect();
        rank_scored(&mut results);
        results.retain(|r| r.score >= config.min_score);

        tracing::debug!(
            candidates = candidate_count,
            kept = results.len(),
            min_score = config.min_score,
            reranker = self.reranker.name(),
            "rerank done"
        );
        Ok(results)
    }

    /// Hits plus their positional neighbors, first occurrence wins.
    async fn expand(&self, hits: Vec<Chunk>, window: usize) -> Result<Vec<Chunk>> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::with_capacity(hits.len() * (1 + 2 * window));
        let neighbor_sets = if window == 0 {
            Vec::new()
        } else {
            try_join_all(hits.iter().map(|hit| self.index.neighbors(hit, window)))
                .await
                .map_err(RagError::retrieval)?
        };

        for hit in hits {
            if seen.insert(hit.id.clone()) {
                candidates.push(hit);
            }
        }
        for chunk in neighbor_sets.into_iter().flatten() {
            if seen.insert(chunk.id.clone()) {
                candidates.push(chunk);
            }
        }
        Ok(candidates)
    }
}

/// Descending score, ascending chunk id. NaN sorts last.
fn rank_scored(results: &mut [ScoredResult]) {
    results.sort_by(|a, b| {
        match (a.score.is_nan(), b.score.is_nan()) {
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            _ => b.score.total_cmp(&a.score),
        }
        .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::split_text;
    use crate::index::memory::InMemoryIndex;
    use crate::rerank::LexicalReranker;
    use async_trait::async_trait;

    /// Bag-of-letters embedder: stable and good enough to rank chunks.
    struct LetterEmbedder;

    #[async_trait]
    impl EmbeddingProvider for LetterEmbedder {
        fn model_name(&self) -> &str {
            "letters"
        }
        fn dims(&self) -> usize {
            26
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut v = vec![0.0; 26];
            for c in text.to_ascii_lowercase().bytes() {
                if c.is_ascii_lowercase() {
                    v[(c - b'a') as usize] += 1.0;
                }
            }
            Ok(v)
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        fn model_name(&self) -> &str {
            "down"
        }
        fn dims(&self) -> usize {
            26
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(RagError::EmbeddingFailed("connection refused".into()))
        }
    }

    async fn seeded_index() -> Arc<InMemoryIndex> {
        let index = Arc::new(InMemoryIndex::new());
        let text = "Rust ownership rules prevent data races. \
                    Borrowing lets code read data without taking ownership. \
                    Lifetimes describe how long references stay valid. \
                    Cargo builds crates and fetches dependencies. \
                    Tokio runs async tasks on a thread pool.";
        for chunk in split_text("book", text, 60, 0) {
            let v = LetterEmbedder.embed(&chunk.content).await.unwrap();
            index.upsert(&chunk, &v).await.unwrap();
        }
        index
    }

    fn retriever(index: Arc<InMemoryIndex>, config: RetrieverConfig) -> Retriever {
        Retriever::new(
            Arc::new(LetterEmbedder),
            index,
            Arc::new(LexicalReranker::new()),
            config,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_results_sorted_unique_and_filtered() {
        let config = RetrieverConfig {
            top_k: 3,
            min_score: 0.0,
            context_window: 2,
        };
        let r = retriever(seeded_index().await, config);
        let results = r.retrieve("ownership borrowing").await.unwrap();
        assert!(!results.is_empty());
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        let ids: HashSet<_> = results.iter().map(|r| r.chunk.id.clone()).collect();
        assert_eq!(ids.len(), results.len());
        assert!(results[0].chunk.content.contains("ownership"));
    }

    /// Scores only through `score_all`, optionally dropping the last score.
    struct BatchOnlyReranker {
        short: bool,
    }

    #[async_trait]
    impl Reranker for BatchOnlyReranker {
        fn name(&self) -> &str {
            "batch-only"
        }
        async fn score(&self, _query: &str, _content: &str) -> Result<f32> {
            Err(RagError::ScoringFailed("per-passage scoring unused".into()))
        }
        async fn score_all(&self, _query: &str, contents: &[&str]) -> Result<Vec<f32>> {
            let mut scores: Vec<f32> = contents.iter().map(|c| c.len() as f32).collect();
            if self.short {
                scores.pop();
            }
            Ok(scores)
        }
    }

    #[tokio::test]
    async fn test_rerank_scores_candidate_set_in_one_call() {
        let config = RetrieverConfig {
            top_k: 2,
            min_score: 0.0,
            context_window: 1,
        };
        let r = Retriever::new(
            Arc::new(LetterEmbedder),
            seeded_index().await,
            Arc::new(BatchOnlyReranker { short: false }),
            config,
        )
        .unwrap();
        let results = r.retrieve("ownership").await.unwrap();
        assert!(!results.is_empty());
        for res in &results {
            assert_eq!(res.score, res.chunk.content.len() as f32);
        }

        let r = Retriever::new(
            Arc::new(LetterEmbedder),
            seeded_index().await,
            Arc::new(BatchOnlyReranker { short: true }),
            config,
        )
        .unwrap();
        assert!(matches!(
            r.retrieve("ownership").await,
            Err(RagError::RetrievalFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_high_min_score_yields_empty() {
        let config = RetrieverConfig {
            min_score: 0.9,
            ..RetrieverConfig::default()
        };
        let r = retriever(seeded_index().await, config);
        assert!(r.retrieve("x").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_is_idempotent() {
        let config = RetrieverConfig {
            min_score: 0.0,
            ..RetrieverConfig::default()
        };
        let r = retriever(seeded_index().await, config);
        let a = r.retrieve("async tasks").await.unwrap();
        let b = r.retrieve("async tasks").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_empty_query_short_circuits() {
        let r = Retriever::new(
            Arc::new(FailingEmbedder),
            Arc::new(InMemoryIndex::new()),
            Arc::new(LexicalReranker::new()),
            RetrieverConfig::default(),
        )
        .unwrap();
        assert!(r.retrieve("   ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_wrapped() {
        let r = Retriever::new(
            Arc::new(FailingEmbedder),
            seeded_index().await,
            Arc::new(LexicalReranker::new()),
            RetrieverConfig::default(),
        )
        .unwrap();
        match r.retrieve("rust").await {
            Err(RagError::RetrievalFailed { cause }) => {
                assert!(matches!(*cause, RagError::EmbeddingFailed(_)))
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_index_is_retrieval_failure() {
        let r = retriever(Arc::new(InMemoryIndex::new()), RetrieverConfig::default());
        match r.retrieve("rust").await {
            Err(RagError::RetrievalFailed { cause }) => {
                assert!(matches!(*cause, RagError::IndexUnavailable(_)))
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad = RetrieverConfig {
            top_k: 0,
            ..RetrieverConfig::default()
        };
        assert!(matches!(bad.validate(), Err(RagError::InvalidConfig(_))));
    }

    #[test]
    fn test_rank_scored_ties_and_nan() {
        let mk = |id: &str, score: f32| ScoredResult {
            chunk: split_text(id, "Text.", 10, 0).remove(0),
            score,
        };
        let mut rs = vec![mk("b", 0.5), mk("a", f32::NAN), mk("c", 0.9), mk("a", 0.5)];
        rank_scored(&mut rs);
        assert_eq!(rs[0].score, 0.9);
        assert!(rs[1].chunk.id < rs[2].chunk.id);
        assert!(rs[3].score.is_nan());
    }
}
