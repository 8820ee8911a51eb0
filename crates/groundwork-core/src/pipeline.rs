//! Query orchestration.
//!
//! [`RagPipeline`] composes a [`Retriever`], a [`Generator`] and a
//! [`QueryDecomposer`] into the single entry point `process(query)`.
//!
//! # Modes
//!
//! - [`PipelineMode::Simple`]: retrieve, then generate.
//! - [`PipelineMode::Decomposing`]: decompose, run the simple path for every
//!   sub-query concurrently, then merge the sub-answers. Decomposition is
//!   one level deep. A query that yields a single sub-query is answered
//!   directly without a merge.
//!
//! # Partial failure
//!
//! Every sub-pipeline runs to completion. If any of them failed, nothing
//! is merged and [`RagError::DecompositionFailed`] is returned with the
//! successful sub-answers (submission order) and the first failure.
//!
//! # Deadline
//!
//! The whole request, fan-out included, runs under `timeout_secs`. When the
//! deadline passes the in-flight work is dropped and [`RagError::Timeout`]
//! is returned.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::decompose::QueryDecomposer;
use crate::error::{RagError, Result};
use crate::generate::{GenerationConfig, Generator};
use crate::models::Answer;
use crate::retrieve::{Retriever, RetrieverConfig};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    #[default]
    Simple,
    Decomposing,
}

/// Orchestrator settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub mode: PipelineMode,
    /// Request deadline in seconds. `None` disables it.
    pub timeout_secs: Option<u64>,
    /// Upper bound on sub-queries in decomposing mode.
    pub max_sub_queries: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: PipelineMode::Simple,
            timeout_secs: Some(60),
            max_sub_queries: 4,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == Some(0) {
            return Err(RagError::InvalidConfig(
                "pipeline.timeout_secs must be > 0 (omit it to disable the deadline)".into(),
            ));
        }
        if self.max_sub_queries == 0 {
            return Err(RagError::InvalidConfig(
                "pipeline.max_sub_queries must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Per-call overrides. `None` keeps the pipeline's configured value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessOptions {
    pub mode: Option<PipelineMode>,
    pub top_k: Option<usize>,
    pub min_score: Option<f32>,
    pub context_window: Option<usize>,
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl ProcessOptions {
    /// `base` with every set override applied.
    pub fn retriever_config(&self, base: &RetrieverConfig) -> RetrieverConfig {
        RetrieverConfig {
            top_k: self.top_k.unwrap_or(base.top_k),
            min_score: self.min_score.unwrap_or(base.min_score),
            context_window: self.context_window.unwrap_or(base.context_window),
        }
    }

    pub fn generation_config(&self, base: &GenerationConfig) -> GenerationConfig {
        GenerationConfig {
            max_output_tokens: self.max_output_tokens.unwrap_or(base.max_output_tokens),
            temperature: self.temperature.unwrap_or(base.temperature),
            regenerate_on_invalid: base.regenerate_on_invalid,
        }
    }
}

/// The retrieval-augmented generation pipeline.
pub struct RagPipeline {
    retriever: Retriever,
    generator: Generator,
    decomposer: Arc<dyn QueryDecomposer>,
    config: PipelineConfig,
}

impl RagPipeline {
    pub fn new(
        retriever: Retriever,
        generator: Generator,
        decomposer: Arc<dyn QueryDecomposer>,
        config: PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            retriever,
            generator,
            decomposer,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    pub async fn process(&self, query: &str) -> Result<Answer> {
        self.process_with(query, &ProcessOptions::default()).await
    }

    /// Answer `query` with per-call overrides.
    pub async fn process_with(&self, query: &str, options: &ProcessOptions) -> Result<Answer> {
        let started = Instant::now();
        let mode = options.mode.unwrap_or(self.config.mode);
        let retrieval = options.retriever_config(self.retriever.config());
        let generation = options.generation_config(self.generator.config());
        retrieval.validate()?;
        generation.validate()?;

        let work = async {
            match mode {
                PipelineMode::Simple => self.answer(query, &retrieval, &generation).await,
                PipelineMode::Decomposing => {
                    self.answer_decomposed(query, &retrieval, &generation).await
                }
            }
        };
        let result = match self.config.timeout() {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .map_err(|_| RagError::Timeout(limit))?,
            None => work.await,
        };

        match &result {
            Ok(answer) => tracing::info!(
                ?mode,
                sources = answer.sources.len(),
                insufficient = answer.insufficient_context,
                validation = ?answer.validation,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "query answered"
            ),
            Err(e) => tracing::warn!(
                ?mode,
                error = %e,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "query failed"
            ),
        }
        result
    }

    /// The simple path: retrieve, then generate.
    async fn answer(
        &self,
        query: &str,
        retrieval: &RetrieverConfig,
        generation: &GenerationConfig,
    ) -> Result<Answer> {
        let context = self.retriever.retrieve_with(query, retrieval).await?;
        self.generator
            .generate_with(query, &context, generation)
            .await
    }

    async fn answer_decomposed(
        &self,
        query: &str,
        retrieval: &RetrieverConfig,
        generation: &GenerationConfig,
    ) -> Result<Answer> {
        let mut sub_queries = self.decomposer.decompose(query).await?;
        sub_queries.truncate(self.config.max_sub_queries);
        tracing::debug!(count = sub_queries.len(), "query decomposed");

        if sub_queries.len() <= 1 {
            let text = sub_queries
                .pop()
                .map(|s| s.text)
                .unwrap_or_else(|| query.to_string());
            return self.answer(&text, retrieval, generation).await;
        }

        let outcomes = join_all(
            sub_queries
                .iter()
                .map(|sub| self.answer(&sub.text, retrieval, generation)),
        )
        .await;

        let mut answers = Vec::with_capacity(outcomes.len());
        let mut first_failure = None;
        for (sub, outcome) in sub_queries.iter().zip(outcomes) {
            match outcome {
                Ok(answer) => answers.push(answer),
                Err(e) => {
                    tracing::warn!(sub_query = %sub.text, error = %e, "sub-query failed");
                    if first_failure.is_none() {
                        first_failure = Some((sub.text.clone(), e));
                    }
                }
            }
        }
        if let Some((failed_query, cause)) = first_failure {
            return Err(RagError::DecompositionFailed {
                partial_results: answers,
                failed_query,
                cause: Box::new(cause),
            });
        }

        self.generator
            .synthesize_with(query, &answers, generation)
            .await
    }
}
