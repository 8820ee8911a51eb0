//! Wires configuration into core components.
//!
//! ```text
//! Config ─▶ embedder ─┬─▶ SqliteIndex (scoped to model + dims)
//!                     ├─▶ Retriever ◀── reranker (lexical | embedding | llm)
//! Config ─▶ model ────┼─▶ Generator
//!                     └─▶ decomposer (heuristic | llm)
//!                              │
//!                              ▼
//!                         RagPipeline
//! ```

use anyhow::{bail, Result};
use std::sync::Arc;

use groundwork_core::decompose::{HeuristicDecomposer, LlmDecomposer, QueryDecomposer};
use groundwork_core::embedding::EmbeddingProvider;
use groundwork_core::generate::Generator;
use groundwork_core::llm::LanguageModel;
use groundwork_core::rerank::{EmbeddingReranker, LexicalReranker, LlmReranker, Reranker};
use groundwork_core::retrieve::Retriever;
use groundwork_core::RagPipeline;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::llm::create_model;
use crate::migrate;
use crate::sqlite_index::SqliteIndex;

/// Shared handles for one CLI invocation.
pub struct Services {
    pub index: Arc<SqliteIndex>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub model: Arc<dyn LanguageModel>,
}

impl Services {
    /// Open the database (migrating it if needed) and create the adapters.
    pub async fn open(config: &Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let model = create_model(&config.llm)?;
        let pool = db::connect(config).await?;
        migrate::migrate_pool(&pool).await?;
        let index = Arc::new(SqliteIndex::new(
            pool,
            embedder.model_name(),
            embedder.dims(),
        ));
        Ok(Self {
            index,
            embedder,
            model,
        })
    }

    pub fn reranker(&self, config: &Config) -> Result<Arc<dyn Reranker>> {
        Ok(match config.reranker.provider.as_str() {
            "lexical" => Arc::new(LexicalReranker::new()),
            "embedding" => Arc::new(EmbeddingReranker::new(self.embedder.clone())),
            "llm" => Arc::new(LlmReranker::new(self.model.clone())),
            other => bail!("Unknown reranker: {}", other),
        })
    }

    pub fn decomposer(&self, config: &Config) -> Result<Arc<dyn QueryDecomposer>> {
        let max = config.pipeline.core.max_sub_queries;
        Ok(match config.pipeline.decomposer.as_str() {
            "heuristic" => Arc::new(HeuristicDecomposer::new(max)?),
            "llm" => Arc::new(LlmDecomposer::new(self.model.clone(), max)?),
            other => bail!("Unknown decomposer: {}", other),
        })
    }

    pub fn retriever(&self, config: &Config) -> Result<Retriever> {
        Ok(Retriever::new(
            self.embedder.clone(),
            self.index.clone(),
            self.reranker(config)?,
            config.retrieval,
        )?)
    }

    pub fn pipeline(&self, config: &Config) -> Result<RagPipeline> {
        let generator = Generator::new(self.model.clone(), config.generation)?;
        Ok(RagPipeline::new(
            self.retriever(config)?,
            generator,
            self.decomposer(config)?,
            config.pipeline.core,
        )?)
    }

    pub async fn close(self) {
        self.index.pool().close().await;
    }
}
