//! TOML configuration.
//!
//! One file configures the whole application. Every section except `[db]`
//! is optional and falls back to its defaults:
//!
//! ```toml
//! [db]
//! path = "./data/gw.sqlite"
//!
//! [chunking]
//! max_chunk_size = 1000
//! overlap_size = 100
//!
//! [retrieval]
//! top_k = 5
//! min_score = 0.7
//! context_window = 2
//!
//! [generation]
//! max_output_tokens = 1000
//! temperature = 0.7
//!
//! [pipeline]
//! mode = "simple"          # or "decomposing"
//! timeout_secs = 60
//! max_sub_queries = 4
//! decomposer = "heuristic" # or "llm"
//!
//! [embedding]
//! provider = "openai"      # disabled | openai | ollama | hash
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [llm]
//! provider = "openai"      # disabled | openai | ollama
//! model = "gpt-4o-mini"
//!
//! [reranker]
//! provider = "lexical"     # lexical | embedding | llm
//!
//! [ingest]
//! root = "./docs"
//! include_globs = ["**/*.md", "**/*.txt"]
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use groundwork_core::chunk::ChunkingConfig;
use groundwork_core::generate::GenerationConfig;
use groundwork_core::retrieve::RetrieverConfig;
use groundwork_core::PipelineConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrieverConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub reranker: RerankerConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// `[pipeline]`: the orchestrator settings plus the decomposer choice.
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineSection {
    #[serde(flatten)]
    pub core: PipelineConfig,
    #[serde(default = "default_decomposer")]
    pub decomposer: String,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            core: PipelineConfig::default(),
            decomposer: default_decomposer(),
        }
    }
}

fn default_decomposer() -> String {
    "heuristic".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (OpenAI-compatible gateway or Ollama host).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_llm_timeout_secs(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RerankerConfig {
    #[serde(default = "default_reranker")]
    pub provider: String,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            provider: default_reranker(),
        }
    }
}

fn default_reranker() -> String {
    "lexical".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            root: None,
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    4
}
fn default_embedding_timeout_secs() -> u64 {
    30
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_backoff_base_ms() -> u64 {
    1000
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate a config document.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    config.chunking.validate()?;
    config.retrieval.validate()?;
    config.generation.validate()?;
    config.pipeline.core.validate()?;

    match config.embedding.provider.as_str() {
        "disabled" | "hash" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hash, openai, or ollama.",
            other
        ),
    }
    if config.embedding.is_enabled() && matches!(config.embedding.dims, None | Some(0)) {
        bail!(
            "embedding.dims must be > 0 when provider is '{}'",
            config.embedding.provider
        );
    }
    if matches!(config.embedding.provider.as_str(), "openai" | "ollama")
        && config.embedding.model.is_none()
    {
        bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    match config.llm.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown llm provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if config.llm.is_enabled() && config.llm.model.is_none() {
        bail!(
            "llm.model must be specified when provider is '{}'",
            config.llm.provider
        );
    }

    match config.reranker.provider.as_str() {
        "lexical" => {}
        "embedding" if !config.embedding.is_enabled() => {
            bail!("reranker.provider = 'embedding' requires an embedding provider")
        }
        "llm" if !config.llm.is_enabled() => {
            bail!("reranker.provider = 'llm' requires an llm provider")
        }
        "embedding" | "llm" => {}
        other => bail!(
            "Unknown reranker: '{}'. Must be lexical, embedding, or llm.",
            other
        ),
    }

    match config.pipeline.decomposer.as_str() {
        "heuristic" => {}
        "llm" if !config.llm.is_enabled() => {
            bail!("pipeline.decomposer = 'llm' requires an llm provider")
        }
        "llm" => {}
        other => bail!(
            "Unknown decomposer: '{}'. Must be heuristic or llm.",
            other
        ),
    }

    Ok(config)
}
