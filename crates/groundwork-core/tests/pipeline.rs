//! End-to-end pipeline tests over in-memory services.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use groundwork_core::chunk::ChunkManager;
use groundwork_core::chunk::ChunkingConfig;
use groundwork_core::decompose::HeuristicDecomposer;
use groundwork_core::embedding::EmbeddingProvider;
use groundwork_core::generate::{GenerationConfig, Generator, SYNTHESIS_INSTRUCTION};
use groundwork_core::index::memory::InMemoryIndex;
use groundwork_core::index::VectorIndex;
use groundwork_core::llm::{CompletionOptions, LanguageModel};
use groundwork_core::models::Validation;
use groundwork_core::rerank::LexicalReranker;
use groundwork_core::retrieve::{Retriever, RetrieverConfig};
use groundwork_core::{
    Document, PipelineConfig, PipelineMode, ProcessOptions, RagError, RagPipeline, Result,
};

/// Bag-of-letters embedder.
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

enum Behavior {
    Cite,
    FailOn(&'static str),
    Hang,
}

struct FakeModel {
    behavior: Behavior,
    calls: AtomicUsize,
    merges: AtomicUsize,
}

impl FakeModel {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
            merges: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    fn model_name(&self) -> &str {
        "fake"
    }

    async fn complete(&self, prompt: &str, _options: &CompletionOptions) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if prompt.contains(SYNTHESIS_INSTRUCTION) {
            self.merges.fetch_add(1, Ordering::SeqCst);
        }
        match &self.behavior {
            Behavior::Cite => Ok("The context covers this [1].".to_string()),
            Behavior::FailOn(needle) if prompt.contains(needle) => {
                Err(RagError::GenerationFailed("model overloaded".into()))
            }
            Behavior::FailOn(_) => Ok("Answered from [1].".to_string()),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok("too late".to_string())
            }
        }
    }
}

const CORPUS: &str = "Tokio is an async runtime for Rust. \
    Cargo is the Rust package manager. \
    Serde serializes and deserializes Rust data structures. \
    Explosives are out of scope for this handbook.";

async fn pipeline(model: Arc<FakeModel>, config: PipelineConfig) -> RagPipeline {
    let index = Arc::new(InMemoryIndex::new());
    let chunker = ChunkManager::new(ChunkingConfig {
        max_chunk_size: 60,
        overlap_size: 0,
    })
    .unwrap();
    let doc = Document::new("handbook", CORPUS).with_title("Handbook");
    for chunk in chunker.split(&doc) {
        let v = LetterEmbedder.embed(&chunk.content).await.unwrap();
        index.upsert(&chunk, &v).await.unwrap();
    }

    let retriever = Retriever::new(
        Arc::new(LetterEmbedder),
        index,
        Arc::new(LexicalReranker::new()),
        RetrieverConfig {
            top_k: 2,
            min_score: 0.5,
            context_window: 3,
        },
    )
    .unwrap();
    let generator = Generator::new(model, GenerationConfig::default()).unwrap();
    let decomposer = Arc::new(HeuristicDecomposer::new(config.max_sub_queries).unwrap());
    RagPipeline::new(retriever, generator, decomposer, config).unwrap()
}

fn decomposing() -> PipelineConfig {
    PipelineConfig {
        mode: PipelineMode::Decomposing,
        ..PipelineConfig::default()
    }
}

#[tokio::test]
async fn test_simple_mode_answers_with_sources() {
    let model = FakeModel::new(Behavior::Cite);
    let p = pipeline(model.clone(), PipelineConfig::default()).await;
    let answer = p.process("What is the Tokio runtime?").await.unwrap();
    assert!(!answer.insufficient_context);
    assert!(!answer.sources.is_empty());
    assert_eq!(answer.cited, vec![0]);
    assert!(answer.response.contains("Sources:\n[1] Handbook (chunk 0)"));
    assert_eq!(answer.validation, Validation::Passed);
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_no_relevant_context_skips_model() {
    let model = FakeModel::new(Behavior::Cite);
    let p = pipeline(model.clone(), PipelineConfig::default()).await;
    let answer = p.process("zebra migration patterns").await.unwrap();
    assert!(answer.insufficient_context);
    assert!(answer.sources.is_empty());
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_options_override_per_call() {
    let model = FakeModel::new(Behavior::Cite);
    let p = pipeline(model.clone(), PipelineConfig::default()).await;
    let options = ProcessOptions {
        min_score: Some(1.5),
        ..ProcessOptions::default()
    };
    let answer = p.process_with("Tokio runtime", &options).await.unwrap();
    assert!(answer.insufficient_context);

    let answer = p.process("Tokio runtime").await.unwrap();
    assert!(!answer.insufficient_context);
}

#[tokio::test]
async fn test_invalid_override_rejected() {
    let model = FakeModel::new(Behavior::Cite);
    let p = pipeline(model, PipelineConfig::default()).await;
    let options = ProcessOptions {
        top_k: Some(0),
        ..ProcessOptions::default()
    };
    assert!(matches!(
        p.process_with("Tokio", &options).await,
        Err(RagError::InvalidConfig(_))
    ));
}

#[tokio::test]
async fn test_decomposing_merges_sub_answers() {
    let model = FakeModel::new(Behavior::Cite);
    let p = pipeline(model.clone(), decomposing()).await;
    let answer = p
        .process("What is Tokio? What is Cargo? What does Serde do?")
        .await
        .unwrap();
    assert!(!answer.insufficient_context);
    assert_eq!(model.merges.load(Ordering::SeqCst), 1);
    assert_eq!(model.calls.load(Ordering::SeqCst), 4);
    assert!(answer.sources.len() >= 3);
}

#[tokio::test]
async fn test_single_sub_query_skips_merge() {
    let model = FakeModel::new(Behavior::Cite);
    let p = pipeline(model.clone(), decomposing()).await;
    let answer = p.process("What is Tokio?").await.unwrap();
    assert!(!answer.insufficient_context);
    assert_eq!(model.merges.load(Ordering::SeqCst), 0);
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fail_fast_keeps_partial_answers() {
    let model = FakeModel::new(Behavior::FailOn("Query: Are explosives covered?"));
    let p = pipeline(model.clone(), decomposing()).await;
    let err = p
        .process("What is Tokio? Are explosives covered? What is Cargo?")
        .await
        .unwrap_err();
    match &err {
        RagError::DecompositionFailed {
            partial_results,
            failed_query,
            cause,
        } => {
            assert_eq!(partial_results.len(), 2);
            assert_eq!(failed_query, "Are explosives covered?");
            assert!(matches!(**cause, RagError::GenerationFailed(_)));
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert!(err.is_unavailable());
    assert_eq!(model.merges.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_all_insufficient_sub_answers_skip_merge() {
    let model = FakeModel::new(Behavior::Cite);
    let p = pipeline(model.clone(), decomposing()).await;
    let answer = p.process("Zebras? Giraffes?").await.unwrap();
    assert!(answer.insufficient_context);
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_returns_timeout() {
    let model = FakeModel::new(Behavior::Hang);
    let config = PipelineConfig {
        timeout_secs: Some(2),
        ..decomposing()
    };
    let p = pipeline(model, config).await;
    let err = p
        .process("What is Tokio? What is Cargo?")
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Timeout(d) if d == Duration::from_secs(2)));
}

#[tokio::test]
async fn test_empty_index_is_unavailable_not_empty_answer() {
    let retriever = Retriever::new(
        Arc::new(LetterEmbedder),
        Arc::new(InMemoryIndex::new()),
        Arc::new(LexicalReranker::new()),
        RetrieverConfig::default(),
    )
    .unwrap();
    let generator = Generator::new(FakeModel::new(Behavior::Cite), GenerationConfig::default())
        .unwrap();
    let p = RagPipeline::new(
        retriever,
        generator,
        Arc::new(HeuristicDecomposer::default()),
        PipelineConfig::default(),
    )
    .unwrap();
    let err = p.process("Tokio").await.unwrap_err();
    assert!(matches!(err, RagError::RetrievalFailed { .. }));
    assert!(err.is_unavailable());
}
