//! # Groundwork Core
//!
//! The retrieval and orchestration core of Groundwork: data models,
//! sentence-boundary chunking, the vector index abstraction, retrieval with
//! context expansion and reranking, grounded generation, query
//! decomposition, and the pipeline that composes them.
//!
//! External services (embedding model, language model, reranker, vector
//! storage) are consumed through the traits in [`embedding`], [`llm`],
//! [`rerank`] and [`index`]. Concrete HTTP and SQLite implementations live in
//! the `groundwork` application crate.
//!
//! This crate has no database, HTTP or filesystem dependencies. The only
//! runtime facility it uses is `tokio`'s timer, for the request deadline in
//! [`pipeline`].
//!
//! ```text
//! query ─▶ [decompose] ─▶ retrieve ─▶ generate ─▶ [merge] ─▶ Answer
//!                          │  search (VectorIndex)
//!                          │  expand (neighbors by position)
//!                          └  rerank (Reranker) + min_score filter
//! ```

pub mod chunk;
pub mod decompose;
pub mod embedding;
pub mod error;
pub mod generate;
pub mod index;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod rerank;
pub mod retrieve;
mod text;

pub use error::{RagError, Result};
pub use models::{Answer, Chunk, Document, ScoredResult, SearchResult, SourceRef, SubQuery};
pub use pipeline::{PipelineConfig, PipelineMode, ProcessOptions, RagPipeline};
