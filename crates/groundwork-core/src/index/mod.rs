//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the storage contract the retrieval pipeline
//! consumes: idempotent upserts, top-k similarity search, and positional
//! neighbor lookups for context expansion. Backends are pluggable
//! ([`memory::InMemoryIndex`] here, SQLite in the app crate).
//!
//! Ingestion happens out of band. At query time the pipeline only reads.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Chunk, SearchResult};

/// Abstract vector storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorIndex::upsert) | Insert or replace a chunk and its embedding (idempotent per chunk id) |
/// | [`search`](VectorIndex::search) | Top-k cosine search, descending similarity |
/// | [`neighbors`](VectorIndex::neighbors) | Chunks of the same document within a position window |
/// | [`len`](VectorIndex::len) | Number of indexed chunks |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace `chunk` with its embedding, keyed by chunk id.
    async fn upsert(&self, chunk: &Chunk, embedding: &[f32]) -> Result<()>;

    /// Return at most `top_k` results sorted by descending similarity,
    /// ties broken by ascending chunk id.
    ///
    /// # Errors
    ///
    /// [`RagError::IndexUnavailable`](crate::RagError::IndexUnavailable) if
    /// the index is empty or cannot be read, so that an empty result is
    /// never mistaken for "no relevant content".
    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>>;

    /// Chunks of `chunk`'s document whose position is within `window` of
    /// `chunk.position`, excluding `chunk` itself, ordered by position.
    async fn neighbors(&self, chunk: &Chunk, window: usize) -> Result<Vec<Chunk>>;

    /// Number of indexed chunks.
    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Sort search results by descending similarity, then ascending chunk id,
/// and keep the first `top_k`.
pub fn rank_results(mut results: Vec<SearchResult>, top_k: usize) -> Vec<SearchResult> {
    results.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    results.truncate(top_k);
    results
}

/// Position range `[position - window, position + window]`, saturating at 0.
pub fn neighbor_range(position: usize, window: usize) -> std::ops::RangeInclusive<usize> {
    position.saturating_sub(window)..=position.saturating_add(window)
}
