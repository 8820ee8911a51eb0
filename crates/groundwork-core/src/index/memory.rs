//! In-memory [`VectorIndex`] implementation for tests and small corpora.
//!
//! Uses `HashMap`/`BTreeMap` behind `std::sync::RwLock`. Search is
//! brute-force cosine similarity over every stored vector.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{RagError, Result};
use crate::models::{Chunk, SearchResult};

use super::{neighbor_range, rank_results, VectorIndex};

struct StoredChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

#[derive(Default)]
struct Inner {
    chunks: HashMap<String, StoredChunk>,
    /// (document_id, position) → chunk id
    by_position: BTreeMap<(String, usize), String>,
}

/// In-memory vector index.
#[derive(Default)]
pub struct InMemoryIndex {
    inner: RwLock<Inner>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| RagError::IndexUnavailable("in-memory index lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| RagError::IndexUnavailable("in-memory index lock poisoned".into()))
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, chunk: &Chunk, embedding: &[f32]) -> Result<()> {
        let mut inner = self.write()?;
        if let Some(previous) = inner.chunks.remove(&chunk.id) {
            let key = (previous.chunk.document_id, previous.chunk.position);
            if inner.by_position.get(&key) == Some(&chunk.id) {
                inner.by_position.remove(&key);
            }
        }
        inner.by_position.insert(
            (chunk.document_id.clone(), chunk.position),
            chunk.id.clone(),
        );
        inner.chunks.insert(
            chunk.id.clone(),
            StoredChunk {
                chunk: chunk.clone(),
                vector: embedding.to_vec(),
            },
        );
        Ok(())
    }

    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Err(RagError::InvalidConfig("top_k must be > 0".into()));
        }
        let inner = self.read()?;
        if inner.chunks.is_empty() {
            return Err(RagError::IndexUnavailable("index is empty".into()));
        }
        let results = inner
            .chunks
            .values()
            .map(|stored| SearchResult {
                chunk: stored.chunk.clone(),
                similarity: cosine_similarity(query, &stored.vector),
            })
            .collect();
        Ok(rank_results(results, top_k))
    }

    async fn neighbors(&self, chunk: &Chunk, window: usize) -> Result<Vec<Chunk>> {
        if window == 0 {
            return Ok(Vec::new());
        }
        let inner = self.read()?;
        let range = neighbor_range(chunk.position, window);
        let lo = (chunk.document_id.clone(), *range.start());
        let hi = (chunk.document_id.clone(), *range.end());
        Ok(inner
            .by_position
            .range(lo..=hi)
            .filter(|((_, position), _)| *position != chunk.position)
            .filter_map(|(_, id)| inner.chunks.get(id))
            .map(|stored| stored.chunk.clone())
            .collect())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.read()?.chunks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::split_text;

    async fn seeded() -> (InMemoryIndex, Vec<Chunk>) {
        let index = InMemoryIndex::new();
        let chunks = split_text("doc", "Zero. One. Two. Three. Four. Five.", 6, 0);
        assert_eq!(chunks.len(), 6);
        for (i, c) in chunks.iter().enumerate() {
            index.upsert(c, &[1.0, i as f32]).await.unwrap();
        }
        (index, chunks)
    }

    #[tokio::test]
    async fn test_empty_index_is_unavailable() {
        let index = InMemoryIndex::new();
        let err = index.search(&[1.0], 3).await.unwrap_err();
        assert!(matches!(err, RagError::IndexUnavailable(_)));
    }

    #[tokio::test]
    async fn test_zero_top_k_rejected() {
        let (index, _) = seeded().await;
        assert!(matches!(
            index.search(&[1.0, 0.0], 0).await,
            Err(RagError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_search_sorted_and_truncated() {
        let (index, chunks) = seeded().await;
        let results = index.search(&[0.0, 1.0], 3).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].chunk.id, chunks[5].id);
        for pair in results.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
    }

    #[tokio::test]
    async fn test_upsert_idempotent() {
        let (index, chunks) = seeded().await;
        index.upsert(&chunks[0], &[0.0, 1.0]).await.unwrap();
        index.upsert(&chunks[0], &[0.0, 1.0]).await.unwrap();
        assert_eq!(index.len().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_neighbors_window() {
        let (index, chunks) = seeded().await;
        let around_two: Vec<usize> = index
            .neighbors(&chunks[2], 2)
            .await
            .unwrap()
            .iter()
            .map(|c| c.position)
            .collect();
        assert_eq!(around_two, vec![0, 1, 3, 4]);

        let at_start: Vec<usize> = index
            .neighbors(&chunks[0], 1)
            .await
            .unwrap()
            .iter()
            .map(|c| c.position)
            .collect();
        assert_eq!(at_start, vec![1]);
        assert!(index.neighbors(&chunks[0], 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_neighbors_stay_in_document() {
        let (index, _) = seeded().await;
        let other = split_text("other", "Alpha. Beta.", 6, 0);
        for c in &other {
            index.upsert(c, &[1.0, 0.0]).await.unwrap();
        }
        let found = index.neighbors(&other[0], 5).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].document_id, "other");
    }
}
