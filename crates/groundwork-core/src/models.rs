//! Core data models that flow through the ingestion and query pipeline.
//!
//! [`Document`] → [`Chunk`] at ingestion time; [`SearchResult`] →
//! [`ScoredResult`] → [`Answer`] at query time.

use serde::{Deserialize, Serialize};

/// Raw text plus source metadata. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub body: String,
    pub uri: Option<String>,
    pub title: Option<String>,
}

impl Document {
    pub fn new(id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            uri: None,
            title: None,
        }
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// A bounded segment of a document, the atomic unit of retrieval.
///
/// `length` is the character count of `content`. `overlap` is the number of
/// leading characters of `content` carried over from the previous chunk of
/// the same document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub position: usize,
    pub length: usize,
    pub content: String,
    pub overlap: usize,
    /// SHA-256 of `content`, used for staleness checks only.
    pub hash: String,
    pub uri: Option<String>,
    pub title: Option<String>,
}

impl Chunk {
    /// The content with the carried-over overlap prefix removed.
    pub fn fresh_content(&self) -> &str {
        match self.content.char_indices().nth(self.overlap) {
            Some((idx, _)) => &self.content[idx..],
            None if self.overlap == 0 => &self.content,
            None => "",
        }
    }

    pub fn source_ref(&self) -> SourceRef {
        SourceRef {
            chunk_id: self.id.clone(),
            document_id: self.document_id.clone(),
            position: self.position,
            uri: self.uri.clone(),
            title: self.title.clone(),
        }
    }
}

/// Source attribution for a chunk used as answer context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub chunk_id: String,
    pub document_id: String,
    pub position: usize,
    pub uri: Option<String>,
    pub title: Option<String>,
}

impl SourceRef {
    /// Human-readable label: title, then URI, then document id.
    pub fn label(&self) -> String {
        let name = self
            .title
            .as_deref()
            .or(self.uri.as_deref())
            .unwrap_or(&self.document_id);
        format!("{} (chunk {})", name, self.position)
    }
}

/// A first-pass hit from the vector index. `similarity` is cosine in `[-1, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub chunk: Chunk,
    pub similarity: f32,
}

/// A reranked candidate. Higher `score` means more relevant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub chunk: Chunk,
    pub score: f32,
}

/// One independent piece of a decomposed query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubQuery {
    pub id: String,
    pub text: String,
    pub parent_query_id: String,
}

/// Outcome of response validation in the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Validation {
    /// First response was valid.
    Passed,
    /// First response was invalid; the regenerated one is valid.
    Regenerated,
    /// Both responses were invalid; the second was accepted anyway.
    Exhausted,
    /// No model call was made (empty context).
    Skipped,
}

/// Final pipeline output.
///
/// `sources` lists the metadata of every chunk that was given to the model,
/// in context order. `cited` holds the indices into `sources` the response
/// was attributed to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub response: String,
    pub sources: Vec<SourceRef>,
    pub cited: Vec<usize>,
    pub insufficient_context: bool,
    pub validation: Validation,
}
