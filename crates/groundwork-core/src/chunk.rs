//! Sentence-boundary text chunker with overlap.
//!
//! Splits document text into [`Chunk`]s of at most `max_chunk_size`
//! characters. Splitting happens between sentence-like units so a chunk
//! never cuts a sentence in half.
//!
//! # Algorithm
//!
//! 1. Segment the text into units. A unit ends at `.`, `!` or `?` followed
//!    by whitespace. The separating whitespace belongs to no unit.
//! 2. Greedily extend the current chunk to the end of the next unit. A
//!    chunk's content is the verbatim slice of the document, so whitespace
//!    inside a chunk is preserved.
//! 3. When the extension would exceed `max_chunk_size` characters, flush the
//!    chunk and start the next one with that unit, prefixed by the last
//!    `overlap_size` characters of the flushed chunk.
//! 4. The carried tail is shortened until tail + unit fits. A single unit
//!    longer than `max_chunk_size` becomes its own oversized chunk, with no
//!    tail and no truncation.
//!
//! Chunk ids are UUID v5 values over the document id, position and chunking
//! parameters. They never depend on content, so re-chunking with different
//! parameters yields different ids.
//!
//! # Example
//!
//! ```rust
//! use groundwork_core::chunk::split_text;
//!
//! let chunks = split_text("doc-123", "A. B. C.", 4, 0);
//! let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
//! assert_eq!(contents, ["A.", "B.", "C."]);
//! assert_eq!(chunks[2].position, 2);
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{RagError, Result};
use crate::models::{Chunk, Document};

/// Chunk size limits, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Upper bound on chunk length (oversized single units excepted).
    pub max_chunk_size: usize,
    /// Characters of the previous chunk carried into the next one.
    pub overlap_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 1000,
            overlap_size: 100,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 {
            return Err(RagError::InvalidConfig(
                "chunking.max_chunk_size must be > 0".into(),
            ));
        }
        if self.overlap_size >= self.max_chunk_size {
            return Err(RagError::InvalidConfig(format!(
                "chunking.overlap_size ({}) must be smaller than max_chunk_size ({})",
                self.overlap_size, self.max_chunk_size
            )));
        }
        Ok(())
    }
}

/// Splits [`Document`]s with a validated [`ChunkingConfig`].
#[derive(Debug, Clone)]
pub struct ChunkManager {
    config: ChunkingConfig,
}

impl ChunkManager {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Split a document and stamp its URI and title on every chunk.
    pub fn split(&self, document: &Document) -> Vec<Chunk> {
        split_text(
            &document.id,
            &document.body,
            self.config.max_chunk_size,
            self.config.overlap_size,
        )
        .into_iter()
        .map(|mut chunk| {
            chunk.uri = document.uri.clone();
            chunk.title = document.title.clone();
            chunk
        })
        .collect()
    }
}

/// Split `text` into chunks of at most `max_chunk_size` characters.
///
/// # Guarantees
///
/// - Positions are contiguous: `0, 1, …, N-1`.
/// - `length == content.chars().count()` for every chunk.
/// - No chunk exceeds `max_chunk_size` unless it consists of a single
///   oversized unit.
/// - Empty or whitespace-only text yields no chunks.
/// - Joining every chunk's [`fresh_content`](Chunk::fresh_content) with
///   spaces reproduces the text up to whitespace.
pub fn split_text(
    document_id: &str,
    text: &str,
    max_chunk_size: usize,
    overlap_size: usize,
) -> Vec<Chunk> {
    let max = max_chunk_size.max(1);
    let mut chunks = Vec::new();
    // (chunk start incl. overlap tail, first unit start, end of last unit)
    let mut current: Option<(usize, usize, usize)> = None;

    for (unit_start, unit_end) in sentence_spans(text) {
        let Some((start, first_unit, end)) = current else {
            current = Some((unit_start, unit_start, unit_end));
            continue;
        };

        if char_len(&text[start..unit_end]) <= max {
            current = Some((start, first_unit, unit_end));
            continue;
        }

        let position = chunks.len();
        chunks.push(make_chunk(
            document_id,
            position,
            text,
            (start, first_unit, end),
            (max_chunk_size, overlap_size),
        ));

        let tail = overlap_start(text, (start, end), (unit_start, unit_end), overlap_size, max);
        current = Some((tail, unit_start, unit_end));
    }

    if let Some(span) = current {
        let position = chunks.len();
        chunks.push(make_chunk(
            document_id,
            position,
            text,
            span,
            (max_chunk_size, overlap_size),
        ));
    }

    chunks
}

/// Byte spans of sentence-like units, whitespace excluded.
fn sentence_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    let mut last_end = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c.is_whitespace() {
            continue;
        }
        let unit_start = *start.get_or_insert(i);
        last_end = i + c.len_utf8();

        let at_boundary = matches!(c, '.' | '!' | '?')
            && chars.peek().is_some_and(|(_, next)| next.is_whitespace());
        if at_boundary {
            spans.push((unit_start, last_end));
            start = None;
        }
    }

    if let Some(unit_start) = start {
        spans.push((unit_start, last_end));
    }
    spans
}

/// Byte offset where the next chunk starts, carrying a tail of the
/// previous chunk `prev` so that tail + gap + `unit` stays within `max`.
fn overlap_start(
    text: &str,
    prev: (usize, usize),
    unit: (usize, usize),
    overlap_size: usize,
    max: usize,
) -> usize {
    if overlap_size == 0 {
        return unit.0;
    }
    let prev_text = &text[prev.0..prev.1];
    let prev_len = char_len(prev_text);
    let budget = max.saturating_sub(char_len(&text[prev.1..unit.1]));
    let keep = overlap_size.min(budget).min(prev_len);
    if keep == 0 {
        return unit.0;
    }

    let mut offset = prev_text
        .char_indices()
        .nth(prev_len - keep)
        .map(|(i, _)| i)
        .unwrap_or(prev_text.len());
    // Do not start a chunk on whitespace.
    while let Some(c) = prev_text[offset..].chars().next() {
        if !c.is_whitespace() {
            break;
        }
        offset += c.len_utf8();
    }

    if offset >= prev_text.len() {
        unit.0
    } else {
        prev.0 + offset
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Build a [`Chunk`] from a `(start, first_unit, end)` byte span.
fn make_chunk(
    document_id: &str,
    position: usize,
    text: &str,
    (start, first_unit, end): (usize, usize, usize),
    (max_chunk_size, overlap_size): (usize, usize),
) -> Chunk {
    let content = &text[start..end];

    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let name = format!("{document_id}:{position}:{max_chunk_size}:{overlap_size}");

    Chunk {
        id: Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string(),
        document_id: document_id.to_string(),
        position,
        length: char_len(content),
        content: content.to_string(),
        overlap: char_len(&text[start..first_unit]),
        hash,
        uri: None,
        title: None,
    }
}
