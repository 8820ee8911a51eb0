//! Typed error taxonomy for the retrieval and generation pipeline.
//!
//! Service adapters retry transient failures themselves and only surface an
//! error once retries are exhausted. Everything that reaches a caller of
//! [`RagPipeline::process`](crate::pipeline::RagPipeline::process) is one of
//! these variants, never a raw service error.
//!
//! An empty retrieval result is *not* an error: it produces an
//! [`Answer`] flagged `insufficient_context`. Likewise a response that is
//! still invalid after the single regeneration is accepted and reported as
//! [`Validation::Exhausted`](crate::models::Validation::Exhausted).

use std::time::Duration;

use thiserror::Error;

use crate::models::Answer;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("relevance scoring failed: {0}")]
    ScoringFailed(String),

    #[error("retrieval failed: {cause}")]
    RetrievalFailed {
        #[source]
        cause: Box<RagError>,
    },

    #[error("generation failed: {0}")]
    GenerationFailed(String),

    #[error(
        "decomposition failed on sub-query {failed_query:?} ({} partial answers kept): {cause}",
        partial_results.len()
    )]
    DecompositionFailed {
        partial_results: Vec<Answer>,
        failed_query: String,
        #[source]
        cause: Box<RagError>,
    },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, RagError>;

impl RagError {
    /// Wrap an embedding, index or scoring failure at the retriever boundary.
    pub fn retrieval(cause: RagError) -> Self {
        match cause {
            already @ RagError::RetrievalFailed { .. } => already,
            other => RagError::RetrievalFailed {
                cause: Box::new(other),
            },
        }
    }

    /// True when the error means a backing service could not serve the
    /// request, as opposed to a configuration problem.
    ///
    /// Lets callers tell "system unavailable" apart from "no relevant
    /// content", which is never an error.
    pub fn is_unavailable(&self) -> bool {
        match self {
            RagError::EmbeddingFailed(_)
            | RagError::IndexUnavailable(_)
            | RagError::ScoringFailed(_)
            | RagError::GenerationFailed(_)
            | RagError::Timeout(_) => true,
            RagError::RetrievalFailed { cause } | RagError::DecompositionFailed { cause, .. } => {
                cause.is_unavailable()
            }
            RagError::InvalidConfig(_) => false,
        }
    }

    /// Successful sub-answers carried by a [`RagError::DecompositionFailed`].
    pub fn partial_results(&self) -> &[Answer] {
        match self {
            RagError::DecompositionFailed {
                partial_results, ..
            } => partial_results,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieval_wrap_is_not_nested() {
        let err = RagError::retrieval(RagError::IndexUnavailable("empty".into()));
        let err = RagError::retrieval(err);
        match err {
            RagError::RetrievalFailed { cause } => {
                assert!(matches!(*cause, RagError::IndexUnavailable(_)));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_unavailable_classification() {
        assert!(RagError::retrieval(RagError::EmbeddingFailed("down".into())).is_unavailable());
        assert!(RagError::Timeout(Duration::from_secs(1)).is_unavailable());
        assert!(!RagError::InvalidConfig("top_k".into()).is_unavailable());
    }

    #[test]
    fn test_display_includes_cause() {
        let err = RagError::retrieval(RagError::ScoringFailed("503".into()));
        assert_eq!(
            err.to_string(),
            "retrieval failed: relevance scoring failed: 503"
        );
    }
}
