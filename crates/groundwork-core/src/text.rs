//! Lowercase term extraction shared by the lexical scorer, response
//! validation and citation attribution.

use std::collections::HashSet;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "can", "did", "do", "for", "has",
    "how", "in", "is", "it", "its", "not", "of", "on", "or", "the", "to", "was", "who", "why",
    "you", "about", "above", "after", "again", "also", "been", "before", "being", "both", "cannot",
    "could", "does", "doing", "each", "from", "have", "having", "here", "into", "just", "more",
    "most", "only", "other", "over", "same", "should", "some", "such", "than", "that", "their",
    "them", "then", "there", "these", "they", "this", "those", "through", "under", "very",
    "were", "what", "when", "where", "which", "while", "will", "with", "would", "your",
];

/// Alphanumeric lowercase tokens.
pub(crate) fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// Distinct tokens of at least `min_len` characters that are not stopwords.
pub(crate) fn content_terms(text: &str, min_len: usize) -> HashSet<String> {
    tokens(text)
        .filter(|t| t.chars().count() >= min_len && !STOPWORDS.contains(&t.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_terms_filters_short_and_stopwords() {
        let terms = content_terms("The Rust compiler, which is FAST, compiles crates.", 4);
        assert!(terms.contains("rust"));
        assert!(terms.contains("compiler"));
        assert!(terms.contains("fast"));
        assert!(!terms.contains("which"));
        assert!(!terms.contains("the"));
    }
}
