//! Query decomposition into independent sub-queries.
//!
//! A decomposer never returns an empty list: a query that cannot be split
//! comes back as a single sub-query holding the original text.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{RagError, Result};
use crate::llm::{CompletionOptions, LanguageModel};
use crate::models::SubQuery;

#[async_trait]
pub trait QueryDecomposer: Send + Sync {
    async fn decompose(&self, query: &str) -> Result<Vec<SubQuery>>;
}

/// Rule-based splitter.
///
/// Splits on question marks, semicolons and line breaks, and strips list
/// markers (`-`, `*`, `1.`, `2)`) from line-broken items.
#[derive(Debug, Clone)]
pub struct HeuristicDecomposer {
    max_sub_queries: usize,
}

impl HeuristicDecomposer {
    pub fn new(max_sub_queries: usize) -> Result<Self> {
        if max_sub_queries == 0 {
            return Err(RagError::InvalidConfig(
                "pipeline.max_sub_queries must be > 0".into(),
            ));
        }
        Ok(Self { max_sub_queries })
    }

    fn split(query: &str) -> Vec<String> {
        let mut parts = Vec::new();
        for line in query.lines() {
            let line = strip_list_marker(line);
            for clause in line.split(';') {
                let mut rest = clause;
                while let Some(idx) = rest.find('?') {
                    parts.push(rest[..=idx].to_string());
                    rest = &rest[idx + 1..];
                }
                parts.push(rest.to_string());
            }
        }
        parts
    }
}

impl Default for HeuristicDecomposer {
    fn default() -> Self {
        Self { max_sub_queries: 4 }
    }
}

#[async_trait]
impl QueryDecomposer for HeuristicDecomposer {
    async fn decompose(&self, query: &str) -> Result<Vec<SubQuery>> {
        let parts = Self::split(query);
        Ok(sub_queries(query, parts, self.max_sub_queries))
    }
}

/// Asks a language model to list independent sub-questions.
///
/// Model failures and empty replies fall back to the original query.
pub struct LlmDecomposer {
    model: Arc<dyn LanguageModel>,
    max_sub_queries: usize,
}

impl LlmDecomposer {
    pub fn new(model: Arc<dyn LanguageModel>, max_sub_queries: usize) -> Result<Self> {
        if max_sub_queries == 0 {
            return Err(RagError::InvalidConfig(
                "pipeline.max_sub_queries must be > 0".into(),
            ));
        }
        Ok(Self {
            model,
            max_sub_queries,
        })
    }

    fn prompt(&self, query: &str) -> String {
        format!(
            "Break the question below into at most {} independent sub-questions that can each \
             be answered on their own. Write one sub-question per line and nothing else. If the \
             question cannot be broken down, repeat it unchanged.\n\
             Question: {query}\n\
             Sub-questions:",
            self.max_sub_queries
        )
    }
}

#[async_trait]
impl QueryDecomposer for LlmDecomposer {
    async fn decompose(&self, query: &str) -> Result<Vec<SubQuery>> {
        let options = CompletionOptions {
            max_tokens: 256,
            temperature: 0.0,
        };
        let parts = match self.model.complete(&self.prompt(query), &options).await {
            Ok(reply) => reply
                .lines()
                .map(|l| strip_list_marker(l).to_string())
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "decomposition model failed, using original query");
                Vec::new()
            }
        };
        Ok(sub_queries(query, parts, self.max_sub_queries))
    }
}

/// Trim, drop empties, deduplicate case-insensitively, cap. Falls back to
/// the original query when nothing is left.
fn sub_queries(query: &str, parts: Vec<String>, max: usize) -> Vec<SubQuery> {
    let parent_query_id = Uuid::new_v4().to_string();
    let mut seen = HashSet::new();
    let mut texts: Vec<String> = parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| p.chars().any(char::is_alphanumeric))
        .filter(|p| seen.insert(p.to_lowercase()))
        .take(max)
        .collect();
    if texts.is_empty() {
        texts.push(query.trim().to_string());
    }
    texts
        .into_iter()
        .map(|text| SubQuery {
            id: Uuid::new_v4().to_string(),
            text,
            parent_query_id: parent_query_id.clone(),
        })
        .collect()
}

/// `"  2) foo"` → `"foo"`, `"- bar"` → `"bar"`.
fn strip_list_marker(line: &str) -> &str {
    let line = line.trim_start();
    if let Some(rest) = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .or_else(|| line.strip_prefix("• "))
    {
        return rest;
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return rest;
        }
    }
    line
}
