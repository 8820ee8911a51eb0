//! `retrieve` and `ask` commands.
//!
//! `retrieve` runs only the retrieval half of the pipeline (embed, search,
//! neighbor expansion, rerank, score filter) and prints the ranked passages.
//! `ask` runs the full pipeline and prints the generated answer with its
//! sources. Both accept per-call overrides and a `--json` switch.

use anyhow::Result;

use groundwork_core::{Answer, PipelineMode, ProcessOptions, ScoredResult};

use crate::config::Config;
use crate::services::Services;

const SNIPPET_CHARS: usize = 240;

/// Command-line overrides shared by `retrieve` and `ask`.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOverrides {
    pub top_k: Option<usize>,
    pub min_score: Option<f32>,
    pub context_window: Option<usize>,
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl QueryOverrides {
    pub fn process_options(&self, decompose: bool) -> ProcessOptions {
        ProcessOptions {
            mode: decompose.then_some(PipelineMode::Decomposing),
            top_k: self.top_k,
            min_score: self.min_score,
            context_window: self.context_window,
            max_output_tokens: self.max_output_tokens,
            temperature: self.temperature,
        }
    }
}

pub async fn run_retrieve(
    config: &Config,
    query: &str,
    overrides: QueryOverrides,
    json: bool,
) -> Result<()> {
    let services = Services::open(config).await?;
    let retriever = services.retriever(config)?;
    let retriever_config = overrides
        .process_options(false)
        .retriever_config(retriever.config());
    let results = retriever.retrieve_with(query, &retriever_config).await?;
    services.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    print_results(&results);
    Ok(())
}

fn print_results(results: &[ScoredResult]) {
    for (i, result) in results.iter().enumerate() {
        let source = result.chunk.source_ref();
        println!("{}. [{:.2}] {}", i + 1, result.score, source.label());
        if let Some(ref uri) = source.uri {
            println!("    uri: {}", uri);
        }
        println!("    excerpt: \"{}\"", snippet(result.chunk.fresh_content()));
        println!("    id: {}", result.chunk.id);
        println!();
    }
}

fn snippet(content: &str) -> String {
    let flat = content.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= SNIPPET_CHARS {
        return flat.to_string();
    }
    let cut: String = flat.chars().take(SNIPPET_CHARS).collect();
    format!("{}...", cut.trim_end())
}

pub async fn run_ask(
    config: &Config,
    query: &str,
    decompose: bool,
    overrides: QueryOverrides,
    json: bool,
) -> Result<()> {
    let services = Services::open(config).await?;
    let pipeline = services.pipeline(config)?;
    let outcome = pipeline
        .process_with(query, &overrides.process_options(decompose))
        .await;
    services.close().await;

    let answer = match outcome {
        Ok(answer) => answer,
        Err(e) => {
            let partial = e.partial_results();
            if !partial.is_empty() {
                eprintln!("{} partial answer(s) before the failure:", partial.len());
                for answer in partial {
                    eprintln!("---");
                    eprintln!("{}", answer.response);
                }
            }
            return Err(e.into());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        print_answer(&answer);
    }
    Ok(())
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.response.trim_end());
    println!();
    if answer.insufficient_context {
        println!("(no passage met the relevance threshold)");
    } else {
        println!(
            "validation: {}",
            serde_json::to_value(answer.validation)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default()
        );
    }
}
