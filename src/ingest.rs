//! Filesystem ingestion.
//!
//! Coordinates the indexing flow: scan → chunk → embed → store.
//!
//! Files are selected with include/exclude globs relative to the ingest
//! root. Each file becomes one [`Document`] whose identity is its path, so
//! re-ingesting a changed file replaces its chunks instead of duplicating
//! them. A `dedup_hash` over the body, the chunking parameters and the
//! embedding model and dimension lets unchanged files be skipped. Each
//! changed file is swapped in with a single transaction.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use walkdir::WalkDir;

use groundwork_core::chunk::{ChunkManager, ChunkingConfig};
use groundwork_core::index::VectorIndex;
use groundwork_core::Document;

use crate::config::{Config, IngestConfig};
use crate::services::Services;

/// A file selected for ingestion.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub relative_path: String,
    pub uri: String,
    pub title: String,
    pub body: String,
    pub modified: i64,
}

impl SourceFile {
    /// Stable document id derived from the file URI.
    pub fn document_id(&self) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_URL, self.uri.as_bytes()).to_string()
    }

    pub fn to_document(&self) -> Document {
        Document::new(self.document_id(), self.body.clone())
            .with_uri(self.uri.clone())
            .with_title(self.title.clone())
    }
}

#[derive(Debug, Default)]
struct IngestReport {
    ingested: u64,
    unchanged: u64,
    empty: u64,
    chunks_written: u64,
}

pub async fn run_ingest(config: &Config, path: Option<PathBuf>, dry_run: bool) -> Result<()> {
    let root = match path.or_else(|| config.ingest.root.clone()) {
        Some(root) => root,
        None => bail!("No path given and [ingest].root is not set"),
    };
    let files = scan_files(&root, &config.ingest)?;
    let chunker = ChunkManager::new(config.chunking)?;

    if dry_run {
        let total_chunks: usize = files
            .iter()
            .map(|f| chunker.split(&f.to_document()).len())
            .sum();
        println!("ingest {} (dry-run)", root.display());
        println!("  files found: {}", files.len());
        println!("  estimated chunks: {}", total_chunks);
        return Ok(());
    }

    let services = Services::open(config).await?;
    let model = services.embedder.model_name().to_string();
    let dims = services.embedder.dims();
    let pool = services.index.pool().clone();
    let mut report = IngestReport::default();

    for file in &files {
        let doc = file.to_document();
        let hash = dedup_hash(&file.body, chunker.config(), &model, dims);

        if is_unchanged(&pool, &doc.id, &hash).await? {
            tracing::debug!(path = %file.relative_path, "unchanged, skipping");
            report.unchanged += 1;
            continue;
        }

        let chunks = chunker.split(&doc);
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = if texts.is_empty() {
            report.empty += 1;
            Vec::new()
        } else {
            services
                .embedder
                .embed_batch(&texts)
                .await
                .with_context(|| format!("Failed to embed {}", file.relative_path))?
        };

        if vectors.len() != chunks.len() {
            bail!(
                "Embedder returned {} vectors for {} chunks of {}",
                vectors.len(),
                chunks.len(),
                file.relative_path
            );
        }
        let chunk_count = chunks.len();
        let rows: Vec<_> = chunks.into_iter().zip(vectors).collect();
        services
            .index
            .replace_document(&doc, &rows, &hash, file.modified)
            .await
            .with_context(|| format!("Failed to store {}", file.relative_path))?;

        tracing::info!(path = %file.relative_path, chunks = chunk_count, "ingested");
        report.ingested += 1;
        report.chunks_written += chunk_count as u64;
    }

    let indexed = services.index.len().await?;

    println!("ingest {}", root.display());
    println!("  files found: {}", files.len());
    println!("  ingested documents: {}", report.ingested);
    println!("  unchanged: {}", report.unchanged);
    if report.empty > 0 {
        println!("  empty: {}", report.empty);
    }
    println!("  chunks written: {}", report.chunks_written);
    println!("  indexed chunks ({}): {}", model, indexed);
    println!("  dimensions: {}", dims);
    println!("ok");

    services.close().await;
    Ok(())
}

/// Walk `root` and read every file matching the configured globs, sorted
/// by relative path. A file path is accepted as a single-file root.
pub fn scan_files(root: &Path, config: &IngestConfig) -> Result<Vec<SourceFile>> {
    if !root.exists() {
        bail!("Ingest root does not exist: {}", root.display());
    }
    if root.is_file() {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        return Ok(vec![read_source_file(root, &name)?]);
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        files.push(read_source_file(path, &rel_str)?);
    }

    // Sort for deterministic ordering
    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    Ok(files)
}

fn read_source_file(path: &Path, relative_path: &str) -> Result<SourceFile> {
    let metadata = std::fs::metadata(path)?;
    let modified = metadata
        .modified()
        .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;

    let body = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} as UTF-8 text", path.display()))?;

    let title = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let absolute = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

    Ok(SourceFile {
        relative_path: relative_path.to_string(),
        uri: format!("file://{}", absolute.display()),
        title,
        body,
        modified,
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

fn dedup_hash(body: &str, chunking: &ChunkingConfig, model: &str, dims: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    hasher.update((chunking.max_chunk_size as u64).to_le_bytes());
    hasher.update((chunking.overlap_size as u64).to_le_bytes());
    hasher.update(model.as_bytes());
    hasher.update((dims as u64).to_le_bytes());
    format!("{:x}", hasher.finalize())
}

async fn is_unchanged(pool: &SqlitePool, document_id: &str, hash: &str) -> Result<bool> {
    let existing: Option<String> =
        sqlx::query_scalar("SELECT dedup_hash FROM documents WHERE id = ?")
            .bind(document_id)
            .fetch_optional(pool)
            .await?;
    Ok(existing.as_deref() == Some(hash))
}
