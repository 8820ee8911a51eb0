//! Index statistics.
//!
//! A quick summary of what is indexed: document and chunk counts, embedding
//! coverage, and a per-model breakdown of stored vectors. Used by `gw stats`
//! to confirm that ingestion produced what the retriever will search.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::{db, migrate};

/// Vectors stored for one embedding model at one dimension.
struct ModelStats {
    model: String,
    dims: i64,
    vector_count: i64,
    doc_count: i64,
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;

    let total_docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(&pool)
        .await?;

    let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(&pool)
        .await?;

    let total_embedded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
        .fetch_one(&pool)
        .await?;

    let newest_doc: Option<i64> = sqlx::query_scalar("SELECT MAX(updated_at) FROM documents")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Groundwork Index Stats");
    println!("======================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", total_docs);
    println!("  Chunks:      {}", total_chunks);
    println!(
        "  Embedded:    {} / {} ({}%)",
        total_embedded,
        total_chunks,
        if total_chunks > 0 {
            (total_embedded * 100) / total_chunks
        } else {
            0
        }
    );
    println!(
        "  Newest doc:  {}",
        match newest_doc {
            Some(ts) => format_ts_relative(ts),
            None => "never".to_string(),
        }
    );

    let model_rows = sqlx::query(
        r#"
        SELECT
            model,
            dims,
            COUNT(*) AS vector_count,
            COUNT(DISTINCT document_id) AS doc_count
        FROM chunk_vectors
        GROUP BY model, dims
        ORDER BY vector_count DESC, model ASC, dims ASC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let model_stats: Vec<ModelStats> = model_rows
        .iter()
        .map(|row| ModelStats {
            model: row.get("model"),
            dims: row.get("dims"),
            vector_count: row.get("vector_count"),
            doc_count: row.get("doc_count"),
        })
        .collect();

    if !model_stats.is_empty() {
        println!();
        println!("  By embedding model:");
        println!(
            "  {:<32} {:>6} {:>8} {:>6}",
            "MODEL", "DIMS", "VECTORS", "DOCS"
        );
        println!("  {}", "-".repeat(56));

        for s in &model_stats {
            println!(
                "  {:<32} {:>6} {:>8} {:>6}",
                s.model, s.dims, s.vector_count, s.doc_count
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
