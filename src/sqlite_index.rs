//! SQLite-backed [`VectorIndex`] implementation.
//!
//! Chunks live in `chunks`, embeddings in `chunk_vectors` as little-endian
//! f32 BLOBs. Search is brute-force cosine similarity in process over every
//! vector produced by the configured embedding model at the configured
//! dimension; vectors written by a different model or dimension are ignored.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use groundwork_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use groundwork_core::index::{neighbor_range, rank_results, VectorIndex};
use groundwork_core::models::{Chunk, SearchResult};
use groundwork_core::{Document, RagError, Result};

/// SQLite implementation of the [`VectorIndex`] trait.
pub struct SqliteIndex {
    pool: SqlitePool,
    model: String,
    dims: usize,
}

impl SqliteIndex {
    /// `model` and `dims` tag written vectors and scope searches.
    pub fn new(pool: SqlitePool, model: impl Into<String>, dims: usize) -> Self {
        Self {
            pool,
            model: model.into(),
            dims,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Remove every chunk (and its vector) of `document_id`.
    pub async fn delete_document(&self, document_id: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        let removed = delete_chunks(&mut tx, document_id).await?;
        tx.commit().await.map_err(unavailable)?;
        Ok(removed)
    }

    /// Swap a document's chunks, vectors and `documents` row in one
    /// transaction. On any failure the previous state is kept. A document
    /// without a URI is stored under its id.
    pub async fn replace_document(
        &self,
        doc: &Document,
        chunks: &[(Chunk, Vec<f32>)],
        dedup_hash: &str,
        updated_at: i64,
    ) -> Result<()> {
        for (chunk, embedding) in chunks {
            self.check_dims(embedding)?;
            if chunk.document_id != doc.id {
                return Err(RagError::IndexUnavailable(format!(
                    "chunk {} belongs to {}, not {}",
                    chunk.id, chunk.document_id, doc.id
                )));
            }
        }

        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        delete_chunks(&mut tx, &doc.id).await?;
        for (chunk, embedding) in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, position, content, overlap, hash, uri, title)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.position as i64)
            .bind(&chunk.content)
            .bind(chunk.overlap as i64)
            .bind(&chunk.hash)
            .bind(&chunk.uri)
            .bind(&chunk.title)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;
            self.write_vector(&mut tx, chunk, embedding).await?;
        }

        sqlx::query(
            r#"
            INSERT INTO documents (id, uri, title, body, dedup_hash, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                uri = excluded.uri,
                title = excluded.title,
                body = excluded.body,
                dedup_hash = excluded.dedup_hash,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&doc.id)
        .bind(doc.uri.as_deref().unwrap_or(&doc.id))
        .bind(&doc.title)
        .bind(&doc.body)
        .bind(dedup_hash)
        .bind(updated_at)
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?;

        tx.commit().await.map_err(unavailable)?;
        Ok(())
    }

    fn check_dims(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dims {
            return Err(RagError::EmbeddingFailed(format!(
                "expected {} dimensions, got {}",
                self.dims,
                embedding.len()
            )));
        }
        Ok(())
    }

    async fn write_vector(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        chunk: &Chunk,
        embedding: &[f32],
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chunk_vectors (chunk_id, document_id, model, dims, embedding)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                document_id = excluded.document_id,
                model = excluded.model,
                dims = excluded.dims,
                embedding = excluded.embedding
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(&self.model)
        .bind(self.dims as i64)
        .bind(vec_to_blob(embedding))
        .execute(&mut **tx)
        .await
        .map_err(unavailable)?;
        Ok(())
    }
}

async fn delete_chunks(tx: &mut Transaction<'_, Sqlite>, document_id: &str) -> Result<u64> {
    sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut **tx)
        .await
        .map_err(unavailable)?;
    let removed = sqlx::query("DELETE FROM chunks WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut **tx)
        .await
        .map_err(unavailable)?
        .rows_affected();
    Ok(removed)
}

fn unavailable(e: sqlx::Error) -> RagError {
    RagError::IndexUnavailable(e.to_string())
}

fn row_to_chunk(row: &SqliteRow) -> Chunk {
    let content: String = row.get("content");
    Chunk {
        id: row.get("id"),
        document_id: row.get("document_id"),
        position: row.get::<i64, _>("position") as usize,
        length: content.chars().count(),
        overlap: row.get::<i64, _>("overlap") as usize,
        hash: row.get("hash"),
        uri: row.get("uri"),
        title: row.get("title"),
        content,
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn upsert(&self, chunk: &Chunk, embedding: &[f32]) -> Result<()> {
        self.check_dims(embedding)?;
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        // A different chunk id at the same position means the document was
        // re-chunked with other parameters.
        sqlx::query(
            "DELETE FROM chunk_vectors WHERE chunk_id IN \
             (SELECT id FROM chunks WHERE document_id = ? AND position = ? AND id != ?)",
        )
        .bind(&chunk.document_id)
        .bind(chunk.position as i64)
        .bind(&chunk.id)
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?;
        sqlx::query("DELETE FROM chunks WHERE document_id = ? AND position = ? AND id != ?")
            .bind(&chunk.document_id)
            .bind(chunk.position as i64)
            .bind(&chunk.id)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;

        sqlx::query(
            r#"
            INSERT INTO chunks (id, document_id, position, content, overlap, hash, uri, title)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                document_id = excluded.document_id,
                position = excluded.position,
                content = excluded.content,
                overlap = excluded.overlap,
                hash = excluded.hash,
                uri = excluded.uri,
                title = excluded.title
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.position as i64)
        .bind(&chunk.content)
        .bind(chunk.overlap as i64)
        .bind(&chunk.hash)
        .bind(&chunk.uri)
        .bind(&chunk.title)
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?;

        self.write_vector(&mut tx, chunk, embedding).await?;

        tx.commit().await.map_err(unavailable)?;
        Ok(())
    }

    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Err(RagError::InvalidConfig("top_k must be > 0".into()));
        }
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.document_id, c.position, c.content, c.overlap, c.hash, c.uri, c.title,
                   cv.embedding
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            WHERE cv.model = ? AND cv.dims = ?
            "#,
        )
        .bind(&self.model)
        .bind(self.dims as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        if rows.is_empty() {
            return Err(RagError::IndexUnavailable(format!(
                "no chunks embedded with model '{}' at {} dimensions; run `gw ingest` first",
                self.model, self.dims
            )));
        }

        let results = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                SearchResult {
                    chunk: row_to_chunk(row),
                    similarity: cosine_similarity(query, &blob_to_vec(&blob)),
                }
            })
            .collect();
        Ok(rank_results(results, top_k))
    }

    async fn neighbors(&self, chunk: &Chunk, window: usize) -> Result<Vec<Chunk>> {
        if window == 0 {
            return Ok(Vec::new());
        }
        let range = neighbor_range(chunk.position, window);
        let rows = sqlx::query(
            r#"
            SELECT id, document_id, position, content, overlap, hash, uri, title
            FROM chunks
            WHERE document_id = ? AND position BETWEEN ? AND ? AND position != ?
            ORDER BY position
            "#,
        )
        .bind(&chunk.document_id)
        .bind(*range.start() as i64)
        .bind((*range.end()).min(i64::MAX as usize) as i64)
        .bind(chunk.position as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(rows.iter().map(row_to_chunk).collect())
    }

    async fn len(&self) -> Result<usize> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors WHERE model = ? AND dims = ?")
                .bind(&self.model)
                .bind(self.dims as i64)
                .fetch_one(&self.pool)
                .await
                .map_err(unavailable)?;
        Ok(count as usize)
    }
}
