//! SQLite-backed [`VectorStore`].
//!
//! Embeddings are stored as little-endian f32 BLOBs next to the snippet
//! columns. Search loads every vector of the store's dimensionality and ranks
//! by cosine similarity, which is fine for a single repository.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::StoreError;
use crate::migrate;
use crate::models::{Embedding, Snippet};

use super::{check_dims, validate_batch, VectorStore};

pub struct SqliteStore {
    pool: SqlitePool,
    dims: usize,
}

impl SqliteStore {
    /// Open the database at `path`, creating and migrating it as needed.
    ///
    /// The first open records `dims` for the collection; later opens with a
    /// different dimensionality fail with [`StoreError::DimensionMismatch`].
    pub async fn open(path: &Path, dims: usize) -> Result<Self, StoreError> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        pin_dims(&pool, dims).await?;
        Ok(Self { pool, dims })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn pin_dims(pool: &SqlitePool, dims: usize) -> Result<(), StoreError> {
    let recorded: Option<i64> = sqlx::query_scalar("SELECT dims FROM collection_meta WHERE id = 1")
        .fetch_optional(pool)
        .await?;
    let recorded = match recorded {
        Some(recorded) => recorded,
        None => {
            // Databases written before the collection table existed.
            let existing: Option<i64> = sqlx::query_scalar("SELECT dims FROM snippets LIMIT 1")
                .fetch_optional(pool)
                .await?;
            let recorded = existing.unwrap_or(dims as i64);
            sqlx::query("INSERT OR IGNORE INTO collection_meta (id, dims) VALUES (1, ?)")
                .bind(recorded)
                .execute(pool)
                .await?;
            recorded
        }
    };

    if recorded != dims as i64 {
        return Err(StoreError::DimensionMismatch {
            expected: recorded.max(0) as usize,
            actual: dims,
        });
    }
    Ok(())
}

#[async_trait]
impl VectorStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert(&self, snippets: &[Snippet]) -> Result<(), StoreError> {
        validate_batch(self.dims, snippets)?;

        let mut tx = self.pool.begin().await?;
        for snippet in snippets {
            let embedding = super::require_embedding(self.dims, snippet)?;
            sqlx::query(
                r#"
                INSERT INTO snippets
                    (id, content, file_path, start_line, end_line, symbols_json, metadata_json, dims, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    content = excluded.content,
                    file_path = excluded.file_path,
                    start_line = excluded.start_line,
                    end_line = excluded.end_line,
                    symbols_json = excluded.symbols_json,
                    metadata_json = excluded.metadata_json,
                    dims = excluded.dims,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&snippet.id)
            .bind(&snippet.content)
            .bind(&snippet.file_path)
            .bind(snippet.start_line as i64)
            .bind(snippet.end_line as i64)
            .bind(serde_json::to_string(&snippet.symbols)?)
            .bind(serde_json::to_string(&snippet.metadata)?)
            .bind(self.dims as i64)
            .bind(vec_to_blob(embedding.as_slice()))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, embedding: &Embedding, k: usize) -> Result<Vec<Snippet>, StoreError> {
        check_dims(self.dims, embedding)?;

        let rows = sqlx::query(
            "SELECT id, content, file_path, start_line, end_line, symbols_json, metadata_json, embedding \
             FROM snippets WHERE dims = ?",
        )
        .bind(self.dims as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in rows {
            let blob: Vec<u8> = row.get("embedding");
            let score = cosine_similarity(embedding.as_slice(), &blob_to_vec(&blob));
            scored.push((score, row));
        }
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut results = Vec::with_capacity(k.min(scored.len()));
        for (_, row) in scored.into_iter().take(k) {
            let symbols_json: String = row.get("symbols_json");
            let metadata_json: String = row.get("metadata_json");
            let start_line: i64 = row.get("start_line");
            let end_line: i64 = row.get("end_line");
            let symbols: Vec<String> = serde_json::from_str(&symbols_json)?;
            let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_json)?;
            results.push(Snippet {
                id: row.get("id"),
                content: row.get("content"),
                file_path: row.get("file_path"),
                start_line: start_line.max(0) as usize,
                end_line: end_line.max(0) as usize,
                symbols,
                embedding: None,
                metadata,
            });
        }
        Ok(results)
    }
}
