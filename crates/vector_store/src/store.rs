use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::index::VectorIndex;
use crate::migrations::run_migrations;
use crate::models::{Chunk, SearchResult, SourceSummary};

/// Chunks stored in PostgreSQL, searched with pgvector's cosine distance.
pub struct PgVectorStore {
    pool: PgPool,
    embedding_dimensions: Option<usize>,
}

impl PgVectorStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::connect_with_dimensions(database_url, None).await
    }

    pub async fn connect_with_dimensions(
        database_url: &str,
        embedding_dimensions: Option<usize>,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        run_migrations(database_url)
            .await
            .context("Failed to run database migrations")?;

        tracing::info!(
            "Vector store initialization completed successfully with migrations applied"
        );

        Ok(Self {
            pool,
            embedding_dimensions,
        })
    }

    fn check_dimension(&self, len: usize, what: &str) -> Result<()> {
        match self.embedding_dimensions {
            Some(expected) if expected != len => Err(anyhow::anyhow!(
                "{} embedding dimension mismatch: expected {}, got {}",
                what,
                expected,
                len
            )),
            _ => Ok(()),
        }
    }
}

async fn insert_chunk(tx: &mut Transaction<'_, Postgres>, chunk: &Chunk) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO chunks (id, source_file, page, chunk_index, content, embedding, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(chunk.id)
    .bind(&chunk.source_file)
    .bind(chunk.page as i32)
    .bind(chunk.chunk_index as i32)
    .bind(&chunk.text)
    .bind(Vector::from(chunk.embedding.clone()))
    .bind(chunk.created_at)
    .execute(&mut **tx)
    .await
    .with_context(|| format!("Failed to insert chunk from {}", chunk.source_file))?;

    Ok(())
}

#[async_trait]
impl VectorIndex for PgVectorStore {
    async fn add(&self, chunks: Vec<Chunk>) -> Result<usize> {
        for chunk in &chunks {
            self.check_dimension(chunk.embedding.len(), "Chunk")?;
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to start transaction")?;

        for chunk in &chunks {
            insert_chunk(&mut tx, chunk).await?;
        }

        tx.commit().await.context("Failed to commit chunks")?;

        Ok(chunks.len())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        tracing::debug!(
            "PgVectorStore::search: query_embedding_length={}, k={}",
            query.len(),
            k
        );

        if k == 0 {
            return Ok(vec![]);
        }
        self.check_dimension(query.len(), "Query")?;

        let query_vector = Vector::from(query.to_vec());

        let rows = sqlx::query(
            r#"
            SELECT
                id,
                source_file,
                page,
                chunk_index,
                content,
                embedding,
                created_at,
                1 - (embedding <=> $1) AS similarity
            FROM chunks
            ORDER BY embedding <=> $1, created_at
            LIMIT $2
            "#,
        )
        .bind(query_vector)
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await
        .with_context(|| "Failed to execute similarity search")?;

        tracing::info!("Found {} results", rows.len());

        let results = rows
            .iter()
            .map(|row| {
                let embedding_vector: Vector = row.get("embedding");
                let similarity: f64 = row.get("similarity");

                let chunk = Chunk {
                    id: row.get("id"),
                    source_file: row.get("source_file"),
                    page: row.get::<i32, _>("page") as u32,
                    chunk_index: row.get::<i32, _>("chunk_index") as usize,
                    text: row.get("content"),
                    embedding: embedding_vector.into(),
                    created_at: row.get("created_at"),
                };

                tracing::debug!(
                    "Result: file={}, page={}, similarity={:.4}",
                    chunk.source_file,
                    chunk.page,
                    similarity
                );

                SearchResult::new(chunk, similarity as f32)
            })
            .collect();

        Ok(results)
    }

    async fn len(&self) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM chunks")
            .fetch_one(&self.pool)
            .await
            .context("Failed to get chunk count")?;

        Ok(row.get::<i64, _>("count") as usize)
    }

    async fn sources(&self) -> Result<Vec<SourceSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT source_file, COUNT(*) AS chunks, COUNT(DISTINCT page) AS pages
            FROM chunks
            GROUP BY source_file
            ORDER BY source_file
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list sources")?;

        Ok(rows
            .iter()
            .map(|row| SourceSummary {
                source_file: row.get("source_file"),
                chunks: row.get::<i64, _>("chunks") as usize,
                pages: row.get::<i64, _>("pages") as usize,
            })
            .collect())
    }

    async fn remove_source(&self, source_file: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM chunks WHERE source_file = $1")
            .bind(source_file)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete chunks of {}", source_file))?;

        Ok(result.rows_affected() as usize)
    }

    async fn replace_source(&self, source_file: &str, chunks: Vec<Chunk>) -> Result<(usize, usize)> {
        for chunk in &chunks {
            self.check_dimension(chunk.embedding.len(), "Chunk")?;
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to start transaction")?;

        let removed = sqlx::query("DELETE FROM chunks WHERE source_file = $1")
            .bind(source_file)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to delete chunks of {}", source_file))?
            .rows_affected() as usize;

        for chunk in &chunks {
            insert_chunk(&mut tx, chunk).await?;
        }

        tx.commit()
            .await
            .with_context(|| format!("Failed to commit replacement of {}", source_file))?;

        Ok((removed, chunks.len()))
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM chunks")
            .execute(&self.pool)
            .await
            .context("Failed to delete all chunks")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn should_fail_to_connect_with_invalid_url() {
        let result = PgVectorStore::connect("postgresql://invalid").await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn should_fail_to_connect_with_dimensions_and_invalid_url() {
        let result = PgVectorStore::connect_with_dimensions("postgresql://invalid", Some(1024)).await;

        assert!(result.is_err());
    }
}
