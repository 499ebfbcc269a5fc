//! Vector store adapter.
//!
//! Wraps the external similarity index behind [`VectorIndex`] so nothing else
//! in the crate depends on the index's native client or storage layout. The
//! SQLite-backed implementation owns the `vectors` table outright: embeddings
//! are opaque blobs here, compared with cosine distance at query time.
//!
//! Query semantics: oversample candidates beyond `k`, convert the native
//! distance to a bounded similarity (`1 − distance/2`), reject anything past
//! the acceptance threshold, re-sort by similarity, truncate to `k`. An empty
//! index or a fully rejected candidate set is an empty result, not an error.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::config::{EmbeddingConfig, RetrievalConfig};
use crate::embedding;
use crate::models::{DocumentChunk, RetrievedChunk};

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Upsert one entry per chunk, keyed by `chunk_id`. No-op on empty input.
    async fn add(&self, chunks: &[DocumentChunk]) -> Result<()>;

    /// Similarity-query the index. Returns at most `k` accepted candidates,
    /// best first; empty when the index is empty or everything is rejected.
    async fn query(&self, text: &str, k: usize) -> Result<Vec<RetrievedChunk>>;

    /// Remove every entry whose provenance matches `document_hash`. Returns
    /// the count removed; zero matches is 0, not an error.
    async fn delete_by_source(&self, document_hash: &str) -> Result<u64>;

    /// Number of chunks indexed for `document_hash`.
    async fn count_by_source(&self, document_hash: &str) -> Result<u64>;

    /// Distinct `document_hash` values currently indexed.
    async fn source_hashes(&self) -> Result<Vec<String>>;

    /// Total entries in the index.
    async fn count(&self) -> Result<u64>;
}

pub struct SqliteVectorIndex {
    pool: SqlitePool,
    embedding: EmbeddingConfig,
    retrieval: RetrievalConfig,
}

impl SqliteVectorIndex {
    pub fn new(pool: SqlitePool, embedding: EmbeddingConfig, retrieval: RetrievalConfig) -> Self {
        Self {
            pool,
            embedding,
            retrieval,
        }
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn add(&self, chunks: &[DocumentChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        // Metadata-only entries (empty blob) are stored when embedding is
        // disabled, so reconciliation can still see which chunks exist.
        let embeddings: Vec<Vec<f32>> = if self.embedding.is_enabled() {
            let mut all = Vec::with_capacity(chunks.len());
            for batch in chunks.chunks(self.embedding.batch_size) {
                let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
                all.extend(embedding::embed_texts(&self.embedding, &texts).await?);
            }
            all
        } else {
            vec![Vec::new(); chunks.len()]
        };

        let mut tx = self.pool.begin().await?;
        for (chunk, vector) in chunks.iter().zip(embeddings.iter()) {
            sqlx::query(
                r#"
                INSERT INTO vectors (chunk_id, document_hash, chunk_index, filename, category, source_path, text, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    document_hash = excluded.document_hash,
                    chunk_index = excluded.chunk_index,
                    filename = excluded.filename,
                    category = excluded.category,
                    source_path = excluded.source_path,
                    text = excluded.text,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.document_hash)
            .bind(chunk.chunk_index)
            .bind(&chunk.filename)
            .bind(&chunk.category)
            .bind(&chunk.source_path)
            .bind(&chunk.text)
            .bind(embedding::vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(chunks = chunks.len(), "added chunks to vector index");
        Ok(())
    }

    async fn query(&self, text: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        if !self.embedding.is_enabled() {
            // Index unavailable degrades to an empty result set.
            return Ok(Vec::new());
        }

        let query_vec = embedding::embed_query(&self.embedding, text).await?;

        let rows = sqlx::query(
            "SELECT text, filename, category, source_path, embedding FROM vectors",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut candidates: Vec<Candidate> = rows
            .iter()
            .filter_map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                if blob.is_empty() {
                    return None;
                }
                let vector = embedding::blob_to_vec(&blob);
                let distance = 1.0 - embedding::cosine_similarity(&query_vec, &vector) as f64;
                Some(Candidate {
                    text: row.get("text"),
                    filename: row.get("filename"),
                    category: row.get("category"),
                    source_path: row.get("source_path"),
                    distance,
                })
            })
            .collect();

        // Keep the oversampled best before the acceptance gate, mirroring an
        // index that only hands back `k × oversample` candidates.
        candidates.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(k.saturating_mul(self.retrieval.oversample));

        Ok(rank_candidates(candidates, k, self.retrieval.max_distance))
    }

    async fn delete_by_source(&self, document_hash: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM vectors WHERE document_hash = ?")
            .bind(document_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count_by_source(&self, document_hash: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vectors WHERE document_hash = ?")
            .bind(document_hash)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn source_hashes(&self) -> Result<Vec<String>> {
        let hashes: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT document_hash FROM vectors")
                .fetch_all(&self.pool)
                .await?;
        Ok(hashes)
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

/// A raw candidate from the underlying index, before the acceptance gate.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub text: String,
    pub filename: String,
    pub category: String,
    pub source_path: String,
    pub distance: f64,
}

/// Convert a native cosine distance in `[0, 2]` to a similarity in `[0, 1]`.
pub fn similarity_from_distance(distance: f64) -> f64 {
    (1.0 - distance / 2.0).clamp(0.0, 1.0)
}

/// Apply the quality gate and final ranking: drop candidates past
/// `max_distance`, sort by similarity descending, truncate to `k`.
pub fn rank_candidates(candidates: Vec<Candidate>, k: usize, max_distance: f64) -> Vec<RetrievedChunk> {
    let mut accepted: Vec<RetrievedChunk> = candidates
        .into_iter()
        .filter(|c| c.distance <= max_distance)
        .map(|c| RetrievedChunk {
            similarity: similarity_from_distance(c.distance),
            distance: c.distance,
            text: c.text,
            filename: c.filename,
            category: c.category,
            source_path: c.source_path,
        })
        .collect();

    accepted.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    accepted.truncate(k);
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;

    fn candidate(name: &str, distance: f64) -> Candidate {
        Candidate {
            text: format!("text from {}", name),
            filename: name.to_string(),
            category: "Other".to_string(),
            source_path: format!("/sorted/Other/{}", name),
            distance,
        }
    }

    async fn memory_index() -> SqliteVectorIndex {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        SqliteVectorIndex::new(
            pool,
            crate::config::EmbeddingConfig::default(),
            crate::config::RetrievalConfig::default(),
        )
    }

    #[test]
    fn similarity_is_bounded() {
        for d in [0.0, 0.5, 1.0, 1.2, 2.0, 3.0] {
            let s = similarity_from_distance(d);
            assert!((0.0..=1.0).contains(&s), "similarity {} for distance {}", s, d);
        }
        assert!((similarity_from_distance(0.0) - 1.0).abs() < 1e-9);
        assert!(similarity_from_distance(2.0).abs() < 1e-9);
    }

    #[test]
    fn gate_rejects_distant_candidates() {
        let results = rank_candidates(
            vec![candidate("near", 0.3), candidate("far", 1.5), candidate("edge", 1.2)],
            10,
            1.2,
        );
        let names: Vec<&str> = results.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["near", "edge"]);
        for r in &results {
            assert!(r.distance <= 1.2);
            assert!((0.0..=1.0).contains(&r.similarity));
        }
    }

    #[test]
    fn ranking_sorts_by_similarity_and_truncates() {
        let results = rank_candidates(
            vec![candidate("c", 0.9), candidate("a", 0.1), candidate("b", 0.5)],
            2,
            1.2,
        );
        let names: Vec<&str> = results.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn all_rejected_is_empty_not_error() {
        let results = rank_candidates(vec![candidate("x", 1.9)], 5, 1.2);
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn add_empty_is_noop() {
        let index = memory_index().await;
        index.add(&[]).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_unknown_hash_returns_zero() {
        let index = memory_index().await;
        let removed = index.delete_by_source("deadbeef").await.unwrap();
        assert_eq!(removed, 0);
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn add_then_delete_by_source_cascades_on_hash() {
        let index = memory_index().await;
        let chunks = crate::chunk::build_chunks(
            "hash1",
            "a.txt",
            "Code",
            "/sorted/Code/a.txt",
            &"x".repeat(1500),
            600,
            150,
        );
        assert!(chunks.len() > 1);
        index.add(&chunks).await.unwrap();
        // Idempotent re-add: same ids, same count.
        index.add(&chunks).await.unwrap();
        assert_eq!(index.count().await.unwrap(), chunks.len() as u64);
        assert_eq!(
            index.count_by_source("hash1").await.unwrap(),
            chunks.len() as u64
        );

        let removed = index.delete_by_source("hash1").await.unwrap();
        assert_eq!(removed, chunks.len() as u64);
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn query_with_disabled_embeddings_is_empty() {
        let index = memory_index().await;
        let results = index.query("anything", 4).await.unwrap();
        assert!(results.is_empty());
    }
}
