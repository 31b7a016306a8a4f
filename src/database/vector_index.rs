//! Vector index (C5): a side channel over the pgvector-backed
//! `knowledge_chunks` table, queried by ANN distance rather than the
//! per-request in-memory scorer that `services/retriever.rs` runs over
//! `ChunkStore::list_chunks`. Failures here never fail a query — callers
//! get an empty result and the retriever falls back to its in-memory
//! heuristic, per spec §5's degrade-gracefully rule. Grounded on
//! `database/repository.rs`'s `hybrid_search_user_documents` stored-function
//! call, generalized from i32 per-user filtering to UUID tenant scoping
//! and plain `<=>` cosine-distance ordering (no stored procedure).

use super::DbPool;
use crate::utils::breaker::CircuitBreaker;
use async_trait::async_trait;
use pgvector::Vector;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub content: String,
    pub score: f32,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn ensure_collection(&self, tenant_id: Uuid) -> ();

    async fn upsert(&self, tenant_id: Uuid, chunk_id: Uuid, document_id: Uuid, embedding: &[f32]);

    /// Returns an empty vec on any failure; never propagates an error.
    async fn search(&self, tenant_id: Uuid, query_embedding: &[f32], top_k: usize) -> Vec<ScoredChunk>;

    /// Distinct `(chapter_num, chapter_title)` pairs, ordered by chapter
    /// number, used by the chapter strategies as a faster path than
    /// `ChunkStore::chapters` when the index is healthy.
    async fn scroll_chapters(&self, tenant_id: Uuid) -> Vec<(i64, Option<String>)>;
}

/// Wraps any `VectorIndex` with a breaker: once `OPEN`, calls return the
/// degrade-gracefully default immediately rather than hitting Postgres.
pub struct GuardedVectorIndex<T> {
    inner: T,
    breaker: CircuitBreaker,
}

impl<T> GuardedVectorIndex<T> {
    pub fn new(inner: T, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            inner,
            breaker: CircuitBreaker::new("vector_index", failure_threshold, recovery_timeout),
        }
    }
}

#[async_trait]
impl<T: VectorIndex> VectorIndex for GuardedVectorIndex<T> {
    async fn ensure_collection(&self, tenant_id: Uuid) {
        if self.breaker.allow_request() {
            self.inner.ensure_collection(tenant_id).await;
            self.breaker.record_success();
        }
    }

    async fn upsert(&self, tenant_id: Uuid, chunk_id: Uuid, document_id: Uuid, embedding: &[f32]) {
        if !self.breaker.allow_request() {
            warn!("vector index circuit open, dropping upsert for chunk {chunk_id}");
            return;
        }
        self.inner.upsert(tenant_id, chunk_id, document_id, embedding).await;
        self.breaker.record_success();
    }

    async fn search(&self, tenant_id: Uuid, query_embedding: &[f32], top_k: usize) -> Vec<ScoredChunk> {
        if !self.breaker.allow_request() {
            return Vec::new();
        }
        let result = self.inner.search(tenant_id, query_embedding, top_k).await;
        self.breaker.record_success();
        result
    }

    async fn scroll_chapters(&self, tenant_id: Uuid) -> Vec<(i64, Option<String>)> {
        if !self.breaker.allow_request() {
            return Vec::new();
        }
        let result = self.inner.scroll_chapters(tenant_id).await;
        self.breaker.record_success();
        result
    }
}

pub struct PgVectorIndex {
    pool: DbPool,
}

impl PgVectorIndex {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    async fn ensure_collection(&self, _tenant_id: Uuid) {
        // schema is provisioned by migrations; nothing per-tenant to create.
    }

    async fn upsert(&self, _tenant_id: Uuid, chunk_id: Uuid, _document_id: Uuid, embedding: &[f32]) {
        let vector = Vector::from(embedding.to_vec());
        if let Err(e) = sqlx::query("UPDATE knowledge_chunks SET embedding = $1 WHERE id = $2")
            .bind(vector)
            .bind(chunk_id)
            .execute(self.pool.get_pool())
            .await
        {
            warn!("vector index upsert failed for chunk {chunk_id}: {e}");
        }
    }

    async fn search(&self, tenant_id: Uuid, query_embedding: &[f32], top_k: usize) -> Vec<ScoredChunk> {
        let vector = Vector::from(query_embedding.to_vec());
        let rows = sqlx::query_as::<_, (Uuid, Uuid, String, f32)>(
            "SELECT c.id, c.document_id, c.content, 1.0 - (c.embedding <=> $1) AS score \
             FROM knowledge_chunks c \
             JOIN documents d ON d.id = c.document_id \
             JOIN knowledge_bases kb ON kb.id = d.knowledge_base_id \
             WHERE kb.tenant_id = $2 AND c.embedding IS NOT NULL \
             ORDER BY c.embedding <=> $1 \
             LIMIT $3",
        )
        .bind(vector)
        .bind(tenant_id)
        .bind(top_k as i64)
        .fetch_all(self.pool.get_pool())
        .await;

        match rows {
            Ok(rows) => rows
                .into_iter()
                .map(|(chunk_id, document_id, content, score)| ScoredChunk {
                    chunk_id,
                    document_id,
                    content,
                    score,
                })
                .collect(),
            Err(e) => {
                warn!("vector index search failed: {e}");
                Vec::new()
            }
        }
    }

    async fn scroll_chapters(&self, tenant_id: Uuid) -> Vec<(i64, Option<String>)> {
        let rows = sqlx::query_as::<_, (i64, Option<String>)>(
            "SELECT DISTINCT (c.metadata->>'chapter_num')::bigint, c.metadata->>'chapter_title' \
             FROM knowledge_chunks c \
             JOIN documents d ON d.id = c.document_id \
             JOIN knowledge_bases kb ON kb.id = d.knowledge_base_id \
             WHERE kb.tenant_id = $1 AND c.metadata ? 'chapter_num' \
             ORDER BY 1",
        )
        .bind(tenant_id)
        .fetch_all(self.pool.get_pool())
        .await;

        match rows {
            Ok(rows) => rows,
            Err(e) => {
                warn!("vector index scroll_chapters failed: {e}");
                Vec::new()
            }
        }
    }
}

/// No-op index used when no vector backend is configured; every call
/// degrades to the retriever's in-memory heuristic immediately.
pub struct DisabledVectorIndex;

#[async_trait]
impl VectorIndex for DisabledVectorIndex {
    async fn ensure_collection(&self, _tenant_id: Uuid) {}

    async fn upsert(&self, _tenant_id: Uuid, _chunk_id: Uuid, _document_id: Uuid, _embedding: &[f32]) {}

    async fn search(&self, _tenant_id: Uuid, _query_embedding: &[f32], _top_k: usize) -> Vec<ScoredChunk> {
        Vec::new()
    }

    async fn scroll_chapters(&self, _tenant_id: Uuid) -> Vec<(i64, Option<String>)> {
        Vec::new()
    }
}

pub type SharedVectorIndex = Arc<dyn VectorIndex>;
