//! Chunk store (C4): persists document, chunk, embedding and schema
//! metadata, tenant-scoped. Grounded on `database/repository.rs`'s
//! `Repository` (wraps `DbPool`, typed query methods, transactional
//! multi-row insert loop in `insert_document_chunks`) generalized to the
//! UUID-keyed multi-tenant schema of spec §3.

use super::DbPool;
use crate::domain::{Document, DocumentStatus, KnowledgeBase, KnowledgeBaseStatus, KnowledgeChunk};
use crate::utils::error::{CoreError, CoreResult};
use async_trait::async_trait;
use chrono::Utc;
use pgvector::Vector;
use serde_json::Value;
use sqlx::Row;
use uuid::Uuid;

/// A chunk awaiting insertion; `chunk_index` is assigned by the caller
/// (the chunker/ingest pipeline), not the store.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub content: String,
    pub chunk_index: i32,
    pub embedding: Vec<f32>,
    pub metadata: Value,
}

#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn get_or_create_default_kb(&self, tenant_id: Uuid) -> CoreResult<KnowledgeBase>;

    async fn create_document(
        &self,
        knowledge_base_id: Uuid,
        title: &str,
        content_preview: &str,
        metadata: Value,
    ) -> CoreResult<Document>;

    /// Transactional: all chunks insert or none do. On failure the
    /// document is left PROCESSING for the caller to mark FAILED.
    async fn insert_chunks(&self, document_id: Uuid, chunks: Vec<NewChunk>) -> CoreResult<()>;

    async fn finalize_document(
        &self,
        document_id: Uuid,
        status: DocumentStatus,
        chunk_count: i32,
    ) -> CoreResult<()>;

    /// Top `limit` most-recently-created chunks belonging to `tenant_id`,
    /// across every knowledge base/document the tenant owns.
    async fn list_chunks(&self, tenant_id: Uuid, limit: usize) -> CoreResult<Vec<KnowledgeChunk>>;

    /// Distinct `(chapter_num, chapter_title)` pairs seen in any chunk of
    /// any document owned by `tenant_id`.
    async fn chapters(&self, tenant_id: Uuid) -> CoreResult<Vec<(i64, Option<String>)>>;

    async fn get_document(&self, document_id: Uuid) -> CoreResult<Document>;
}

pub struct PgChunkStore {
    pool: DbPool,
}

impl PgChunkStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChunkStore for PgChunkStore {
    async fn get_or_create_default_kb(&self, tenant_id: Uuid) -> CoreResult<KnowledgeBase> {
        sqlx::query(
            "INSERT INTO tenants (id, name, settings, created_at) \
             VALUES ($1, $1::text, '{}'::jsonb, $2) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(tenant_id)
        .bind(Utc::now())
        .execute(self.pool.get_pool())
        .await
        .map_err(|e| CoreError::storage(e.to_string()))?;

        if let Some(row) = sqlx::query_as::<_, KnowledgeBase>(
            "SELECT id, tenant_id, name, status, document_count, created_at \
             FROM knowledge_bases WHERE tenant_id = $1 ORDER BY created_at ASC LIMIT 1",
        )
        .bind(tenant_id)
        .fetch_optional(self.pool.get_pool())
        .await
        .map_err(|e| CoreError::storage(e.to_string()))?
        {
            return Ok(row);
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO knowledge_bases (id, tenant_id, name, status, document_count, created_at) \
             VALUES ($1, $2, 'Default', $3, 0, $4)",
        )
        .bind(id)
        .bind(tenant_id)
        .bind("ACTIVE")
        .bind(now)
        .execute(self.pool.get_pool())
        .await
        .map_err(|e| CoreError::storage(e.to_string()))?;

        Ok(KnowledgeBase {
            id,
            tenant_id,
            name: "Default".to_string(),
            status: KnowledgeBaseStatus::Active,
            document_count: 0,
            created_at: now,
        })
    }

    async fn create_document(
        &self,
        knowledge_base_id: Uuid,
        title: &str,
        content_preview: &str,
        metadata: Value,
    ) -> CoreResult<Document> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO documents \
             (id, knowledge_base_id, title, content_preview, source_url, status, chunk_count, metadata, created_at, indexed_at) \
             VALUES ($1, $2, $3, $4, NULL, $5, 0, $6, $7, NULL)",
        )
        .bind(id)
        .bind(knowledge_base_id)
        .bind(title)
        .bind(content_preview)
        .bind("PROCESSING")
        .bind(&metadata)
        .bind(now)
        .execute(self.pool.get_pool())
        .await
        .map_err(|e| CoreError::storage(e.to_string()))?;

        sqlx::query("UPDATE knowledge_bases SET document_count = document_count + 1 WHERE id = $1")
            .bind(knowledge_base_id)
            .execute(self.pool.get_pool())
            .await
            .map_err(|e| CoreError::storage(e.to_string()))?;

        Ok(Document {
            id,
            knowledge_base_id,
            title: title.to_string(),
            content_preview: content_preview.to_string(),
            source_url: None,
            status: DocumentStatus::Processing,
            chunk_count: 0,
            metadata,
            created_at: now,
            indexed_at: None,
        })
    }

    async fn insert_chunks(&self, document_id: Uuid, chunks: Vec<NewChunk>) -> CoreResult<()> {
        let mut tx = self
            .pool
            .get_pool()
            .begin()
            .await
            .map_err(|e| CoreError::storage(e.to_string()))?;

        for chunk in &chunks {
            let id = Uuid::new_v4();
            let vector = Vector::from(chunk.embedding.clone());
            sqlx::query(
                "INSERT INTO knowledge_chunks (id, document_id, content, chunk_index, embedding, metadata, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(id)
            .bind(document_id)
            .bind(&chunk.content)
            .bind(chunk.chunk_index)
            .bind(vector)
            .bind(&chunk.metadata)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::storage(e.to_string()))?;
        }

        tx.commit().await.map_err(|e| CoreError::storage(e.to_string()))?;
        Ok(())
    }

    async fn finalize_document(
        &self,
        document_id: Uuid,
        status: DocumentStatus,
        chunk_count: i32,
    ) -> CoreResult<()> {
        let status_str = match status {
            DocumentStatus::Processing => "PROCESSING",
            DocumentStatus::Indexed => "INDEXED",
            DocumentStatus::Failed => "FAILED",
        };
        let indexed_at = matches!(status, DocumentStatus::Indexed).then(Utc::now);

        sqlx::query(
            "UPDATE documents SET status = $1, chunk_count = $2, indexed_at = $3 WHERE id = $4",
        )
        .bind(status_str)
        .bind(chunk_count)
        .bind(indexed_at)
        .bind(document_id)
        .execute(self.pool.get_pool())
        .await
        .map_err(|e| CoreError::storage(e.to_string()))?;

        Ok(())
    }

    async fn list_chunks(&self, tenant_id: Uuid, limit: usize) -> CoreResult<Vec<KnowledgeChunk>> {
        sqlx::query_as::<_, KnowledgeChunk>(
            "SELECT c.id, c.document_id, c.content, c.chunk_index, c.embedding, c.metadata, c.created_at \
             FROM knowledge_chunks c \
             JOIN documents d ON d.id = c.document_id \
             JOIN knowledge_bases kb ON kb.id = d.knowledge_base_id \
             WHERE kb.tenant_id = $1 \
             ORDER BY c.created_at DESC \
             LIMIT $2",
        )
        .bind(tenant_id)
        .bind(limit as i64)
        .fetch_all(self.pool.get_pool())
        .await
        .map_err(|e| CoreError::storage(e.to_string()))
    }

    async fn chapters(&self, tenant_id: Uuid) -> CoreResult<Vec<(i64, Option<String>)>> {
        let rows = sqlx::query(
            "SELECT DISTINCT (c.metadata->>'chapter_num')::bigint AS chapter_num, \
                    c.metadata->>'chapter_title' AS chapter_title \
             FROM knowledge_chunks c \
             JOIN documents d ON d.id = c.document_id \
             JOIN knowledge_bases kb ON kb.id = d.knowledge_base_id \
             WHERE kb.tenant_id = $1 AND c.metadata ? 'chapter_num'",
        )
        .bind(tenant_id)
        .fetch_all(self.pool.get_pool())
        .await
        .map_err(|e| CoreError::storage(e.to_string()))?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let num: Option<i64> = row.try_get("chapter_num").ok();
                let title: Option<String> = row.try_get("chapter_title").ok();
                num.map(|n| (n, title))
            })
            .collect())
    }

    async fn get_document(&self, document_id: Uuid) -> CoreResult<Document> {
        sqlx::query_as::<_, Document>(
            "SELECT id, knowledge_base_id, title, content_preview, source_url, status, chunk_count, metadata, created_at, indexed_at \
             FROM documents WHERE id = $1",
        )
        .bind(document_id)
        .fetch_optional(self.pool.get_pool())
        .await
        .map_err(|e| CoreError::storage(e.to_string()))?
        .ok_or_else(|| CoreError::NotFound(format!("document {document_id} not found")))
    }
}
