//! Ingestion pipeline: wires format extraction (C1), chunking (C2),
//! embedding (C3) and the chunk store (C4) together, matching spec
//! §4.1-§4.4 and the JSON-sidecar write in §6's "Persisted state".
//! Grounded on `original_source/.../document_service.py`'s
//! `process_document` orchestration (extract → chunk → embed → insert →
//! finalize, rollback to FAILED on any step's error), restructured
//! around the workspace's `ChunkStore`/`Embedder` traits instead of a
//! single monolithic service class.

use crate::database::chunk_store::{ChunkStore, NewChunk};
use crate::document::chunker::{chunk_rows, TextChunker};
use crate::document::extractors::{self, is_tabular};
use crate::domain::DocumentStatus;
use crate::embedding::Embedder;
use crate::utils::error::{CoreError, CoreResult};
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct IngestResult {
    pub document_id: Uuid,
    pub chunk_count: i32,
    pub status: &'static str,
}

pub struct IngestPipeline {
    chunk_store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn Embedder>,
    chunk_target_chars: usize,
    chunk_overlap_sentences: usize,
    max_file_bytes: usize,
    document_storage_path: String,
}

impl IngestPipeline {
    pub fn new(
        chunk_store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn Embedder>,
        chunk_target_chars: usize,
        chunk_overlap_sentences: usize,
        max_file_bytes: usize,
        document_storage_path: String,
    ) -> Self {
        Self {
            chunk_store,
            embedder,
            chunk_target_chars,
            chunk_overlap_sentences,
            max_file_bytes,
            document_storage_path,
        }
    }

    /// JSON ingest variant: `content` is already-extracted plain text.
    pub async fn ingest_text(
        &self,
        tenant_id: Uuid,
        title: &str,
        content: &str,
        knowledge_base_id: Option<Uuid>,
    ) -> CoreResult<IngestResult> {
        if content.trim().is_empty() {
            return Err(CoreError::Validation("content must not be empty".to_string()));
        }
        if content.len() > self.max_file_bytes {
            return Err(CoreError::Validation(format!(
                "content exceeds max_file_bytes ({} > {})",
                content.len(),
                self.max_file_bytes
            )));
        }

        let kb_id = self.resolve_kb(tenant_id, knowledge_base_id).await?;
        let chunker = TextChunker::new(self.chunk_target_chars, self.chunk_overlap_sentences);
        let text_chunks = chunker.chunk_text(content);

        let preview: String = content.chars().take(500).collect();
        let document = self
            .chunk_store
            .create_document(kb_id, title, &preview, json!({}))
            .await?;

        let contents: Vec<String> = text_chunks.iter().map(|c| c.content.clone()).collect();
        let embed_result = self.embedder.embed(&contents).await;

        let new_chunks = match embed_result {
            Ok(vectors) => text_chunks
                .into_iter()
                .zip(vectors)
                .enumerate()
                .map(|(i, (chunk, embedding))| NewChunk {
                    content: chunk.content,
                    chunk_index: i as i32,
                    embedding,
                    metadata: chunk_metadata(chunk.page, chunk.chapter_num, chunk.chapter_title),
                })
                .collect::<Vec<_>>(),
            Err(e) => {
                self.chunk_store
                    .finalize_document(document.id, DocumentStatus::Failed, 0)
                    .await
                    .ok();
                return Err(e);
            }
        };

        self.finish(document.id, new_chunks, tenant_id, title).await
    }

    /// Multipart/file ingest variant: dispatches to the tabular or text
    /// extraction path by filename extension.
    pub async fn ingest_file(
        &self,
        tenant_id: Uuid,
        title: &str,
        filename: &str,
        bytes: &[u8],
        knowledge_base_id: Option<Uuid>,
    ) -> CoreResult<IngestResult> {
        if bytes.is_empty() {
            return Err(CoreError::Validation("file must not be empty".to_string()));
        }
        if bytes.len() > self.max_file_bytes {
            return Err(CoreError::Validation(format!(
                "file exceeds max_file_bytes ({} > {})",
                bytes.len(),
                self.max_file_bytes
            )));
        }

        let kb_id = self.resolve_kb(tenant_id, knowledge_base_id).await?;

        if is_tabular(filename) {
            let rows = extractors::extract_rows(filename, bytes)?;
            let (columns, row_chunks) = chunk_rows(&rows);
            let preview: String = row_chunks.first().cloned().unwrap_or_default();

            let document = self
                .chunk_store
                .create_document(kb_id, title, &preview, json!({ "columns": columns }))
                .await?;

            let embed_result = self.embedder.embed(&row_chunks).await;
            let new_chunks = match embed_result {
                Ok(vectors) => row_chunks
                    .into_iter()
                    .zip(vectors)
                    .enumerate()
                    .map(|(i, (row, embedding))| NewChunk {
                        content: row,
                        chunk_index: i as i32,
                        embedding,
                        metadata: json!({}),
                    })
                    .collect::<Vec<_>>(),
                Err(e) => {
                    self.chunk_store
                        .finalize_document(document.id, DocumentStatus::Failed, 0)
                        .await
                        .ok();
                    return Err(e);
                }
            };

            self.finish(document.id, new_chunks, tenant_id, title).await
        } else {
            let text = extractors::extract_text(filename, bytes)?;
            self.ingest_text(tenant_id, title, &text, Some(kb_id)).await
        }
    }

    async fn resolve_kb(&self, tenant_id: Uuid, knowledge_base_id: Option<Uuid>) -> CoreResult<Uuid> {
        match knowledge_base_id {
            Some(id) => Ok(id),
            None => Ok(self.chunk_store.get_or_create_default_kb(tenant_id).await?.id),
        }
    }

    async fn finish(
        &self,
        document_id: Uuid,
        chunks: Vec<NewChunk>,
        tenant_id: Uuid,
        title: &str,
    ) -> CoreResult<IngestResult> {
        let chunk_count = chunks.len() as i32;

        if let Err(e) = self.chunk_store.insert_chunks(document_id, chunks).await {
            self.chunk_store
                .finalize_document(document_id, DocumentStatus::Failed, 0)
                .await
                .ok();
            return Err(e);
        }

        self.chunk_store
            .finalize_document(document_id, DocumentStatus::Indexed, chunk_count)
            .await?;

        self.write_sidecar(tenant_id, document_id, title, chunk_count);

        Ok(IngestResult {
            document_id,
            chunk_count,
            status: "INDEXED",
        })
    }

    /// Best-effort JSON sidecar per spec §6; ingest never fails because of
    /// a sidecar write error, only a warning is logged.
    fn write_sidecar(&self, tenant_id: Uuid, document_id: Uuid, title: &str, chunk_count: i32) {
        let dir = Path::new(&self.document_storage_path)
            .join(format!("tenant_{tenant_id}"))
            .join("documents")
            .join(document_id.to_string());

        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!("sidecar metadata dir creation failed for document {document_id}: {e}");
            return;
        }

        let payload = json!({
            "documentId": document_id,
            "tenantId": tenant_id,
            "title": title,
            "chunkCount": chunk_count,
            "status": "INDEXED",
        });

        if let Err(e) = std::fs::write(dir.join("metadata.json"), payload.to_string()) {
            warn!("sidecar metadata write failed for document {document_id}: {e}");
        }
    }
}

fn chunk_metadata(page: Option<i64>, chapter_num: Option<i64>, chapter_title: Option<String>) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    if let Some(p) = page {
        map.insert("page".to_string(), json!(p));
    }
    if let Some(n) = chapter_num {
        map.insert("chapter_num".to_string(), json!(n));
    }
    if let Some(title) = chapter_title.filter(|t| !t.is_empty()) {
        map.insert("chapter_title".to_string(), json!(title));
    }
    serde_json::Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::InMemoryStore;
    use crate::embedding::DeterministicEmbedder;

    fn pipeline() -> IngestPipeline {
        IngestPipeline::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(DeterministicEmbedder::new()),
            1400,
            2,
            10 * 1024 * 1024,
            std::env::temp_dir().to_string_lossy().to_string(),
        )
    }

    #[tokio::test]
    async fn text_ingest_indexes_and_reports_chunk_count() {
        let pipeline = pipeline();
        let tenant_id = Uuid::new_v4();
        let result = pipeline
            .ingest_text(tenant_id, "Doc", "Hello world. This is a test sentence.", None)
            .await
            .unwrap();
        assert_eq!(result.status, "INDEXED");
        assert!(result.chunk_count >= 1);
    }

    #[tokio::test]
    async fn csv_ingest_normalizes_header_and_indexes_rows() {
        let pipeline = pipeline();
        let tenant_id = Uuid::new_v4();
        let csv = b"Employee_Name,Department,Salary\n\"Akinkuolie, Sarah\",Engineering,95000\n".to_vec();
        let result = pipeline
            .ingest_file(tenant_id, "employees", "employees.csv", &csv, None)
            .await
            .unwrap();
        assert_eq!(result.chunk_count, 1);
    }

    #[tokio::test]
    async fn empty_content_is_a_validation_error() {
        let pipeline = pipeline();
        let result = pipeline.ingest_text(Uuid::new_v4(), "Doc", "   ", None).await;
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }
}
