use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum KnowledgeBaseStatus {
    Active,
    Building,
    Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct KnowledgeBase {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub status: KnowledgeBaseStatus,
    pub document_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentStatus {
    Processing,
    Indexed,
    Failed,
}

/// `metadata` always carries `columns: [String]` for tabular ingests
/// (normalized header names); absent for text ingests.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Document {
    pub id: Uuid,
    pub knowledge_base_id: Uuid,
    pub title: String,
    pub content_preview: String,
    pub source_url: Option<String>,
    pub status: DocumentStatus,
    pub chunk_count: i32,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub indexed_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn columns(&self) -> Vec<String> {
        self.metadata
            .get("columns")
            .and_then(|c| c.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// `chunk_index` is dense in `[0, document.chunk_count)`; `embedding` length
/// equals the configured dimension D for every chunk of a given tenant.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct KnowledgeChunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub content: String,
    pub chunk_index: i32,
    pub embedding: Vec<f32>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl KnowledgeChunk {
    pub fn page(&self) -> Option<i64> {
        self.metadata.get("page").and_then(|v| v.as_i64())
    }

    pub fn chapter_num(&self) -> Option<i64> {
        self.metadata.get("chapter_num").and_then(|v| v.as_i64())
    }

    pub fn chapter_title(&self) -> Option<&str> {
        self.metadata.get("chapter_title").and_then(|v| v.as_str())
    }
}
