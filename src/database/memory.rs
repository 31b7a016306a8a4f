//! In-memory fakes of `ChunkStore` and `ConversationStore`, used as the
//! local fallback when no `DATABASE_URL` is configured (spec §6) and as
//! the fixture store in orchestrator tests. Grounded on the teacher's
//! `dashmap`-backed caches (`services/conversation/cache.rs`) generalized
//! into full store implementations rather than read-through caches.

use super::chunk_store::{ChunkStore, NewChunk};
use super::conversation_store::ConversationStore;
use crate::domain::{
    Conversation, ConversationStatus, Document, DocumentStatus, KnowledgeBase, KnowledgeBaseStatus,
    KnowledgeChunk, Message, SenderType, User,
};
use crate::utils::error::{CoreError, CoreResult};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryStore {
    tenants_kb: DashMap<Uuid, Uuid>,
    knowledge_bases: DashMap<Uuid, KnowledgeBase>,
    documents: DashMap<Uuid, Document>,
    chunks: DashMap<Uuid, KnowledgeChunk>,
    users: DashMap<Uuid, User>,
    conversations: DashMap<Uuid, Conversation>,
    messages: Mutex<Vec<Message>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Shallow top-level merge mirroring Postgres jsonb's `||` operator:
/// keys in `patch` overwrite, every other key in `base` survives.
fn merge_json(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (k, v) in patch_map {
                base_map.insert(k, v);
            }
        }
        (base, patch) => *base = patch,
    }
}

#[async_trait]
impl ChunkStore for InMemoryStore {
    async fn get_or_create_default_kb(&self, tenant_id: Uuid) -> CoreResult<KnowledgeBase> {
        if let Some(kb_id) = self.tenants_kb.get(&tenant_id) {
            if let Some(kb) = self.knowledge_bases.get(&*kb_id) {
                return Ok(kb.clone());
            }
        }
        let id = Uuid::new_v4();
        let kb = KnowledgeBase {
            id,
            tenant_id,
            name: "Default".to_string(),
            status: KnowledgeBaseStatus::Active,
            document_count: 0,
            created_at: Utc::now(),
        };
        self.knowledge_bases.insert(id, kb.clone());
        self.tenants_kb.insert(tenant_id, id);
        Ok(kb)
    }

    async fn create_document(
        &self,
        knowledge_base_id: Uuid,
        title: &str,
        content_preview: &str,
        metadata: Value,
    ) -> CoreResult<Document> {
        let id = Uuid::new_v4();
        let doc = Document {
            id,
            knowledge_base_id,
            title: title.to_string(),
            content_preview: content_preview.to_string(),
            source_url: None,
            status: DocumentStatus::Processing,
            chunk_count: 0,
            metadata,
            created_at: Utc::now(),
            indexed_at: None,
        };
        self.documents.insert(id, doc.clone());
        if let Some(mut kb) = self.knowledge_bases.get_mut(&knowledge_base_id) {
            kb.document_count += 1;
        }
        Ok(doc)
    }

    async fn insert_chunks(&self, document_id: Uuid, chunks: Vec<NewChunk>) -> CoreResult<()> {
        for chunk in chunks {
            let id = Uuid::new_v4();
            self.chunks.insert(
                id,
                KnowledgeChunk {
                    id,
                    document_id,
                    content: chunk.content,
                    chunk_index: chunk.chunk_index,
                    embedding: chunk.embedding,
                    metadata: chunk.metadata,
                    created_at: Utc::now(),
                },
            );
        }
        Ok(())
    }

    async fn finalize_document(
        &self,
        document_id: Uuid,
        status: DocumentStatus,
        chunk_count: i32,
    ) -> CoreResult<()> {
        if let Some(mut doc) = self.documents.get_mut(&document_id) {
            doc.status = status;
            doc.chunk_count = chunk_count;
            if matches!(status, DocumentStatus::Indexed) {
                doc.indexed_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn list_chunks(&self, tenant_id: Uuid, limit: usize) -> CoreResult<Vec<KnowledgeChunk>> {
        let doc_ids: Vec<Uuid> = self
            .documents
            .iter()
            .filter(|entry| {
                self.knowledge_bases
                    .get(&entry.knowledge_base_id)
                    .map(|kb| kb.tenant_id == tenant_id)
                    .unwrap_or(false)
            })
            .map(|entry| entry.id)
            .collect();

        let mut chunks: Vec<KnowledgeChunk> = self
            .chunks
            .iter()
            .filter(|entry| doc_ids.contains(&entry.document_id))
            .map(|entry| entry.clone())
            .collect();
        chunks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        chunks.truncate(limit);
        Ok(chunks)
    }

    async fn chapters(&self, tenant_id: Uuid) -> CoreResult<Vec<(i64, Option<String>)>> {
        let chunks = self.list_chunks(tenant_id, usize::MAX).await?;
        let mut seen = std::collections::BTreeMap::new();
        for chunk in &chunks {
            if let Some(num) = chunk.chapter_num() {
                seen.entry(num).or_insert_with(|| chunk.chapter_title().map(str::to_string));
            }
        }
        Ok(seen.into_iter().collect())
    }

    async fn get_document(&self, document_id: Uuid) -> CoreResult<Document> {
        self.documents
            .get(&document_id)
            .map(|d| d.clone())
            .ok_or_else(|| CoreError::NotFound(format!("document {document_id} not found")))
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn ensure_user(&self, tenant_id: Uuid, user_id: Uuid, user_type: &str, role: &str) -> CoreResult<User> {
        if let Some(user) = self.users.get(&user_id) {
            return Ok(user.clone());
        }
        let user = User {
            id: user_id,
            tenant_id,
            user_type: user_type.to_string(),
            role: role.to_string(),
            created_at: Utc::now(),
        };
        self.users.insert(user_id, user.clone());
        Ok(user)
    }

    async fn get_or_create(&self, tenant_id: Uuid, user_id: Uuid, channel: &str) -> CoreResult<Conversation> {
        if let Some(convo) = self.conversations.iter().find(|c| {
            c.tenant_id == tenant_id
                && c.user_id == user_id
                && c.channel == channel
                && c.status == ConversationStatus::Active
        }) {
            return Ok(convo.clone());
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        let convo = Conversation {
            id,
            tenant_id,
            user_id,
            channel: channel.to_string(),
            status: ConversationStatus::Active,
            context: Value::Object(Default::default()),
            started_at: now,
            last_message_at: now,
        };
        self.conversations.insert(id, convo.clone());
        Ok(convo)
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        sender_type: SenderType,
        content: &str,
        message_type: &str,
        metadata: Value,
    ) -> CoreResult<Message> {
        let now = Utc::now();
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_type,
            content: content.to_string(),
            message_type: message_type.to_string(),
            metadata,
            timestamp: now,
        };
        self.messages.lock().push(message.clone());
        if let Some(mut convo) = self.conversations.get_mut(&conversation_id) {
            convo.last_message_at = now;
        }
        Ok(message)
    }

    async fn update_context(&self, conversation_id: Uuid, patch: Value) -> CoreResult<()> {
        if let Some(mut convo) = self.conversations.get_mut(&conversation_id) {
            merge_json(&mut convo.context, patch);
        }
        Ok(())
    }

    async fn list_messages(&self, conversation_id: Uuid, limit: usize) -> CoreResult<Vec<Message>> {
        let mut messages: Vec<Message> = self
            .messages
            .lock()
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        messages.truncate(limit);
        Ok(messages)
    }
}
