//! Conversation store (C9): tenant/user/channel-scoped conversation and
//! message history, enforcing the at-most-one-ACTIVE-conversation
//! invariant. Grounded on `services/conversation/manager.rs`'s session
//! lookup-or-create pattern, generalized from its LLM-streaming session
//! shape to the plain turn-by-turn orchestrator of spec §4.11.

use super::DbPool;
use crate::domain::{Conversation, ConversationStatus, Message, SenderType, User};
use crate::utils::error::{CoreError, CoreResult};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn ensure_user(&self, tenant_id: Uuid, user_id: Uuid, user_type: &str, role: &str) -> CoreResult<User>;

    /// Returns the tenant/user/channel's ACTIVE conversation, creating one
    /// with an empty `context` if none exists.
    async fn get_or_create(&self, tenant_id: Uuid, user_id: Uuid, channel: &str) -> CoreResult<Conversation>;

    async fn append_message(
        &self,
        conversation_id: Uuid,
        sender_type: SenderType,
        content: &str,
        message_type: &str,
        metadata: Value,
    ) -> CoreResult<Message>;

    /// Shallow-merges `patch`'s top-level keys into the conversation's
    /// existing `context` (spec §4.9: "merges a JSON patch"), leaving
    /// keys the patch doesn't mention untouched.
    async fn update_context(&self, conversation_id: Uuid, patch: Value) -> CoreResult<()>;

    async fn list_messages(&self, conversation_id: Uuid, limit: usize) -> CoreResult<Vec<Message>>;
}

pub struct PgConversationStore {
    pool: DbPool,
}

impl PgConversationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn ensure_user(&self, tenant_id: Uuid, user_id: Uuid, user_type: &str, role: &str) -> CoreResult<User> {
        if let Some(user) = sqlx::query_as::<_, User>(
            "SELECT id, tenant_id, user_type, role, created_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(self.pool.get_pool())
        .await
        .map_err(|e| CoreError::storage(e.to_string()))?
        {
            return Ok(user);
        }

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO users (id, tenant_id, user_type, role, created_at) VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(user_id)
        .bind(tenant_id)
        .bind(user_type)
        .bind(role)
        .bind(now)
        .execute(self.pool.get_pool())
        .await
        .map_err(|e| CoreError::storage(e.to_string()))?;

        Ok(User {
            id: user_id,
            tenant_id,
            user_type: user_type.to_string(),
            role: role.to_string(),
            created_at: now,
        })
    }

    async fn get_or_create(&self, tenant_id: Uuid, user_id: Uuid, channel: &str) -> CoreResult<Conversation> {
        if let Some(convo) = sqlx::query_as::<_, Conversation>(
            "SELECT id, tenant_id, user_id, channel, status, context, started_at, last_message_at \
             FROM conversations \
             WHERE tenant_id = $1 AND user_id = $2 AND channel = $3 AND status = 'ACTIVE' \
             ORDER BY started_at DESC LIMIT 1",
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(channel)
        .fetch_optional(self.pool.get_pool())
        .await
        .map_err(|e| CoreError::storage(e.to_string()))?
        {
            return Ok(convo);
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        let context = Value::Object(Default::default());
        sqlx::query(
            "INSERT INTO conversations (id, tenant_id, user_id, channel, status, context, started_at, last_message_at) \
             VALUES ($1, $2, $3, $4, 'ACTIVE', $5, $6, $6)",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(user_id)
        .bind(channel)
        .bind(&context)
        .bind(now)
        .execute(self.pool.get_pool())
        .await
        .map_err(|e| CoreError::storage(e.to_string()))?;

        Ok(Conversation {
            id,
            tenant_id,
            user_id,
            channel: channel.to_string(),
            status: ConversationStatus::Active,
            context,
            started_at: now,
            last_message_at: now,
        })
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        sender_type: SenderType,
        content: &str,
        message_type: &str,
        metadata: Value,
    ) -> CoreResult<Message> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let sender_str = match sender_type {
            SenderType::User => "USER",
            SenderType::System => "SYSTEM",
            SenderType::HumanAgent => "HUMAN_AGENT",
        };

        sqlx::query(
            "INSERT INTO messages (id, conversation_id, sender_type, content, message_type, metadata, timestamp) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(id)
        .bind(conversation_id)
        .bind(sender_str)
        .bind(content)
        .bind(message_type)
        .bind(&metadata)
        .bind(now)
        .execute(self.pool.get_pool())
        .await
        .map_err(|e| CoreError::storage(e.to_string()))?;

        sqlx::query("UPDATE conversations SET last_message_at = $1 WHERE id = $2")
            .bind(now)
            .bind(conversation_id)
            .execute(self.pool.get_pool())
            .await
            .map_err(|e| CoreError::storage(e.to_string()))?;

        Ok(Message {
            id,
            conversation_id,
            sender_type,
            content: content.to_string(),
            message_type: message_type.to_string(),
            metadata,
            timestamp: now,
        })
    }

    async fn update_context(&self, conversation_id: Uuid, patch: Value) -> CoreResult<()> {
        // `||` is Postgres jsonb's shallow-merge operator: keys in `patch`
        // overwrite, everything else in the stored object survives.
        sqlx::query("UPDATE conversations SET context = COALESCE(context, '{}'::jsonb) || $1 WHERE id = $2")
            .bind(patch)
            .bind(conversation_id)
            .execute(self.pool.get_pool())
            .await
            .map_err(|e| CoreError::storage(e.to_string()))?;
        Ok(())
    }

    async fn list_messages(&self, conversation_id: Uuid, limit: usize) -> CoreResult<Vec<Message>> {
        sqlx::query_as::<_, Message>(
            "SELECT id, conversation_id, sender_type, content, message_type, metadata, timestamp \
             FROM messages WHERE conversation_id = $1 ORDER BY timestamp DESC LIMIT $2",
        )
        .bind(conversation_id)
        .bind(limit as i64)
        .fetch_all(self.pool.get_pool())
        .await
        .map_err(|e| CoreError::storage(e.to_string()))
    }
}
