use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ConversationStatus {
    Active,
    Completed,
    Escalated,
}

/// Invariant: at most one ACTIVE conversation per `(tenant_id, user_id, channel)`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub channel: String,
    pub status: ConversationStatus,
    /// Mutable short-term memory: `last_person`, `last_chapter`,
    /// `last_list_topic`, `last_list_items`, `last_list_index`.
    pub context: Value,
    pub started_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
}

impl Conversation {
    pub fn last_person(&self) -> Option<String> {
        self.context
            .get("last_person")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    pub fn last_chapter(&self) -> Option<i64> {
        self.context.get("last_chapter").and_then(|v| v.as_i64())
    }

    pub fn last_list_topic(&self) -> Option<String> {
        self.context
            .get("last_list_topic")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    pub fn last_list_items(&self) -> Vec<String> {
        self.context
            .get("last_list_items")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn last_list_index(&self) -> usize {
        self.context
            .get("last_list_index")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum SenderType {
    User,
    System,
    HumanAgent,
}

/// Append-only; never updated. Ordering within a conversation is the
/// monotonically increasing `timestamp` recorded at append time.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_type: SenderType,
    pub content: String,
    pub message_type: String,
    pub metadata: Value,
    pub timestamp: DateTime<Utc>,
}

/// Created lazily on first message.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_type: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}
