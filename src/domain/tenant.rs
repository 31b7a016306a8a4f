use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Root of isolation. Every other entity carries a tenant link, directly
/// or transitively, and no query ever crosses this boundary.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub settings: Value,
    pub created_at: DateTime<Utc>,
}
