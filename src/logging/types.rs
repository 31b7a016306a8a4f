//! Activity log record shape for the orchestrator's per-turn audit trail.
//! Adapted from the teacher's session/user i64-keyed `ActivityLog` to the
//! tenant/conversation Uuid schema of `domain::conversation`, carrying the
//! fields spec §4.11's "persists a structured record of each orchestrator
//! turn" calls for: which intent dispatched, how many chunks were
//! retrieved, latency, and error detail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Activity type categories, one per orchestrator step/outcome worth
/// auditing independently of the request/response log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    QueryReceived,
    SensitiveRefusal,
    AnswerProduced,
    NoTenantKnowledge,
    IngestCompleted,
    IngestFailed,
    CacheHit,
    ExternalServiceDegraded,
}

impl ActivityType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::QueryReceived => "query_received",
            Self::SensitiveRefusal => "sensitive_refusal",
            Self::AnswerProduced => "answer_produced",
            Self::NoTenantKnowledge => "no_tenant_knowledge",
            Self::IngestCompleted => "ingest_completed",
            Self::IngestFailed => "ingest_failed",
            Self::CacheHit => "cache_hit",
            Self::ExternalServiceDegraded => "external_service_degraded",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Success,
    Error,
    Warning,
    Info,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

/// One audited event, batch-inserted into `activity_logs` by
/// [`super::ActivityLogger`].
#[derive(Debug, Clone)]
pub struct ActivityLog {
    pub tenant_id: Uuid,
    pub conversation_id: Option<Uuid>,

    pub activity_type: ActivityType,
    pub activity_status: ActivityStatus,

    pub intent: Option<String>,
    pub retrieval_hit_count: Option<i32>,
    pub message_content: Option<String>,
    pub response_content: Option<String>,

    pub processing_time_ms: Option<i32>,

    pub error_message: Option<String>,
    pub error_type: Option<String>,

    pub created_at: DateTime<Utc>,

    pub custom_fields: Option<HashMap<String, Value>>,
}

impl ActivityLog {
    pub fn builder(tenant_id: Uuid, activity_type: ActivityType) -> ActivityLogBuilder {
        ActivityLogBuilder::new(tenant_id, activity_type)
    }
}

/// Builder pattern for `ActivityLog`, carried over from the teacher's
/// fluent `ActivityLogBuilder` shape.
pub struct ActivityLogBuilder {
    log: ActivityLog,
}

impl ActivityLogBuilder {
    pub fn new(tenant_id: Uuid, activity_type: ActivityType) -> Self {
        Self {
            log: ActivityLog {
                tenant_id,
                conversation_id: None,
                activity_type,
                activity_status: ActivityStatus::Success,
                intent: None,
                retrieval_hit_count: None,
                message_content: None,
                response_content: None,
                processing_time_ms: None,
                error_message: None,
                error_type: None,
                created_at: Utc::now(),
                custom_fields: None,
            },
        }
    }

    pub fn status(mut self, status: ActivityStatus) -> Self {
        self.log.activity_status = status;
        self
    }

    pub fn conversation_id(mut self, id: Uuid) -> Self {
        self.log.conversation_id = Some(id);
        self
    }

    pub fn intent(mut self, intent: impl Into<String>) -> Self {
        self.log.intent = Some(intent.into());
        self
    }

    pub fn retrieval_hit_count(mut self, count: i32) -> Self {
        self.log.retrieval_hit_count = Some(count);
        self
    }

    pub fn message(mut self, content: impl Into<String>) -> Self {
        self.log.message_content = Some(content.into());
        self
    }

    pub fn response(mut self, content: impl Into<String>) -> Self {
        self.log.response_content = Some(content.into());
        self
    }

    pub fn processing_time(mut self, ms: i32) -> Self {
        self.log.processing_time_ms = Some(ms);
        self
    }

    pub fn error(mut self, message: impl Into<String>, error_type: impl Into<String>) -> Self {
        self.log.error_message = Some(message.into());
        self.log.error_type = Some(error_type.into());
        self.log.activity_status = ActivityStatus::Error;
        self
    }

    pub fn custom(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.log
            .custom_fields
            .get_or_insert_with(HashMap::new)
            .insert(key.to_string(), value.into());
        self
    }

    pub fn build(self) -> ActivityLog {
        self.log
    }
}
