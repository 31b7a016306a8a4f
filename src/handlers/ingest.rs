use axum::{
    extract::{Multipart, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{require_role, Role};
use crate::ingest::IngestResult;
use crate::state::AppState;
use crate::utils::error::CoreError;

#[derive(Debug, Deserialize)]
pub struct JsonIngestRequest {
    pub tenant_id: Uuid,
    pub title: String,
    pub content: String,
    pub knowledge_base_id: Option<Uuid>,
}

/// `POST /ingest` — text/JSON ingest path. Requires at least the `AGENT`
/// role since it writes into a tenant's corpus.
pub async fn ingest_json_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<JsonIngestRequest>,
) -> Result<Json<IngestResult>, CoreError> {
    require_role(&headers, Role::Agent)?;
    let result = state
        .ingest_pipeline
        .ingest_text(req.tenant_id, &req.title, &req.content, req.knowledge_base_id)
        .await?;
    Ok(Json(result))
}

/// `POST /ingest/file` — multipart file upload path. Expects fields
/// `tenantId`, `title`, an optional `knowledgeBaseId`, and `file`.
pub async fn ingest_file_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<IngestResult>, CoreError> {
    require_role(&headers, Role::Agent)?;

    let mut tenant_id: Option<Uuid> = None;
    let mut title: Option<String> = None;
    let mut knowledge_base_id: Option<Uuid> = None;
    let mut filename: Option<String> = None;
    let mut bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| CoreError::Validation(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "tenantId" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| CoreError::Validation(e.to_string()))?;
                tenant_id = Some(
                    text.parse()
                        .map_err(|_| CoreError::Validation("tenantId must be a uuid".to_string()))?,
                );
            }
            "title" => {
                title = Some(field.text().await.map_err(|e| CoreError::Validation(e.to_string()))?);
            }
            "knowledgeBaseId" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| CoreError::Validation(e.to_string()))?;
                if !text.trim().is_empty() {
                    knowledge_base_id = Some(
                        text.parse()
                            .map_err(|_| CoreError::Validation("knowledgeBaseId must be a uuid".to_string()))?,
                    );
                }
            }
            "file" => {
                filename = Some(field.file_name().unwrap_or("upload.bin").to_string());
                bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| CoreError::Validation(e.to_string()))?
                        .to_vec(),
                );
            }
            _ => {}
        }
    }

    let tenant_id = tenant_id.ok_or_else(|| CoreError::Validation("tenantId is required".to_string()))?;
    let title = title.ok_or_else(|| CoreError::Validation("title is required".to_string()))?;
    let filename = filename.ok_or_else(|| CoreError::Validation("file is required".to_string()))?;
    let bytes = bytes.ok_or_else(|| CoreError::Validation("file is required".to_string()))?;

    let result = state
        .ingest_pipeline
        .ingest_file(tenant_id, &title, &filename, &bytes, knowledge_base_id)
        .await?;
    Ok(Json(result))
}
