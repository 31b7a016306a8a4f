use axum::{extract::State, Json};

use crate::orchestrator::{QueryRequest, QueryResponse};
use crate::state::AppState;
use crate::utils::error::CoreError;

/// `POST /query` — spec §6's single conversational entry point. Identifier
/// validation and every other step live in `Orchestrator::handle_query`;
/// this handler only adapts the HTTP envelope.
pub async fn query_handler(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, CoreError> {
    let response = state.orchestrator.handle_query(req).await?;
    Ok(Json(response))
}
