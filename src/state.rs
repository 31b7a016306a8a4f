use std::sync::Arc;

use crate::config::Settings;
use crate::ingest::IngestPipeline;
use crate::orchestrator::Orchestrator;

/// Shared application state. `Orchestrator` and `IngestPipeline` already
/// hold their own `Arc`-wrapped stores/embedder/cache internally; handlers
/// only need these two entry points plus `settings` for request-time
/// config reads (e.g. the webhook shared secret).
#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub orchestrator: Arc<Orchestrator>,
    pub ingest_pipeline: Arc<IngestPipeline>,
}
