use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::{info, warn};

mod auth;
mod cache;
mod config;
mod database;
mod document;
mod domain;
mod embedding;
mod generation;
mod handlers;
mod ingest;
mod logging;
mod orchestrator;
mod planner;
mod retrieval;
mod state;
mod strategies;
mod utils;

use cache::{AnswerCache, DisabledCache, RedisAnswerCache};
use config::Settings;
use database::chunk_store::{ChunkStore, PgChunkStore};
use database::conversation_store::{ConversationStore, PgConversationStore};
use database::memory::InMemoryStore;
use database::pool::DbPool;
use database::vector_index::{DisabledVectorIndex, GuardedVectorIndex, PgVectorIndex, VectorIndex};
use embedding::{DeterministicEmbedder, Embedder, RemoteEmbedder};
use generation::{Generator, RemoteGenerator};
use ingest::IngestPipeline;
use logging::ActivityLogger;
use orchestrator::Orchestrator;
use retrieval::RetrieverConfig;
use state::AppState;
use utils::breaker::CircuitBreaker;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .with_target(true)
        .json()
        .init();

    info!("starting RAG query engine");

    let settings = Settings::load()?;
    info!("configuration loaded");

    let db_pool: Option<DbPool> = match DbPool::connect(&settings.database).await {
        Ok(pool) => {
            info!("database connection established");
            Some(pool)
        }
        Err(e) => {
            warn!("no usable database ({e}), falling back to in-memory stores");
            None
        }
    };

    let (chunk_store, conversation_store, logger): (
        Arc<dyn ChunkStore>,
        Arc<dyn ConversationStore>,
        ActivityLogger,
    ) = match &db_pool {
        Some(pool) => {
            let logger = ActivityLogger::new(pool.get_pool().clone(), logging::LoggerConfig::default());
            (
                Arc::new(PgChunkStore::new(pool.clone())),
                Arc::new(PgConversationStore::new(pool.clone())),
                logger,
            )
        }
        None => {
            let memory = Arc::new(InMemoryStore::new());
            (memory.clone(), memory, ActivityLogger::disabled())
        }
    };

    let breaker_cfg = &settings.circuit_breaker;

    let embedder: Arc<dyn Embedder> = match &settings.embedder.provider_url {
        Some(url) => {
            info!("using remote embedder at {url}");
            Arc::new(RemoteEmbedder::new(
                url.clone(),
                settings.embedder.api_key.clone(),
                "text-embedding-3-small".to_string(),
                settings.embedder.dimension,
                settings.embedder.embed_batch_tokens,
                Duration::from_millis(settings.embedder.timeout_ms),
                CircuitBreaker::new("embedder", breaker_cfg.failure_threshold, breaker_cfg.recovery_timeout()),
            ))
        }
        None => {
            info!("no embedder provider configured, using deterministic fallback embedder");
            Arc::new(DeterministicEmbedder::new())
        }
    };

    let generator: Option<Arc<dyn Generator>> = settings.generator.provider_url.as_ref().map(|url| {
        info!("using remote generator at {url}");
        Arc::new(RemoteGenerator::new(
            url.clone(),
            settings.generator.api_key.clone(),
            settings.generator.model.clone(),
            settings.generator.temperature,
            Duration::from_millis(settings.generator.timeout_ms),
            CircuitBreaker::new("generator", breaker_cfg.failure_threshold, breaker_cfg.recovery_timeout()),
        )) as Arc<dyn Generator>
    });

    let vector_index: Arc<dyn VectorIndex> = match (&db_pool, &settings.vector_index.url) {
        (Some(pool), Some(_)) => Arc::new(GuardedVectorIndex::new(
            PgVectorIndex::new(pool.clone()),
            breaker_cfg.failure_threshold,
            breaker_cfg.recovery_timeout(),
        )),
        _ => {
            info!("no vector index configured, dense retrieval runs on the in-memory heuristic only");
            Arc::new(DisabledVectorIndex)
        }
    };

    let cache: Arc<dyn AnswerCache> = match &settings.cache.url {
        Some(url) => match RedisAnswerCache::connect(
            url,
            settings.cache.ttl_seconds,
            CircuitBreaker::new("cache", breaker_cfg.failure_threshold, breaker_cfg.recovery_timeout()),
        ) {
            Ok(cache) => Arc::new(cache),
            Err(e) => {
                warn!("failed to connect to cache ({e}), answers will not be cached");
                Arc::new(DisabledCache)
            }
        },
        None => Arc::new(DisabledCache),
    };

    let retriever_config = RetrieverConfig {
        bm25_k1: settings.rag.bm25_k1,
        bm25_b: settings.rag.bm25_b,
        rrf_k: settings.rag.rrf_k,
    };

    let ingest_pipeline = Arc::new(IngestPipeline::new(
        chunk_store.clone(),
        embedder.clone(),
        settings.rag.chunk_target_chars,
        settings.rag.chunk_overlap_sentences,
        settings.rag.max_file_bytes,
        settings.storage.document_storage_path.clone(),
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        chunk_store,
        conversation_store,
        vector_index,
        embedder,
        generator,
        cache,
        logger,
        retriever_config,
        settings.rag.corpus_limit,
        settings.rag.retrieve_top_k,
    ));

    let addr = SocketAddr::from((settings.server.host.parse::<std::net::IpAddr>()?, settings.server.port));

    let app_state = AppState {
        orchestrator,
        ingest_pipeline,
        settings,
    };

    let app = build_router(app_state);

    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check))
        .route("/query", post(handlers::query::query_handler))
        .route("/ingest", post(handlers::ingest::ingest_json_handler))
        .route("/ingest/file", post(handlers::ingest::ingest_file_handler))
        .route("/webhooks/{channel}", post(handlers::webhook::webhook_handler))
        .layer(
            CorsLayer::permissive()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default().include_headers(true)))
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .with_state(state)
}
