use anyhow::Result;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration, loaded the way the teacher's `Settings::load()`
/// does: `dotenvy` for a local `.env`, then `config::Config::builder()`
/// layering an optional base TOML file under `Environment::with_prefix
/// ("APP")` using a `__` separator, so e.g. `APP__EMBEDDER__PROVIDER_URL`
/// overrides `embedder.provider_url`. Every option documented in spec §6
/// lives here.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub embedder: EmbedderConfig,
    pub generator: GeneratorConfig,
    pub vector_index: VectorIndexConfig,
    pub cache: CacheConfig,
    pub rag: RagConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub storage: StorageConfig,
    pub webhook: WebhookConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    /// Absent, or unreachable after `connect_attempts` retries, falls back
    /// to the local in-process store (`database::memory::InMemoryStore`).
    pub url: Option<String>,
    pub pool_max_size: u32,
    pub connect_attempts: u32,
    pub connect_retry_delay_ms: u64,
}

/// Absence of `provider_url` selects the deterministic fallback embedder.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbedderConfig {
    pub provider_url: Option<String>,
    pub api_key: Option<String>,
    pub dimension: usize,
    pub embed_batch_tokens: usize,
    pub timeout_ms: u64,
}

/// Absence of `provider_url` disables generator-backed strategies; they
/// degrade to snippet answers per spec §6.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GeneratorConfig {
    pub provider_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub timeout_ms: u64,
}

/// Absence of `url` limits dense search to the in-memory heuristic; the
/// per-request retriever still runs regardless (spec §4.6/§9 Open
/// Questions: in-memory heuristic chosen for the per-request path, the
/// external index is a side channel only).
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VectorIndexConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

/// Absence of `url` disables caching entirely (fail-open by construction).
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    pub url: Option<String>,
    pub ttl_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RagConfig {
    pub max_file_bytes: usize,
    pub chunk_target_chars: usize,
    pub chunk_overlap_sentences: usize,
    pub rrf_k: f32,
    pub retrieve_top_k: usize,
    pub corpus_limit: usize,
    pub bm25_k1: f32,
    pub bm25_b: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// `{base_path}/tenant_{t}/documents/{d}/metadata.json` sidecar root.
    pub document_storage_path: String,
}

/// Absence of `shared_secret` disables signature verification; webhooks
/// are then trusted at the network boundary instead (e.g. an upstream
/// proxy already validated them).
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebhookConfig {
    pub shared_secret: Option<String>,
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::new("config/settings", FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("database.url", None::<String>)?
            .set_default("database.pool_max_size", 10)?
            .set_default("database.connect_attempts", 3)?
            .set_default("database.connect_retry_delay_ms", 500)?
            .set_default("embedder.provider_url", None::<String>)?
            .set_default("embedder.api_key", None::<String>)?
            .set_default("embedder.dimension", 256)?
            .set_default("embedder.embed_batch_tokens", 280_000)?
            .set_default("embedder.timeout_ms", 10_000)?
            .set_default("generator.provider_url", None::<String>)?
            .set_default("generator.api_key", None::<String>)?
            .set_default("generator.model", "default")?
            .set_default("generator.temperature", 0.3)?
            .set_default("generator.timeout_ms", 20_000)?
            .set_default("vector_index.url", None::<String>)?
            .set_default("vector_index.api_key", None::<String>)?
            .set_default("vector_index.retry_attempts", 3)?
            .set_default("vector_index.retry_delay_ms", 100)?
            .set_default("vector_index.retry_max_delay_ms", 2_000)?
            .set_default("cache.url", None::<String>)?
            .set_default("cache.ttl_seconds", 300)?
            .set_default("rag.max_file_bytes", 10 * 1024 * 1024)?
            .set_default("rag.chunk_target_chars", 1_400)?
            .set_default("rag.chunk_overlap_sentences", 2)?
            .set_default("rag.rrf_k", 60.0)?
            .set_default("rag.retrieve_top_k", 10)?
            .set_default("rag.corpus_limit", 2_000)?
            .set_default("rag.bm25_k1", 1.5)?
            .set_default("rag.bm25_b", 0.75)?
            .set_default("circuit_breaker.failure_threshold", 5)?
            .set_default("circuit_breaker.recovery_timeout_ms", 30_000)?
            .set_default("storage.document_storage_path", "./data/documents")?
            .set_default("webhook.shared_secret", None::<String>)?
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_defaults_without_env_or_file() {
        let settings = Settings::load().expect("defaults alone must be loadable");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.rag.chunk_target_chars, 1_400);
        assert!(settings.embedder.provider_url.is_none());
    }
}
