pub mod settings;

pub use settings::{
    CacheConfig, CircuitBreakerConfig, DatabaseConfig, EmbedderConfig, GeneratorConfig,
    RagConfig, ServerConfig, Settings, StorageConfig, VectorIndexConfig, WebhookConfig,
};
