use crate::config::DatabaseConfig;
use crate::utils::breaker::retry_with_backoff;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{info, warn};

/// Thin wrapper so callers don't reach into `sqlx::PgPool` directly,
/// matching the shape of `rag-embedding-worker`'s own `database/pool.rs`.
#[derive(Clone)]
pub struct DbPool(PgPool);

impl DbPool {
    /// Connects with `connect_attempts` bounded retries; the caller (see
    /// `main.rs`) falls back to `database::memory::InMemoryStore` if every
    /// attempt fails, per spec §6's `DATABASE_URL` contract.
    pub async fn connect(cfg: &DatabaseConfig) -> anyhow::Result<Self> {
        let url = cfg
            .url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL not configured"))?;

        let pool = retry_with_backoff(
            cfg.connect_attempts,
            Duration::from_millis(cfg.connect_retry_delay_ms),
            Duration::from_secs(5),
            || {
                let url = url.clone();
                let max_size = cfg.pool_max_size;
                async move {
                    PgPoolOptions::new()
                        .max_connections(max_size)
                        .connect(&url)
                        .await
                }
            },
        )
        .await
        .map_err(|e| {
            warn!("failed to connect to database after retries: {e}");
            anyhow::anyhow!(e)
        })?;

        info!("database connection pool established");
        Ok(Self(pool))
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.0
    }
}
