//! Answer cache (C10): a small Redis-backed memo of recent query answers,
//! keyed per tenant so one tenant's cache entries are never visible to
//! another. Grounded on `sso-infrastructure`'s `RedisCache` adapter shape
//! (a `deadpool-redis` pool behind a trait, `Cargo.toml`'s `redis` +
//! `deadpool-redis` pair) and on `utils/breaker.rs` for the same
//! degrade-to-miss behavior `database::vector_index` uses: a cache
//! failure is a cache miss, never a query failure.

use crate::strategies::Citation;
use crate::utils::breaker::CircuitBreaker;
use async_trait::async_trait;
use deadpool_redis::{redis::AsyncCommands, Config, Pool, Runtime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedAnswer {
    pub response: String,
    pub citations: Vec<Citation>,
    pub confidence: f32,
    pub requires_human: bool,
}

#[async_trait]
pub trait AnswerCache: Send + Sync {
    async fn get(&self, tenant_id: Uuid, plan_key: &str) -> Option<CachedAnswer>;
    async fn set(&self, tenant_id: Uuid, plan_key: &str, answer: &CachedAnswer);
}

/// Tenant-scoped so a key collision across tenants is structurally
/// impossible: the tenant id is part of the Redis key, not just the hash
/// input.
fn redis_key(tenant_id: Uuid, plan_key: &str) -> String {
    let digest = Sha256::digest(plan_key.as_bytes());
    format!("rag:answer:{tenant_id}:{}", hex::encode(digest))
}

pub struct RedisAnswerCache {
    pool: Pool,
    ttl_seconds: u64,
    breaker: CircuitBreaker,
}

impl RedisAnswerCache {
    pub fn connect(url: &str, ttl_seconds: u64, breaker: CircuitBreaker) -> anyhow::Result<Self> {
        let pool = Config::from_url(url).create_pool(Some(Runtime::Tokio1))?;
        Ok(Self {
            pool,
            ttl_seconds,
            breaker,
        })
    }
}

#[async_trait]
impl AnswerCache for RedisAnswerCache {
    async fn get(&self, tenant_id: Uuid, plan_key: &str) -> Option<CachedAnswer> {
        if !self.breaker.allow_request() {
            return None;
        }
        let key = redis_key(tenant_id, plan_key);

        let result: Result<Option<String>, _> = async {
            let mut conn = self.pool.get().await?;
            let raw: Option<String> = conn.get(&key).await?;
            Ok::<_, anyhow::Error>(raw)
        }
        .await;

        match result {
            Ok(Some(raw)) => {
                self.breaker.record_success();
                serde_json::from_str(&raw).ok()
            }
            Ok(None) => {
                self.breaker.record_success();
                None
            }
            Err(e) => {
                self.breaker.record_failure();
                warn!("answer cache get failed: {e}");
                None
            }
        }
    }

    async fn set(&self, tenant_id: Uuid, plan_key: &str, answer: &CachedAnswer) {
        if !self.breaker.allow_request() {
            return;
        }
        let key = redis_key(tenant_id, plan_key);
        let Ok(serialized) = serde_json::to_string(answer) else {
            return;
        };
        let ttl = self.ttl_seconds;

        let result = async {
            let mut conn = self.pool.get().await?;
            conn.set_ex::<_, _, ()>(&key, serialized, ttl).await?;
            Ok::<_, anyhow::Error>(())
        }
        .await;

        match result {
            Ok(()) => self.breaker.record_success(),
            Err(e) => {
                self.breaker.record_failure();
                warn!("answer cache set failed: {e}");
            }
        }
    }
}

/// No-op cache used when no `cache.url` is configured; every lookup is a
/// miss and every write is a no-op, per spec's "absence of `url` disables
/// caching entirely" rule.
pub struct DisabledCache;

#[async_trait]
impl AnswerCache for DisabledCache {
    async fn get(&self, _tenant_id: Uuid, _plan_key: &str) -> Option<CachedAnswer> {
        None
    }

    async fn set(&self, _tenant_id: Uuid, _plan_key: &str, _answer: &CachedAnswer) {}
}

pub type SharedAnswerCache = std::sync::Arc<dyn AnswerCache>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_key_differs_across_tenants() {
        let a = redis_key(Uuid::nil(), "plan-key");
        let b = redis_key(Uuid::new_v4(), "plan-key");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn disabled_cache_always_misses() {
        let cache = DisabledCache;
        let answer = CachedAnswer {
            response: "hi".to_string(),
            citations: Vec::new(),
            confidence: 1.0,
            requires_human: false,
        };
        cache.set(Uuid::new_v4(), "k", &answer).await;
        assert!(cache.get(Uuid::new_v4(), "k").await.is_none());
    }
}
