//! Embedder adapter (C3): batched embedding behind a fixed-dimension
//! contract, with a deterministic fallback used whenever no provider is
//! configured. Grounded on `services/embedding_service.rs`'s reqwest
//! client shape (OpenAI-style `/v1/embeddings`, bearer auth, batch loop)
//! generalized from per-call single-text requests to token-budgeted
//! batches per spec §4.3, and on `utils/breaker.rs` for retry/backoff.

use crate::utils::breaker::{retry_with_backoff, CircuitBreaker};
use crate::utils::error::CoreError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::warn;

/// Dimension used by the deterministic fallback embedder.
pub const FALLBACK_DIMENSION: usize = 256;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Fixed dimension of every vector this embedder returns.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, preserving input order. The core MUST NOT
    /// mix dimensions within a tenant; callers compare `dimension()` to
    /// the chunk/vector-index's configured D before trusting results.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoreError>;
}

/// `vector[i] = f(sha256(text), i)`, a seeded pseudo-random mapping into
/// `[-1, 1]`. Used when no provider is configured and as a test seam.
pub struct DeterministicEmbedder {
    dimension: usize,
}

impl DeterministicEmbedder {
    pub fn new() -> Self {
        Self {
            dimension: FALLBACK_DIMENSION,
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        (0..self.dimension)
            .map(|i| {
                let byte = digest[i % digest.len()] as u32;
                let mixed = byte.wrapping_add((i as u32).wrapping_mul(2654435761));
                let mixed = mixed ^ (mixed >> 13);
                (mixed % 2001) as f32 / 1000.0 - 1.0
            })
            .collect()
    }
}

impl Default for DeterministicEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for DeterministicEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoreError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    index: usize,
}

/// Batches inputs so the estimated token count (`ceil(len/4)`) per batch
/// stays under `embed_batch_tokens`, issuing one HTTP call per batch.
pub struct RemoteEmbedder {
    client: Client,
    provider_url: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
    batch_token_cap: usize,
    retry_attempts: u32,
    breaker: CircuitBreaker,
}

impl RemoteEmbedder {
    pub fn new(
        provider_url: String,
        api_key: Option<String>,
        model: String,
        dimension: usize,
        batch_token_cap: usize,
        timeout: Duration,
        breaker: CircuitBreaker,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            provider_url,
            api_key,
            model,
            dimension,
            batch_token_cap: batch_token_cap.max(1),
            retry_attempts: 3,
            breaker,
        }
    }

    fn estimated_tokens(text: &str) -> usize {
        (text.chars().count() + 3) / 4
    }

    /// Greedily groups `texts` so each batch's estimated token sum stays
    /// at or under the cap; a single text exceeding the cap alone still
    /// forms its own one-item batch.
    fn batch_by_tokens(&self, texts: &[String]) -> Vec<Vec<usize>> {
        let mut batches = Vec::new();
        let mut current = Vec::new();
        let mut current_tokens = 0usize;

        for (i, text) in texts.iter().enumerate() {
            let tokens = Self::estimated_tokens(text);
            if !current.is_empty() && current_tokens + tokens > self.batch_token_cap {
                batches.push(std::mem::take(&mut current));
                current_tokens = 0;
            }
            current.push(i);
            current_tokens += tokens;
        }
        if !current.is_empty() {
            batches.push(current);
        }
        batches
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoreError> {
        let url = format!("{}/v1/embeddings", self.provider_url);
        let request = EmbeddingRequest {
            input: texts,
            model: &self.model,
        };

        let call = || {
            let mut builder = self.client.post(&url).json(&request);
            if let Some(key) = &self.api_key {
                builder = builder.header("Authorization", format!("Bearer {key}"));
            }
            async move {
                let response = builder.send().await?;
                let response = response.error_for_status()?;
                response.json::<EmbeddingResponse>().await
            }
        };

        let response = retry_with_backoff(
            self.retry_attempts,
            Duration::from_millis(200),
            Duration::from_secs(5),
            call,
        )
        .await
        .map_err(|e| CoreError::external("embedder", e.to_string()))?;

        let mut out = vec![Vec::new(); texts.len()];
        for datum in response.data {
            if datum.index < out.len() {
                out[datum.index] = datum.embedding;
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoreError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if !self.breaker.allow_request() {
            return Err(CoreError::external("embedder", "circuit open"));
        }

        let mut out = vec![Vec::new(); texts.len()];
        for batch_idxs in self.batch_by_tokens(texts) {
            let batch_texts: Vec<String> = batch_idxs.iter().map(|&i| texts[i].clone()).collect();
            match self.embed_batch(&batch_texts).await {
                Ok(vectors) => {
                    self.breaker.record_success();
                    for (slot, vector) in batch_idxs.into_iter().zip(vectors) {
                        out[slot] = vector;
                    }
                }
                Err(e) => {
                    self.breaker.record_failure();
                    warn!("remote embedder batch failed: {e}");
                    return Err(e);
                }
            }
        }
        Ok(out)
    }
}

pub type SharedEmbedder = std::sync::Arc<dyn Embedder>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deterministic_embedder_is_stable_and_bounded() {
        let embedder = DeterministicEmbedder::new();
        let a = embedder.embed(&["hello world".to_string()]).await.unwrap();
        let b = embedder.embed(&["hello world".to_string()]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), FALLBACK_DIMENSION);
        assert!(a[0].iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[tokio::test]
    async fn deterministic_embedder_differs_across_inputs() {
        let embedder = DeterministicEmbedder::new();
        let vectors = embedder
            .embed(&["foo".to_string(), "bar".to_string()])
            .await
            .unwrap();
        assert_ne!(vectors[0], vectors[1]);
    }

    #[test]
    fn batches_respect_token_cap() {
        let embedder = RemoteEmbedder::new(
            "http://example".to_string(),
            None,
            "m".to_string(),
            8,
            10,
            Duration::from_secs(1),
            CircuitBreaker::new("test-embedder", 5, Duration::from_secs(1)),
        );
        // each text ~ 3 tokens (12 chars / 4); cap 10 => 3 per batch max
        let texts = vec!["x".repeat(12); 7];
        let batches = embedder.batch_by_tokens(&texts);
        assert!(batches.iter().all(|b| b.len() <= 3));
        assert_eq!(batches.iter().map(|b| b.len()).sum::<usize>(), 7);
    }
}
