//! Generator adapter: the upstream LLM used by `S-generic`, `S-chapter-
//! summary` and the optional planner refinement pass. Grounded on
//! `services/llm_service.rs`'s reqwest client shape (OpenAI-style
//! `/v1/chat/completions`), stripped of streaming (`chat_stream`'s SSE
//! parsing) per spec §1's "No streaming tokens" non-goal: the core only
//! ever needs a single completed string back.

use crate::utils::breaker::{retry_with_backoff, CircuitBreaker};
use crate::utils::error::CoreError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a single completion from a system prompt and user turn.
    /// Returns `Err` only when every retry/breaker path is exhausted;
    /// callers degrade to a snippet answer rather than bubble this up.
    async fn generate(&self, system_prompt: &str, user_message: &str) -> Result<String, CoreError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

pub struct RemoteGenerator {
    client: Client,
    provider_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    retry_attempts: u32,
    breaker: CircuitBreaker,
}

impl RemoteGenerator {
    pub fn new(
        provider_url: String,
        api_key: Option<String>,
        model: String,
        temperature: f32,
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
            temperature,
            retry_attempts: 2,
            breaker,
        }
    }
}

#[async_trait]
impl Generator for RemoteGenerator {
    async fn generate(&self, system_prompt: &str, user_message: &str) -> Result<String, CoreError> {
        if !self.breaker.allow_request() {
            return Err(CoreError::external("generator", "circuit open"));
        }

        let url = format!("{}/v1/chat/completions", self.provider_url);
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_message,
                },
            ],
            temperature: self.temperature,
            stream: false,
        };

        let call = || {
            let mut builder = self.client.post(&url).json(&request);
            if let Some(key) = &self.api_key {
                builder = builder.header("Authorization", format!("Bearer {key}"));
            }
            async move {
                let response = builder.send().await?;
                let response = response.error_for_status()?;
                response.json::<ChatCompletionResponse>().await
            }
        };

        let result = retry_with_backoff(
            self.retry_attempts,
            Duration::from_millis(200),
            Duration::from_secs(3),
            call,
        )
        .await;

        match result {
            Ok(response) => {
                self.breaker.record_success();
                Ok(response
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .unwrap_or_default())
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(CoreError::external("generator", e.to_string()))
            }
        }
    }
}

pub type SharedGenerator = std::sync::Arc<dyn Generator>;
