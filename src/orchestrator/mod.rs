//! Query orchestrator (C11): the nine-step per-query pipeline tying the
//! conversation store, planner, hybrid retriever, answer strategies and
//! cache together. Grounded structurally on the teacher's
//! `ConversationManager::handle_message` staged pipeline (understand →
//! plan → retrieve → compose → finalize), stripped of its
//! streaming/LLM-planner machinery per spec's "No streaming tokens"
//! non-goal and the planner's "correct without a Generator" requirement.

use crate::cache::{AnswerCache, CachedAnswer};
use crate::database::chunk_store::ChunkStore;
use crate::database::conversation_store::ConversationStore;
use crate::database::vector_index::VectorIndex;
use crate::domain::SenderType;
use crate::embedding::Embedder;
use crate::generation::Generator;
use crate::logging::{ActivityLog, ActivityLogger, ActivityStatus, ActivityType};
use crate::planner::{Plan, Planner, PlannerContext};
use crate::retrieval::{HybridRetriever, RetrieverConfig};
use crate::strategies::{self, Citation, StrategyDeps, StrategyOutcome};
use crate::utils::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub tenant_id: Uuid,
    pub user_id: Option<Uuid>,
    pub channel: String,
    pub message: String,
    pub context: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub response: String,
    pub citations: Vec<Citation>,
    pub confidence: f32,
    #[serde(rename = "requiresHuman")]
    pub requires_human: bool,
}

impl From<StrategyOutcome> for QueryResponse {
    fn from(outcome: StrategyOutcome) -> Self {
        Self {
            response: outcome.response,
            citations: outcome.citations,
            confidence: outcome.confidence,
            requires_human: outcome.requires_human,
        }
    }
}

const NO_TENANT_KNOWLEDGE_TEXT: &str =
    "I don't have any documents on file for this tenant yet, so I can't answer that.";

pub struct Orchestrator {
    chunk_store: Arc<dyn ChunkStore>,
    conversation_store: Arc<dyn ConversationStore>,
    vector_index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    generator: Option<Arc<dyn Generator>>,
    cache: Arc<dyn AnswerCache>,
    logger: ActivityLogger,
    retriever_config: RetrieverConfig,
    corpus_limit: usize,
    retrieve_top_k: usize,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chunk_store: Arc<dyn ChunkStore>,
        conversation_store: Arc<dyn ConversationStore>,
        vector_index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        generator: Option<Arc<dyn Generator>>,
        cache: Arc<dyn AnswerCache>,
        logger: ActivityLogger,
        retriever_config: RetrieverConfig,
        corpus_limit: usize,
        retrieve_top_k: usize,
    ) -> Self {
        Self {
            chunk_store,
            conversation_store,
            vector_index,
            embedder,
            generator,
            cache,
            logger,
            retriever_config,
            corpus_limit,
            retrieve_top_k,
        }
    }

    pub async fn handle_query(&self, req: QueryRequest) -> CoreResult<QueryResponse> {
        let start = std::time::Instant::now();

        // Step 1: validate identifiers; synthesize a user id if absent.
        if req.tenant_id.is_nil() {
            return Err(CoreError::Validation("tenantId must not be the nil uuid".to_string()));
        }
        if req.message.trim().is_empty() {
            return Err(CoreError::Validation("message must not be empty".to_string()));
        }
        if req.channel.trim().is_empty() {
            return Err(CoreError::Validation("channel must not be empty".to_string()));
        }
        let user_id = req.user_id.unwrap_or_else(Uuid::new_v4);

        self.conversation_store
            .ensure_user(req.tenant_id, user_id, "END_USER", "END_USER")
            .await?;
        let conversation = self
            .conversation_store
            .get_or_create(req.tenant_id, user_id, &req.channel)
            .await?;
        self.conversation_store
            .append_message(conversation.id, SenderType::User, &req.message, "text", json!({}))
            .await?;

        // Step 2: sensitive-attribute guard. Classification doesn't need
        // conversation context for this check, so a default context is
        // fine; the guard short-circuits before retrieval/strategy/cache.
        let guard_plan = Planner::classify(&req.message, &PlannerContext::default());
        if matches!(guard_plan, Plan::SensitiveRefusal) {
            self.logger.log(
                ActivityLog::builder(req.tenant_id, ActivityType::SensitiveRefusal)
                    .conversation_id(conversation.id)
                    .message(req.message.clone())
                    .processing_time(start.elapsed().as_millis() as i32)
                    .build(),
            );
            let outcome = strategies::refusal_outcome();
            return Ok(outcome.into());
        }

        // Cache read-through, keyed on tenant + raw message text; a hit
        // skips corpus load/retrieval/planning entirely but still records
        // the turn (system message appended below).
        let plan_key = req.message.trim().to_lowercase();
        if let Some(cached) = self.cache.get(req.tenant_id, &plan_key).await {
            self.logger.log(
                ActivityLog::builder(req.tenant_id, ActivityType::CacheHit)
                    .conversation_id(conversation.id)
                    .build(),
            );
            self.finalize_turn(&conversation.id, &cached.response, None).await;
            return Ok(QueryResponse {
                response: cached.response,
                citations: cached.citations,
                confidence: cached.confidence,
                requires_human: cached.requires_human,
            });
        }

        // Step 4: tenant corpus snapshot.
        let corpus = self.chunk_store.list_chunks(req.tenant_id, self.corpus_limit).await?;

        // Step 5: empty-corpus short-circuit.
        if corpus.is_empty() {
            self.logger.log(
                ActivityLog::builder(req.tenant_id, ActivityType::NoTenantKnowledge)
                    .conversation_id(conversation.id)
                    .build(),
            );
            let outcome = StrategyOutcome::no_tenant_knowledge(NO_TENANT_KNOWLEDGE_TEXT);
            self.finalize_turn(&conversation.id, &outcome.response, outcome.context_patch.clone())
                .await;
            return Ok(outcome.into());
        }

        // Step 6: hybrid retrieval.
        let query_embedding = self.embedder.embed(std::slice::from_ref(&req.message)).await.ok();
        let retriever = HybridRetriever::new(&corpus, self.retriever_config);
        let retrieved = retriever
            .retrieve(
                &req.message,
                self.retrieve_top_k,
                req.tenant_id,
                query_embedding.as_ref().and_then(|v| v.first()).map(|v| v.as_slice()),
                Some(self.vector_index.as_ref()),
            )
            .await;

        // Step 7: planner + strategy dispatch.
        let planner_context = PlannerContext {
            last_person: conversation.last_person(),
        };
        let plan = Planner::classify(&req.message, &planner_context);
        let deps = StrategyDeps {
            tenant_id: req.tenant_id,
            corpus: &corpus,
            chunk_store: self.chunk_store.as_ref(),
            vector_index: self.vector_index.as_ref(),
            generator: self.generator.as_deref(),
            retriever_config: self.retriever_config,
        };
        let outcome = strategies::execute(&plan, &req.message, &retrieved, &conversation, &deps).await;

        // Step 8: persist system message, merge context, write-through cache.
        self.finalize_turn(&conversation.id, &outcome.response, outcome.context_patch.clone())
            .await;
        self.cache
            .set(
                req.tenant_id,
                &plan_key,
                &CachedAnswer {
                    response: outcome.response.clone(),
                    citations: outcome.citations.clone(),
                    confidence: outcome.confidence,
                    requires_human: outcome.requires_human,
                },
            )
            .await;

        self.logger.log(
            ActivityLog::builder(req.tenant_id, ActivityType::AnswerProduced)
                .conversation_id(conversation.id)
                .intent(plan_label(&plan))
                .retrieval_hit_count(retrieved.len() as i32)
                .status(if outcome.requires_human {
                    ActivityStatus::Warning
                } else {
                    ActivityStatus::Success
                })
                .processing_time(start.elapsed().as_millis() as i32)
                .build(),
        );

        // Step 9.
        Ok(outcome.into())
    }

    async fn finalize_turn(&self, conversation_id: &Uuid, response: &str, context_patch: Option<Value>) {
        if let Err(e) = self
            .conversation_store
            .append_message(*conversation_id, SenderType::System, response, "text", json!({}))
            .await
        {
            tracing::warn!("failed to append system message for conversation {conversation_id}: {e}");
        }

        if let Some(patch) = context_patch {
            if let Err(e) = self.conversation_store.update_context(*conversation_id, patch).await {
                tracing::warn!("failed to update context for conversation {conversation_id}: {e}");
            }
        }
    }
}

fn plan_label(plan: &Plan) -> &'static str {
    match plan {
        Plan::SensitiveRefusal => "sensitive_refusal",
        Plan::ChapterNav { .. } => "chapter_nav",
        Plan::ChapterCount => "chapter_count",
        Plan::ChapterTitles { .. } => "chapter_titles",
        Plan::ChapterSummary { .. } => "chapter_summary",
        Plan::ListRequest { .. } => "list_request",
        Plan::TabularField { .. } => "tabular_field",
        Plan::PolicySummary => "policy_summary",
        Plan::Generic => "generic",
    }
}
