//! End-to-end orchestrator tests, exercising the full query pipeline
//! (conversation store -> guard -> cache -> corpus load -> retrieval ->
//! planner -> strategy -> persistence) against the in-memory stores and
//! deterministic embedder, with no external services configured. Mirrors
//! the scenario list carried over from the original chat-bot's own
//! end-to-end suite: salary lookup, unknown person, sensitive refusal,
//! chapter navigation, and list pagination.

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::cache::DisabledCache;
use crate::database::chunk_store::{ChunkStore, NewChunk};
use crate::database::memory::InMemoryStore;
use crate::database::vector_index::DisabledVectorIndex;
use crate::domain::DocumentStatus;
use crate::embedding::{DeterministicEmbedder, Embedder};
use crate::ingest::IngestPipeline;
use crate::logging::ActivityLogger;
use crate::orchestrator::{Orchestrator, QueryRequest};
use crate::retrieval::RetrieverConfig;

fn fresh_pipeline(store: Arc<InMemoryStore>, embedder: Arc<DeterministicEmbedder>) -> IngestPipeline {
    IngestPipeline::new(
        store,
        embedder,
        1400,
        2,
        10 * 1024 * 1024,
        std::env::temp_dir().to_string_lossy().to_string(),
    )
}

fn fresh_orchestrator(store: Arc<InMemoryStore>, embedder: Arc<DeterministicEmbedder>) -> Orchestrator {
    Orchestrator::new(
        store.clone(),
        store,
        Arc::new(DisabledVectorIndex),
        embedder,
        None,
        Arc::new(DisabledCache),
        ActivityLogger::disabled(),
        RetrieverConfig::default(),
        2_000,
        10,
    )
}

#[tokio::test]
async fn salary_lookup_returns_exact_formatted_answer() {
    let store = Arc::new(InMemoryStore::new());
    let embedder = Arc::new(DeterministicEmbedder::new());
    let pipeline = fresh_pipeline(store.clone(), embedder.clone());
    let orchestrator = fresh_orchestrator(store, embedder);

    let tenant_id = Uuid::new_v4();
    let csv = b"Employee_Name,Department,Salary\n\"Akinkuolie, Sarah\",Engineering,95000\n".to_vec();
    pipeline
        .ingest_file(tenant_id, "Employees", "employees.csv", &csv, None)
        .await
        .unwrap();

    let response = orchestrator
        .handle_query(QueryRequest {
            tenant_id,
            user_id: None,
            channel: "web".to_string(),
            message: "What is the salary of Akinkuolie, Sarah?".to_string(),
            context: None,
        })
        .await
        .unwrap();

    assert_eq!(response.response, "The salary of Akinkuolie, Sarah is $95,000.");
    assert!(!response.requires_human);
}

#[tokio::test]
async fn unknown_person_lookup_is_a_polite_miss_not_a_hallucination() {
    let store = Arc::new(InMemoryStore::new());
    let embedder = Arc::new(DeterministicEmbedder::new());
    let pipeline = fresh_pipeline(store.clone(), embedder.clone());
    let orchestrator = fresh_orchestrator(store, embedder);

    let tenant_id = Uuid::new_v4();
    let csv = b"Employee_Name,Department,Salary\n\"Akinkuolie, Sarah\",Engineering,95000\n".to_vec();
    pipeline
        .ingest_file(tenant_id, "Employees", "employees.csv", &csv, None)
        .await
        .unwrap();

    let response = orchestrator
        .handle_query(QueryRequest {
            tenant_id,
            user_id: None,
            channel: "web".to_string(),
            message: "What is the salary of John Doe?".to_string(),
            context: None,
        })
        .await
        .unwrap();

    assert!(response.response.contains("John Doe"));
    assert!(response.requires_human);
}

#[tokio::test]
async fn sensitive_attribute_question_is_refused_before_retrieval() {
    let store = Arc::new(InMemoryStore::new());
    let embedder = Arc::new(DeterministicEmbedder::new());
    let orchestrator = fresh_orchestrator(store, embedder);

    let tenant_id = Uuid::new_v4();
    let response = orchestrator
        .handle_query(QueryRequest {
            tenant_id,
            user_id: None,
            channel: "web".to_string(),
            message: "What is the ethnicity of Akinkuolie, Sarah?".to_string(),
            context: None,
        })
        .await
        .unwrap();

    assert_eq!(
        response.response,
        "I can't help with questions about protected attributes such as ethnicity, race, religion, or sexual orientation."
    );
    assert!(response.requires_human);
}

#[tokio::test]
async fn empty_tenant_corpus_reports_no_knowledge_instead_of_guessing() {
    let store = Arc::new(InMemoryStore::new());
    let embedder = Arc::new(DeterministicEmbedder::new());
    let orchestrator = fresh_orchestrator(store, embedder);

    let response = orchestrator
        .handle_query(QueryRequest {
            tenant_id: Uuid::new_v4(),
            user_id: None,
            channel: "web".to_string(),
            message: "What does the handbook say about vacation?".to_string(),
            context: None,
        })
        .await
        .unwrap();

    assert!(response.requires_human);
    assert!(response.citations.is_empty());
}

#[tokio::test]
async fn chapter_navigation_finds_the_next_numbered_chapter() {
    let store = Arc::new(InMemoryStore::new());
    let embedder = Arc::new(DeterministicEmbedder::new());
    let pipeline = fresh_pipeline(store.clone(), embedder.clone());
    let orchestrator = fresh_orchestrator(store, embedder);

    let tenant_id = Uuid::new_v4();
    let manual = "[[PAGE:1]]\nChapter 2: Setup\nThis chapter covers environment setup and \
                  installation steps for the toolkit in detail.\n\
                  [[PAGE:2]]\nChapter 3: Usage\nThis chapter covers everyday usage patterns \
                  and common workflows for the toolkit in detail.";
    pipeline.ingest_text(tenant_id, "Manual", manual, None).await.unwrap();

    let response = orchestrator
        .handle_query(QueryRequest {
            tenant_id,
            user_id: None,
            channel: "web".to_string(),
            message: "next chapter after chapter 2".to_string(),
            context: None,
        })
        .await
        .unwrap();

    assert_eq!(response.response, "The next chapter is Chapter 3: Usage.");
    assert!(!response.requires_human);
}

#[tokio::test]
async fn list_pagination_carries_state_across_turns_in_one_conversation() {
    let store = Arc::new(InMemoryStore::new());
    let embedder = Arc::new(DeterministicEmbedder::new());
    let orchestrator = fresh_orchestrator(store.clone(), embedder.clone());

    let tenant_id = Uuid::new_v4();
    let kb = store.get_or_create_default_kb(tenant_id).await.unwrap();
    let document = store
        .create_document(kb.id, "Project Management Guide", "process groups", json!({}))
        .await
        .unwrap();
    let content = "Project management involves five core process groups that guide delivery.\n\
                   - Initiation\n- Planning\n- Execution\n- Monitoring and Controlling\n- Closure";
    let embedding = embedder.embed(&[content.to_string()]).await.unwrap().remove(0);
    store
        .insert_chunks(
            document.id,
            vec![NewChunk {
                content: content.to_string(),
                chunk_index: 0,
                embedding,
                metadata: json!({}),
            }],
        )
        .await
        .unwrap();
    store
        .finalize_document(document.id, DocumentStatus::Indexed, 1)
        .await
        .unwrap();

    let user_id = Uuid::new_v4();

    let first = orchestrator
        .handle_query(QueryRequest {
            tenant_id,
            user_id: Some(user_id),
            channel: "web".to_string(),
            message: "first 3 processes of project management".to_string(),
            context: None,
        })
        .await
        .unwrap();
    assert_eq!(first.response, "1. Initiation\n2. Planning\n3. Execution");

    let second = orchestrator
        .handle_query(QueryRequest {
            tenant_id,
            user_id: Some(user_id),
            channel: "web".to_string(),
            message: "next 2".to_string(),
            context: None,
        })
        .await
        .unwrap();
    assert_eq!(second.response, "4. Monitoring and Controlling\n5. Closure");
}

#[tokio::test]
async fn distinct_tenants_never_see_each_others_corpus() {
    let store = Arc::new(InMemoryStore::new());
    let embedder = Arc::new(DeterministicEmbedder::new());
    let pipeline = fresh_pipeline(store.clone(), embedder.clone());
    let orchestrator = fresh_orchestrator(store, embedder);

    let tenant_a = Uuid::new_v4();
    let tenant_b = Uuid::new_v4();
    let csv = b"Employee_Name,Department,Salary\n\"Akinkuolie, Sarah\",Engineering,95000\n".to_vec();
    pipeline
        .ingest_file(tenant_a, "Employees", "employees.csv", &csv, None)
        .await
        .unwrap();

    let response = orchestrator
        .handle_query(QueryRequest {
            tenant_id: tenant_b,
            user_id: None,
            channel: "web".to_string(),
            message: "What is the salary of Akinkuolie, Sarah?".to_string(),
            context: None,
        })
        .await
        .unwrap();

    assert!(response.requires_human);
    assert!(!response.response.contains("95,000"));
}
