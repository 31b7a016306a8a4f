//! Answer strategies (C8): one handler per planner intent. Grounded on
//! `original_source/.../answer_strategies.py`'s per-intent handler set,
//! reimplemented against `RetrievedChunk`/`KnowledgeChunk` rather than
//! dict rows, with context mutation expressed as a JSON patch the
//! orchestrator merges (spec §4.9's `update_context`) instead of direct
//! mutation of a shared dict.

use crate::database::chunk_store::ChunkStore;
use crate::database::vector_index::VectorIndex;
use crate::domain::{Conversation, KnowledgeChunk};
use crate::generation::Generator;
use crate::planner::{ListMode, Plan, TabularField};
use crate::retrieval::{HybridRetriever, RetrievedChunk, RetrieverConfig};
use crate::utils::text::{format_currency, normalize_header, parse_delimited_row, split_sentences_loose};
use serde_json::{json, Value};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Citation {
    pub source: String,
    pub title: String,
    pub relevance: f32,
    pub snippet: String,
}

#[derive(Debug, Clone)]
pub struct StrategyOutcome {
    pub response: String,
    pub citations: Vec<Citation>,
    pub confidence: f32,
    pub requires_human: bool,
    /// Merged into the conversation's mutable `context` by the
    /// orchestrator; `None` means no context change.
    pub context_patch: Option<Value>,
}

impl StrategyOutcome {
    fn refusal(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            citations: Vec::new(),
            confidence: 0.0,
            requires_human: true,
            context_patch: None,
        }
    }

    /// Used by the orchestrator when the tenant corpus is empty, before
    /// any plan has been classified.
    pub fn no_tenant_knowledge(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            citations: Vec::new(),
            confidence: 0.0,
            requires_human: true,
            context_patch: None,
        }
    }
}

/// Sensitive-attribute refusal outcome, exposed for the orchestrator's
/// guard step which runs before retrieval/conversation context exist.
pub fn refusal_outcome() -> StrategyOutcome {
    StrategyOutcome::refusal(SENSITIVE_REFUSAL_TEXT)
}

fn citation_from(chunk: &RetrievedChunk) -> Citation {
    let doc_prefix: String = chunk.document_id.to_string().chars().take(8).collect();
    Citation {
        source: chunk.document_id.to_string(),
        title: format!("document-{doc_prefix}"),
        relevance: chunk.score,
        snippet: chunk.content.chars().take(160).collect(),
    }
}

fn citations_from(chunks: &[RetrievedChunk], cap: usize) -> Vec<Citation> {
    chunks.iter().take(cap).map(citation_from).collect()
}

/// External services and corpus snapshot a strategy may need. Built once
/// per query by the orchestrator.
pub struct StrategyDeps<'a> {
    pub tenant_id: Uuid,
    pub corpus: &'a [KnowledgeChunk],
    pub chunk_store: &'a dyn ChunkStore,
    pub vector_index: &'a dyn VectorIndex,
    pub generator: Option<&'a dyn Generator>,
    pub retriever_config: RetrieverConfig,
}

const SENSITIVE_REFUSAL_TEXT: &str = "I can't help with questions about protected attributes such as ethnicity, race, religion, or sexual orientation.";
const NO_INFO_SENTINEL: &str = "I don't have enough information in the available documents to answer that.";

pub async fn execute(
    plan: &Plan,
    utterance: &str,
    retrieved: &[RetrievedChunk],
    conversation: &Conversation,
    deps: &StrategyDeps<'_>,
) -> StrategyOutcome {
    match plan {
        Plan::SensitiveRefusal => StrategyOutcome::refusal(SENSITIVE_REFUSAL_TEXT),
        Plan::TabularField { field, person } => tabular_field(*field, person.as_deref(), deps.corpus),
        Plan::ChapterNav { base } => chapter_nav(*base, retrieved, deps).await,
        Plan::ChapterCount => chapter_count(deps).await,
        Plan::ChapterTitles { n } => chapter_titles(*n, retrieved, deps).await,
        Plan::ChapterSummary { chapter } => chapter_summary(*chapter, retrieved, deps).await,
        Plan::ListRequest { mode, n, topic } => list_request(*mode, *n, topic.as_deref(), retrieved, conversation),
        Plan::PolicySummary => policy_summary(retrieved),
        Plan::Generic => generic(utterance, retrieved, deps).await,
    }
}

// ---------------------------------------------------------------- S-tabular

const NAME_COLUMN_CANDIDATES: &[&str] =
    &["employee_name", "name", "employee", "empname", "full_name", "employee_full_name"];

fn normalize_name_value(raw: &str) -> String {
    raw.trim().split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn name_variants(person: &str) -> Vec<String> {
    let mut variants = vec![normalize_name_value(person)];
    if let Some((last, first)) = person.split_once(',') {
        variants.push(normalize_name_value(&format!("{} {}", first.trim(), last.trim())));
    }
    variants
}

fn row_columns(chunk: &KnowledgeChunk) -> Option<Vec<String>> {
    chunk
        .metadata
        .get("columns")
        .and_then(|c| c.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
}

fn tabular_field(field: TabularField, person: Option<&str>, corpus: &[KnowledgeChunk]) -> StrategyOutcome {
    let Some(person) = person else {
        return not_found(field, "the requested person");
    };
    let variants = name_variants(person);

    for chunk in corpus {
        let Some(columns) = row_columns(chunk) else {
            continue;
        };
        let cells = parse_delimited_row(&chunk.content, ',');
        if cells.len() != columns.len() {
            continue;
        }

        let name_idx = columns
            .iter()
            .position(|c| NAME_COLUMN_CANDIDATES.contains(&c.as_str()))
            .or_else(|| {
                cells
                    .iter()
                    .position(|cell| variants.contains(&normalize_name_value(cell)))
            });

        let Some(name_idx) = name_idx else {
            continue;
        };
        let Some(cell_value) = cells.get(name_idx) else {
            continue;
        };
        if !variants.contains(&normalize_name_value(cell_value)) {
            continue;
        }

        let canonical_name = cell_value.clone();
        let field_idx = columns.iter().position(|c| field.aliases().contains(&c.as_str()));
        let Some(field_idx) = field_idx else {
            return not_found_after_match(field, &canonical_name);
        };
        let value = cells.get(field_idx).map(|s| s.trim()).unwrap_or("");
        if value.is_empty() {
            return not_found_after_match(field, &canonical_name);
        }

        let formatted = match field {
            TabularField::Salary => format!("${}", format_currency(value)),
            _ => value.to_string(),
        };
        let response = format!("The {} of {} is {}.", field_label(field), canonical_name, formatted);
        let doc_prefix: String = chunk.document_id.to_string().chars().take(8).collect();
        return StrategyOutcome {
            response,
            citations: vec![Citation {
                source: chunk.document_id.to_string(),
                title: format!("document-{doc_prefix}"),
                relevance: 1.0,
                snippet: chunk.content.chars().take(160).collect(),
            }],
            confidence: 0.95,
            requires_human: false,
            context_patch: Some(json!({ "last_person": canonical_name })),
        };
    }

    not_found(field, person)
}

fn field_label(field: TabularField) -> &'static str {
    match field {
        TabularField::Salary => "salary",
        TabularField::Department => "department",
        TabularField::Manager => "manager",
        TabularField::EmploymentStatus => "employment status",
        TabularField::Position => "position",
        TabularField::Location => "location",
    }
}

fn not_found(field: TabularField, person: &str) -> StrategyOutcome {
    let _ = field;
    StrategyOutcome::refusal(format!(
        "I couldn't find a record for \"{person}\". Please verify the spelling and try again."
    ))
}

fn not_found_after_match(field: TabularField, canonical_name: &str) -> StrategyOutcome {
    StrategyOutcome::refusal(format!(
        "I found {canonical_name} but no {} is recorded for them.",
        field_label(field)
    ))
}

// --------------------------------------------------------------- chapters

fn chapter_pairs_from_chunks<'a>(chunks: impl Iterator<Item = &'a KnowledgeChunk>) -> Vec<(i64, Option<String>)> {
    let mut seen = std::collections::BTreeMap::new();
    for chunk in chunks {
        if let Some(num) = chunk.chapter_num() {
            seen.entry(num).or_insert_with(|| chunk.chapter_title().map(str::to_string));
        }
    }
    seen.into_iter().collect()
}

fn chapter_pairs_from_retrieved(retrieved: &[RetrievedChunk]) -> Vec<(i64, Option<String>)> {
    let mut seen = std::collections::BTreeMap::new();
    for chunk in retrieved {
        if let Some(num) = chunk.chapter_num {
            seen.entry(num).or_insert_with(|| chunk.chapter_title.clone());
        }
    }
    seen.into_iter().collect()
}

async fn chapter_nav(base: i64, retrieved: &[RetrievedChunk], deps: &StrategyDeps<'_>) -> StrategyOutcome {
    let mut pairs = chapter_pairs_from_retrieved(&retrieved[..retrieved.len().min(8)]);
    if pairs.is_empty() {
        pairs = chapter_pairs_from_chunks(deps.corpus.iter());
    }

    match pairs.iter().find(|(n, _)| *n == base + 1) {
        Some((num, title)) => {
            let title = title.clone().unwrap_or_default();
            StrategyOutcome {
                response: format!("The next chapter is Chapter {num}: {title}."),
                citations: citations_from(retrieved, 3),
                confidence: 0.9,
                requires_human: false,
                context_patch: Some(json!({ "last_chapter": num })),
            }
        }
        None => StrategyOutcome {
            response: format!("I couldn't find a chapter after Chapter {base}."),
            citations: Vec::new(),
            confidence: 0.2,
            requires_human: true,
            context_patch: None,
        },
    }
}

/// Prefers the vector index's `scroll_chapters` (fast path when healthy),
/// falls back to the chunk store's metadata scan, finally to regex
/// extraction over whatever was retrieved for this turn.
async fn resolve_chapters(retrieved: &[RetrievedChunk], deps: &StrategyDeps<'_>) -> Vec<(i64, Option<String>)> {
    let from_index = deps.vector_index.scroll_chapters(deps.tenant_id).await;
    if !from_index.is_empty() {
        return dedupe_chapters(from_index);
    }

    match deps.chunk_store.chapters(deps.tenant_id).await {
        Ok(pairs) if !pairs.is_empty() => return dedupe_chapters(pairs),
        _ => {}
    }

    chapter_pairs_from_retrieved(retrieved)
}

fn dedupe_chapters(pairs: Vec<(i64, Option<String>)>) -> Vec<(i64, Option<String>)> {
    let mut map = std::collections::BTreeMap::new();
    for (num, title) in pairs {
        map.entry(num).or_insert(title);
    }
    map.into_iter().collect()
}

async fn chapter_count(deps: &StrategyDeps<'_>) -> StrategyOutcome {
    let pairs = resolve_chapters(&[], deps).await;
    StrategyOutcome {
        response: format!("There are {} chapters.", pairs.len()),
        citations: Vec::new(),
        confidence: if pairs.is_empty() { 0.3 } else { 0.9 },
        requires_human: pairs.is_empty(),
        context_patch: None,
    }
}

async fn chapter_titles(n: Option<usize>, retrieved: &[RetrievedChunk], deps: &StrategyDeps<'_>) -> StrategyOutcome {
    let mut pairs = resolve_chapters(retrieved, deps).await;
    pairs.sort_by_key(|(num, _)| *num);
    let cap = n.unwrap_or(20).min(20);
    pairs.truncate(cap);

    if pairs.is_empty() {
        return StrategyOutcome {
            response: "I couldn't find any chapter titles.".to_string(),
            citations: Vec::new(),
            confidence: 0.2,
            requires_human: true,
            context_patch: None,
        };
    }

    let body = pairs
        .iter()
        .map(|(num, title)| format!("Chapter {num}: {}", title.clone().unwrap_or_default()))
        .collect::<Vec<_>>()
        .join("\n");
    StrategyOutcome {
        response: format!("Chapter titles:\n{body}"),
        citations: citations_from(retrieved, 3),
        confidence: 0.85,
        requires_human: false,
        context_patch: None,
    }
}

async fn chapter_summary(chapter: i64, retrieved: &[RetrievedChunk], deps: &StrategyDeps<'_>) -> StrategyOutcome {
    let relevant: Vec<&RetrievedChunk> = retrieved
        .iter()
        .filter(|c| c.chapter_num == Some(chapter) || c.content.to_lowercase().contains(&format!("chapter {chapter}")))
        .collect();

    if relevant.is_empty() {
        return StrategyOutcome {
            response: format!("I couldn't find content for Chapter {chapter}."),
            citations: Vec::new(),
            confidence: 0.2,
            requires_human: true,
            context_patch: None,
        };
    }

    let joined_context = relevant.iter().map(|c| c.content.as_str()).collect::<Vec<_>>().join("\n");
    let bullets = if let Some(generator) = deps.generator {
        let prompt = format!(
            "Summarize CHAPTER {chapter} in 5 to 7 bullet points, using only the CONTEXT below.\n\nCONTEXT:\n{joined_context}"
        );
        match generator.generate("You write concise, grounded bullet-point summaries.", &prompt).await {
            Ok(text) if !text.trim().is_empty() => text,
            _ => fallback_bullets(&joined_context),
        }
    } else {
        fallback_bullets(&joined_context)
    };

    StrategyOutcome {
        response: format!("Summary of Chapter {chapter}:\n{bullets}"),
        citations: citations_from(relevant.into_iter().cloned().collect::<Vec<_>>().as_slice(), 6),
        confidence: 0.8,
        requires_human: false,
        context_patch: Some(json!({ "last_chapter": chapter })),
    }
}

fn fallback_bullets(context: &str) -> String {
    split_sentences_loose(context)
        .into_iter()
        .take(6)
        .map(|s| format!("- {s}"))
        .collect::<Vec<_>>()
        .join("\n")
}

// ------------------------------------------------------------------ S-list

static LIST_ITEM: once_cell::sync::Lazy<regex::Regex> =
    once_cell::sync::Lazy::new(|| regex::Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s*(.+)$").unwrap());

fn extract_list_items(retrieved: &[RetrievedChunk]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for chunk in retrieved.iter().take(6) {
        for line in chunk.content.lines() {
            if let Some(caps) = LIST_ITEM.captures(line) {
                let item = caps[1].trim().to_string();
                if !item.is_empty() && seen.insert(item.clone()) {
                    out.push(item);
                }
            }
        }
    }
    out
}

fn list_request(
    mode: ListMode,
    n: usize,
    topic: Option<&str>,
    retrieved: &[RetrievedChunk],
    conversation: &Conversation,
) -> StrategyOutcome {
    match mode {
        ListMode::First => {
            let items = extract_list_items(retrieved);
            if items.is_empty() {
                return StrategyOutcome {
                    response: "I couldn't find a list to answer that.".to_string(),
                    citations: Vec::new(),
                    confidence: 0.2,
                    requires_human: true,
                    context_patch: None,
                };
            }
            let end = n.min(items.len());
            let slice = &items[..end];
            StrategyOutcome {
                response: format_enumerated(slice, 0),
                citations: citations_from(retrieved, 3),
                confidence: 0.85,
                requires_human: false,
                context_patch: Some(json!({
                    "last_list_topic": topic,
                    "last_list_items": items,
                    "last_list_index": end,
                })),
            }
        }
        ListMode::Next => {
            let stored_topic = conversation.last_list_topic();
            let topic_matches = match (topic, &stored_topic) {
                (Some(t), Some(stored)) => t.eq_ignore_ascii_case(stored),
                (None, _) => true,
                (Some(_), None) => false,
            };

            let items = if topic_matches {
                conversation.last_list_items()
            } else {
                extract_list_items(retrieved)
            };
            let start = if topic_matches { conversation.last_list_index() } else { 0 };

            if items.is_empty() || start >= items.len() {
                // Documented policy (spec §9 Open Questions): past-the-end
                // "next" requests report exhaustion rather than erroring.
                return StrategyOutcome {
                    response: "There are no further items in the list.".to_string(),
                    citations: Vec::new(),
                    confidence: 0.3,
                    requires_human: false,
                    context_patch: Some(json!({ "last_list_index": items.len() })),
                };
            }

            let end = (start + n).min(items.len());
            let slice = &items[start..end];
            StrategyOutcome {
                response: format_enumerated(slice, start),
                citations: citations_from(retrieved, 3),
                confidence: 0.85,
                requires_human: false,
                context_patch: Some(json!({
                    "last_list_topic": topic.or(stored_topic.as_deref()),
                    "last_list_items": items,
                    "last_list_index": end,
                })),
            }
        }
    }
}

/// Numbers `items` starting at `start_index + 1`, so a "next" page
/// continues the same ordered list rather than restarting at 1 (spec
/// §8 scenario 5: "next 2" on a five-item list renders items 4-5).
fn format_enumerated(items: &[String], start_index: usize) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", start_index + i + 1, item))
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------- S-policy

const POLICY_TERMS: &[&str] = &[
    "currency", "conversion", "unwithdrawn", "withdrawn", "loan", "amount", "approved currency",
    "variable spread", "minimum", "maximum",
];

fn policy_summary(retrieved: &[RetrievedChunk]) -> StrategyOutcome {
    let joined = retrieved.iter().map(|c| c.content.as_str()).collect::<Vec<_>>().join(" ");
    let sentences = split_sentences_loose(&joined);

    let mut scored: Vec<(f32, &str)> = sentences
        .iter()
        .map(|s| {
            let lower = s.to_lowercase();
            let hits = POLICY_TERMS.iter().filter(|t| lower.contains(*t)).count() as f32;
            let length_bonus = (s.chars().count() as f32 / 200.0).min(1.0);
            (hits + length_bonus, s.as_str())
        })
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let bullets: Vec<&str> = scored.iter().filter(|(score, _)| *score > 0.0).take(5).map(|(_, s)| *s).collect();

    if bullets.is_empty() {
        return StrategyOutcome {
            response: "I couldn't find policy details on that in the available documents.".to_string(),
            citations: Vec::new(),
            confidence: 0.2,
            requires_human: true,
            context_patch: None,
        };
    }

    let body = bullets.iter().map(|s| format!("- {s}")).collect::<Vec<_>>().join("\n");
    StrategyOutcome {
        response: format!("Policy summary:\n{body}"),
        citations: citations_from(retrieved, 6),
        confidence: 0.85,
        requires_human: false,
        context_patch: None,
    }
}

// --------------------------------------------------------------- S-generic

async fn generic(utterance: &str, retrieved: &[RetrievedChunk], deps: &StrategyDeps<'_>) -> StrategyOutcome {
    let Some(generator) = deps.generator else {
        return generic_snippet_fallback(retrieved);
    };
    if retrieved.is_empty() {
        return StrategyOutcome {
            response: NO_INFO_SENTINEL.to_string(),
            citations: Vec::new(),
            confidence: 0.0,
            requires_human: true,
            context_patch: None,
        };
    }

    let context_block = retrieved.iter().map(|c| c.content.as_str()).collect::<Vec<_>>().join("\n---\n");
    let answer = generate_grounded(generator, utterance, &context_block).await;

    if !is_sentinel(&answer) {
        return StrategyOutcome {
            response: answer,
            citations: citations_from(retrieved, 6),
            confidence: 0.75,
            requires_human: false,
            context_patch: None,
        };
    }

    // One reformulation pass.
    let paraphrases = generate_paraphrases(generator, utterance).await;
    let mut merged: Vec<RetrievedChunk> = retrieved.to_vec();
    for paraphrase in &paraphrases {
        let retriever = HybridRetriever::new(deps.corpus, deps.retriever_config);
        let hits = retriever.retrieve(paraphrase, 10, deps.tenant_id, None, None).await;
        merged.extend(hits);
    }
    merged = dedupe_and_rerank(merged);

    if merged.is_empty() {
        return generic_snippet_fallback(retrieved);
    }

    let reformulated_context = merged.iter().map(|c| c.content.as_str()).collect::<Vec<_>>().join("\n---\n");
    let second_answer = generate_grounded(generator, utterance, &reformulated_context).await;

    if !is_sentinel(&second_answer) {
        StrategyOutcome {
            response: second_answer,
            citations: citations_from(&merged, 6),
            confidence: 0.65,
            requires_human: false,
            context_patch: None,
        }
    } else {
        generic_snippet_fallback(&merged)
    }
}

async fn generate_grounded(generator: &dyn Generator, utterance: &str, context_block: &str) -> String {
    let system = format!(
        "Answer the question using only the information in CONTEXT. If the answer cannot be \
         derived from CONTEXT, reply with exactly: \"{NO_INFO_SENTINEL}\"\n\nCONTEXT:\n{context_block}"
    );
    generator.generate(&system, utterance).await.unwrap_or_else(|_| NO_INFO_SENTINEL.to_string())
}

async fn generate_paraphrases(generator: &dyn Generator, utterance: &str) -> Vec<String> {
    let prompt = format!(
        "Give 3 to 5 alternative phrasings of this question, one per line, no numbering:\n{utterance}"
    );
    match generator.generate("You rewrite questions for search retrieval.", &prompt).await {
        Ok(text) => text.lines().map(str::trim).filter(|l| !l.is_empty()).take(5).map(str::to_string).collect(),
        Err(_) => Vec::new(),
    }
}

fn is_sentinel(answer: &str) -> bool {
    answer.trim() == NO_INFO_SENTINEL || answer.trim().is_empty()
}

fn dedupe_and_rerank(chunks: Vec<RetrievedChunk>) -> Vec<RetrievedChunk> {
    let mut seen = HashSet::new();
    let mut out: Vec<RetrievedChunk> = chunks
        .into_iter()
        .filter(|c| seen.insert(c.content.to_lowercase().chars().take(200).collect::<String>()))
        .collect();
    out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    out.truncate(20);
    out
}

fn generic_snippet_fallback(retrieved: &[RetrievedChunk]) -> StrategyOutcome {
    match retrieved.first() {
        Some(chunk) => StrategyOutcome {
            response: chunk.content.chars().take(500).collect(),
            citations: citations_from(retrieved, 6),
            confidence: 0.4,
            requires_human: false,
            context_patch: None,
        },
        None => StrategyOutcome {
            response: NO_INFO_SENTINEL.to_string(),
            citations: Vec::new(),
            confidence: 0.0,
            requires_human: true,
            context_patch: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tabular_chunk(document_id: Uuid, columns: &[&str], cells: &[&str]) -> KnowledgeChunk {
        let columns: Vec<String> = columns.iter().map(|c| normalize_header(c)).collect();
        let content = cells
            .iter()
            .map(|c| if c.contains(',') { format!("\"{c}\"") } else { c.to_string() })
            .collect::<Vec<_>>()
            .join(",");
        KnowledgeChunk {
            id: Uuid::new_v4(),
            document_id,
            content,
            chunk_index: 1,
            embedding: vec![],
            metadata: json!({ "columns": columns }),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn tabular_salary_lookup_formats_currency() {
        let doc_id = Uuid::new_v4();
        let corpus = vec![tabular_chunk(
            doc_id,
            &["Employee_Name", "Department", "Salary", "Manager", "Status"],
            &["Akinkuolie, Sarah", "Engineering", "95000", "John Smith", "Active"],
        )];
        let outcome = tabular_field(TabularField::Salary, Some("Akinkuolie, Sarah"), &corpus);
        assert_eq!(outcome.response, "The salary of Akinkuolie, Sarah is $95,000.");
        assert!(outcome.confidence >= 0.9);
        assert!(!outcome.requires_human);
        assert!(outcome.citations[0].snippet.contains("Akinkuolie, Sarah"));
    }

    #[test]
    fn unknown_person_requires_human() {
        let doc_id = Uuid::new_v4();
        let corpus = vec![tabular_chunk(
            doc_id,
            &["Employee_Name", "Department", "Salary"],
            &["Akinkuolie, Sarah", "Engineering", "95000"],
        )];
        let outcome = tabular_field(TabularField::Salary, Some("Jones, Pat"), &corpus);
        assert!(outcome.requires_human);
        assert_eq!(outcome.confidence, 0.0);
        assert!(outcome.response.contains("Jones, Pat"));
    }

    #[test]
    fn list_first_then_next_continuation() {
        let chunk = RetrievedChunk {
            chunk_id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            content: "- Initiating\n- Planning\n- Executing\n- Monitoring\n- Closing".to_string(),
            chapter_num: None,
            chapter_title: None,
            page: None,
            score: 1.0,
        };
        let retrieved = vec![chunk];

        let conv_blank = blank_conversation(json!({}));
        let first = list_request(ListMode::First, 3, Some("project management"), &retrieved, &conv_blank);
        assert!(first.response.contains("1. Initiating"));
        assert!(first.response.contains("3. Executing"));

        let patch = first.context_patch.unwrap();
        let conv_after_first = blank_conversation(patch);
        let next = list_request(ListMode::Next, 2, None, &retrieved, &conv_after_first);
        assert!(next.response.contains("4. Monitoring"));
        assert!(next.response.contains("5. Closing"));

        let patch2 = next.context_patch.unwrap();
        let conv_after_second = blank_conversation(patch2);
        let exhausted = list_request(ListMode::Next, 1, None, &retrieved, &conv_after_second);
        assert_eq!(exhausted.response, "There are no further items in the list.");
        assert!(!exhausted.requires_human);
    }

    fn blank_conversation(context: Value) -> Conversation {
        Conversation {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            channel: "test".to_string(),
            status: crate::domain::ConversationStatus::Active,
            context,
            started_at: Utc::now(),
            last_message_at: Utc::now(),
        }
    }

}
