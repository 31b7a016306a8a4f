//! Hybrid retriever (C6): BM25-lite + in-memory dense heuristic + exact-
//! substring promotion, fused by reciprocal rank fusion, with an external
//! vector index merged in as a side channel. Grounded on
//! `original_source/.../retrieval_service.py`'s three-list-then-fuse
//! shape, reimplemented against `domain::KnowledgeChunk` rather than a
//! dict-of-dicts corpus (spec §9 "arena-and-index" redesign note).
//!
//! Per spec §9 Open Questions, the per-request retriever always uses the
//! in-memory heuristic for its own dense list; the external vector index
//! (`database::vector_index::VectorIndex`) is consulted only as a side
//! channel appended after fusion, never substituted into list 2.

use crate::database::vector_index::VectorIndex;
use crate::domain::KnowledgeChunk;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub content: String,
    pub chapter_num: Option<i64>,
    pub chapter_title: Option<String>,
    pub page: Option<i64>,
    pub score: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct RetrieverConfig {
    pub bm25_k1: f32,
    pub bm25_b: f32,
    pub rrf_k: f32,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            bm25_k1: 1.5,
            bm25_b: 0.75,
            rrf_k: 60.0,
        }
    }
}

/// Constructed fresh per request from a tenant's corpus snapshot (spec
/// §5): never shared between requests, so tenant isolation needs no
/// locking.
pub struct HybridRetriever<'a> {
    corpus: &'a [KnowledgeChunk],
    config: RetrieverConfig,
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

impl<'a> HybridRetriever<'a> {
    pub fn new(corpus: &'a [KnowledgeChunk], config: RetrieverConfig) -> Self {
        Self { corpus, config }
    }

    /// Runs the full retrieval pipeline: keyword + dense lists (each with
    /// exact-substring pre-promotion), RRF fusion to `top_k`, then an
    /// external vector-index side channel appended and deduplicated,
    /// capped at 20 total.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        tenant_id: Uuid,
        query_embedding: Option<&[f32]>,
        vector_index: Option<&(dyn VectorIndex)>,
    ) -> Vec<RetrievedChunk> {
        if self.corpus.is_empty() {
            return Vec::new();
        }

        let keyword_ranked = self.rank_keyword(query);
        let dense_ranked = self.rank_dense(query);

        let fused = reciprocal_rank_fusion(&[&keyword_ranked, &dense_ranked], self.config.rrf_k);
        let mut results: Vec<RetrievedChunk> = fused
            .into_iter()
            .take(top_k)
            .filter_map(|(idx, score)| self.to_retrieved(idx, score))
            .collect();

        if let (Some(index), Some(embedding)) = (vector_index, query_embedding) {
            let side_channel = index.search(tenant_id, embedding, top_k).await;
            for hit in side_channel {
                results.push(RetrievedChunk {
                    chunk_id: hit.chunk_id,
                    document_id: hit.document_id,
                    content: hit.content,
                    chapter_num: None,
                    chapter_title: None,
                    page: None,
                    score: hit.score,
                });
            }
        }

        dedupe_by_prefix(results, 20)
    }

    fn to_retrieved(&self, idx: usize, score: f32) -> Option<RetrievedChunk> {
        let chunk = self.corpus.get(idx)?;
        Some(RetrievedChunk {
            chunk_id: chunk.id,
            document_id: chunk.document_id,
            content: chunk.content.clone(),
            chapter_num: chunk.chapter_num(),
            chapter_title: chunk.chapter_title().map(str::to_string),
            page: chunk.page(),
            score,
        })
    }

    /// List 1: classical BM25 (`k1`, `b`), whitespace tokenization, a
    /// single-term IDF approximation, plus the substring/term-overlap
    /// boosts layered on after BM25. Returns `(corpus_index, score)`
    /// sorted descending, with up to 3 exact-substring matches spliced to
    /// the front first.
    fn rank_keyword(&self, query: &str) -> Vec<(usize, f32)> {
        let query_lower = query.to_lowercase();
        let query_terms = tokenize(&query_lower);
        let query_term_set: HashSet<&str> = query_terms.iter().map(String::as_str).collect();

        let doc_tokens: Vec<Vec<String>> = self.corpus.iter().map(|c| tokenize(&c.content)).collect();
        let doc_lens: Vec<usize> = doc_tokens.iter().map(|t| t.len()).collect();
        let avg_len = if doc_lens.is_empty() {
            0.0
        } else {
            doc_lens.iter().sum::<usize>() as f32 / doc_lens.len() as f32
        };
        let n = self.corpus.len() as f32;

        let mut df: HashMap<&str, usize> = HashMap::new();
        for (term_set, _) in doc_tokens.iter().map(|t| (t.iter().collect::<HashSet<_>>(), ())) {
            for term in term_set {
                *df.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        let mut scores: Vec<(usize, f32)> = Vec::with_capacity(self.corpus.len());
        for (idx, tokens) in doc_tokens.iter().enumerate() {
            let mut term_freq: HashMap<&str, usize> = HashMap::new();
            for t in tokens {
                *term_freq.entry(t.as_str()).or_insert(0) += 1;
            }

            let mut bm25 = 0.0f32;
            for term in &query_terms {
                let Some(&tf) = term_freq.get(term.as_str()) else {
                    continue;
                };
                let doc_df = df.get(term.as_str()).copied().unwrap_or(0).max(1) as f32;
                let idf = ((n - doc_df + 0.5) / (doc_df + 0.5) + 1.0).ln();
                let tf = tf as f32;
                let len_norm = 1.0 - self.config.bm25_b
                    + self.config.bm25_b * (doc_lens[idx] as f32 / avg_len.max(1.0));
                bm25 += idf * (tf * (self.config.bm25_k1 + 1.0)) / (tf + self.config.bm25_k1 * len_norm);
            }

            let content_lower = self.corpus[idx].content.to_lowercase();
            let boost = if content_lower.contains(&query_lower) {
                10.0
            } else if !query_term_set.is_empty()
                && query_term_set.iter().all(|t| content_lower.contains(t))
            {
                5.0
            } else {
                let matching = query_term_set.iter().filter(|t| content_lower.contains(**t)).count();
                matching as f32
            };

            scores.push((idx, bm25 + boost));
        }

        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        self.promote_exact_substring(&query_lower, scores)
    }

    /// List 2: in-memory dense heuristic,
    /// `score = 2*Jaccard(query_words, doc_words) + 1/(1+|len(doc)-len(query)|/max(1,len(query)))`.
    fn rank_dense(&self, query: &str) -> Vec<(usize, f32)> {
        let query_lower = query.to_lowercase();
        let query_words: HashSet<String> = tokenize(&query_lower).into_iter().collect();
        let query_len = query.chars().count().max(1) as f32;

        let mut scores: Vec<(usize, f32)> = self
            .corpus
            .iter()
            .enumerate()
            .map(|(idx, chunk)| {
                let doc_words: HashSet<String> = tokenize(&chunk.content).into_iter().collect();
                let jaccard = jaccard(&query_words, &doc_words);
                let len_closeness = 1.0
                    / (1.0 + (chunk.content.chars().count() as f32 - query_len).abs() / query_len);
                (idx, 2.0 * jaccard + len_closeness)
            })
            .collect();

        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        self.promote_exact_substring(&query_lower, scores)
    }

    /// Splices up to 3 chunks whose content contains the full (lowercased)
    /// query to the front of `ranked`, preserving the rest's relative
    /// order and removing duplicates of the promoted indices.
    fn promote_exact_substring(&self, query_lower: &str, ranked: Vec<(usize, f32)>) -> Vec<(usize, f32)> {
        if query_lower.trim().is_empty() {
            return ranked;
        }
        let promoted: Vec<usize> = self
            .corpus
            .iter()
            .enumerate()
            .filter(|(_, c)| c.content.to_lowercase().contains(query_lower))
            .take(3)
            .map(|(idx, _)| idx)
            .collect();

        if promoted.is_empty() {
            return ranked;
        }

        let promoted_set: HashSet<usize> = promoted.iter().copied().collect();
        let mut out: Vec<(usize, f32)> = promoted
            .iter()
            .map(|&idx| {
                let score = ranked.iter().find(|(i, _)| *i == idx).map(|(_, s)| *s).unwrap_or(0.0);
                (idx, score)
            })
            .collect();
        out.extend(ranked.into_iter().filter(|(idx, _)| !promoted_set.contains(idx)));
        out
    }
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f32;
    let union = a.union(b).count() as f32;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Reciprocal rank fusion: for every list `l` and 1-based rank `r`, add
/// `1/(k+r)` to the candidate's score; sorted descending.
pub fn reciprocal_rank_fusion(lists: &[&Vec<(usize, f32)>], k: f32) -> Vec<(usize, f32)> {
    let mut scores: HashMap<usize, f32> = HashMap::new();
    for list in lists {
        for (rank, (idx, _)) in list.iter().enumerate() {
            *scores.entry(*idx).or_insert(0.0) += 1.0 / (k + (rank as f32 + 1.0));
        }
    }
    let mut out: Vec<(usize, f32)> = scores.into_iter().collect();
    out.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    out
}

/// De-duplicates by the first 200 chars (lowercased) of each chunk's
/// content, preserving first-seen order, capped at `max_len`.
fn dedupe_by_prefix(chunks: Vec<RetrievedChunk>, max_len: usize) -> Vec<RetrievedChunk> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for chunk in chunks {
        let prefix: String = chunk.content.to_lowercase().chars().take(200).collect();
        if seen.insert(prefix) {
            out.push(chunk);
            if out.len() >= max_len {
                break;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::KnowledgeChunk;
    use chrono::Utc;
    use serde_json::json;

    fn chunk(content: &str) -> KnowledgeChunk {
        KnowledgeChunk {
            id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            content: content.to_string(),
            chunk_index: 0,
            embedding: vec![],
            metadata: json!({}),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn exact_substring_match_ranks_first() {
        let corpus = vec![
            chunk("totally unrelated filler text about nothing in particular"),
            chunk("the salary of Akinkuolie, Sarah is ninety five thousand"),
        ];
        let retriever = HybridRetriever::new(&corpus, RetrieverConfig::default());
        let results = retriever
            .retrieve("salary of Akinkuolie, Sarah", 5, Uuid::new_v4(), None, None)
            .await;
        assert_eq!(results[0].content, corpus[1].content);
    }

    #[tokio::test]
    async fn empty_corpus_returns_empty() {
        let corpus: Vec<KnowledgeChunk> = vec![];
        let retriever = HybridRetriever::new(&corpus, RetrieverConfig::default());
        let results = retriever.retrieve("anything", 5, Uuid::new_v4(), None, None).await;
        assert!(results.is_empty());
    }

    #[test]
    fn rrf_preserves_relative_order_when_both_lists_agree() {
        let list_a = vec![(0, 5.0), (1, 3.0), (2, 1.0)];
        let list_b = vec![(0, 9.0), (1, 2.0), (2, 0.5)];
        let fused = reciprocal_rank_fusion(&[&list_a, &list_b], 60.0);
        assert_eq!(fused[0].0, 0);
        assert_eq!(fused[1].0, 1);
        assert_eq!(fused[2].0, 2);
    }

    #[test]
    fn jaccard_is_one_for_identical_sets() {
        let a: HashSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        let b = a.clone();
        assert_eq!(jaccard(&a, &b), 1.0);
    }
}
